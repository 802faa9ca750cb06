use core::time::Duration;

use crate::mutex::LockError;

/// A result type that defaults to an infallible error.
pub type Result<T, E = core::convert::Infallible> = core::result::Result<T, E>;

/// Errors raised while validating coordinator settings.
///
/// These only ever surface from the builder. A coordinator that was built
/// successfully never produces a `ConfigError` at call time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// `threads_per_key` must admit at least one worker.
    #[error("threads per key must be at least 1")]
    ZeroThreadsPerKey,

    /// A timeout was given as a negative number of milliseconds.
    #[error("timeout must be non-negative, got {millis}ms")]
    NegativeTimeout {
        /// The rejected value.
        millis: i64,
    },

    /// The waiter poll interval must be greater than zero.
    #[error("minor timeout must be greater than zero")]
    ZeroMinorTimeout,

    /// The poll interval cannot be longer than the total wait.
    #[error("minor timeout ({minor:?}) exceeds major timeout ({major:?})")]
    MinorExceedsMajor {
        /// The configured poll interval.
        minor: Duration,
        /// The configured total wait.
        major: Duration,
    },

    /// Coordinators must be tagged with a non-empty id.
    #[error("cooperation id must not be empty")]
    EmptyId,
}

/// All errors a coordinator can return from `run`.
///
/// `E` is the failure type of the caller's work. A failure produced by a
/// worker is delivered unchanged to that worker and a clone of it is
/// delivered to every caller that waited on the same generation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E> {
    /// A waiter exhausted the major timeout without receiving a result or a
    /// free worker slot.
    ///
    /// This is recoverable: the caller decides whether to retry, execute the
    /// work on its own or surface the failure.
    #[error("cooperation on key {key:?} timed out after {waited:?}")]
    Timeout {
        /// The key the caller was waiting on.
        key: String,
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The work itself failed.
    #[error("cooperative work failed: {0}")]
    Work(E),

    /// A coordinator lock was poisoned by a thread that panicked while
    /// holding it. Not available with the `parking-lot` feature, whose locks
    /// do not poison.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("cooperation lock poisoned")]
    LockPoisoned,
}

impl<E> Error<E> {
    /// Returns `true` if the caller gave up waiting on another caller's work.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the work failure, if this error carries one.
    pub fn into_work(self) -> Option<E> {
        match self {
            Self::Work(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(not(feature = "parking-lot"))]
impl<E> From<LockError> for Error<E> {
    fn from(_: LockError) -> Self {
        Self::LockPoisoned
    }
}

#[cfg(feature = "parking-lot")]
impl<E> From<LockError> for Error<E> {
    fn from(never: LockError) -> Self {
        match never {}
    }
}
