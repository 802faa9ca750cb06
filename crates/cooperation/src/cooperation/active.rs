use core::fmt;
use std::collections::HashMap;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{instrument, warn};

use crate::{
    config::CooperationConfig,
    cooperation::{
        Cooperation,
        state::{Admission, Registry, WaitStatus, deadline},
    },
    error::{Error, Result},
};

/// A coordinator that bounds how many callers run the work per key.
///
/// Up to `threads_per_key` callers for the same key become *workers* and run
/// their work. Further callers become *waiters*: they block, re-checking every
/// minor timeout, until a worker publishes an outcome (which they all
/// receive), a worker slot frees up without an outcome (the oldest waiter
/// takes it over), or the major timeout runs out ([`Error::Timeout`]).
///
/// The first outcome a generation produces, success or failure, is the one
/// every waiter of that generation receives. Once the last worker finishes
/// the generation retires and the next caller starts over, so outcomes are
/// never replayed beyond the callers that overlapped with the work.
///
/// Per-key state lives only while some caller is using the key.
///
/// ## Features
/// - ✅ Thread-safe, callable concurrently with arbitrary keys
/// - ✅ Different keys never wait on each other
/// - ✅ A panicking worker hands its slot to a waiter
///
/// ## See Also
/// - [`DisabledCooperation`]
/// - [`Coordinator`]
///
/// [`DisabledCooperation`]: crate::DisabledCooperation
/// [`Coordinator`]: crate::Coordinator
pub struct ActiveCooperation<T, E> {
    id: String,
    config: CooperationConfig,
    pub(crate) registry: Registry<T, E>,
}

impl<T, E> ActiveCooperation<T, E> {
    /// Creates a coordinator with an empty key registry. Prefer
    /// [`crate::configure`], which validates the settings and the id.
    pub fn new(id: impl Into<String>, config: CooperationConfig) -> Self {
        Self {
            id: id.into(),
            config,
            registry: Registry::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &CooperationConfig {
        &self.config
    }
}

impl<T: Clone, E: Clone> ActiveCooperation<T, E> {
    /// Runs `work` for `key` cooperatively, blocking the calling thread while
    /// waiting on other callers.
    ///
    /// # Errors
    ///
    /// - [`Error::Work`] if the outcome this caller produced or received is a
    ///   failure.
    /// - [`Error::Timeout`] if this caller waited the full major timeout.
    /// - [`Error::LockPoisoned`] if a coordinator lock was poisoned (std
    ///   mutex backend only).
    ///
    /// # Example
    /// ```
    /// use cooperation::{ActiveCooperation, CooperationConfig};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// let coordinator = ActiveCooperation::<usize, ()>::new("docs", CooperationConfig::default());
    /// let executions = AtomicUsize::new(0);
    ///
    /// std::thread::scope(|s| {
    ///     for _ in 0..4 {
    ///         s.spawn(|| {
    ///             coordinator.run("key", || Ok(executions.fetch_add(1, Ordering::SeqCst)))
    ///         });
    ///     }
    /// });
    /// assert!(executions.load(Ordering::SeqCst) >= 1);
    /// ```
    ///
    /// [`Error::LockPoisoned`]: crate::Error
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, work), fields(id = %self.id))
    )]
    pub fn run<F>(&self, key: &str, work: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let arrived = Instant::now();
        let threads_per_key = self.config.threads_per_key();
        let mut participant = self.registry.enter(key)?;

        match participant.admit(threads_per_key)? {
            Admission::Worker => {}
            Admission::Ready(outcome) => return outcome.map_err(Error::Work),
            Admission::Waiter(ticket) => {
                let until = deadline(arrived, self.config.major_timeout());
                match participant.wait(
                    ticket,
                    threads_per_key,
                    self.config.minor_timeout(),
                    until,
                )? {
                    WaitStatus::Delivered(outcome) => return outcome.map_err(Error::Work),
                    WaitStatus::Promoted => {}
                    WaitStatus::Pending => {
                        let waited = arrived.elapsed();
                        #[cfg(feature = "tracing")]
                        warn!(key, ?waited, "gave up waiting for cooperative work");
                        return Err(Error::Timeout {
                            key: key.to_owned(),
                            waited,
                        });
                    }
                }
            }
        }

        let outcome = work();
        participant.complete(&outcome);
        outcome.map_err(Error::Work)
    }

    /// Returns how many callers are currently inside `run`, per key.
    pub fn thread_count_per_key(&self) -> HashMap<String, usize> {
        self.registry.thread_counts()
    }
}

impl<T: Clone, E: Clone> Cooperation<T, E> for ActiveCooperation<T, E> {
    fn id(&self) -> &str {
        self.id()
    }

    fn run<F>(&self, key: &str, work: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.run(key, work)
    }

    fn thread_count_per_key(&self) -> HashMap<String, usize> {
        self.thread_count_per_key()
    }
}

impl<T, E> fmt::Debug for ActiveCooperation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCooperation")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
