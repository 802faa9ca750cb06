use core::num::NonZeroUsize;
use core::time::Duration;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::{
    cooperation::{ActiveCooperation, Coordinator, DisabledCooperation},
    error::{ConfigError, Result},
};

/// Whether coordination is on unless told otherwise.
pub const DEFAULT_ENABLED: bool = true;
/// How long a waiter waits in total before giving up.
pub const DEFAULT_MAJOR_TIMEOUT: Duration = Duration::from_secs(30);
/// How often a waiter re-checks for a result or a free worker slot.
pub const DEFAULT_MINOR_TIMEOUT: Duration = Duration::from_millis(50);
/// How many callers may run the work for one key at the same time.
pub const DEFAULT_THREADS_PER_KEY: usize = 1;

/// Validated coordinator tunables.
///
/// A config is immutable: it is produced by [`Builder::config`] (or
/// [`Default`]) and copied into every coordinator built from it. To change
/// settings, build a new coordinator and replace the old one wholesale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CooperationConfig {
    enabled: bool,
    major_timeout: Duration,
    minor_timeout: Duration,
    threads_per_key: NonZeroUsize,
}

impl CooperationConfig {
    /// Returns a [`Builder`] seeded with the defaults.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Converts a signed millisecond count, as read from an environment
    /// variable or a command line flag, into a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NegativeTimeout`] if `millis` is negative.
    ///
    /// # Example
    /// ```
    /// use cooperation::{ConfigError, CooperationConfig};
    /// use core::time::Duration;
    ///
    /// assert_eq!(CooperationConfig::timeout_from_millis(250), Ok(Duration::from_millis(250)));
    /// assert_eq!(
    ///     CooperationConfig::timeout_from_millis(-1),
    ///     Err(ConfigError::NegativeTimeout { millis: -1 })
    /// );
    /// ```
    pub fn timeout_from_millis(millis: i64) -> Result<Duration, ConfigError> {
        u64::try_from(millis)
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::NegativeTimeout { millis })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn major_timeout(&self) -> Duration {
        self.major_timeout
    }

    pub fn minor_timeout(&self) -> Duration {
        self.minor_timeout
    }

    pub fn threads_per_key(&self) -> usize {
        self.threads_per_key.get()
    }
}

impl Default for CooperationConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            major_timeout: DEFAULT_MAJOR_TIMEOUT,
            minor_timeout: DEFAULT_MINOR_TIMEOUT,
            threads_per_key: NonZeroUsize::MIN,
        }
    }
}

/// Returns a fresh [`Builder`] seeded with the defaults.
///
/// # Example
/// ```
/// use cooperation::{configure, Cooperation, Error};
/// use core::time::Duration;
///
/// let coordinator = configure()
///     .major_timeout(Duration::from_secs(5))
///     .minor_timeout(Duration::from_millis(10))
///     .threads_per_key(2)
///     .build::<u32, String>("artifact-fetch")
///     .unwrap();
///
/// let value = coordinator.run("org/example/1.0", || Ok(42)).unwrap();
/// assert_eq!(value, 42);
///
/// let failed = coordinator.run("org/example/2.0", || Err("offline".to_string()));
/// assert_eq!(failed, Err(Error::Work("offline".to_string())));
/// ```
pub fn configure() -> Builder {
    Builder::default()
}

/// Chained setter interface for coordinator settings.
///
/// Setters never panic. An invalid argument is remembered and reported by
/// [`Builder::build`] (or [`Builder::config`]), so a whole configuration
/// reads as one expression. When several setters are invalid the first one
/// wins.
///
/// The builder holds no state beyond its settings: every call to `build`
/// returns an independent coordinator.
#[derive(Clone, Debug)]
pub struct Builder {
    enabled: bool,
    major_timeout: Duration,
    minor_timeout: Duration,
    threads_per_key: usize,
    invalid: Option<ConfigError>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            major_timeout: DEFAULT_MAJOR_TIMEOUT,
            minor_timeout: DEFAULT_MINOR_TIMEOUT,
            threads_per_key: DEFAULT_THREADS_PER_KEY,
            invalid: None,
        }
    }
}

impl Builder {
    /// Turns coordination on or off. A disabled coordinator runs every
    /// caller's work directly.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the longest time a waiter waits before failing with
    /// [`crate::Error::Timeout`].
    #[must_use]
    pub fn major_timeout(mut self, timeout: Duration) -> Self {
        self.major_timeout = timeout;
        self
    }

    /// Sets how often a waiter re-checks for a published result or a free
    /// worker slot. Must be non-zero and no larger than the major timeout.
    #[must_use]
    pub fn minor_timeout(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            self.reject(ConfigError::ZeroMinorTimeout);
        }
        self.minor_timeout = timeout;
        self
    }

    /// Sets how many callers may run the work for the same key concurrently.
    /// Must be at least 1.
    #[must_use]
    pub fn threads_per_key(mut self, threads: usize) -> Self {
        if threads == 0 {
            self.reject(ConfigError::ZeroThreadsPerKey);
        }
        self.threads_per_key = threads;
        self
    }

    fn reject(&mut self, err: ConfigError) {
        self.invalid.get_or_insert(err);
    }

    /// Validates the settings without building a coordinator.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setter argument, or
    /// [`ConfigError::MinorExceedsMajor`] when the poll interval is longer
    /// than the total wait.
    pub fn config(&self) -> Result<CooperationConfig, ConfigError> {
        if let Some(err) = &self.invalid {
            return Err(err.clone());
        }
        let threads_per_key =
            NonZeroUsize::new(self.threads_per_key).ok_or(ConfigError::ZeroThreadsPerKey)?;
        if self.minor_timeout.is_zero() {
            return Err(ConfigError::ZeroMinorTimeout);
        }
        if self.minor_timeout > self.major_timeout {
            return Err(ConfigError::MinorExceedsMajor {
                minor: self.minor_timeout,
                major: self.major_timeout,
            });
        }
        Ok(CooperationConfig {
            enabled: self.enabled,
            major_timeout: self.major_timeout,
            minor_timeout: self.minor_timeout,
            threads_per_key,
        })
    }

    /// Builds a coordinator tagged with `id`.
    ///
    /// When coordination is disabled the result is a passthrough
    /// [`Coordinator::Disabled`]; the id is kept for diagnostics only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyId`] for an empty id, or any error
    /// [`Builder::config`] reports.
    pub fn build<T, E>(&self, id: impl Into<String>) -> Result<Coordinator<T, E>, ConfigError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ConfigError::EmptyId);
        }
        let config = self.config()?;
        if !config.enabled() {
            #[cfg(feature = "tracing")]
            debug!(%id, "disabled cooperation");
            return Ok(Coordinator::Disabled(DisabledCooperation::new(id)));
        }
        #[cfg(feature = "tracing")]
        debug!(
            %id,
            major_timeout = ?config.major_timeout(),
            minor_timeout = ?config.minor_timeout(),
            threads_per_key = config.threads_per_key(),
            "active cooperation"
        );
        Ok(Coordinator::Active(ActiveCooperation::new(id, config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = configure().config().unwrap();
        assert_eq!(config, CooperationConfig::default());
        assert!(config.enabled());
        assert_eq!(config.major_timeout(), DEFAULT_MAJOR_TIMEOUT);
        assert_eq!(config.minor_timeout(), DEFAULT_MINOR_TIMEOUT);
        assert_eq!(config.threads_per_key(), DEFAULT_THREADS_PER_KEY);
    }

    #[test]
    fn zero_threads_per_key_fails_at_build() {
        let err = configure().threads_per_key(0).build::<(), ()>("x").unwrap_err();
        assert_eq!(err, ConfigError::ZeroThreadsPerKey);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        assert_eq!(
            CooperationConfig::timeout_from_millis(-1),
            Err(ConfigError::NegativeTimeout { millis: -1 })
        );
        assert_eq!(
            CooperationConfig::timeout_from_millis(0),
            Ok(Duration::ZERO)
        );
    }

    #[test]
    fn zero_minor_timeout_is_rejected() {
        let err = configure()
            .minor_timeout(Duration::ZERO)
            .config()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroMinorTimeout);
    }

    #[test]
    fn minor_must_not_exceed_major() {
        let err = configure()
            .minor_timeout(Duration::from_secs(2))
            .major_timeout(Duration::from_secs(1))
            .config()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MinorExceedsMajor {
                minor: Duration::from_secs(2),
                major: Duration::from_secs(1),
            }
        );

        // Setter order does not matter once the pair is consistent.
        let config = configure()
            .minor_timeout(Duration::from_secs(2))
            .major_timeout(Duration::from_secs(3))
            .config()
            .unwrap();
        assert_eq!(config.minor_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn first_invalid_setter_wins() {
        let err = configure()
            .threads_per_key(0)
            .minor_timeout(Duration::ZERO)
            .config()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroThreadsPerKey);
    }

    #[test]
    fn later_valid_setter_does_not_clear_earlier_error() {
        let err = configure()
            .threads_per_key(0)
            .threads_per_key(4)
            .build::<(), ()>("x")
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroThreadsPerKey);
    }

    #[test]
    fn empty_id_fails() {
        let err = configure().build::<(), ()>("").unwrap_err();
        assert_eq!(err, ConfigError::EmptyId);

        let err = configure().enabled(false).build::<(), ()>("").unwrap_err();
        assert_eq!(err, ConfigError::EmptyId);
    }

    #[test]
    fn enabled_flag_selects_variant() {
        let active = configure().build::<u8, ()>("on").unwrap();
        assert!(matches!(active, Coordinator::Active(_)));

        let disabled = configure().enabled(false).build::<u8, ()>("off").unwrap();
        assert!(matches!(disabled, Coordinator::Disabled(_)));
    }

    #[test]
    fn builder_is_reusable() {
        let builder = configure().threads_per_key(3);
        let a = builder.build::<u8, ()>("a").unwrap();
        let b = builder.build::<u8, ()>("b").unwrap();
        assert_eq!(a.config().unwrap().threads_per_key(), 3);
        assert_eq!(b.config().unwrap().threads_per_key(), 3);
    }
}
