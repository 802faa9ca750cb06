use std::collections::HashMap;

use crate::error::{Error, Result};

/// A minimal interface for running keyed, idempotent work cooperatively.
///
/// Implementations decide how many callers actually execute `work` for a
/// given key. Every caller receives an outcome: either from its own
/// execution or from the execution it waited on.
pub trait Cooperation<T, E> {
    /// The id this coordinator was built with. Used for diagnostics only.
    fn id(&self) -> &str;

    /// Runs `work` for `key`, or waits for and returns the outcome of a
    /// concurrent caller running it.
    ///
    /// # Errors
    ///
    /// - [`Error::Work`] carries the work's failure, whether this caller
    ///   produced it or waited on it.
    /// - [`Error::Timeout`] if this caller waited the full major timeout
    ///   without receiving an outcome or a worker slot.
    fn run<F>(&self, key: &str, work: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Result<T, E>;

    /// Returns how many callers are currently inside [`Self::run`], per key.
    fn thread_count_per_key(&self) -> HashMap<String, usize>;
}
