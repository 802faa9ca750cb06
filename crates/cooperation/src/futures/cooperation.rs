use core::future::Future;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{instrument, warn};

use super::SleepProvider;
use crate::{
    cooperation::{
        ActiveCooperation, Coordinator, DisabledCooperation,
        state::{Admission, WaitStatus, deadline},
    },
    error::{Error, Result},
};

/// Extension trait for running cooperative work from async code.
///
/// Follows the same protocol as the blocking `run`, except that a waiter
/// never blocks its thread: it re-checks every minor timeout and sleeps
/// through the [`SleepProvider`] `S` in between.
///
/// Dropping the returned future is how an async caller cancels. A cancelled
/// waiter leaves the waiter set; a cancelled worker gives up its slot
/// without publishing, so a waiter can take over. Nobody else is affected.
pub trait CooperationAsyncExt<T, E> {
    /// Returns a future that resolves to the outcome for `key`: either from
    /// running `work` or from another caller that ran it.
    ///
    /// # Errors
    ///
    /// - [`Error::Work`] if the outcome is a failure.
    /// - [`Error::Timeout`] if the caller waited the full major timeout.
    fn run_async<S, F, Fut>(&self, key: &str, work: F) -> impl Future<Output = Result<T, Error<E>>>
    where
        S: SleepProvider,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>;
}

impl<T: Clone, E: Clone> ActiveCooperation<T, E> {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, work), fields(id = %self.id()))
    )]
    async fn cooperate_async<S, F, Fut>(&self, key: &str, work: F) -> Result<T, Error<E>>
    where
        S: SleepProvider,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let arrived = Instant::now();
        let config = *self.config();
        let threads_per_key = config.threads_per_key();
        let mut participant = self.registry.enter(key)?;

        match participant.admit(threads_per_key)? {
            Admission::Worker => {}
            Admission::Ready(outcome) => return outcome.map_err(Error::Work),
            Admission::Waiter(ticket) => {
                let until = deadline(arrived, config.major_timeout());
                loop {
                    match participant.poll(ticket, threads_per_key)? {
                        WaitStatus::Delivered(outcome) => return outcome.map_err(Error::Work),
                        WaitStatus::Promoted => break,
                        WaitStatus::Pending => {}
                    }
                    let now = Instant::now();
                    if now >= until {
                        participant.give_up();
                        let waited = arrived.elapsed();
                        #[cfg(feature = "tracing")]
                        warn!(key, ?waited, "gave up waiting for cooperative work");
                        return Err(Error::Timeout {
                            key: key.to_owned(),
                            waited,
                        });
                    }
                    S::sleep_for(config.minor_timeout().min(until - now)).await;
                }
            }
        }

        let outcome = work().await;
        participant.complete(&outcome);
        outcome.map_err(Error::Work)
    }
}

impl<T: Clone, E: Clone> CooperationAsyncExt<T, E> for ActiveCooperation<T, E> {
    fn run_async<S, F, Fut>(&self, key: &str, work: F) -> impl Future<Output = Result<T, Error<E>>>
    where
        S: SleepProvider,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cooperate_async::<S, F, Fut>(key, work)
    }
}

impl<T, E> CooperationAsyncExt<T, E> for DisabledCooperation {
    fn run_async<S, F, Fut>(&self, _key: &str, work: F) -> impl Future<Output = Result<T, Error<E>>>
    where
        S: SleepProvider,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        async move { work().await.map_err(Error::Work) }
    }
}

impl<T: Clone, E: Clone> CooperationAsyncExt<T, E> for Coordinator<T, E> {
    fn run_async<S, F, Fut>(&self, key: &str, work: F) -> impl Future<Output = Result<T, Error<E>>>
    where
        S: SleepProvider,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        async move {
            match self {
                Self::Active(inner) => inner.run_async::<S, F, Fut>(key, work).await,
                Self::Disabled(inner) => {
                    CooperationAsyncExt::<T, E>::run_async::<S, F, Fut>(inner, key, work).await
                }
            }
        }
    }
}
