use core::pin::Pin;

use crate::{Error, Result, SleepProvider};

/// Extension trait for running cooperative work on the
/// [`tokio`](https://docs.rs/tokio) async runtime.
///
/// This trait provides a convenience method for using a [`SleepProvider`]
/// backed by the `tokio` runtime, allowing you to call `.run_async()`
/// without specifying the sleep strategy manually.
pub trait CooperationAsyncTokioExt<T, E> {
    /// Returns a future that resolves to the outcome for `key` using the
    /// [`TokioSleep`] provider.
    ///
    /// Internally delegates to [`CooperationAsyncExt::run_async`] with
    /// [`TokioSleep`] as the sleep strategy.
    ///
    /// # Errors
    ///
    /// This future returns the same errors as the underlying coordinator.
    ///
    /// [`CooperationAsyncExt::run_async`]: crate::CooperationAsyncExt::run_async
    fn run_async<F, Fut>(&self, key: &str, work: F) -> impl Future<Output = Result<T, Error<E>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>;
}

impl<C, T, E> CooperationAsyncTokioExt<T, E> for C
where
    C: crate::CooperationAsyncExt<T, E>,
{
    fn run_async<F, Fut>(&self, key: &str, work: F) -> impl Future<Output = Result<T, Error<E>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        <Self as crate::CooperationAsyncExt<T, E>>::run_async::<TokioSleep, F, Fut>(self, key, work)
    }
}

/// An implementation of [`SleepProvider`] using Tokio's timer.
///
/// This is the default provider for use in async applications built on Tokio.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    type Sleep = tokio::time::Sleep;

    fn sleep_for(dur: core::time::Duration) -> Self::Sleep {
        tokio::time::sleep(dur)
    }
}

/// An implementation of [`SleepProvider`] using Tokio's yield.
///
/// Waiters yield to the scheduler instead of sleeping out the minor timeout,
/// which picks up a published outcome sooner at the cost of tighter polling
/// loops and more CPU while waiting. Under heavy contention a timer-based
/// sleep (e.g., [`TokioSleep`]) is usually the better choice.
pub struct TokioYield;
impl SleepProvider for TokioYield {
    /// Tokio's `yield_now()` returns a private future type, so we must use a
    /// boxed `dyn Future` to abstract over it.
    type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn sleep_for(_dur: core::time::Duration) -> Self::Sleep {
        Box::pin(tokio::task::yield_now())
    }
}
