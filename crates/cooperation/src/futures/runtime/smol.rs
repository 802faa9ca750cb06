use crate::{Error, Result, SleepProvider};
use pin_project_lite::pin_project;
use smol::Timer;
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// Extension trait for running cooperative work on the
/// [`smol`](https://docs.rs/smol) async runtime.
///
/// This trait provides a convenience method for using a [`SleepProvider`]
/// backed by the `smol` runtime, allowing you to call `.run_async()` without
/// needing to specify the sleep strategy manually.
pub trait CooperationAsyncSmolExt<T, E> {
    /// Returns a future that resolves to the outcome for `key` using the
    /// [`SmolSleep`] provider.
    ///
    /// Internally delegates to [`CooperationAsyncExt::run_async`] with
    /// [`SmolSleep`] as the sleep strategy.
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

impl<C, T, E> CooperationAsyncSmolExt<T, E> for C
where
    C: crate::CooperationAsyncExt<T, E>,
{
    fn run_async<F, Fut>(&self, key: &str, work: F) -> impl Future<Output = Result<T, Error<E>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        <Self as crate::CooperationAsyncExt<T, E>>::run_async::<SmolSleep, F, Fut>(self, key, work)
    }
}

/// An implementation of [`SleepProvider`] using Smol's timer.
///
/// This is the default provider for use in async applications built on Smol.
pub struct SmolSleep;
impl SleepProvider for SmolSleep {
    type Sleep = SmolSleepFuture;

    fn sleep_for(dur: std::time::Duration) -> Self::Sleep {
        SmolSleepFuture {
            timer: Timer::after(dur),
        }
    }
}

pin_project! {
    /// Internal future returned by [`SmolSleep::sleep_for`].
    ///
    /// This type wraps a [`smol::Timer`] and implements [`Future`] with `Output
    /// = ()`, discarding the timer's `Instant` result.
    ///
    /// You should not construct or use this type directly. It is only used
    /// internally by the [`SleepProvider`] implementation for the Smol runtime.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct SmolSleepFuture {
        #[pin]
        timer: Timer,
    }
}

impl Future for SmolSleepFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.project().timer.poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// An implementation of [`SleepProvider`] using Smol's yield.
///
/// Waiters yield to the executor between polls instead of sleeping out the
/// minor timeout. This notices a published outcome sooner but spins harder
/// while the worker is still busy; prefer [`SmolSleep`] under contention.
pub struct SmolYield;
impl SleepProvider for SmolYield {
    type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn sleep_for(_dur: std::time::Duration) -> Self::Sleep {
        Box::pin(smol::future::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinator, configure};
    use core::time::Duration;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const CALLERS: usize = 32;

    fn coordinator(threads_per_key: usize, major_ms: u64) -> Coordinator<u64, String> {
        configure()
            .threads_per_key(threads_per_key)
            .major_timeout(Duration::from_millis(major_ms))
            .minor_timeout(Duration::from_millis(5))
            .build("smol")
            .unwrap()
    }

    async fn herd<S: SleepProvider>(
        coordinator: &Coordinator<u64, String>,
        executions: &AtomicUsize,
    ) -> Vec<Result<u64, Error<String>>> {
        let callers = (0..CALLERS).map(|_| {
            crate::CooperationAsyncExt::<u64, String>::run_async::<S, _, _>(
                coordinator,
                "artifact",
                || async {
                    let n = executions.fetch_add(1, Ordering::SeqCst) as u64 + 1;
                    Timer::after(Duration::from_millis(30)).await;
                    Ok(n)
                },
            )
        });
        join_all(callers).await
    }

    #[test]
    fn herd_executes_once_smol_sleep() {
        smol::block_on(async {
            let coordinator = coordinator(1, 5000);
            let executions = AtomicUsize::new(0);
            let outcomes = herd::<SmolSleep>(&coordinator, &executions).await;
            assert!(outcomes.iter().all(|outcome| *outcome == Ok(1)));
            assert_eq!(executions.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn herd_executes_once_smol_yield() {
        smol::block_on(async {
            let coordinator = coordinator(1, 5000);
            let executions = AtomicUsize::new(0);
            let outcomes = herd::<SmolYield>(&coordinator, &executions).await;
            assert!(outcomes.iter().all(|outcome| *outcome == Ok(1)));
            assert_eq!(executions.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn herd_bounded_by_threads_per_key() {
        smol::block_on(async {
            let coordinator = coordinator(3, 5000);
            let executions = AtomicUsize::new(0);
            let outcomes = herd::<SmolSleep>(&coordinator, &executions).await;
            // The first worker to finish publishes; the other two keep their
            // own outcomes and every waiter receives the published one.
            assert_eq!(executions.load(Ordering::SeqCst), 3);
            let shared = (1..=3)
                .map(|n| outcomes.iter().filter(|o| **o == Ok(n)).count())
                .max()
                .unwrap();
            assert_eq!(shared, CALLERS - 2);
        });
    }

    #[test]
    fn shared_failure_convenience() {
        smol::block_on(async {
            let coordinator = coordinator(1, 5000);
            let executions = AtomicUsize::new(0);
            let callers = (0..CALLERS).map(|_| {
                coordinator.run_async("artifact", || async {
                    let n = executions.fetch_add(1, Ordering::SeqCst) + 1;
                    Timer::after(Duration::from_millis(30)).await;
                    Err::<u64, _>(format!("failure #{n}"))
                })
            });
            let outcomes = join_all(callers).await;
            let expected = Err(Error::Work("failure #1".to_string()));
            assert!(outcomes.iter().all(|outcome| *outcome == expected));
            assert_eq!(executions.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn waiter_times_out() {
        smol::block_on(async {
            let coordinator = coordinator(1, 80);
            let worker = coordinator.run_async("k", || async {
                Timer::after(Duration::from_millis(300)).await;
                Ok(1)
            });
            let waiter = async {
                let arrived = Instant::now();
                let outcome = coordinator.run_async("k", || async { Ok(2) }).await;
                (outcome, arrived.elapsed())
            };

            let (worker, (waiter, elapsed)) = futures::future::join(worker, waiter).await;
            assert_eq!(worker, Ok(1));
            assert!(waiter.unwrap_err().is_timeout());
            assert!(elapsed >= Duration::from_millis(80));
            assert!(elapsed < Duration::from_millis(250), "{elapsed:?}");
        });
    }

    #[test]
    fn disabled_runs_every_caller() {
        smol::block_on(async {
            let coordinator: Coordinator<u64, String> =
                configure().enabled(false).build("off").unwrap();
            let executions = AtomicUsize::new(0);
            let outcomes = herd::<SmolSleep>(&coordinator, &executions).await;
            assert_eq!(executions.load(Ordering::SeqCst), CALLERS);
            assert!(outcomes.iter().all(|outcome| outcome.is_ok()));
        });
    }
}
