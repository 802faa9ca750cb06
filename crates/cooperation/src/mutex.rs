//! Lock backend selection.
//!
//! With the `parking-lot` feature locks never poison and acquiring one is
//! infallible. Otherwise the std primitives are used and a poisoned lock is
//! reported as [`crate::Error::LockPoisoned`].

use core::time::Duration;

#[cfg(feature = "parking-lot")]
pub(crate) use parking_lot::{Condvar, Mutex, MutexGuard};
#[cfg(not(feature = "parking-lot"))]
pub(crate) use std::sync::{Condvar, Mutex, MutexGuard};

/// The error produced when a lock cannot be acquired.
#[cfg(feature = "parking-lot")]
pub type LockError = core::convert::Infallible;

/// The error produced when a lock cannot be acquired.
#[cfg(not(feature = "parking-lot"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockError;

#[cfg(feature = "parking-lot")]
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, LockError> {
    Ok(mutex.lock())
}

#[cfg(not(feature = "parking-lot"))]
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, LockError> {
    mutex.lock().map_err(|_| LockError)
}

/// Acquires `mutex` even if a previous holder panicked. Only used on `Drop`
/// paths where there is no caller to report the poisoning to.
#[cfg(feature = "parking-lot")]
#[inline]
pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
}

#[cfg(not(feature = "parking-lot"))]
#[inline]
pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Blocks on `condvar` for at most `timeout`, returning the reacquired guard.
#[cfg(feature = "parking-lot")]
#[inline]
pub(crate) fn wait_for<'a, T>(
    condvar: &Condvar,
    mut guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> Result<MutexGuard<'a, T>, LockError> {
    condvar.wait_for(&mut guard, timeout);
    Ok(guard)
}

#[cfg(not(feature = "parking-lot"))]
#[inline]
pub(crate) fn wait_for<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> Result<MutexGuard<'a, T>, LockError> {
    condvar
        .wait_timeout(guard, timeout)
        .map(|(guard, _)| guard)
        .map_err(|_| LockError)
}
