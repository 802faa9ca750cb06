use core::fmt;
use std::collections::HashMap;

use crate::{
    config::CooperationConfig,
    cooperation::{ActiveCooperation, Cooperation, DisabledCooperation},
    error::{Error, Result},
};

/// The coordinator returned by [`crate::Builder::build`].
///
/// The variant is chosen once, at build time, from the `enabled` setting.
/// Callers hold a `Coordinator` and never need to know which one they got.
pub enum Coordinator<T, E> {
    /// Enforces the per-key worker/waiter protocol.
    Active(ActiveCooperation<T, E>),
    /// Runs all work directly.
    Disabled(DisabledCooperation),
}

impl<T, E> Coordinator<T, E> {
    pub fn id(&self) -> &str {
        match self {
            Self::Active(inner) => inner.id(),
            Self::Disabled(inner) => inner.id(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// The settings in force, or `None` for a disabled coordinator.
    pub fn config(&self) -> Option<&CooperationConfig> {
        match self {
            Self::Active(inner) => Some(inner.config()),
            Self::Disabled(_) => None,
        }
    }
}

impl<T: Clone, E: Clone> Coordinator<T, E> {
    /// See [`Cooperation::run`].
    ///
    /// # Errors
    ///
    /// See [`Cooperation::run`].
    pub fn run<F>(&self, key: &str, work: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        match self {
            Self::Active(inner) => inner.run(key, work),
            Self::Disabled(inner) => Cooperation::<T, E>::run(inner, key, work),
        }
    }

    /// See [`Cooperation::thread_count_per_key`].
    pub fn thread_count_per_key(&self) -> HashMap<String, usize> {
        match self {
            Self::Active(inner) => inner.thread_count_per_key(),
            Self::Disabled(_) => HashMap::new(),
        }
    }
}

impl<T: Clone, E: Clone> Cooperation<T, E> for Coordinator<T, E> {
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

impl<T, E> fmt::Debug for Coordinator<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(inner) => f.debug_tuple("Active").field(inner).finish(),
            Self::Disabled(inner) => f.debug_tuple("Disabled").field(inner).finish(),
        }
    }
}
