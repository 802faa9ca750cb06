use std::collections::HashMap;

use crate::{
    cooperation::Cooperation,
    error::{Error, Result},
};

/// A coordinator that does not coordinate.
///
/// Every call runs the caller's work immediately on the calling thread and
/// hands back its outcome unchanged. There is no per-key state, no waiting
/// and no timeout; behavior is identical to calling the work directly.
///
/// ## Recommended When
/// - Coordination has been switched off administratively
/// - You need a zero-risk fallback with the same call surface as
///   [`ActiveCooperation`]
///
/// [`ActiveCooperation`]: crate::ActiveCooperation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisabledCooperation {
    id: String,
}

impl DisabledCooperation {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<T, E> Cooperation<T, E> for DisabledCooperation {
    fn id(&self) -> &str {
        &self.id
    }

    fn run<F>(&self, _key: &str, work: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        work().map_err(Error::Work)
    }

    fn thread_count_per_key(&self) -> HashMap<String, usize> {
        HashMap::new()
    }
}
