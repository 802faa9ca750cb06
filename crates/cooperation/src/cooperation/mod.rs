mod active;
mod coordinator;
mod disabled;
mod interface;
pub(crate) mod state;

pub use active::*;
pub use coordinator::*;
pub use disabled::*;
pub use interface::*;
