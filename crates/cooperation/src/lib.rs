#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod cooperation;
mod error;
#[cfg(feature = "futures")]
mod futures;
mod mutex;

pub use crate::config::*;
pub use crate::cooperation::*;
pub use crate::error::*;
#[cfg(feature = "futures")]
pub use crate::futures::*;
