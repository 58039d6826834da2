//! EAVN triple storage: the per-database index and the named namespace of
//! indexes handed to executing blocks.

mod index;
mod multi;

pub use index::{Pattern, Quad, TripleIndex};
pub use multi::{MultiIndex, SharedIndex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("index '{0}' is already registered")]
    DuplicateIndex(String),
    #[error("index '{0}' is not registered")]
    UnknownIndex(String),
}
