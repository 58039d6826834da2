//! Scalar values and opaque identifiers for EAVN facts.
//!
//! Every slot of a quadruple holds a [`Scalar`]: a deterministic, hashable,
//! totally ordered value. Entities and values may additionally be minted
//! identifiers ([`OpaqueId`]) that round-trip through save/load via a
//! decomposition into constituent parts (see [`portable`]).

mod id;
pub mod portable;

use serde::{Deserialize, Serialize};

pub use id::{IdError, OpaqueId, fresh, mint, parts_of};
pub use portable::{PortableQuad, PortableValue, from_canonical_cbor, to_canonical_cbor};

/// The distinguished attribute consulted by the block activation filter.
pub const TAG_ATTRIBUTE: &str = "tag";

/// Deterministic value representation occupying the four quad slots.
///
/// Floats are absent: scalars key ordered maps and sets throughout the
/// store, so every variant must be `Eq + Ord + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Text(String),
    Int(i64),
    Bool(bool),
    Id(OpaqueId),
}

impl Scalar {
    /// Human-readable kind string used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Text(_) => "text",
            Scalar::Int(_) => "int",
            Scalar::Bool(_) => "bool",
            Scalar::Id(_) => "id",
        }
    }

    /// True when the slot holds a minted identifier rather than a raw scalar.
    pub fn is_id(&self) -> bool {
        matches!(self, Scalar::Id(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<OpaqueId> for Scalar {
    fn from(value: OpaqueId) -> Self {
        Scalar::Id(value)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Text(text) => write!(f, "{text}"),
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Id(id) => write!(f, "{id}"),
        }
    }
}
