//! Portable representation of scalars for save/load.
//!
//! Minted identifiers are only meaningful inside the process that interned
//! them. A dump therefore replaces every [`Scalar::Id`] with the tree of
//! parts it was minted from; loading re-mints the parts and reconstructs an
//! equivalent handle. Raw scalars pass through unchanged, and the serde tag
//! distinguishes the two cases in the encoded form.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::{IdError, Scalar, id};

/// A scalar as it appears in a dump: either a raw value or an
/// identifier-parts tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c", rename_all = "snake_case")]
pub enum PortableValue {
    Raw(Scalar),
    Parts(Vec<PortableValue>),
}

impl PortableValue {
    /// Decompose a scalar, recursively unfolding minted identifiers.
    pub fn from_scalar(scalar: &Scalar) -> Result<Self, IdError> {
        match scalar {
            Scalar::Id(handle) => {
                let parts = id::parts_of(*handle)?;
                let parts = parts
                    .iter()
                    .map(PortableValue::from_scalar)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PortableValue::Parts(parts))
            }
            raw => Ok(PortableValue::Raw(raw.clone())),
        }
    }

    /// Reconstruct a scalar, re-minting identifiers from their parts.
    pub fn to_scalar(&self) -> Scalar {
        match self {
            PortableValue::Raw(scalar) => scalar.clone(),
            PortableValue::Parts(parts) => {
                let parts = parts.iter().map(PortableValue::to_scalar).collect();
                Scalar::Id(id::mint(parts))
            }
        }
    }
}

/// One dumped fact: `[e, a, v, n]` with identifier slots decomposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableQuad(
    pub PortableValue,
    pub PortableValue,
    pub PortableValue,
    pub PortableValue,
);

impl PortableQuad {
    pub fn from_scalars(e: &Scalar, a: &Scalar, v: &Scalar, n: &Scalar) -> Result<Self, IdError> {
        Ok(PortableQuad(
            PortableValue::from_scalar(e)?,
            PortableValue::from_scalar(a)?,
            PortableValue::from_scalar(v)?,
            PortableValue::from_scalar(n)?,
        ))
    }

    pub fn to_scalars(&self) -> (Scalar, Scalar, Scalar, Scalar) {
        (
            self.0.to_scalar(),
            self.1.to_scalar(),
            self.2.to_scalar(),
            self.3.to_scalar(),
        )
    }
}

/// Canonical CBOR encoding: deterministic map ordering so equal dumps have
/// equal bytes.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_cbor::Error> {
    let mut buf = Vec::with_capacity(128);
    let mut ser = serde_cbor::ser::Serializer::new(&mut buf);
    ser.self_describe()?;
    value.serialize(&mut ser)?;
    Ok(buf)
}

pub fn from_canonical_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}
