//! Process-wide registry of minted identifiers.
//!
//! An [`OpaqueId`] is a compact handle interned from its constituent parts:
//! minting the same parts twice yields the same handle. Ids are ephemeral
//! within a process; a dump replaces each handle with its parts so a fresh
//! process can re-mint them (see [`crate::portable`]).

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Scalar;

/// Handle to an interned identifier. Compares by registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpaqueId(u64);

impl std::fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "⦑{}⦒", self.0)
    }
}

#[derive(Debug, Error)]
pub enum IdError {
    #[error("identifier {0} is not registered in this process")]
    UnknownId(u64),
}

#[derive(Default)]
struct Registry {
    by_parts: HashMap<Vec<Scalar>, u64>,
    parts: Vec<Vec<Scalar>>,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));
static FRESH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Intern an identifier from its constituent parts. Equal parts yield the
/// same handle for the lifetime of the process.
pub fn mint(parts: Vec<Scalar>) -> OpaqueId {
    {
        let registry = REGISTRY.read().unwrap();
        if let Some(&slot) = registry.by_parts.get(&parts) {
            return OpaqueId(slot);
        }
    }
    let mut registry = REGISTRY.write().unwrap();
    if let Some(&slot) = registry.by_parts.get(&parts) {
        return OpaqueId(slot);
    }
    let slot = registry.parts.len() as u64;
    registry.by_parts.insert(parts.clone(), slot);
    registry.parts.push(parts);
    OpaqueId(slot)
}

/// Mint an anonymous identifier from a process-unique counter.
pub fn fresh() -> OpaqueId {
    let nonce = FRESH_COUNTER.fetch_add(1, Ordering::Relaxed);
    mint(vec![
        Scalar::Text("~fresh".to_owned()),
        Scalar::Int(nonce as i64),
    ])
}

/// Decompose a handle back into the parts it was minted from.
pub fn parts_of(id: OpaqueId) -> Result<Vec<Scalar>, IdError> {
    let registry = REGISTRY.read().unwrap();
    registry
        .parts
        .get(id.0 as usize)
        .cloned()
        .ok_or(IdError::UnknownId(id.0))
}
