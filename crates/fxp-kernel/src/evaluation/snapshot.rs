//! Portable dumps of an evaluation's databases.
//!
//! A snapshot maps each database name to its quads with identifier slots
//! decomposed into parts, so a dump survives crossing a process boundary.
//! Loading replays every quad as a staged insertion and drives a fixpoint
//! over the result, exactly like any other external input.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use fxp_value::{PortableQuad, from_canonical_cbor, to_canonical_cbor};

use super::*;

/// Database name -> dumped quads, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(pub IndexMap<String, Vec<PortableQuad>>);

impl Snapshot {
    pub fn to_cbor(&self) -> Result<Vec<u8>, KernelError> {
        Ok(to_canonical_cbor(self)?)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, KernelError> {
        Ok(from_canonical_cbor(bytes)?)
    }
}

impl Evaluation {
    /// Dump every registered database, decomposing minted identifiers.
    pub fn save(&self) -> Result<Snapshot, KernelError> {
        let mut out = IndexMap::new();
        for (name, db) in &self.databases {
            let quads = db.read().unwrap().to_triples();
            let quads = quads
                .iter()
                .map(|quad| PortableQuad::from_scalars(&quad.e, &quad.a, &quad.v, &quad.n))
                .collect::<Result<Vec<_>, _>>()?;
            out.insert(name.clone(), quads);
        }
        Ok(Snapshot(out))
    }

    /// Stage every dumped quad as an insertion in a fresh change set and
    /// fixpoint over it. Identifiers are re-minted from their parts.
    pub fn load(&mut self, snapshot: &Snapshot) -> Result<(), KernelError> {
        let mut changes = ChangeSet::new();
        for (db, quads) in &snapshot.0 {
            for quad in quads {
                let (e, a, v, n) = quad.to_scalars();
                changes.store(db, e, a, v, n);
            }
        }
        self.execute_actions(Vec::new(), Some(changes), None)
    }
}
