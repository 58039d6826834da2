//! The ownership boundary around one named triple index and its blocks.
//!
//! A database is long-lived and may be registered in several evaluations at
//! once; that is the sole sharing unit of the system. On fixpoint it fans the
//! committed net delta out to every registered peer evaluation as a queued
//! `Commit` item, never by direct mutation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use fxp_store::{Quad, SharedIndex, TripleIndex};

use crate::KernelError;
use crate::block::SharedBlock;
use crate::changes::ChangeSet;
use crate::queue::{EvalId, EvaluationHandle, WorkItem};

pub type DatabaseId = u64;
pub type SharedDatabase = Arc<RwLock<dyn Database>>;

static DATABASE_IDS: AtomicU64 = AtomicU64::new(0);

/// Mint a process-unique database id. Ids are ephemeral within the process.
pub fn next_database_id() -> DatabaseId {
    DATABASE_IDS.fetch_add(1, Ordering::Relaxed)
}

pub trait Database: Send + Sync {
    fn id(&self) -> DatabaseId;
    fn name(&self) -> &str;
    fn index(&self) -> SharedIndex;
    fn blocks(&self) -> Vec<SharedBlock>;

    /// Excluded from block activation when true.
    fn non_executing(&self) -> bool {
        false
    }

    fn register(&mut self, handle: EvaluationHandle);
    fn unregister(&mut self, eval: EvalId) -> Result<(), KernelError>;
    fn registered(&self) -> Vec<EvaluationHandle>;

    /// Invoked once per database pair when a database joins an evaluation.
    fn analyze(&mut self, _eval: EvalId, _other: &dyn Database) {}

    /// Fan the completed fixpoint's net delta for this database out to every
    /// registered evaluation except the one that produced it.
    fn on_fixpoint(&self, source: EvalId, changes: &ChangeSet) {
        let delta = changes.result_for(self.name());
        if delta.is_empty() {
            return;
        }
        for handle in self.registered() {
            if handle.id == source {
                continue;
            }
            if let Some(inbox) = handle.inbox.upgrade() {
                log::debug!(
                    "database '{}': delivering {} entries to evaluation {}",
                    self.name(),
                    delta.len(),
                    handle.id
                );
                inbox.push(WorkItem::Commit {
                    delta: delta.clone(),
                });
            }
        }
    }

    fn to_triples(&self) -> Vec<Quad> {
        self.index().read().unwrap().to_triples(true)
    }
}

impl std::fmt::Debug for dyn Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// The canonical in-memory database.
pub struct MemoryDatabase {
    id: DatabaseId,
    name: String,
    index: SharedIndex,
    blocks: Vec<SharedBlock>,
    non_executing: bool,
    registered: Vec<EvaluationHandle>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: next_database_id(),
            name: name.into(),
            index: Arc::new(RwLock::new(TripleIndex::new())),
            blocks: Vec::new(),
            non_executing: false,
            registered: Vec::new(),
        }
    }

    pub fn with_blocks(
        name: impl Into<String>,
        blocks: impl IntoIterator<Item = SharedBlock>,
    ) -> Self {
        let mut db = Self::new(name);
        db.blocks = blocks.into_iter().collect();
        db
    }

    pub fn with_non_executing(mut self, non_executing: bool) -> Self {
        self.non_executing = non_executing;
        self
    }

    pub fn add_block(&mut self, block: SharedBlock) {
        self.blocks.push(block);
    }

    pub fn shared(self) -> SharedDatabase {
        Arc::new(RwLock::new(self))
    }
}

impl Database for MemoryDatabase {
    fn id(&self) -> DatabaseId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> SharedIndex {
        Arc::clone(&self.index)
    }

    fn blocks(&self) -> Vec<SharedBlock> {
        self.blocks.clone()
    }

    fn non_executing(&self) -> bool {
        self.non_executing
    }

    fn register(&mut self, handle: EvaluationHandle) {
        if self.registered.iter().any(|known| known.id == handle.id) {
            return;
        }
        self.registered.push(handle);
    }

    fn unregister(&mut self, eval: EvalId) -> Result<(), KernelError> {
        let before = self.registered.len();
        self.registered.retain(|known| known.id != eval);
        if self.registered.len() == before {
            return Err(KernelError::EvaluationNotRegistered(
                eval,
                self.name.clone(),
            ));
        }
        Ok(())
    }

    fn registered(&self) -> Vec<EvaluationHandle> {
        self.registered.clone()
    }
}
