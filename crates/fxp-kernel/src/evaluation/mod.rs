//! The evaluation: a multi-index, its databases, a work queue, and the
//! fixpoint driver.
//!
//! Exactly one work item is active at a time. The driver is cooperative and
//! single-threaded within one evaluation: `drain` pulls one item, runs it to
//! fixpoint (possibly parking on remote blocks), then pulls the next. Peer
//! evaluations only ever append to the inbox; they never touch this
//! evaluation's state directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use fxp_store::MultiIndex;

use crate::action::Action;
use crate::block::SharedBlock;
use crate::changes::ChangeSet;
use crate::database::SharedDatabase;
use crate::error::KernelError;
use crate::perf::{PerfReport, PerfTracker};
use crate::queue::{EvalId, EvaluationHandle, FixpointCallback, Inbox, WorkItem};

mod driver;
mod snapshot;

pub use snapshot::Snapshot;

/// Divergence cap: a fixpoint that is still producing changes after this many
/// rounds is reported as an error and cut off.
pub const MAX_ROUNDS: u64 = 300;

/// Reported as `(kind, message)`; when absent, errors go to standard error.
pub type ErrorReporter = Box<dyn Fn(&str, &str) + Send>;

#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub max_rounds: u64,
    /// Record per-block timing and round counters.
    pub perf: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS,
            perf: false,
        }
    }
}

static EVAL_IDS: AtomicU64 = AtomicU64::new(0);

pub(crate) struct ActiveItem {
    pub(crate) changes: ChangeSet,
    pub(crate) blocks: Vec<SharedBlock>,
    pub(crate) waiting_for: IndexMap<String, bool>,
    pub(crate) waiting_count: usize,
    pub(crate) callback: Option<FixpointCallback>,
}

pub struct Evaluation {
    id: EvalId,
    multi: MultiIndex,
    databases: IndexMap<String, SharedDatabase>,
    inbox: Arc<Inbox>,
    current: Option<ActiveItem>,
    config: EvalConfig,
    reporter: Option<ErrorReporter>,
    perf: Option<PerfTracker>,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        Self {
            id: EVAL_IDS.fetch_add(1, Ordering::Relaxed),
            multi: MultiIndex::new(),
            databases: IndexMap::new(),
            inbox: Arc::new(Inbox::default()),
            current: None,
            perf: config.perf.then(PerfTracker::new),
            reporter: None,
            config,
        }
    }

    pub fn id(&self) -> EvalId {
        self.id
    }

    /// Weak back-reference used by databases for fixpoint delivery.
    pub fn handle(&self) -> EvaluationHandle {
        EvaluationHandle {
            id: self.id,
            inbox: Arc::downgrade(&self.inbox),
        }
    }

    pub fn multi_index(&self) -> &MultiIndex {
        &self.multi
    }

    pub fn database(&self, name: &str) -> Option<&SharedDatabase> {
        self.databases.get(name)
    }

    /// Register a database under its own name. Every already-registered
    /// database is analyzed against the newcomer, in both directions.
    pub fn register_database(&mut self, db: SharedDatabase) -> Result<(), KernelError> {
        let name = db.read().unwrap().name().to_owned();
        if self.databases.contains_key(&name) {
            return Err(KernelError::DuplicateDatabase(name));
        }
        let index = db.read().unwrap().index();
        self.multi.register(&name, index)?;
        for existing in self.databases.values() {
            {
                let existing_read = existing.read().unwrap();
                db.write().unwrap().analyze(self.id, &*existing_read);
            }
            {
                let db_read = db.read().unwrap();
                existing.write().unwrap().analyze(self.id, &*db_read);
            }
        }
        db.write().unwrap().register(self.handle());
        self.databases.insert(name, db);
        Ok(())
    }

    pub fn unregister_database(&mut self, name: &str) -> Result<SharedDatabase, KernelError> {
        let Some(db) = self.databases.shift_remove(name) else {
            return Err(KernelError::UnknownDatabase(name.to_owned()));
        };
        self.multi.unregister(name)?;
        db.write().unwrap().unregister(self.id)?;
        Ok(db)
    }

    /// Standard entry point: enqueue external actions, then drain if nothing
    /// is in flight. The callback, when given, receives the final change set.
    pub fn execute_actions(
        &mut self,
        actions: Vec<Box<dyn Action>>,
        changes: Option<ChangeSet>,
        callback: Option<FixpointCallback>,
    ) -> Result<(), KernelError> {
        self.queue_item(WorkItem::Actions {
            actions,
            changes,
            callback,
        })
    }

    pub fn queue_item(&mut self, item: WorkItem) -> Result<(), KernelError> {
        self.inbox.push(item);
        self.drain()
    }

    /// Pull queued items one at a time until the queue is empty or the
    /// active item parks on a remote block.
    pub fn drain(&mut self) -> Result<(), KernelError> {
        while self.current.is_none() {
            let Some(item) = self.inbox.pop() else {
                break;
            };
            self.run_item(item)?;
        }
        Ok(())
    }

    /// Queued items not yet started.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// True while a work item is parked awaiting remote blocks.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Remote blocks the active item is still waiting on.
    pub fn awaiting(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |item| item.waiting_count)
    }

    /// Round counter of the active item, if any.
    pub fn round(&self) -> Option<u64> {
        self.current.as_ref().map(|item| item.changes.round())
    }

    pub fn set_error_reporter(&mut self, reporter: ErrorReporter) {
        self.reporter = Some(reporter);
    }

    pub fn perf_report(&self) -> Option<PerfReport> {
        self.perf.as_ref().map(PerfTracker::report)
    }

    pub(crate) fn report(&self, kind: &str, message: &str) {
        match &self.reporter {
            Some(reporter) => reporter(kind, message),
            None => eprintln!("{kind}: {message}"),
        }
    }
}

impl Default for Evaluation {
    fn default() -> Self {
        Self::new()
    }
}
