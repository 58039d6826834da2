//! Evaluation core of a deductive, fact-oriented runtime.
//!
//! An [`Evaluation`] owns a namespace of EAVN databases and a queue of work
//! items. Each item is converted into a seed [`ChangeSet`], an initial block
//! set is selected by the activation filter, and fixpoint rounds run until no
//! round produces a net change (or the divergence cap trips). On fixpoint,
//! every registered database fans the net delta out to peer evaluations that
//! share it.
//!
//! Module map:
//! - [`changes`]: the staged, round-tagged change multiset and its commit.
//! - [`block`]: the block contract and the activation filter.
//! - [`action`]: the contract for staging external inputs.
//! - [`database`]: the ownership boundary around one index and its blocks.
//! - [`queue`]: work items and the shared evaluation inbox.
//! - [`evaluation`]: the fixpoint driver, registration, and save/load.
//! - [`perf`]: optional timing counters.

pub mod action;
pub mod block;
pub mod changes;
pub mod database;
mod error;
pub mod evaluation;
pub mod perf;
pub mod queue;

pub use action::{Action, InsertFact, RemoveFact};
pub use block::{Block, BlockBody, CheckPattern, Checker, SharedBlock};
pub use changes::{ChangeSet, CommitEntry, RoundView};
pub use database::{Database, DatabaseId, MemoryDatabase, SharedDatabase};
pub use error::KernelError;
pub use evaluation::{ErrorReporter, EvalConfig, Evaluation, MAX_ROUNDS, Snapshot};
pub use perf::{PerfReport, PerfTracker};
pub use queue::{EvalId, EvaluationHandle, FixpointCallback, Inbox, WorkItem};
