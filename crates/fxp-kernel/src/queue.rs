//! Work items and the shared evaluation inbox.
//!
//! Each evaluation drains its own inbox; peers (and the outside world) only
//! ever append. The inbox is handed around as a weak reference inside an
//! [`EvaluationHandle`] so a long-lived database never keeps a dropped
//! evaluation alive.

use std::collections::VecDeque;
use std::sync::{Mutex, Weak};

use crate::action::Action;
use crate::changes::{ChangeSet, CommitEntry};

pub type EvalId = u64;

/// Invoked with the final change set once an item's fixpoint completes.
pub type FixpointCallback = Box<dyn FnOnce(&ChangeSet) + Send>;

/// One queued unit of work.
pub enum WorkItem {
    /// A committed delta from a peer evaluation, to be replayed here.
    Commit { delta: Vec<CommitEntry> },
    /// External actions to stage, then fixpoint. `changes` optionally
    /// pre-seeds the change set.
    Actions {
        actions: Vec<Box<dyn Action>>,
        changes: Option<ChangeSet>,
        callback: Option<FixpointCallback>,
    },
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkItem::Commit { delta } => f
                .debug_struct("Commit")
                .field("entries", &delta.len())
                .finish(),
            WorkItem::Actions { actions, .. } => f
                .debug_struct("Actions")
                .field("actions", &actions.len())
                .finish_non_exhaustive(),
        }
    }
}

/// Single-consumer FIFO of work items.
#[derive(Debug, Default)]
pub struct Inbox {
    queue: Mutex<VecDeque<WorkItem>>,
}

impl Inbox {
    pub fn push(&self, item: WorkItem) {
        self.queue.lock().unwrap().push_back(item);
    }

    pub(crate) fn pop(&self) -> Option<WorkItem> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Weak back-reference to an evaluation, resolved by id when delivering
/// fixpoint notifications.
#[derive(Debug, Clone)]
pub struct EvaluationHandle {
    pub id: EvalId,
    pub inbox: Weak<Inbox>,
}
