//! The block contract and its activation filter.
//!
//! A block is a compiled rule. The core never looks inside one: it sees a
//! stable id, a dormant flag, a [`Checker`] that gates re-execution, and an
//! execute operation that reads the multi-index and stages derived facts.
//! Local and remote blocks share the execute operation; a remote block may
//! return before its derived facts are ready and completes later through
//! `Evaluation::on_remote_changes`.

use std::collections::BTreeSet;
use std::sync::Arc;

use fxp_store::{MultiIndex, TripleIndex};
use fxp_value::Scalar;

use crate::changes::ChangeSet;

/// Executable body of a block. Must be deterministic given identical inputs.
pub trait BlockBody: Send + Sync {
    fn execute(&self, multi: &MultiIndex, changes: &mut ChangeSet) -> anyhow::Result<()>;
}

impl<F> BlockBody for F
where
    F: Fn(&MultiIndex, &mut ChangeSet) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, multi: &MultiIndex, changes: &mut ChangeSet) -> anyhow::Result<()> {
        self(multi, changes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Local,
    Remote,
}

pub struct Block {
    pub id: String,
    pub dormant: bool,
    pub checker: Checker,
    kind: BlockKind,
    body: Arc<dyn BlockBody>,
}

pub type SharedBlock = Arc<Block>;

impl Block {
    pub fn local(id: impl Into<String>, checker: Checker, body: impl BlockBody + 'static) -> Self {
        Self {
            id: id.into(),
            dormant: false,
            checker,
            kind: BlockKind::Local,
            body: Arc::new(body),
        }
    }

    /// A block whose execution completes out of band. Running it parks the
    /// evaluation until its changes arrive.
    pub fn remote(id: impl Into<String>, checker: Checker, body: impl BlockBody + 'static) -> Self {
        Self {
            id: id.into(),
            dormant: false,
            checker,
            kind: BlockKind::Remote,
            body: Arc::new(body),
        }
    }

    pub fn with_dormant(mut self, dormant: bool) -> Self {
        self.dormant = dormant;
        self
    }

    pub fn is_remote(&self) -> bool {
        self.kind == BlockKind::Remote
    }

    pub fn execute(&self, multi: &MultiIndex, changes: &mut ChangeSet) -> anyhow::Result<()> {
        self.body.execute(multi, changes)
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("dormant", &self.dormant)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// One activation pattern: a required tag plus an optional attribute
/// constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPattern {
    pub tag: Scalar,
    pub attribute: Option<Scalar>,
}

impl CheckPattern {
    pub fn new(tag: impl Into<Scalar>) -> Self {
        Self {
            tag: tag.into(),
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<Scalar>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

/// Decides whether a block might observe a new binding given one changed
/// triple.
///
/// The filter is an over-approximation: activating a block that then stages
/// nothing is wasted work, but failing to activate a block that would have
/// staged something is forbidden.
#[derive(Debug, Clone)]
pub enum Checker {
    /// Activate on any change.
    Always,
    /// Activate when some pattern's tag is in the entity's merged tag set and
    /// its attribute is unconstrained or equal to the changed attribute.
    Patterns(Vec<CheckPattern>),
}

impl Checker {
    pub fn patterns(patterns: impl IntoIterator<Item = CheckPattern>) -> Self {
        Checker::Patterns(patterns.into_iter().collect())
    }

    pub fn check(
        &self,
        _index: &TripleIndex,
        _change: i8,
        tags: &BTreeSet<Scalar>,
        _e: &Scalar,
        a: &Scalar,
        _v: &Scalar,
    ) -> bool {
        match self {
            Checker::Always => true,
            Checker::Patterns(patterns) => patterns.iter().any(|pattern| {
                tags.contains(&pattern.tag)
                    && pattern
                        .attribute
                        .as_ref()
                        .is_none_or(|attribute| attribute == a)
            }),
        }
    }
}
