//! The action contract: staging external inputs into a change set.
//!
//! Actions are how the outside world feeds facts into an evaluation. The
//! scratch argument is a per-action list of bindings used by join-producing
//! actions; the core always passes an empty list. The two primitive actions
//! here cover direct fact insertion and removal; domain-specific actions live
//! with their domains.

use fxp_store::MultiIndex;
use fxp_value::Scalar;

use crate::changes::ChangeSet;

pub trait Action: Send {
    fn execute(
        &self,
        multi: &MultiIndex,
        scratch: &mut Vec<Vec<Scalar>>,
        changes: &mut ChangeSet,
    ) -> anyhow::Result<()>;
}

/// Stage one fact for insertion.
#[derive(Debug, Clone)]
pub struct InsertFact {
    pub db: String,
    pub e: Scalar,
    pub a: Scalar,
    pub v: Scalar,
    pub n: Scalar,
}

impl InsertFact {
    pub fn new(
        db: impl Into<String>,
        e: impl Into<Scalar>,
        a: impl Into<Scalar>,
        v: impl Into<Scalar>,
        n: impl Into<Scalar>,
    ) -> Self {
        Self {
            db: db.into(),
            e: e.into(),
            a: a.into(),
            v: v.into(),
            n: n.into(),
        }
    }
}

impl Action for InsertFact {
    fn execute(
        &self,
        _multi: &MultiIndex,
        _scratch: &mut Vec<Vec<Scalar>>,
        changes: &mut ChangeSet,
    ) -> anyhow::Result<()> {
        changes.store(
            &self.db,
            self.e.clone(),
            self.a.clone(),
            self.v.clone(),
            self.n.clone(),
        );
        Ok(())
    }
}

/// Stage one fact for removal.
#[derive(Debug, Clone)]
pub struct RemoveFact {
    pub db: String,
    pub e: Scalar,
    pub a: Scalar,
    pub v: Scalar,
    pub n: Scalar,
}

impl RemoveFact {
    pub fn new(
        db: impl Into<String>,
        e: impl Into<Scalar>,
        a: impl Into<Scalar>,
        v: impl Into<Scalar>,
        n: impl Into<Scalar>,
    ) -> Self {
        Self {
            db: db.into(),
            e: e.into(),
            a: a.into(),
            v: v.into(),
            n: n.into(),
        }
    }
}

impl Action for RemoveFact {
    fn execute(
        &self,
        _multi: &MultiIndex,
        _scratch: &mut Vec<Vec<Scalar>>,
        changes: &mut ChangeSet,
    ) -> anyhow::Result<()> {
        changes.unstore(
            &self.db,
            self.e.clone(),
            self.a.clone(),
            self.v.clone(),
            self.n.clone(),
        );
        Ok(())
    }
}
