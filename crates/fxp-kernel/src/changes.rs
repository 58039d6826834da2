//! The change set: a staged, round-tagged multiset of fact deltas with
//! commit semantics.
//!
//! Actions and executing blocks stage `+1`/`−1` entries against named
//! databases; [`ChangeSet::commit`] nets the staged entries, applies them to
//! the target indexes atomically, and yields the round's delta of logical
//! transitions. One change set lives for exactly one queued work item.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use fxp_store::{MultiIndex, TripleIndex};
use fxp_value::{Scalar, TAG_ATTRIBUTE};

use crate::KernelError;

/// One logical transition applied by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub db: String,
    /// `+1` for a fact that became present, `−1` for one that disappeared.
    pub change: i8,
    pub e: Scalar,
    pub a: Scalar,
    pub v: Scalar,
    pub n: Scalar,
    pub round: u64,
}

#[derive(Debug, Clone)]
struct Staged {
    db: String,
    e: Scalar,
    a: Scalar,
    v: Scalar,
    n: Scalar,
    round: u64,
    delta: i32,
}

#[derive(Debug, Default)]
pub struct ChangeSet {
    round: u64,
    changed: bool,
    staged: Vec<Staged>,
    committed: Vec<CommitEntry>,
    history: Vec<CommitEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current fixpoint round. Starts at 0 and only ever increases.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Sticky flag: true when the current round committed a non-empty delta.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// The last committed delta.
    pub fn committed(&self) -> &[CommitEntry] {
        &self.committed
    }

    pub fn has_pending(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Stage a `+1` for the named database.
    pub fn store(
        &mut self,
        db: &str,
        e: impl Into<Scalar>,
        a: impl Into<Scalar>,
        v: impl Into<Scalar>,
        n: impl Into<Scalar>,
    ) {
        self.stage(db, e.into(), a.into(), v.into(), n.into(), 1);
    }

    /// Stage a `−1` for the named database.
    pub fn unstore(
        &mut self,
        db: &str,
        e: impl Into<Scalar>,
        a: impl Into<Scalar>,
        v: impl Into<Scalar>,
        n: impl Into<Scalar>,
    ) {
        self.stage(db, e.into(), a.into(), v.into(), n.into(), -1);
    }

    fn stage(&mut self, db: &str, e: Scalar, a: Scalar, v: Scalar, n: Scalar, delta: i32) {
        self.staged.push(Staged {
            db: db.to_owned(),
            e,
            a,
            v,
            n,
            round: self.round,
            delta,
        });
    }

    /// Seed the changed flag for a replayed commit whose effects are already
    /// applied, so the driver still runs activation rounds over it.
    pub(crate) fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Advance to the next round and clear the changed flag.
    pub fn next_round(&mut self) {
        self.round += 1;
        self.changed = false;
    }

    /// Fold another change set's pending entries into this one at the current
    /// round, without committing. Used when a remote block delivers its
    /// derived changes.
    pub fn merge_round(&mut self, other: ChangeSet) {
        let round = self.round;
        for mut staged in other.staged {
            staged.round = round;
            self.staged.push(staged);
        }
    }

    /// Apply all staged entries to their target indexes and return the net
    /// delta of logical transitions.
    ///
    /// Opposing provenance-equal pairs cancel before anything touches an
    /// index, so a store/unstore of the same quad in one round is a no-op.
    /// With nothing staged the commit is empty, which makes back-to-back
    /// commits idempotent.
    pub fn commit(&mut self, multi: &MultiIndex) -> Result<&[CommitEntry], KernelError> {
        let mut net: IndexMap<(String, Scalar, Scalar, Scalar, Scalar), i32> = IndexMap::new();
        for staged in self.staged.drain(..) {
            *net.entry((staged.db, staged.e, staged.a, staged.v, staged.n))
                .or_insert(0) += staged.delta;
        }

        let mut delta = Vec::new();
        for ((db, e, a, v, n), count) in net {
            if count == 0 {
                continue;
            }
            let index = multi
                .get(&db)
                .ok_or_else(|| KernelError::UnknownDatabase(db.clone()))?;
            let mut index = index.write().unwrap();
            if count > 0 {
                let mut added = false;
                for _ in 0..count {
                    added |= index.insert(e.clone(), a.clone(), v.clone(), n.clone());
                }
                if added {
                    delta.push(CommitEntry {
                        db,
                        change: 1,
                        e,
                        a,
                        v,
                        n,
                        round: self.round,
                    });
                }
            } else {
                let mut removed = false;
                for _ in 0..-count {
                    removed |= index.remove(&e, &a, &v, &n);
                }
                if removed {
                    delta.push(CommitEntry {
                        db,
                        change: -1,
                        e,
                        a,
                        v,
                        n,
                        round: self.round,
                    });
                }
            }
        }

        self.changed |= !delta.is_empty();
        self.history.extend(delta.iter().cloned());
        self.committed = delta;
        Ok(&self.committed)
    }

    /// Net effect of every committed round so far, restricted to one
    /// database. A fact added in one round and removed in a later one cancels
    /// out, so the result reflects the completed fixpoint rather than its
    /// intermediate rounds.
    pub fn result_for(&self, db: &str) -> Vec<CommitEntry> {
        let mut net: IndexMap<(&Scalar, &Scalar, &Scalar, &Scalar), (i32, &CommitEntry)> =
            IndexMap::new();
        for entry in self.history.iter().filter(|entry| entry.db == db) {
            let slot = net
                .entry((&entry.e, &entry.a, &entry.v, &entry.n))
                .or_insert((0, entry));
            slot.0 += i32::from(entry.change);
            slot.1 = entry;
        }
        net.into_values()
            .filter(|(count, _)| *count != 0)
            .map(|(count, entry)| CommitEntry {
                change: if count > 0 { 1 } else { -1 },
                ..entry.clone()
            })
            .collect()
    }

    /// Scoped read view merging one database's committed index with the
    /// entries staged in the current round.
    pub fn round_view<'a>(&'a self, index: &'a TripleIndex, db: &'a str) -> RoundView<'a> {
        RoundView {
            index,
            changes: self,
            db,
        }
    }
}

/// Per-round merged read view over one database.
///
/// The view is only valid during the round it was created in: it borrows the
/// staging area, and the staging area is drained by the next commit. Never
/// cache its results across commits.
pub struct RoundView<'a> {
    index: &'a TripleIndex,
    changes: &'a ChangeSet,
    db: &'a str,
}

impl RoundView<'_> {
    /// Committed values for `(e, a)` union pending additions, minus pending
    /// removals.
    pub fn merged_values(&self, e: &Scalar, a: &Scalar) -> std::collections::BTreeSet<Scalar> {
        let mut out: std::collections::BTreeSet<Scalar> =
            self.index.values(e, a).cloned().collect();
        for staged in &self.changes.staged {
            if staged.db == self.db && &staged.e == e && &staged.a == a {
                if staged.delta > 0 {
                    out.insert(staged.v.clone());
                } else {
                    out.remove(&staged.v);
                }
            }
        }
        out
    }

    /// Fully specified form: is `(e, a, v)` present once pending entries are
    /// taken into account?
    pub fn merged_contains(&self, e: &Scalar, a: &Scalar, v: &Scalar) -> bool {
        self.merged_values(e, a).contains(v)
    }

    /// Merged tag set of `e`, as consulted by the activation filter.
    pub fn tags(&self, e: &Scalar) -> std::collections::BTreeSet<Scalar> {
        self.merged_values(e, &Scalar::Text(TAG_ATTRIBUTE.to_owned()))
    }
}
