//! The fixpoint driver: seeding, rounds, suspension, and block activation.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use indexmap::IndexMap;

use fxp_value::Scalar;

use super::*;
use crate::changes::CommitEntry;

impl Evaluation {
    pub(super) fn run_item(&mut self, item: WorkItem) -> Result<(), KernelError> {
        match item {
            WorkItem::Actions {
                actions,
                changes,
                callback,
            } => {
                let mut changes = changes.unwrap_or_default();
                for action in &actions {
                    let mut scratch = Vec::new();
                    action
                        .execute(&self.multi, &mut scratch, &mut changes)
                        .map_err(KernelError::Action)?;
                }
                let seed = changes.commit(&self.multi)?.to_vec();
                let blocks = self.next_blocks(&changes, &seed);
                self.fixpoint(ActiveItem {
                    changes,
                    blocks,
                    waiting_for: IndexMap::new(),
                    waiting_count: 0,
                    callback,
                })
            }
            WorkItem::Commit { delta } => {
                // A peer already applied this delta to the shared index; the
                // replay only seeds activation so local blocks can react.
                let mut changes = ChangeSet::new();
                if !delta.is_empty() {
                    changes.mark_changed();
                }
                let blocks = self.next_blocks(&changes, &delta);
                self.fixpoint(ActiveItem {
                    changes,
                    blocks,
                    waiting_for: IndexMap::new(),
                    waiting_count: 0,
                    callback: None,
                })
            }
        }
    }

    /// Run rounds until quiescence, divergence, or a remote suspension.
    fn fixpoint(&mut self, mut item: ActiveItem) -> Result<(), KernelError> {
        loop {
            if !item.changes.changed() {
                return self.finish(item);
            }
            if item.changes.round() >= self.config.max_rounds {
                let message = format!(
                    "fixpoint did not converge after {} rounds",
                    item.changes.round()
                );
                log::warn!("evaluation {}: {message}", self.id);
                self.report("Fixpoint Error", &message);
                return self.finish(item);
            }

            item.changes.next_round();
            item.waiting_for.clear();
            item.waiting_count = 0;

            let blocks = std::mem::take(&mut item.blocks);
            log::debug!(
                "evaluation {}: round {} with {} blocks",
                self.id,
                item.changes.round(),
                blocks.len()
            );
            for block in &blocks {
                if block.is_remote() {
                    item.waiting_for.insert(block.id.clone(), true);
                    item.waiting_count += 1;
                }
                let started = self.perf.as_ref().map(|_| Instant::now());
                if let Err(source) = block.execute(&self.multi, &mut item.changes) {
                    // Collaborator failure: abandon the fixpoint and leave
                    // the slot clear so later items can proceed.
                    return Err(KernelError::Block {
                        id: block.id.clone(),
                        source,
                    });
                }
                if let Some(perf) = self.perf.as_mut()
                    && let Some(started) = started
                {
                    perf.record_block(&block.id, started.elapsed());
                }
            }
            if let Some(perf) = self.perf.as_mut() {
                perf.record_round();
            }

            if item.waiting_count > 0 {
                self.current = Some(item);
                return Ok(());
            }

            let delta = item.changes.commit(&self.multi)?.to_vec();
            item.blocks = self.next_blocks(&item.changes, &delta);
        }
    }

    /// Deliver a remote block's derived changes. When the last awaited block
    /// responds, the merged changes commit and the fixpoint resumes.
    pub fn on_remote_changes(
        &mut self,
        block_id: &str,
        changes: ChangeSet,
    ) -> Result<(), KernelError> {
        let Some(mut item) = self.current.take() else {
            return Err(KernelError::NoActiveEvaluation);
        };
        match item.waiting_for.get_mut(block_id) {
            Some(waiting) if *waiting => *waiting = false,
            _ => {
                let err = KernelError::UnexpectedRemoteResponse(block_id.to_owned());
                self.current = Some(item);
                return Err(err);
            }
        }
        item.changes.merge_round(changes);
        item.waiting_count -= 1;
        if item.waiting_count > 0 {
            self.current = Some(item);
            return Ok(());
        }

        let delta = item.changes.commit(&self.multi)?.to_vec();
        item.blocks = self.next_blocks(&item.changes, &delta);
        self.fixpoint(item)?;
        self.drain()
    }

    /// Quiescence (or divergence cut-off): fan the net delta out through
    /// every database, invoke the callback, clear the slot.
    fn finish(&mut self, mut item: ActiveItem) -> Result<(), KernelError> {
        for db in self.databases.values() {
            db.read().unwrap().on_fixpoint(self.id, &item.changes);
        }
        if let Some(callback) = item.callback.take() {
            callback(&item.changes);
        }
        if let Some(perf) = self.perf.as_mut() {
            perf.record_fixpoint();
        }
        Ok(())
    }

    /// Select the blocks that might observe a new binding from this delta.
    ///
    /// Pointwise over the commit: for each non-executing-exempt database, for
    /// each live block, the scan stops at the first changed triple the
    /// block's checker accepts. Tag lookups are cached per entity for the
    /// duration of the scan.
    fn next_blocks(&self, changes: &ChangeSet, delta: &[CommitEntry]) -> Vec<SharedBlock> {
        let mut out: Vec<SharedBlock> = Vec::new();
        let mut tag_cache: HashMap<(String, Scalar), BTreeSet<Scalar>> = HashMap::new();
        for db in self.databases.values() {
            let db = db.read().unwrap();
            if db.non_executing() {
                continue;
            }
            'blocks: for block in db.blocks() {
                if block.dormant {
                    continue;
                }
                if out.iter().any(|chosen| chosen.id == block.id) {
                    continue;
                }
                for entry in delta {
                    let Some(index) = self.multi.get(&entry.db) else {
                        continue;
                    };
                    let index = index.read().unwrap();
                    let tags = tag_cache
                        .entry((entry.db.clone(), entry.e.clone()))
                        .or_insert_with(|| changes.round_view(&index, &entry.db).tags(&entry.e));
                    if block
                        .checker
                        .check(&index, entry.change, tags, &entry.e, &entry.a, &entry.v)
                    {
                        out.push(block);
                        continue 'blocks;
                    }
                }
            }
        }
        out
    }
}
