//! Two-stream join node, indexed or nested-loop.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use scorenet_core::{Fact, IndexKey, Result, ScorenetError};

use super::{InputSide, JoinFilter, KeyExtractor, NodeBase};
use crate::index::JoinIndex;
use crate::tuple::{Slot, TupleId, TuplePool};

/// Store-slot offsets claimed on one parent's output tuples.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SideSlots {
    /// Key the input is currently indexed under.
    pub key: usize,
    /// Output tuples the input currently contributes to.
    pub outs: usize,
}

/// Combines two input streams into one output tuple per matching pair.
///
/// Both sides keep an index keyed by extracted [`IndexKey`] plus, per input
/// tuple, the list of its current outputs, so retraction touches O(matches)
/// tuples, never the whole match set. The unindexed variant replaces the
/// hash buckets with a nested-loop scan and explicit key-equality checks;
/// for any input sequence the two variants produce identical outputs.
pub struct JoinNode {
    pub(crate) base: NodeBase,
    indexed: bool,
    left_keys: Vec<KeyExtractor>,
    right_keys: Vec<KeyExtractor>,
    filter: Option<JoinFilter>,
    left_index: JoinIndex,
    right_index: JoinIndex,
    /// (left, right) pair -> output tuple, for the live match set.
    pub(crate) outs: HashMap<(TupleId, TupleId), TupleId>,
    /// Output tuple -> originating pair, for finish and removal.
    origins: HashMap<TupleId, (TupleId, TupleId)>,
    left_slots: SideSlots,
    right_slots: SideSlots,
}

impl JoinNode {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        base: NodeBase,
        indexed: bool,
        left_keys: Vec<KeyExtractor>,
        right_keys: Vec<KeyExtractor>,
        filter: Option<JoinFilter>,
        left_slots: SideSlots,
        right_slots: SideSlots,
    ) -> Self {
        let (left_index, right_index) = if indexed {
            (JoinIndex::hashed(), JoinIndex::hashed())
        } else {
            (JoinIndex::scanning(), JoinIndex::scanning())
        };
        JoinNode {
            base,
            indexed,
            left_keys,
            right_keys,
            filter,
            left_index,
            right_index,
            outs: HashMap::new(),
            origins: HashMap::new(),
            left_slots,
            right_slots,
        }
    }

    pub(crate) fn insert(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
    ) -> Result<()> {
        let slots = self.slots(side);
        if !pool.get(tuple)?.slot(slots.outs).is_empty() {
            return Err(ScorenetError::NodeContract(format!(
                "tuple inserted twice into join node {:?}",
                self.base.id
            )));
        }
        let key = self.extract_key(pool, tuple, side)?;
        self.index_mut(side).insert(&key, tuple);
        {
            let input = pool.get_mut(tuple)?;
            *input.slot_mut(slots.key) = Slot::JoinKey(key.clone());
            *input.slot_mut(slots.outs) = Slot::JoinOuts(Vec::new());
        }
        self.scan_matches(pool, tuple, side, &key)
    }

    pub(crate) fn update(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
    ) -> Result<()> {
        let slots = self.slots(side);
        if pool.get(tuple)?.slot(slots.outs).is_empty() {
            // Filtered upstream until now: adopt as an insert.
            return self.insert(pool, tuple, side);
        }
        let old_key = match pool.get(tuple)?.slot(slots.key) {
            Slot::JoinKey(key) => key.clone(),
            other => {
                return Err(ScorenetError::Internal(format!(
                    "join key slot held {other:?}"
                )))
            }
        };
        let new_key = self.extract_key(pool, tuple, side)?;

        if new_key == old_key {
            // Non-key fields changed: re-run the existing match set in place
            // instead of a retract/reinsert storm.
            return self.rerun_matches(pool, tuple, side, &old_key);
        }

        // Key changed: always a full retract + reinsert under the new key,
        // even if the new key happens to match the same opposite tuples.
        let outs = take_outs(pool, tuple, slots.outs, false)?;
        for out in outs {
            self.remove_out(pool, out, Some((tuple, side)))?;
        }
        self.index_mut(side).remove(&old_key, tuple)?;
        self.index_mut(side).insert(&new_key, tuple);
        *pool.get_mut(tuple)?.slot_mut(slots.key) = Slot::JoinKey(new_key.clone());
        self.scan_matches(pool, tuple, side, &new_key)
    }

    pub(crate) fn retract(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
    ) -> Result<()> {
        let slots = self.slots(side);
        if pool.get(tuple)?.slot(slots.outs).is_empty() {
            return Ok(());
        }
        let outs = take_outs(pool, tuple, slots.outs, true)?;
        let key = match pool.get_mut(tuple)?.take_slot(slots.key) {
            Slot::JoinKey(key) => key,
            other => {
                return Err(ScorenetError::Internal(format!(
                    "join key slot held {other:?}"
                )))
            }
        };
        self.index_mut(side).remove(&key, tuple)?;
        for out in outs {
            self.remove_out(pool, out, Some((tuple, side)))?;
        }
        Ok(())
    }

    /// Refreshes an output tuple's facts from its inputs right before flush.
    pub(crate) fn finish(&mut self, pool: &mut TuplePool, out: TupleId) -> Result<()> {
        let (left, right) = *self.origins.get(&out).ok_or_else(|| {
            ScorenetError::Internal(format!("finish for unknown join output {out:?}"))
        })?;
        let facts = combined_facts(pool, left, right)?;
        pool.get_mut(out)?.set_facts(facts);
        Ok(())
    }

    fn scan_matches(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
        key: &IndexKey,
    ) -> Result<()> {
        let candidates: Vec<TupleId> = self.other_index(side).candidates(key).to_vec();
        for other in candidates {
            if !self.indexed && !self.key_matches(pool, key, other, side.opposite())? {
                continue;
            }
            let (left, right) = orient(side, tuple, other);
            if self.filter_passes(pool, left, right)? {
                self.create_out(pool, left, right)?;
            }
        }
        Ok(())
    }

    fn rerun_matches(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
        key: &IndexKey,
    ) -> Result<()> {
        let candidates: Vec<TupleId> = self.other_index(side).candidates(key).to_vec();
        for other in candidates {
            if !self.indexed && !self.key_matches(pool, key, other, side.opposite())? {
                continue;
            }
            let (left, right) = orient(side, tuple, other);
            let existing = self.outs.get(&(left, right)).copied();
            let passes = self.filter_passes(pool, left, right)?;
            match (existing, passes) {
                // Content changed: unconditionally signal downstream; the
                // finisher refreshes the facts at flush.
                (Some(out), true) => self.base.propagator.stage_update(pool, out)?,
                (Some(out), false) => self.remove_out(pool, out, None)?,
                (None, true) => self.create_out(pool, left, right)?,
                (None, false) => {}
            }
        }
        Ok(())
    }

    fn create_out(&mut self, pool: &mut TuplePool, left: TupleId, right: TupleId) -> Result<()> {
        let facts = combined_facts(pool, left, right)?;
        let out = pool.create(facts, self.base.out_store);
        self.outs.insert((left, right), out);
        self.origins.insert(out, (left, right));
        push_out(pool, left, self.left_slots.outs, out)?;
        push_out(pool, right, self.right_slots.outs, out)?;
        self.base.propagator.stage_insert(pool, out)
    }

    /// Retracts one output and unlinks it from both inputs' output lists.
    ///
    /// `taken` is the input slot the caller already drained, identified by
    /// tuple and side. The side matters: under a self-join the same tuple
    /// holds both slots, and a self-matching pair must still be dropped
    /// from the slot that was not drained.
    fn remove_out(
        &mut self,
        pool: &mut TuplePool,
        out: TupleId,
        taken: Option<(TupleId, InputSide)>,
    ) -> Result<()> {
        let (left, right) = self.origins.remove(&out).ok_or_else(|| {
            ScorenetError::Internal(format!("unknown join output {out:?}"))
        })?;
        self.outs.remove(&(left, right));
        if taken != Some((left, InputSide::Left)) {
            drop_out(pool, left, self.left_slots.outs, out)?;
        }
        if taken != Some((right, InputSide::Right)) {
            drop_out(pool, right, self.right_slots.outs, out)?;
        }
        self.base.propagator.stage_retract(pool, out)
    }

    fn extract_key(
        &self,
        pool: &TuplePool,
        tuple: TupleId,
        side: InputSide,
    ) -> Result<IndexKey> {
        let extractors = match side {
            InputSide::Left => &self.left_keys,
            InputSide::Right => &self.right_keys,
            InputSide::Single => {
                return Err(ScorenetError::Internal(
                    "join addressed without a side".into(),
                ))
            }
        };
        let input = pool.get(tuple)?;
        Ok(IndexKey::new(extractors.iter().map(|e| e(input)).collect()))
    }

    /// Stored-key equality check for the scan variant.
    fn key_matches(
        &self,
        pool: &TuplePool,
        key: &IndexKey,
        other: TupleId,
        other_side: InputSide,
    ) -> Result<bool> {
        let slots = self.slots(other_side);
        match pool.get(other)?.slot(slots.key) {
            Slot::JoinKey(other_key) => Ok(other_key == key),
            other => Err(ScorenetError::Internal(format!(
                "join key slot held {other:?}"
            ))),
        }
    }

    fn filter_passes(&self, pool: &TuplePool, left: TupleId, right: TupleId) -> Result<bool> {
        match &self.filter {
            None => Ok(true),
            Some(filter) => Ok(filter(pool.get(left)?, pool.get(right)?)),
        }
    }

    fn slots(&self, side: InputSide) -> SideSlots {
        match side {
            InputSide::Right => self.right_slots,
            _ => self.left_slots,
        }
    }

    fn index_mut(&mut self, side: InputSide) -> &mut JoinIndex {
        match side {
            InputSide::Right => &mut self.right_index,
            _ => &mut self.left_index,
        }
    }

    fn other_index(&self, side: InputSide) -> &JoinIndex {
        match side {
            InputSide::Right => &self.left_index,
            _ => &self.right_index,
        }
    }
}

fn orient(side: InputSide, mine: TupleId, other: TupleId) -> (TupleId, TupleId) {
    match side {
        InputSide::Right => (other, mine),
        _ => (mine, other),
    }
}

fn combined_facts(
    pool: &TuplePool,
    left: TupleId,
    right: TupleId,
) -> Result<SmallVec<[Rc<dyn Fact>; 4]>> {
    let mut facts = SmallVec::new();
    facts.extend(pool.get(left)?.facts().iter().cloned());
    facts.extend(pool.get(right)?.facts().iter().cloned());
    Ok(facts)
}

/// Drains the input's output list, clearing the slot entirely on terminal
/// retract or leaving an empty list behind for a re-scan.
fn take_outs(
    pool: &mut TuplePool,
    tuple: TupleId,
    offset: usize,
    terminal: bool,
) -> Result<Vec<TupleId>> {
    let input = pool.get_mut(tuple)?;
    if terminal {
        match input.take_slot(offset) {
            Slot::JoinOuts(outs) => Ok(outs),
            other => Err(ScorenetError::Internal(format!(
                "join outs slot held {other:?}"
            ))),
        }
    } else {
        match input.slot_mut(offset) {
            Slot::JoinOuts(outs) => Ok(std::mem::take(outs)),
            other => Err(ScorenetError::Internal(format!(
                "join outs slot held {other:?}"
            ))),
        }
    }
}

fn push_out(pool: &mut TuplePool, tuple: TupleId, offset: usize, out: TupleId) -> Result<()> {
    match pool.get_mut(tuple)?.slot_mut(offset) {
        Slot::JoinOuts(outs) => {
            outs.push(out);
            Ok(())
        }
        other => Err(ScorenetError::Internal(format!(
            "join outs slot held {other:?}"
        ))),
    }
}

fn drop_out(pool: &mut TuplePool, tuple: TupleId, offset: usize, out: TupleId) -> Result<()> {
    match pool.get_mut(tuple)?.slot_mut(offset) {
        Slot::JoinOuts(outs) => {
            let pos = outs.iter().position(|o| *o == out).ok_or_else(|| {
                ScorenetError::Internal(format!("output {out:?} missing from input list"))
            })?;
            outs.swap_remove(pos);
            Ok(())
        }
        other => Err(ScorenetError::Internal(format!(
            "join outs slot held {other:?}"
        ))),
    }
}

impl fmt::Debug for JoinNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinNode")
            .field("id", &self.base.id)
            .field("layer", &self.base.layer)
            .field("indexed", &self.indexed)
            .field("matches", &self.outs.len())
            .finish()
    }
}
