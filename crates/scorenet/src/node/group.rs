//! Group-by node: key extraction plus incremental aggregation.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use scorenet_core::{Fact, IndexKey, Result, ScorenetError};

use super::{KeyExtractor, NodeBase};
use crate::collector::{Collector, CollectorSupplier, UndoToken};
use crate::tuple::{GroupMembership, Slot, TupleId, TuplePool};

/// Live state of one group: its output tuple, a reference count of member
/// inputs, and one collector instance per configured supplier.
struct Group {
    out: TupleId,
    parent_count: usize,
    collectors: SmallVec<[Box<dyn Collector>; 2]>,
}

/// Partitions its input stream by extracted key and maintains one output
/// tuple per non-empty group.
///
/// Each member input records its key and collector undo tokens in its store
/// slot, so key changes and retractions never re-extract from possibly
/// mutated facts. The output tuple's facts (key parts followed by collector
/// results) are recomputed lazily by [`GroupNode::finish`] at flush time.
pub struct GroupNode {
    pub(crate) base: NodeBase,
    key_fns: Vec<KeyExtractor>,
    suppliers: Vec<CollectorSupplier>,
    groups: HashMap<IndexKey, Group>,
    /// Output tuple -> group key, for the finisher.
    origins: HashMap<TupleId, IndexKey>,
    member_slot: usize,
    /// Re-hash stored keys on update/retract and fail loudly on drift.
    assert_keys: bool,
}

impl GroupNode {
    pub(crate) fn new(
        base: NodeBase,
        key_fns: Vec<KeyExtractor>,
        suppliers: Vec<CollectorSupplier>,
        member_slot: usize,
        assert_keys: bool,
    ) -> Self {
        GroupNode {
            base,
            key_fns,
            suppliers,
            groups: HashMap::new(),
            origins: HashMap::new(),
            member_slot,
            assert_keys,
        }
    }

    pub(crate) fn insert(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        if !pool.get(tuple)?.slot(self.member_slot).is_empty() {
            return Err(ScorenetError::NodeContract(format!(
                "tuple inserted twice into group node {:?}",
                self.base.id
            )));
        }
        let key = self.extract_key(pool, tuple)?;
        self.insert_member(pool, tuple, key)
    }

    pub(crate) fn update(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        if pool.get(tuple)?.slot(self.member_slot).is_empty() {
            // Filtered upstream until now: adopt as an insert.
            return self.insert(pool, tuple);
        }
        let old = self.take_membership(pool, tuple)?;
        self.verify_key(&old.key)?;
        let new_key = self.extract_key(pool, tuple)?;

        if new_key != old.key {
            self.retract_member(pool, old)?;
            return self.insert_member(pool, tuple, new_key);
        }

        // Same group: swap the member's contribution in place.
        let group = self
            .groups
            .get_mut(&old.key)
            .ok_or_else(|| unknown_group(&old.key))?;
        for (collector, token) in group.collectors.iter_mut().zip(old.undo) {
            collector.retract(token)?;
        }
        let input = pool.get(tuple)?;
        let undo = group
            .collectors
            .iter_mut()
            .map(|c| c.accumulate(input))
            .collect();
        let out = group.out;
        *pool.get_mut(tuple)?.slot_mut(self.member_slot) =
            Slot::Group(GroupMembership { key: new_key, undo });
        self.base.propagator.stage_update(pool, out)
    }

    pub(crate) fn retract(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        if pool.get(tuple)?.slot(self.member_slot).is_empty() {
            return Ok(());
        }
        let old = self.take_membership(pool, tuple)?;
        self.verify_key(&old.key)?;
        self.retract_member(pool, old)
    }

    /// Rebuilds the output tuple's facts: key parts, then one result per
    /// collector, in configuration order.
    pub(crate) fn finish(&mut self, pool: &mut TuplePool, out: TupleId) -> Result<()> {
        let key = self
            .origins
            .get(&out)
            .ok_or_else(|| {
                ScorenetError::Internal(format!("finish for unknown group output {out:?}"))
            })?
            .clone();
        let group = self.groups.get(&key).ok_or_else(|| unknown_group(&key))?;
        let mut facts: SmallVec<[Rc<dyn Fact>; 4]> = key.part_facts().collect();
        facts.extend(group.collectors.iter().map(|c| c.finish()));
        pool.get_mut(out)?.set_facts(facts);
        Ok(())
    }

    fn insert_member(&mut self, pool: &mut TuplePool, tuple: TupleId, key: IndexKey) -> Result<()> {
        let undo: SmallVec<[UndoToken; 2]>;
        if let Some(group) = self.groups.get_mut(&key) {
            group.parent_count += 1;
            let input = pool.get(tuple)?;
            undo = group
                .collectors
                .iter_mut()
                .map(|c| c.accumulate(input))
                .collect();
            let out = group.out;
            self.base.propagator.stage_update(pool, out)?;
        } else {
            let out = pool.create(SmallVec::new(), self.base.out_store);
            let mut collectors: SmallVec<[Box<dyn Collector>; 2]> =
                self.suppliers.iter().map(|s| s()).collect();
            let input = pool.get(tuple)?;
            undo = collectors.iter_mut().map(|c| c.accumulate(input)).collect();
            self.groups.insert(
                key.clone(),
                Group {
                    out,
                    parent_count: 1,
                    collectors,
                },
            );
            self.origins.insert(out, key.clone());
            self.base.propagator.stage_insert(pool, out)?;
        }
        *pool.get_mut(tuple)?.slot_mut(self.member_slot) =
            Slot::Group(GroupMembership { key, undo });
        Ok(())
    }

    /// Undoes one membership; the group's output dies when its last member
    /// leaves and is merely re-derived otherwise.
    fn retract_member(&mut self, pool: &mut TuplePool, membership: GroupMembership) -> Result<()> {
        let group = self
            .groups
            .get_mut(&membership.key)
            .ok_or_else(|| unknown_group(&membership.key))?;
        for (collector, token) in group.collectors.iter_mut().zip(membership.undo) {
            collector.retract(token)?;
        }
        group.parent_count -= 1;
        let out = group.out;
        if group.parent_count == 0 {
            self.groups.remove(&membership.key);
            self.origins.remove(&out);
            self.base.propagator.stage_retract(pool, out)
        } else {
            self.base.propagator.stage_update(pool, out)
        }
    }

    fn take_membership(&self, pool: &mut TuplePool, tuple: TupleId) -> Result<GroupMembership> {
        match pool.get_mut(tuple)?.take_slot(self.member_slot) {
            Slot::Group(membership) => Ok(membership),
            other => Err(ScorenetError::Internal(format!(
                "group membership slot held {other:?}"
            ))),
        }
    }

    fn extract_key(&self, pool: &TuplePool, tuple: TupleId) -> Result<IndexKey> {
        let input = pool.get(tuple)?;
        Ok(IndexKey::new(
            self.key_fns.iter().map(|f| f(input)).collect(),
        ))
    }

    fn verify_key(&self, key: &IndexKey) -> Result<()> {
        if self.assert_keys && key.has_drifted() {
            return Err(ScorenetError::KeyHashDrift {
                key: format!("{key:?}"),
                node: self.base.id.0,
            });
        }
        Ok(())
    }
}

fn unknown_group(key: &IndexKey) -> ScorenetError {
    ScorenetError::Internal(format!("no live group for key {key:?}"))
}

impl fmt::Debug for GroupNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupNode")
            .field("id", &self.base.id)
            .field("layer", &self.base.layer)
            .field("keys", &self.key_fns.len())
            .field("collectors", &self.suppliers.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}
