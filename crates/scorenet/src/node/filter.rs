//! Predicate gate producing a pass-through output tuple.

use std::fmt;

use smallvec::SmallVec;

use scorenet_core::{Result, ScorenetError};

use super::{NodeBase, TuplePredicate};
use crate::tuple::{Slot, TupleId, TuplePool};

/// Forwards a tuple downstream while its predicate holds.
///
/// The forward link lives in the input tuple's store slot; an input whose
/// predicate never held has an empty slot, so a later update silently adopts
/// it and a retract is a no-op; the engine cannot tell "filtered" from
/// "never existed".
pub struct FilterNode {
    pub(crate) base: NodeBase,
    predicate: TuplePredicate,
    /// Offset of the forward-link slot in the input tuple's store.
    slot: usize,
}

impl FilterNode {
    pub(crate) fn new(base: NodeBase, predicate: TuplePredicate, slot: usize) -> Self {
        FilterNode {
            base,
            predicate,
            slot,
        }
    }

    pub(crate) fn insert(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        {
            let input = pool.get(tuple)?;
            if !input.slot(self.slot).is_empty() {
                return Err(ScorenetError::NodeContract(format!(
                    "tuple inserted twice into filter node {:?}",
                    self.base.id
                )));
            }
            if !(self.predicate)(input) {
                return Ok(());
            }
        }
        self.pass_through(pool, tuple)
    }

    pub(crate) fn update(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        let (passes, out) = {
            let input = pool.get(tuple)?;
            let out = match input.slot(self.slot) {
                Slot::Child(out) => Some(*out),
                _ => None,
            };
            ((self.predicate)(input), out)
        };
        match (out, passes) {
            // Filtered until now: adopt as an insert.
            (None, true) => self.pass_through(pool, tuple),
            (None, false) => Ok(()),
            (Some(out), true) => {
                let facts = pool.get(tuple)?.facts().to_vec();
                let output = pool.get_mut(out)?;
                output.set_facts(SmallVec::from_vec(facts));
                self.base.propagator.stage_update(pool, out)
            }
            (Some(out), false) => {
                pool.get_mut(tuple)?.take_slot(self.slot);
                self.base.propagator.stage_retract(pool, out)
            }
        }
    }

    pub(crate) fn retract(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        match pool.get_mut(tuple)?.take_slot(self.slot) {
            Slot::Empty => Ok(()),
            Slot::Child(out) => self.base.propagator.stage_retract(pool, out),
            other => Err(ScorenetError::Internal(format!(
                "filter slot held {other:?}"
            ))),
        }
    }

    fn pass_through(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        let facts = SmallVec::from_vec(pool.get(tuple)?.facts().to_vec());
        let out = pool.create(facts, self.base.out_store);
        *pool.get_mut(tuple)?.slot_mut(self.slot) = Slot::Child(out);
        self.base.propagator.stage_insert(pool, out)
    }
}

impl fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterNode")
            .field("id", &self.base.id)
            .field("layer", &self.base.layer)
            .finish()
    }
}
