//! Stateless 1:1 transform node.

use std::fmt;

use scorenet_core::{Result, ScorenetError};

use super::{NodeBase, TupleMapper};
use crate::tuple::{Slot, TupleId, TuplePool};

/// Derives exactly one output tuple from each input tuple.
///
/// An update always re-runs the mapping in place and signals downstream
/// even when the mapped value looks unchanged, since derived state may have
/// moved silently.
pub struct MapNode {
    pub(crate) base: NodeBase,
    mapper: TupleMapper,
    /// Offset of the forward-link slot in the input tuple's store.
    slot: usize,
}

impl MapNode {
    pub(crate) fn new(base: NodeBase, mapper: TupleMapper, slot: usize) -> Self {
        MapNode { base, mapper, slot }
    }

    pub(crate) fn insert(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        let facts = {
            let input = pool.get(tuple)?;
            if !input.slot(self.slot).is_empty() {
                return Err(ScorenetError::NodeContract(format!(
                    "tuple inserted twice into map node {:?}",
                    self.base.id
                )));
            }
            (self.mapper)(input)
        };
        let out = pool.create(facts, self.base.out_store);
        *pool.get_mut(tuple)?.slot_mut(self.slot) = Slot::Child(out);
        self.base.propagator.stage_insert(pool, out)
    }

    pub(crate) fn update(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        let out = match pool.get(tuple)?.slot(self.slot) {
            Slot::Child(out) => *out,
            // Filtered upstream until now: adopt as an insert.
            Slot::Empty => return self.insert(pool, tuple),
            other => {
                return Err(ScorenetError::Internal(format!("map slot held {other:?}")))
            }
        };
        let facts = (self.mapper)(pool.get(tuple)?);
        pool.get_mut(out)?.set_facts(facts);
        self.base.propagator.stage_update(pool, out)
    }

    pub(crate) fn retract(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        match pool.get_mut(tuple)?.take_slot(self.slot) {
            Slot::Empty => Ok(()),
            Slot::Child(out) => self.base.propagator.stage_retract(pool, out),
            other => Err(ScorenetError::Internal(format!("map slot held {other:?}"))),
        }
    }
}

impl fmt::Debug for MapNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapNode")
            .field("id", &self.base.id)
            .field("layer", &self.base.layer)
            .finish()
    }
}
