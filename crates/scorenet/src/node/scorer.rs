//! Terminal scoring node: one weighted impact per matched tuple.

use std::fmt;

use scorenet_core::{Result, ScorenetError};

use super::{ImpactFn, NodeBase};
use crate::tuple::{Slot, TupleId, TuplePool};

/// Leaf of the network: folds every delivered tuple into a running total.
///
/// Impacts are applied at delivery time, not buffered; the propagator of a
/// scorer never stages anything. The impact recorded for a tuple is kept in
/// its store slot so retraction subtracts exactly what insertion added,
/// even if the impact function would now compute a different value.
pub struct ScorerNode {
    pub(crate) base: NodeBase,
    name: String,
    impact: ImpactFn,
    slot: usize,
    total: i64,
    matches: usize,
}

impl ScorerNode {
    pub(crate) fn new(base: NodeBase, name: String, impact: ImpactFn, slot: usize) -> Self {
        ScorerNode {
            base,
            name,
            impact,
            slot,
            total: 0,
            matches: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sum of the recorded impacts of all currently matched tuples.
    pub fn total(&self) -> i64 {
        self.total
    }

    /// Number of currently matched tuples.
    pub fn match_count(&self) -> usize {
        self.matches
    }

    pub(crate) fn insert(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        if !pool.get(tuple)?.slot(self.slot).is_empty() {
            return Err(ScorenetError::NodeContract(format!(
                "tuple inserted twice into scorer {:?}",
                self.name
            )));
        }
        let value = (self.impact)(pool.get(tuple)?);
        *pool.get_mut(tuple)?.slot_mut(self.slot) = Slot::Impact(value);
        self.total += value;
        self.matches += 1;
        Ok(())
    }

    pub(crate) fn update(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        if pool.get(tuple)?.slot(self.slot).is_empty() {
            // Filtered upstream until now: adopt as an insert.
            return self.insert(pool, tuple);
        }
        let old = self.take_impact(pool, tuple)?;
        let value = (self.impact)(pool.get(tuple)?);
        *pool.get_mut(tuple)?.slot_mut(self.slot) = Slot::Impact(value);
        self.total += value - old;
        Ok(())
    }

    pub(crate) fn retract(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        if pool.get(tuple)?.slot(self.slot).is_empty() {
            return Ok(());
        }
        let old = self.take_impact(pool, tuple)?;
        self.total -= old;
        self.matches -= 1;
        Ok(())
    }

    fn take_impact(&self, pool: &mut TuplePool, tuple: TupleId) -> Result<i64> {
        match pool.get_mut(tuple)?.take_slot(self.slot) {
            Slot::Impact(value) => Ok(value),
            other => Err(ScorenetError::Internal(format!(
                "scorer impact slot held {other:?}"
            ))),
        }
    }
}

impl fmt::Debug for ScorerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScorerNode")
            .field("id", &self.base.id)
            .field("name", &self.name)
            .field("total", &self.total)
            .field("matches", &self.matches)
            .finish()
    }
}
