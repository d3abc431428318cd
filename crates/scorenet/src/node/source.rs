//! Entry node turning root facts into uni tuples.

use std::rc::Rc;

use smallvec::smallvec;

use scorenet_core::{Fact, Result, ScorenetError};

use super::NodeBase;
use crate::tuple::{TupleId, TuplePool, TupleState};

/// Layer-0 entry point for one stream of root facts.
///
/// The session owns the fact-identity registry; this node only owns the
/// tuple lifecycle of its stream. Each fact becomes exactly one uni tuple.
#[derive(Debug)]
pub struct SourceNode {
    pub(crate) base: NodeBase,
}

impl SourceNode {
    pub(crate) fn new(base: NodeBase) -> Self {
        SourceNode { base }
    }

    /// Admits a newly inserted root fact, returning its tuple.
    pub(crate) fn insert_fact(
        &mut self,
        pool: &mut TuplePool,
        fact: Rc<dyn Fact>,
    ) -> Result<TupleId> {
        let tuple = pool.create(smallvec![fact], self.base.out_store);
        self.base.propagator.stage_insert(pool, tuple)?;
        Ok(tuple)
    }

    /// Marks a root fact's tuple as re-derived.
    pub(crate) fn update_fact(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        match pool.state(tuple)? {
            TupleState::Dying | TupleState::Aborting => Err(ScorenetError::NodeContract(
                "root fact updated after retract".into(),
            )),
            _ => self.base.propagator.stage_update(pool, tuple),
        }
    }

    /// Retracts a root fact's tuple.
    pub(crate) fn retract_fact(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        self.base.propagator.stage_retract(pool, tuple)
    }
}
