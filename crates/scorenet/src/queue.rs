//! Per-node propagation queues.
//!
//! Every node buffers its pending output deltas here and flushes them in
//! three phases: retracts, then updates, then inserts. Staging drives the
//! tuple lifecycle machine; the network drains one phase list at a time.

use scorenet_core::{Result, ScorenetError};

use crate::tuple::{TupleId, TuplePool, TupleState};

/// One of the three flush phases of a propagation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Retracts,
    Updates,
    Inserts,
}

/// Buffered output deltas of a single node.
///
/// A tuple appears in at most one list per role; a tuple retracted after
/// being staged as an update stays in the update list as a stale entry and
/// is skipped at drain time by its state.
#[derive(Debug, Default)]
pub struct PropagationQueue {
    retracts: Vec<TupleId>,
    updates: Vec<TupleId>,
    inserts: Vec<TupleId>,
}

/// A node's propagator: the queue plus its flush discipline.
///
/// `Static` is pure forwarding (source, filter, map, scorer). `Dynamic`
/// additionally runs the owning node's finisher on each tuple immediately
/// before it is flushed as an insert or update (join and group nodes, whose
/// output value must be recomputed lazily).
#[derive(Debug)]
pub enum Propagator {
    Static(PropagationQueue),
    Dynamic(PropagationQueue),
}

impl Propagator {
    pub fn new_static() -> Self {
        Propagator::Static(PropagationQueue::default())
    }

    pub fn new_dynamic() -> Self {
        Propagator::Dynamic(PropagationQueue::default())
    }

    /// True for the variant that runs a finisher before flushing.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Propagator::Dynamic(_))
    }

    fn queue_mut(&mut self) -> &mut PropagationQueue {
        match self {
            Propagator::Static(q) | Propagator::Dynamic(q) => q,
        }
    }

    /// Stages a freshly created tuple for downstream insertion.
    pub fn stage_insert(&mut self, pool: &TuplePool, id: TupleId) -> Result<()> {
        match pool.state(id)? {
            TupleState::Creating => {
                self.queue_mut().inserts.push(id);
                Ok(())
            }
            state => Err(ScorenetError::Internal(format!(
                "insert staged for tuple in state {state:?}"
            ))),
        }
    }

    /// Stages a re-derivation of an already visible tuple.
    ///
    /// A tuple already pending as `Creating` or `Updating` is left as-is:
    /// same-cycle mutations coalesce into one downstream effect.
    pub fn stage_update(&mut self, pool: &mut TuplePool, id: TupleId) -> Result<()> {
        match pool.state(id)? {
            TupleState::Ok => {
                pool.set_state(id, TupleState::Updating)?;
                self.queue_mut().updates.push(id);
                Ok(())
            }
            TupleState::Creating | TupleState::Updating => Ok(()),
            state => Err(ScorenetError::Internal(format!(
                "update staged for tuple in state {state:?}"
            ))),
        }
    }

    /// Stages a retraction.
    ///
    /// A tuple still `Creating` was never observed downstream and is
    /// aborted: it stays in the insert list and is discarded at flush with
    /// no downstream call at all.
    pub fn stage_retract(&mut self, pool: &mut TuplePool, id: TupleId) -> Result<()> {
        match pool.state(id)? {
            TupleState::Creating => pool.set_state(id, TupleState::Aborting),
            TupleState::Updating | TupleState::Ok => {
                pool.set_state(id, TupleState::Dying)?;
                self.queue_mut().retracts.push(id);
                Ok(())
            }
            state => Err(ScorenetError::Internal(format!(
                "retract staged for tuple in state {state:?}"
            ))),
        }
    }

    /// Drains the staged tuples of one phase, preserving staging order.
    pub fn take(&mut self, phase: Phase) -> Vec<TupleId> {
        let queue = self.queue_mut();
        match phase {
            Phase::Retracts => std::mem::take(&mut queue.retracts),
            Phase::Updates => std::mem::take(&mut queue.updates),
            Phase::Inserts => std::mem::take(&mut queue.inserts),
        }
    }
}
