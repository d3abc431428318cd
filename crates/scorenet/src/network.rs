//! Layered propagation driver.
//!
//! All staging into a node comes from strictly lower layers, so flushing
//! layers in ascending order with the three phases run per layer guarantees
//! every node's queues are complete before they are drained. Dying and
//! aborting tuples are parked in a graveyard and released only once the
//! whole cycle is done, because stale ids for them may still sit in later
//! phase lists.

use std::rc::Rc;

use smallvec::SmallVec;
use tracing::trace;

use scorenet_core::{Fact, Result, ScorenetError};

use crate::node::{ChildEdge, Node, NodeId};
use crate::queue::Phase;
use crate::tuple::{TupleId, TuplePool, TupleState};

/// The sealed node graph plus its tuple pool and propagation state.
pub struct Network {
    pub(crate) nodes: Vec<Node>,
    layers: Vec<Vec<NodeId>>,
    pub(crate) pool: TuplePool,
    graveyard: Vec<TupleId>,
    cycles: u64,
}

impl Network {
    pub(crate) fn new(nodes: Vec<Node>, layers: Vec<Vec<NodeId>>) -> Self {
        Network {
            nodes,
            layers,
            pool: TuplePool::new(),
            graveyard: Vec::new(),
            cycles: 0,
        }
    }

    /// Number of completed propagation cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Tuples currently alive across the whole network.
    pub fn live_tuples(&self) -> usize {
        self.pool.live_count()
    }

    pub(crate) fn insert_root(&mut self, source: NodeId, fact: Rc<dyn Fact>) -> Result<TupleId> {
        let Network { nodes, pool, .. } = self;
        match &mut nodes[source.0] {
            Node::Source(node) => node.insert_fact(pool, fact),
            _ => Err(not_a_source(source)),
        }
    }

    pub(crate) fn update_root(&mut self, source: NodeId, tuple: TupleId) -> Result<()> {
        let Network { nodes, pool, .. } = self;
        match &mut nodes[source.0] {
            Node::Source(node) => node.update_fact(pool, tuple),
            _ => Err(not_a_source(source)),
        }
    }

    pub(crate) fn retract_root(&mut self, source: NodeId, tuple: TupleId) -> Result<()> {
        let Network { nodes, pool, .. } = self;
        match &mut nodes[source.0] {
            Node::Source(node) => node.retract_fact(pool, tuple),
            _ => Err(not_a_source(source)),
        }
    }

    /// Runs one propagation cycle to a fixed point.
    ///
    /// Per layer, in ascending order: flush every node's retracts, then
    /// updates, then inserts. A node's deliveries only stage work in higher
    /// layers, so one pass drains everything.
    pub fn settle(&mut self) -> Result<()> {
        for layer in 0..self.layers.len() {
            for phase in [Phase::Retracts, Phase::Updates, Phase::Inserts] {
                for slot in 0..self.layers[layer].len() {
                    let id = self.layers[layer][slot];
                    self.flush(id, phase)?;
                }
            }
        }
        let dead = std::mem::take(&mut self.graveyard);
        for id in dead {
            self.pool.release(id)?;
        }
        self.cycles += 1;
        trace!(
            cycle = self.cycles,
            live = self.pool.live_count(),
            "settle complete"
        );
        Ok(())
    }

    fn flush(&mut self, id: NodeId, phase: Phase) -> Result<()> {
        let staged = self.nodes[id.0].base_mut().propagator.take(phase);
        if staged.is_empty() {
            return Ok(());
        }
        let dynamic = self.nodes[id.0].base().propagator.is_dynamic();
        let children: SmallVec<[ChildEdge; 2]> = self.nodes[id.0].base().children.clone();

        for tuple in staged {
            let state = self.pool.state(tuple)?;
            match (phase, state) {
                (Phase::Retracts, TupleState::Dying) => {
                    self.deliver(&children, tuple, Phase::Retracts)?;
                    self.graveyard.push(tuple);
                }
                (Phase::Updates, TupleState::Updating) => {
                    if dynamic {
                        self.nodes[id.0].finish(&mut self.pool, tuple)?;
                    }
                    self.pool.set_state(tuple, TupleState::Ok)?;
                    self.deliver(&children, tuple, Phase::Updates)?;
                }
                // Retracted after the update was staged; the retract phase
                // already delivered it and this entry is stale.
                (Phase::Updates, TupleState::Dying) => {}
                (Phase::Inserts, TupleState::Creating) => {
                    if dynamic {
                        self.nodes[id.0].finish(&mut self.pool, tuple)?;
                    }
                    self.pool.set_state(tuple, TupleState::Ok)?;
                    self.deliver(&children, tuple, Phase::Inserts)?;
                }
                // Created and retracted in the same cycle: no downstream
                // effect at all.
                (Phase::Inserts, TupleState::Aborting) => {
                    self.graveyard.push(tuple);
                }
                (phase, state) => {
                    return Err(ScorenetError::Internal(format!(
                        "tuple {tuple:?} in state {state:?} drained in phase {phase:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    fn deliver(&mut self, children: &[ChildEdge], tuple: TupleId, phase: Phase) -> Result<()> {
        let Network { nodes, pool, .. } = self;
        for edge in children {
            let child = &mut nodes[edge.node.0];
            match phase {
                Phase::Retracts => child.retract(pool, tuple, edge.side)?,
                Phase::Updates => child.update(pool, tuple, edge.side)?,
                Phase::Inserts => child.insert(pool, tuple, edge.side)?,
            }
        }
        Ok(())
    }
}

fn not_a_source(id: NodeId) -> ScorenetError {
    ScorenetError::Internal(format!("node {id:?} is not a source"))
}
