//! The closed set of node variants forming the constraint network.
//!
//! Every node owns exactly one propagator and an immutable layer index
//! strictly greater than all of its parents'. Insert/update/retract
//! deliveries mutate only the receiving node and the tuple pool; downstream
//! effects are staged in the node's own propagator and flushed by the
//! network driver, never forwarded eagerly.

mod filter;
mod group;
mod join;
mod map;
mod scorer;
mod source;

use std::rc::Rc;

use smallvec::SmallVec;

use scorenet_core::{Fact, KeyPart, Result, ScorenetError};

pub use filter::FilterNode;
pub use group::GroupNode;
pub use join::JoinNode;
pub(crate) use join::SideSlots;
pub use map::MapNode;
pub use scorer::ScorerNode;
pub use source::SourceNode;

use crate::queue::Propagator;
use crate::tuple::{TupleId, TuplePool};

/// Identity of a node within one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which input of a node a delivery addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSide {
    /// The only input of a single-input node.
    Single,
    /// Left input of a join.
    Left,
    /// Right input of a join.
    Right,
}

impl InputSide {
    pub(crate) fn opposite(self) -> InputSide {
        match self {
            InputSide::Left => InputSide::Right,
            InputSide::Right => InputSide::Left,
            InputSide::Single => InputSide::Single,
        }
    }
}

/// Downstream edge: the consuming node and the input it consumes on.
#[derive(Debug, Clone, Copy)]
pub struct ChildEdge {
    pub node: NodeId,
    pub side: InputSide,
}

/// Predicate over one tuple (filter nodes).
pub type TuplePredicate = Rc<dyn Fn(&crate::tuple::Tuple) -> bool>;
/// 1:1 mapping from an input tuple to the facts of its output tuple.
pub type TupleMapper = Rc<dyn Fn(&crate::tuple::Tuple) -> SmallVec<[Rc<dyn Fact>; 4]>>;
/// Extraction of one key part from a tuple (joins, group-by).
pub type KeyExtractor = Rc<dyn Fn(&crate::tuple::Tuple) -> Rc<dyn KeyPart>>;
/// Residual predicate over a (left, right) pair of join inputs.
pub type JoinFilter = Rc<dyn Fn(&crate::tuple::Tuple, &crate::tuple::Tuple) -> bool>;
/// Weighted impact of one matched tuple (scorer nodes).
pub type ImpactFn = Rc<dyn Fn(&crate::tuple::Tuple) -> i64>;

/// State shared by every node variant.
#[derive(Debug)]
pub struct NodeBase {
    pub(crate) id: NodeId,
    pub(crate) layer: usize,
    pub(crate) children: SmallVec<[ChildEdge; 2]>,
    pub(crate) propagator: Propagator,
    /// Store slots per tuple this node produces; final once the graph is built.
    pub(crate) out_store: usize,
}

impl NodeBase {
    pub(crate) fn new(id: NodeId, layer: usize, propagator: Propagator) -> Self {
        NodeBase {
            id,
            layer,
            children: SmallVec::new(),
            propagator,
            out_store: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Topological generation; strictly greater than every parent's.
    pub fn layer(&self) -> usize {
        self.layer
    }
}

/// A vertex of the constraint network.
#[derive(Debug)]
pub enum Node {
    Source(SourceNode),
    Filter(FilterNode),
    Map(MapNode),
    Join(JoinNode),
    Group(GroupNode),
    Scorer(ScorerNode),
}

impl Node {
    pub(crate) fn base(&self) -> &NodeBase {
        match self {
            Node::Source(n) => &n.base,
            Node::Filter(n) => &n.base,
            Node::Map(n) => &n.base,
            Node::Join(n) => &n.base,
            Node::Group(n) => &n.base,
            Node::Scorer(n) => &n.base,
        }
    }

    pub(crate) fn base_mut(&mut self) -> &mut NodeBase {
        match self {
            Node::Source(n) => &mut n.base,
            Node::Filter(n) => &mut n.base,
            Node::Map(n) => &mut n.base,
            Node::Join(n) => &mut n.base,
            Node::Group(n) => &mut n.base,
            Node::Scorer(n) => &mut n.base,
        }
    }

    pub(crate) fn insert(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
    ) -> Result<()> {
        match self {
            Node::Source(_) => Err(no_upstream(self.base().id)),
            Node::Filter(n) => single_input(side).and_then(|_| n.insert(pool, tuple)),
            Node::Map(n) => single_input(side).and_then(|_| n.insert(pool, tuple)),
            Node::Join(n) => n.insert(pool, tuple, side),
            Node::Group(n) => single_input(side).and_then(|_| n.insert(pool, tuple)),
            Node::Scorer(n) => single_input(side).and_then(|_| n.insert(pool, tuple)),
        }
    }

    pub(crate) fn update(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
    ) -> Result<()> {
        match self {
            Node::Source(_) => Err(no_upstream(self.base().id)),
            Node::Filter(n) => single_input(side).and_then(|_| n.update(pool, tuple)),
            Node::Map(n) => single_input(side).and_then(|_| n.update(pool, tuple)),
            Node::Join(n) => n.update(pool, tuple, side),
            Node::Group(n) => single_input(side).and_then(|_| n.update(pool, tuple)),
            Node::Scorer(n) => single_input(side).and_then(|_| n.update(pool, tuple)),
        }
    }

    pub(crate) fn retract(
        &mut self,
        pool: &mut TuplePool,
        tuple: TupleId,
        side: InputSide,
    ) -> Result<()> {
        match self {
            Node::Source(_) => Err(no_upstream(self.base().id)),
            Node::Filter(n) => single_input(side).and_then(|_| n.retract(pool, tuple)),
            Node::Map(n) => single_input(side).and_then(|_| n.retract(pool, tuple)),
            Node::Join(n) => n.retract(pool, tuple, side),
            Node::Group(n) => single_input(side).and_then(|_| n.retract(pool, tuple)),
            Node::Scorer(n) => single_input(side).and_then(|_| n.retract(pool, tuple)),
        }
    }

    /// Recomputes the output value of `tuple` right before it is flushed.
    ///
    /// Invoked by the network for dynamic-propagator nodes only, at most
    /// once per affected tuple per cycle.
    pub(crate) fn finish(&mut self, pool: &mut TuplePool, tuple: TupleId) -> Result<()> {
        match self {
            Node::Join(n) => n.finish(pool, tuple),
            Node::Group(n) => n.finish(pool, tuple),
            _ => Err(ScorenetError::Internal(format!(
                "finish on static node {:?}",
                self.base().id
            ))),
        }
    }
}

fn single_input(side: InputSide) -> Result<()> {
    match side {
        InputSide::Single => Ok(()),
        other => Err(ScorenetError::Internal(format!(
            "single-input node addressed on side {other:?}"
        ))),
    }
}

fn no_upstream(id: NodeId) -> ScorenetError {
    ScorenetError::Internal(format!("source node {id:?} has no upstream input"))
}
