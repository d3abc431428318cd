//! Fluent construction of the node graph.
//!
//! Node wiring, store-slot claims, and layer assignment all happen here;
//! once [`NetworkBuilder::build`] returns, the graph shape is immutable.

use tracing::debug;

use scorenet_core::{Result, ScorenetError};

use crate::collector::CollectorSupplier;
use crate::network::Network;
use crate::node::{
    ChildEdge, FilterNode, GroupNode, ImpactFn, InputSide, JoinFilter, JoinNode, KeyExtractor,
    MapNode, Node, NodeBase, NodeId, ScorerNode, SideSlots, SourceNode, TupleMapper,
    TuplePredicate,
};
use crate::queue::Propagator;

/// Configuration of one join node.
///
/// `equal` builds the indexed variant: pairwise key equality over the two
/// extractor lists. `cross` pairs every left with every right input; it is
/// only useful with a residual [`JoinSpec::filtered`] predicate.
pub struct JoinSpec {
    left_keys: Vec<KeyExtractor>,
    right_keys: Vec<KeyExtractor>,
    filter: Option<JoinFilter>,
    indexed: bool,
}

impl JoinSpec {
    /// Hash-indexed equi-join over matching extractor lists.
    pub fn equal(left_keys: Vec<KeyExtractor>, right_keys: Vec<KeyExtractor>) -> Self {
        JoinSpec {
            left_keys,
            right_keys,
            filter: None,
            indexed: true,
        }
    }

    /// Cartesian pairing with no key, scan variant.
    pub fn cross() -> Self {
        JoinSpec {
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            filter: None,
            indexed: false,
        }
    }

    /// Adds a residual predicate evaluated on each candidate pair.
    pub fn filtered(mut self, filter: JoinFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Forces the nested-loop scan variant, keeping the same keys and
    /// semantics. Mainly useful to cross-check the indexed variant.
    pub fn unindexed(mut self) -> Self {
        self.indexed = false;
        self
    }
}

/// Accumulates nodes and wiring, then seals them into a [`Network`].
#[derive(Default)]
pub struct NetworkBuilder {
    nodes: Vec<Node>,
    assert_keys: bool,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        NetworkBuilder::default()
    }

    /// Builder whose group nodes re-hash stored keys on every update and
    /// retract, turning silent key mutation into [`ScorenetError::KeyHashDrift`].
    pub fn with_key_assertions() -> Self {
        NetworkBuilder {
            nodes: Vec::new(),
            assert_keys: true,
        }
    }

    /// Adds a root input stream. Sources sit on layer zero.
    pub fn source(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        let base = NodeBase::new(id, 0, Propagator::new_static());
        self.nodes.push(Node::Source(SourceNode::new(base)));
        id
    }

    pub fn filter(&mut self, parent: NodeId, predicate: TuplePredicate) -> Result<NodeId> {
        let layer = self.parent_layer(parent)? + 1;
        let slot = self.claim(parent, 1);
        let id = NodeId(self.nodes.len());
        let base = NodeBase::new(id, layer, Propagator::new_static());
        self.nodes
            .push(Node::Filter(FilterNode::new(base, predicate, slot)));
        self.attach(parent, id, InputSide::Single);
        Ok(id)
    }

    pub fn map(&mut self, parent: NodeId, mapper: TupleMapper) -> Result<NodeId> {
        let layer = self.parent_layer(parent)? + 1;
        let slot = self.claim(parent, 1);
        let id = NodeId(self.nodes.len());
        let base = NodeBase::new(id, layer, Propagator::new_static());
        self.nodes.push(Node::Map(MapNode::new(base, mapper, slot)));
        self.attach(parent, id, InputSide::Single);
        Ok(id)
    }

    pub fn join(&mut self, left: NodeId, right: NodeId, spec: JoinSpec) -> Result<NodeId> {
        if spec.left_keys.len() != spec.right_keys.len() {
            return Err(ScorenetError::Graph(format!(
                "join key arity mismatch: {} left vs {} right",
                spec.left_keys.len(),
                spec.right_keys.len()
            )));
        }
        if spec.indexed && spec.left_keys.is_empty() {
            return Err(ScorenetError::Graph(
                "indexed join requires at least one key pair".into(),
            ));
        }
        let layer = self.parent_layer(left)?.max(self.parent_layer(right)?) + 1;
        // Each side claims a key slot and an output-list slot on its parent.
        let left_key = self.claim(left, 2);
        let right_key = self.claim(right, 2);
        let left_slots = SideSlots {
            key: left_key,
            outs: left_key + 1,
        };
        let right_slots = SideSlots {
            key: right_key,
            outs: right_key + 1,
        };
        let id = NodeId(self.nodes.len());
        let base = NodeBase::new(id, layer, Propagator::new_dynamic());
        self.nodes.push(Node::Join(JoinNode::new(
            base,
            spec.indexed,
            spec.left_keys,
            spec.right_keys,
            spec.filter,
            left_slots,
            right_slots,
        )));
        self.attach(left, id, InputSide::Left);
        self.attach(right, id, InputSide::Right);
        Ok(id)
    }

    pub fn group_by(
        &mut self,
        parent: NodeId,
        keys: Vec<KeyExtractor>,
        collectors: Vec<CollectorSupplier>,
    ) -> Result<NodeId> {
        if keys.is_empty() && collectors.is_empty() {
            return Err(ScorenetError::Graph(
                "group-by needs at least one key or collector".into(),
            ));
        }
        let layer = self.parent_layer(parent)? + 1;
        let slot = self.claim(parent, 1);
        let id = NodeId(self.nodes.len());
        let base = NodeBase::new(id, layer, Propagator::new_dynamic());
        self.nodes.push(Node::Group(GroupNode::new(
            base,
            keys,
            collectors,
            slot,
            self.assert_keys,
        )));
        self.attach(parent, id, InputSide::Single);
        Ok(id)
    }

    /// Terminal node folding matches of `parent` into a named running total.
    pub fn scorer(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        impact: ImpactFn,
    ) -> Result<NodeId> {
        let layer = self.parent_layer(parent)? + 1;
        let slot = self.claim(parent, 1);
        let id = NodeId(self.nodes.len());
        let base = NodeBase::new(id, layer, Propagator::new_static());
        self.nodes.push(Node::Scorer(ScorerNode::new(
            base,
            name.into(),
            impact,
            slot,
        )));
        self.attach(parent, id, InputSide::Single);
        Ok(id)
    }

    /// Seals the graph: groups nodes into ascending layers and hands them
    /// to the propagation driver.
    pub fn build(self) -> Result<Network> {
        let depth = self
            .nodes
            .iter()
            .map(|n| n.base().layer() + 1)
            .max()
            .unwrap_or(0);
        let mut layers: Vec<Vec<NodeId>> = vec![Vec::new(); depth];
        for node in &self.nodes {
            layers[node.base().layer()].push(node.base().id());
        }
        debug!(
            nodes = self.nodes.len(),
            layers = layers.len(),
            "network built"
        );
        Ok(Network::new(self.nodes, layers))
    }

    fn parent_layer(&self, parent: NodeId) -> Result<usize> {
        let node = self
            .nodes
            .get(parent.0)
            .ok_or_else(|| ScorenetError::Graph(format!("unknown parent node {parent:?}")))?;
        if matches!(node, Node::Scorer(_)) {
            return Err(ScorenetError::Graph(format!(
                "scorer {parent:?} is terminal and cannot have children"
            )));
        }
        Ok(node.base().layer())
    }

    /// Reserves `count` store slots on the parent's output tuples and
    /// returns the offset of the first one.
    fn claim(&mut self, parent: NodeId, count: usize) -> usize {
        let base = self.nodes[parent.0].base_mut();
        let offset = base.out_store;
        base.out_store += count;
        offset
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, side: InputSide) {
        self.nodes[parent.0]
            .base_mut()
            .children
            .push(ChildEdge { node: child, side });
    }
}
