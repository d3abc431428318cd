//! User-facing driver: root fact registry on top of the network.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use scorenet_core::{Fact, FactHandle, Result, ScorenetError};

use crate::network::Network;
use crate::node::{Node, NodeId};
use crate::tuple::TupleId;

struct RootFact {
    source: NodeId,
    tuple: TupleId,
}

/// Owns a [`Network`] and the identity registry of its root facts.
///
/// Facts are keyed by reference identity: the same `Rc` allocation must be
/// passed to `update` and `retract` that was passed to `insert`. Mutating a
/// fact's interior and calling [`Session::update`] is the intended way to
/// apply a move.
pub struct Session {
    network: Network,
    facts: HashMap<FactHandle, RootFact>,
}

impl Session {
    pub fn new(network: Network) -> Self {
        Session {
            network,
            facts: HashMap::new(),
        }
    }

    /// Registers a fact with a source stream and stages its insertion.
    pub fn insert(&mut self, source: NodeId, fact: Rc<dyn Fact>) -> Result<()> {
        let handle = FactHandle::of(&fact);
        match self.facts.entry(handle) {
            Entry::Occupied(_) => Err(ScorenetError::NodeContract(
                "root fact inserted twice".into(),
            )),
            Entry::Vacant(entry) => {
                let tuple = self.network.insert_root(source, fact)?;
                entry.insert(RootFact { source, tuple });
                Ok(())
            }
        }
    }

    /// Stages re-derivation of a previously inserted fact.
    pub fn update(&mut self, fact: &Rc<dyn Fact>) -> Result<()> {
        let root = self.lookup(fact)?;
        let (source, tuple) = (root.source, root.tuple);
        self.network.update_root(source, tuple)
    }

    /// Stages retraction of a previously inserted fact and forgets it.
    pub fn retract(&mut self, fact: &Rc<dyn Fact>) -> Result<()> {
        let handle = FactHandle::of(fact);
        let root = self
            .facts
            .remove(&handle)
            .ok_or_else(unknown_fact)?;
        self.network.retract_root(root.source, root.tuple)
    }

    /// Propagates all staged work to a fixed point.
    pub fn settle(&mut self) -> Result<()> {
        self.network.settle()?;
        debug!(
            facts = self.facts.len(),
            tuples = self.network.live_tuples(),
            "session settled"
        );
        Ok(())
    }

    /// Sum of all scorer totals. Only meaningful after [`Session::settle`].
    pub fn score(&self) -> i64 {
        self.scorers().map(|s| s.total()).sum()
    }

    /// Running total of one scorer by name.
    pub fn constraint_score(&self, name: &str) -> Option<i64> {
        self.scorers().find(|s| s.name() == name).map(|s| s.total())
    }

    /// Current match count of one scorer by name.
    pub fn match_count(&self, name: &str) -> Option<usize> {
        self.scorers()
            .find(|s| s.name() == name)
            .map(|s| s.match_count())
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    fn scorers(&self) -> impl Iterator<Item = &crate::node::ScorerNode> {
        self.network.nodes.iter().filter_map(|node| match node {
            Node::Scorer(s) => Some(s),
            _ => None,
        })
    }

    fn lookup(&self, fact: &Rc<dyn Fact>) -> Result<&RootFact> {
        self.facts
            .get(&FactHandle::of(fact))
            .ok_or_else(unknown_fact)
    }
}

fn unknown_fact() -> ScorenetError {
    ScorenetError::NodeContract("fact was never inserted or already retracted".into())
}
