//! Collection-building collectors: list, set, map.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use scorenet_core::{Fact, Result, ScorenetError};

use super::{Collector, CollectorSupplier, TokenStore, UndoToken, ValueFn};
use crate::tuple::Tuple;

/// Creates a supplier of collectors gathering extracted values in insertion
/// order. Finishes to a `Vec<V>`.
pub fn to_list<V>(value: ValueFn<V>) -> CollectorSupplier
where
    V: Clone + Debug + 'static,
{
    Rc::new(move || {
        Box::new(ListCollector {
            value: Rc::clone(&value),
            items: Vec::new(),
            next_token: 0,
        })
    })
}

struct ListCollector<V> {
    value: ValueFn<V>,
    /// (token, value) pairs in insertion order; removal is a scan, which is
    /// fine for the group sizes this engine sees.
    items: Vec<(usize, V)>,
    next_token: usize,
}

impl<V: Clone + Debug + 'static> Collector for ListCollector<V> {
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken {
        let v = (self.value)(tuple);
        let token = self.next_token;
        self.next_token += 1;
        self.items.push((token, v));
        UndoToken::new(token)
    }

    fn retract(&mut self, token: UndoToken) -> Result<()> {
        let raw = token.raw();
        let pos = self
            .items
            .iter()
            .position(|(t, _)| *t == raw)
            .ok_or_else(|| ScorenetError::Internal(format!("unknown undo token {token:?}")))?;
        self.items.remove(pos);
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        let list: Vec<V> = self.items.iter().map(|(_, v)| v.clone()).collect();
        Rc::new(list)
    }
}

/// Creates a supplier of collectors gathering distinct extracted values.
/// Finishes to a `HashSet<V>`; duplicates are reference-counted so a value
/// stays in the set until its last contributor retracts.
pub fn to_set<V>(value: ValueFn<V>) -> CollectorSupplier
where
    V: Clone + Debug + Eq + Hash + 'static,
{
    Rc::new(move || {
        Box::new(SetCollector {
            value: Rc::clone(&value),
            counts: HashMap::new(),
            undo: TokenStore::new(),
        })
    })
}

struct SetCollector<V> {
    value: ValueFn<V>,
    counts: HashMap<V, usize>,
    undo: TokenStore<V>,
}

impl<V: Clone + Debug + Eq + Hash + 'static> Collector for SetCollector<V> {
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken {
        let v = (self.value)(tuple);
        *self.counts.entry(v.clone()).or_insert(0) += 1;
        self.undo.insert(v)
    }

    fn retract(&mut self, token: UndoToken) -> Result<()> {
        let v = self.undo.remove(token)?;
        match self.counts.get_mut(&v) {
            Some(n) if *n > 1 => {
                *n -= 1;
            }
            Some(_) => {
                self.counts.remove(&v);
            }
            None => {
                return Err(ScorenetError::Internal(
                    "set collector retracted unknown value".into(),
                ))
            }
        }
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        let set: HashSet<V> = self.counts.keys().cloned().collect();
        Rc::new(set)
    }
}

/// Creates a supplier of collectors mapping an extracted key to the values
/// sharing it. Finishes to a `HashMap<K, Vec<V>>`.
pub fn to_map<K, V>(key: ValueFn<K>, value: ValueFn<V>) -> CollectorSupplier
where
    K: Clone + Debug + Eq + Hash + 'static,
    V: Clone + Debug + PartialEq + 'static,
{
    Rc::new(move || {
        Box::new(MapCollector {
            key: Rc::clone(&key),
            value: Rc::clone(&value),
            entries: HashMap::new(),
            undo: TokenStore::new(),
        })
    })
}

struct MapCollector<K, V> {
    key: ValueFn<K>,
    value: ValueFn<V>,
    entries: HashMap<K, Vec<V>>,
    undo: TokenStore<(K, V)>,
}

impl<K, V> Collector for MapCollector<K, V>
where
    K: Clone + Debug + Eq + Hash + 'static,
    V: Clone + Debug + PartialEq + 'static,
{
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken {
        let k = (self.key)(tuple);
        let v = (self.value)(tuple);
        self.entries.entry(k.clone()).or_default().push(v.clone());
        self.undo.insert((k, v))
    }

    fn retract(&mut self, token: UndoToken) -> Result<()> {
        let (k, v) = self.undo.remove(token)?;
        let values = self.entries.get_mut(&k).ok_or_else(|| {
            ScorenetError::Internal("map collector retracted unknown key".into())
        })?;
        let pos = values.iter().position(|x| *x == v).ok_or_else(|| {
            ScorenetError::Internal("map collector retracted unknown value".into())
        })?;
        values.swap_remove(pos);
        if values.is_empty() {
            self.entries.remove(&k);
        }
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        Rc::new(self.entries.clone())
    }
}
