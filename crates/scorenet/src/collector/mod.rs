//! Collectors for group-by aggregation.
//!
//! A collector is mutable incremental accumulator state: `accumulate` folds
//! one input tuple in and hands back an [`UndoToken`] that later reverses
//! exactly that contribution, and `finish` converts the current state into
//! the user-visible result. Finish is invoked lazily, at flush time only,
//! never per accumulate/undo call.

mod average;
mod collection;
mod composite;
mod count;
mod minmax;
mod sum;


use std::rc::Rc;

use scorenet_core::{Fact, Result, ScorenetError};

use crate::tuple::Tuple;

pub use average::average;
pub use collection::{to_list, to_map, to_set};
pub use composite::composite;
pub use count::count;
pub use minmax::{max, min};
pub use sum::sum;

/// Extraction function feeding a collector from an input tuple.
pub type ValueFn<V> = Rc<dyn Fn(&Tuple) -> V>;

/// Opaque handle reversing one `accumulate` call.
///
/// An explicit token into collector-private storage, not a captured
/// closure: the undo value lives with the collector, the token lives in the
/// input tuple's store slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoToken(usize);

/// Incremental accumulator state for one group.
pub trait Collector {
    /// Folds `tuple` into the accumulator and returns the inverse handle.
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken;

    /// Reverses the accumulate call that produced `token`.
    fn retract(&mut self, token: UndoToken) -> Result<()>;

    /// Converts the current state into the user-visible result.
    fn finish(&self) -> Rc<dyn Fact>;
}

/// Factory producing one fresh collector per group.
pub type CollectorSupplier = Rc<dyn Fn() -> Box<dyn Collector>>;

/// Token-addressed storage for per-accumulate undo values.
#[derive(Debug)]
pub(crate) struct TokenStore<V> {
    entries: Vec<Option<V>>,
    free: Vec<usize>,
}

impl<V> TokenStore<V> {
    pub(crate) fn new() -> Self {
        TokenStore {
            entries: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, value: V) -> UndoToken {
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(value);
                UndoToken(index)
            }
            None => {
                self.entries.push(Some(value));
                UndoToken(self.entries.len() - 1)
            }
        }
    }

    pub(crate) fn remove(&mut self, token: UndoToken) -> Result<V> {
        let value = self
            .entries
            .get_mut(token.0)
            .and_then(Option::take)
            .ok_or_else(|| {
                ScorenetError::Internal(format!("unknown undo token {token:?}"))
            })?;
        self.free.push(token.0);
        Ok(value)
    }
}

impl UndoToken {
    /// Token for collectors that keep no per-call state (e.g. count).
    pub(crate) const STATELESS: UndoToken = UndoToken(usize::MAX);

    pub(crate) fn new(raw: usize) -> UndoToken {
        UndoToken(raw)
    }

    pub(crate) fn raw(self) -> usize {
        self.0
    }
}
