//! Sum collector.

use std::rc::Rc;

use scorenet_core::{Fact, Result};

use super::{Collector, CollectorSupplier, TokenStore, UndoToken, ValueFn};
use crate::tuple::Tuple;

/// Creates a supplier of collectors summing an extracted `i64` value.
///
/// Finishes to an `i64`.
pub fn sum(value: ValueFn<i64>) -> CollectorSupplier {
    Rc::new(move || {
        Box::new(SumCollector {
            value: Rc::clone(&value),
            total: 0,
            undo: TokenStore::new(),
        })
    })
}

struct SumCollector {
    value: ValueFn<i64>,
    total: i64,
    undo: TokenStore<i64>,
}

impl Collector for SumCollector {
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken {
        let v = (self.value)(tuple);
        self.total += v;
        self.undo.insert(v)
    }

    fn retract(&mut self, token: UndoToken) -> Result<()> {
        let v = self.undo.remove(token)?;
        self.total -= v;
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        Rc::new(self.total)
    }
}
