//! Average collector.

use std::rc::Rc;

use scorenet_core::{Fact, Result};

use super::{Collector, CollectorSupplier, TokenStore, UndoToken, ValueFn};
use crate::tuple::Tuple;

/// Creates a supplier of collectors averaging an extracted `i64` value.
///
/// Finishes to an `Option<f64>` (`None` only while the group is empty).
pub fn average(value: ValueFn<i64>) -> CollectorSupplier {
    Rc::new(move || {
        Box::new(AverageCollector {
            value: Rc::clone(&value),
            total: 0,
            count: 0,
            undo: TokenStore::new(),
        })
    })
}

struct AverageCollector {
    value: ValueFn<i64>,
    total: i64,
    count: usize,
    undo: TokenStore<i64>,
}

impl Collector for AverageCollector {
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken {
        let v = (self.value)(tuple);
        self.total += v;
        self.count += 1;
        self.undo.insert(v)
    }

    fn retract(&mut self, token: UndoToken) -> Result<()> {
        let v = self.undo.remove(token)?;
        self.total -= v;
        self.count -= 1;
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        let result: Option<f64> = if self.count == 0 {
            None
        } else {
            Some(self.total as f64 / self.count as f64)
        };
        Rc::new(result)
    }
}
