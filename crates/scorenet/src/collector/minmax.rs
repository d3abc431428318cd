//! Min/max collectors over an extracted `i64` value.
//!
//! Retraction-friendly: values are kept as a sorted multiset, so removing
//! the current extreme falls back to the next one.

use std::collections::BTreeMap;
use std::rc::Rc;

use scorenet_core::{Fact, Result, ScorenetError};

use super::{Collector, CollectorSupplier, TokenStore, UndoToken, ValueFn};
use crate::tuple::Tuple;

/// Creates a supplier of collectors tracking the minimum extracted value.
///
/// Finishes to an `Option<i64>` (`None` only while the group is empty,
/// which a live group never is).
pub fn min(value: ValueFn<i64>) -> CollectorSupplier {
    extreme(value, Extreme::Min)
}

/// Creates a supplier of collectors tracking the maximum extracted value.
///
/// Finishes to an `Option<i64>`.
pub fn max(value: ValueFn<i64>) -> CollectorSupplier {
    extreme(value, Extreme::Max)
}

#[derive(Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

fn extreme(value: ValueFn<i64>, which: Extreme) -> CollectorSupplier {
    Rc::new(move || {
        Box::new(ExtremeCollector {
            value: Rc::clone(&value),
            which,
            counts: BTreeMap::new(),
            undo: TokenStore::new(),
        })
    })
}

struct ExtremeCollector {
    value: ValueFn<i64>,
    which: Extreme,
    counts: BTreeMap<i64, usize>,
    undo: TokenStore<i64>,
}

impl Collector for ExtremeCollector {
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken {
        let v = (self.value)(tuple);
        *self.counts.entry(v).or_insert(0) += 1;
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
                return Err(ScorenetError::Internal(format!(
                    "extreme collector retracted unknown value {v}"
                )))
            }
        }
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        let result: Option<i64> = match self.which {
            Extreme::Min => self.counts.keys().next().copied(),
            Extreme::Max => self.counts.keys().next_back().copied(),
        };
        Rc::new(result)
    }
}
