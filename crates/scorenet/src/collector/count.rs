//! Count collector.

use std::rc::Rc;

use scorenet_core::{Fact, Result, ScorenetError};

use super::{Collector, CollectorSupplier, UndoToken};
use crate::tuple::Tuple;

/// Creates a supplier of collectors counting group members.
///
/// Finishes to a `usize`.
pub fn count() -> CollectorSupplier {
    Rc::new(|| Box::new(CountCollector { count: 0 }))
}

struct CountCollector {
    count: usize,
}

impl Collector for CountCollector {
    fn accumulate(&mut self, _tuple: &Tuple) -> UndoToken {
        self.count += 1;
        UndoToken::STATELESS
    }

    fn retract(&mut self, _token: UndoToken) -> Result<()> {
        self.count = self
            .count
            .checked_sub(1)
            .ok_or_else(|| ScorenetError::Internal("count retracted below zero".into()))?;
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        Rc::new(self.count)
    }
}
