//! Composite collector combining several collectors over one group.

use std::rc::Rc;

use smallvec::SmallVec;

use scorenet_core::{Fact, Result};

use super::{Collector, CollectorSupplier, TokenStore, UndoToken};
use crate::tuple::Tuple;

/// Creates a supplier combining several collectors into one.
///
/// Each part sees every accumulate/retract; finish yields a
/// `Vec<Rc<dyn Fact>>` with one result per part, in part order.
pub fn composite(parts: Vec<CollectorSupplier>) -> CollectorSupplier {
    Rc::new(move || {
        Box::new(CompositeCollector {
            parts: parts.iter().map(|s| s()).collect(),
            undo: TokenStore::new(),
        })
    })
}

struct CompositeCollector {
    parts: Vec<Box<dyn Collector>>,
    undo: TokenStore<SmallVec<[UndoToken; 2]>>,
}

impl Collector for CompositeCollector {
    fn accumulate(&mut self, tuple: &Tuple) -> UndoToken {
        let tokens: SmallVec<[UndoToken; 2]> =
            self.parts.iter_mut().map(|p| p.accumulate(tuple)).collect();
        self.undo.insert(tokens)
    }

    fn retract(&mut self, token: UndoToken) -> Result<()> {
        let tokens = self.undo.remove(token)?;
        for (part, token) in self.parts.iter_mut().zip(tokens) {
            part.retract(token)?;
        }
        Ok(())
    }

    fn finish(&self) -> Rc<dyn Fact> {
        let results: Vec<Rc<dyn Fact>> = self.parts.iter().map(|p| p.finish()).collect();
        Rc::new(results)
    }
}
