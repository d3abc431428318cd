//! Problem facts as they travel through the network.

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

/// A problem fact held by a tuple.
///
/// Facts are shared by reference (`Rc<dyn Fact>`) between adjacent nodes and
/// are never deep-copied: fact *identity* is what the network tracks, and
/// content reads always go through the current reference. Any `Debug +
/// 'static` value is a fact via the blanket impl below.
pub trait Fact: Any + Debug {
    /// Downcasting access to the concrete fact value.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Debug> Fact for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Identity of a fact reference, used to track root facts across moves.
///
/// Two handles are equal iff they were taken from the same `Rc` allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactHandle(usize);

impl FactHandle {
    /// Captures the identity of a fact reference.
    pub fn of(fact: &Rc<dyn Fact>) -> Self {
        FactHandle(Rc::as_ptr(fact) as *const () as usize)
    }
}
