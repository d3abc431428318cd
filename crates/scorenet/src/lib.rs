//! Incremental constraint-match network for metaheuristic solvers.
//!
//! A working solution is perturbed by small local moves, millions of times
//! per run. Instead of re-evaluating every constraint from scratch after
//! each move, this crate maintains a dataflow network of nodes (filter, map,
//! join, group-by, scorer) that recomputes only the matches a change can
//! reach, through a three-phase retract/update/insert propagation protocol.
//!
//! # Architecture
//!
//! - Facts enter through source nodes and travel between nodes as tuples
//!   allocated in a generational arena ([`tuple::TuplePool`]).
//! - Every node owns one [`queue::Propagator`] buffering its pending output
//!   deltas; the [`network::Network`] flushes them layer by layer, retracts
//!   first, then updates, then inserts.
//! - Joins are accelerated by per-side hash indexes; group-by nodes maintain
//!   reference-counted groups with undoable collectors.
//!
//! Everything is single-threaded by design: the phase ordering provides the
//! consistency a concurrent system would need locks for.

// Closure-heavy node signatures intentionally use complex types
#![allow(clippy::type_complexity)]

pub mod builder;
pub mod collector;
pub mod index;
pub mod network;
pub mod node;
pub mod queue;
pub mod session;
pub mod tuple;

#[cfg(test)]
mod tests;

pub use scorenet_core::{Fact, FactHandle, IndexKey, KeyPart, Result, ScorenetError};

pub use builder::{JoinSpec, NetworkBuilder};
pub use collector::{
    average, composite, count, max, min, sum, to_list, to_map, to_set, Collector,
    CollectorSupplier, UndoToken,
};
pub use network::Network;
pub use node::{ImpactFn, JoinFilter, KeyExtractor, NodeId, TupleMapper, TuplePredicate};
pub use session::Session;
pub use tuple::{Tuple, TupleId, TupleState};
