//! Tuples, their lifecycle states, and the arena that owns them.

use std::rc::Rc;

use smallvec::SmallVec;

use scorenet_core::{Fact, IndexKey, Result, ScorenetError};

use crate::collector::UndoToken;

/// Lifecycle state of a tuple within one propagation cycle.
///
/// Multiple same-cycle mutations of one tuple collapse into a single
/// downstream effect: re-deriving a pending tuple keeps it pending, and
/// retracting a tuple that was never flushed cancels it entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleState {
    /// Newly produced, not yet flushed downstream.
    Creating,
    /// Visible downstream, re-derived with changed content this cycle.
    Updating,
    /// Visible downstream, no pending change.
    Ok,
    /// Visible downstream, will be flushed as a retraction.
    Dying,
    /// Never flushed and already retracted; produces no downstream call.
    Aborting,
}

/// Handle to a tuple in a [`TuplePool`].
///
/// Carries a generation so a handle held past its tuple's release is
/// detected instead of silently addressing a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleId {
    index: u32,
    generation: u32,
}

impl TupleId {
    /// Raw arena position, stable while the tuple is alive.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A group membership record held in an input tuple's store slot.
///
/// Written by the group node's insert path; the matching update/retract
/// paths read the key back (no re-extraction) and run the undo tokens.
#[derive(Debug)]
pub struct GroupMembership {
    /// Key of the group the tuple currently contributes to.
    pub key: IndexKey,
    /// One undo token per collector, in collector order.
    pub undo: SmallVec<[UndoToken; 2]>,
}

/// Node-private bookkeeping value inside a tuple's store.
///
/// A slot written by node N's insert path is only ever read or cleared by
/// node N's own update/retract path; the offsets are assigned once at
/// graph-build time.
#[derive(Debug, Default)]
pub enum Slot {
    /// Unwritten, or cleared after retraction.
    #[default]
    Empty,
    /// Forward link to the single output tuple (filter, map).
    Child(TupleId),
    /// Index key this input tuple is currently indexed under (join).
    JoinKey(IndexKey),
    /// Output tuples this input tuple currently contributes to (join).
    JoinOuts(Vec<TupleId>),
    /// Group membership of this input tuple (group node).
    Group(GroupMembership),
    /// Impact recorded for this tuple (scorer).
    Impact(i64),
}

impl Slot {
    /// True if the slot was never written (or was cleared).
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

/// A record of matched facts travelling between two adjacent nodes.
#[derive(Debug)]
pub struct Tuple {
    facts: SmallVec<[Rc<dyn Fact>; 4]>,
    state: TupleState,
    store: SmallVec<[Slot; 4]>,
}

impl Tuple {
    fn new(facts: SmallVec<[Rc<dyn Fact>; 4]>, store_size: usize) -> Self {
        let mut store = SmallVec::with_capacity(store_size);
        store.resize_with(store_size, Slot::default);
        Tuple {
            facts,
            state: TupleState::Creating,
            store,
        }
    }

    /// The matched facts, in stream order.
    pub fn facts(&self) -> &[Rc<dyn Fact>] {
        &self.facts
    }

    /// Replaces the facts after a re-derivation.
    pub fn set_facts(&mut self, facts: SmallVec<[Rc<dyn Fact>; 4]>) {
        self.facts = facts;
    }

    /// Downcasting accessor for the fact at `index`.
    ///
    /// The explicit deref matters: `Rc<dyn Fact>` is itself `Any + Debug`
    /// and method lookup would otherwise resolve `as_any` on the wrapper,
    /// never the fact inside it.
    pub fn fact_ref<T: 'static>(&self, index: usize) -> Option<&T> {
        self.facts
            .get(index)
            .and_then(|f| f.as_ref().as_any().downcast_ref())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TupleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TupleState) {
        self.state = state;
    }

    /// Read access to the store slot at `offset`.
    pub(crate) fn slot(&self, offset: usize) -> &Slot {
        &self.store[offset]
    }

    pub(crate) fn slot_mut(&mut self, offset: usize) -> &mut Slot {
        &mut self.store[offset]
    }

    /// Clears the slot at `offset` and returns its previous value.
    pub(crate) fn take_slot(&mut self, offset: usize) -> Slot {
        std::mem::take(&mut self.store[offset])
    }
}

struct Entry {
    generation: u32,
    tuple: Option<Tuple>,
}

/// Generational arena owning every live tuple of one network.
///
/// Tuples are created by their producing node and released once their
/// terminal retract (or abort) is flushed; handles to released tuples fail
/// fast instead of aliasing recycled storage.
#[derive(Default)]
pub struct TuplePool {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl TuplePool {
    pub fn new() -> Self {
        TuplePool::default()
    }

    /// Allocates a tuple in state [`TupleState::Creating`] with `store_size`
    /// empty slots.
    pub fn create(
        &mut self,
        facts: SmallVec<[Rc<dyn Fact>; 4]>,
        store_size: usize,
    ) -> TupleId {
        let tuple = Tuple::new(facts, store_size);
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.tuple = Some(tuple);
                self.live += 1;
                TupleId {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    tuple: Some(tuple),
                });
                self.live += 1;
                TupleId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub fn get(&self, id: TupleId) -> Result<&Tuple> {
        self.entries
            .get(id.index())
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.tuple.as_ref())
            .ok_or_else(|| stale(id))
    }

    pub fn get_mut(&mut self, id: TupleId) -> Result<&mut Tuple> {
        self.entries
            .get_mut(id.index())
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.tuple.as_mut())
            .ok_or_else(|| stale(id))
    }

    pub fn state(&self, id: TupleId) -> Result<TupleState> {
        self.get(id).map(|t| t.state())
    }

    pub fn set_state(&mut self, id: TupleId, state: TupleState) -> Result<()> {
        self.get_mut(id)?.set_state(state);
        Ok(())
    }

    /// Releases a tuple after its terminal retract/abort was flushed.
    pub fn release(&mut self, id: TupleId) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id.index())
            .filter(|e| e.generation == id.generation && e.tuple.is_some())
            .ok_or_else(|| stale(id))?;
        entry.tuple = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.live -= 1;
        Ok(())
    }

    /// Number of live tuples; zero once every fact has been retracted and
    /// the network settled.
    pub fn live_count(&self) -> usize {
        self.live
    }
}

fn stale(id: TupleId) -> ScorenetError {
    ScorenetError::Internal(format!("stale tuple handle {id:?}"))
}
