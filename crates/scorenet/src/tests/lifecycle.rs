//! Tuple lifecycle semantics observed through full sessions.

use std::cell::Cell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use scorenet_core::{KeyPart, ScorenetError};
use smallvec::smallvec;

use crate::builder::NetworkBuilder;
use crate::collector::count;
use crate::session::Session;
use crate::tuple::Tuple;

use super::support::{fact, shift, shift_load_impact, unit_impact, Shift};

#[test]
fn insert_then_retract_same_cycle_leaves_nothing() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    builder.scorer(shifts, "any", unit_impact()).unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let s = shift(1, 1, 10);
    session.insert(shifts, fact(&s)).unwrap();
    session.retract(&fact(&s)).unwrap();
    session.settle().unwrap();

    assert_eq!(session.score(), 0);
    assert_eq!(session.match_count("any"), Some(0));
    assert_eq!(session.network().live_tuples(), 0);
}

#[test]
fn filter_admits_and_evicts_on_update() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    let heavy = builder
        .filter(
            shifts,
            Rc::new(|t: &Tuple| t.fact_ref::<Shift>(0).unwrap().load.get() > 10),
        )
        .unwrap();
    builder.scorer(heavy, "heavy", shift_load_impact()).unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let s = shift(1, 1, 5);
    session.insert(shifts, fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 0);

    // Crossing the threshold makes the update act as an insert downstream.
    s.load.set(20);
    session.update(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 20);

    s.load.set(30);
    session.update(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 30);

    s.load.set(5);
    session.update(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 0);
    assert_eq!(session.match_count("heavy"), Some(0));

    session.retract(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.network().live_tuples(), 0);
}

#[test]
fn map_projects_and_tracks_updates() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    let doubled = builder
        .map(
            shifts,
            Rc::new(|t: &Tuple| {
                let load = t.fact_ref::<Shift>(0).unwrap().load.get();
                smallvec![fact(&Rc::new(load * 2))]
            }),
        )
        .unwrap();
    builder
        .scorer(
            doubled,
            "doubled",
            Rc::new(|t: &Tuple| *t.fact_ref::<i64>(0).unwrap()),
        )
        .unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let s = shift(1, 1, 3);
    session.insert(shifts, fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 6);

    s.load.set(8);
    session.update(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 16);

    session.retract(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 0);
    assert_eq!(session.network().live_tuples(), 0);
}

#[test]
fn update_without_structural_change_reuses_tuples() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    builder.scorer(shifts, "load", shift_load_impact()).unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let s = shift(1, 1, 4);
    session.insert(shifts, fact(&s)).unwrap();
    session.settle().unwrap();
    let live = session.network().live_tuples();

    s.load.set(9);
    session.update(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 9);
    // An in-place update allocates no new tuples anywhere.
    assert_eq!(session.network().live_tuples(), live);
}

#[test]
fn root_fact_contract_violations() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    builder.scorer(shifts, "any", unit_impact()).unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let s = shift(1, 1, 1);
    session.insert(shifts, fact(&s)).unwrap();
    assert!(matches!(
        session.insert(shifts, fact(&s)),
        Err(ScorenetError::NodeContract(_))
    ));

    session.retract(&fact(&s)).unwrap();
    assert!(matches!(
        session.update(&fact(&s)),
        Err(ScorenetError::NodeContract(_))
    ));
    assert!(matches!(
        session.retract(&fact(&s)),
        Err(ScorenetError::NodeContract(_))
    ));

    let never_inserted = shift(2, 1, 1);
    assert!(matches!(
        session.update(&fact(&never_inserted)),
        Err(ScorenetError::NodeContract(_))
    ));
}

/// Key part whose hash depends on shared mutable state, simulating a fact
/// whose key fields were mutated without an update call.
#[derive(Debug, Clone)]
struct VolatileKey {
    id: u32,
    salt: Rc<Cell<u64>>,
}

impl PartialEq for VolatileKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VolatileKey {}

impl Hash for VolatileKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.salt.get().hash(state);
    }
}

fn volatile_group_session(assertions: bool, salt: Rc<Cell<u64>>) -> (Session, crate::node::NodeId) {
    let mut builder = if assertions {
        NetworkBuilder::with_key_assertions()
    } else {
        NetworkBuilder::new()
    };
    let shifts = builder.source();
    let grouped = builder
        .group_by(
            shifts,
            vec![Rc::new(move |t: &Tuple| -> Rc<dyn KeyPart> {
                Rc::new(VolatileKey {
                    id: t.fact_ref::<Shift>(0).unwrap().employee.get(),
                    salt: salt.clone(),
                })
            })],
            vec![count()],
        )
        .unwrap();
    builder.scorer(grouped, "groups", unit_impact()).unwrap();
    (Session::new(builder.build().unwrap()), shifts)
}

#[test]
fn key_hash_drift_is_detected_in_assertion_mode() {
    let salt = Rc::new(Cell::new(0));
    let (mut session, shifts) = volatile_group_session(true, salt.clone());

    let s = shift(1, 1, 5);
    session.insert(shifts, fact(&s)).unwrap();
    session.settle().unwrap();

    salt.set(99);
    session.update(&fact(&s)).unwrap();
    assert!(matches!(
        session.settle(),
        Err(ScorenetError::KeyHashDrift { .. })
    ));
}

#[test]
fn key_hash_drift_is_ignored_in_production_mode() {
    let salt = Rc::new(Cell::new(0));
    let (mut session, shifts) = volatile_group_session(false, salt.clone());

    let s = shift(1, 1, 5);
    session.insert(shifts, fact(&s)).unwrap();
    session.settle().unwrap();

    salt.set(99);
    session.update(&fact(&s)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 1);
}
