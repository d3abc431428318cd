//! Join node behavior: matching, moves, residual filters, phase ordering.

use std::rc::Rc;

use scorenet_core::KeyPart;

use crate::builder::{JoinSpec, NetworkBuilder};
use crate::collector::sum;
use crate::session::Session;
use crate::tuple::Tuple;

use super::support::{
    employee, employee_id_key, fact, overload_session, shift, shift_employee_key, unit_impact,
    Employee, Shift,
};

fn pair_session() -> (Session, crate::node::NodeId, crate::node::NodeId) {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    let employees = builder.source();
    let joined = builder
        .join(
            shifts,
            employees,
            JoinSpec::equal(vec![shift_employee_key()], vec![employee_id_key()]),
        )
        .unwrap();
    builder.scorer(joined, "assigned", unit_impact()).unwrap();
    (Session::new(builder.build().unwrap()), shifts, employees)
}

#[test]
fn equi_join_matches_by_key() {
    let (mut session, shifts, employees) = pair_session();

    let e1 = employee(1, 10);
    let e2 = employee(2, 10);
    let s1 = shift(1, 1, 5);
    let s2 = shift(2, 1, 6);
    let s3 = shift(3, 3, 7); // no matching employee
    session.insert(employees, fact(&e1)).unwrap();
    session.insert(employees, fact(&e2)).unwrap();
    session.insert(shifts, fact(&s1)).unwrap();
    session.insert(shifts, fact(&s2)).unwrap();
    session.insert(shifts, fact(&s3)).unwrap();
    session.settle().unwrap();

    assert_eq!(session.match_count("assigned"), Some(2));

    // Moving the orphan shift onto a real employee creates a match.
    s3.employee.set(2);
    session.update(&fact(&s3)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("assigned"), Some(3));

    // Moving a shift between employees keeps the match count stable.
    s1.employee.set(2);
    session.update(&fact(&s1)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("assigned"), Some(3));

    session.retract(&fact(&e2)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("assigned"), Some(1));
}

#[test]
fn residual_filter_tracks_value_changes() {
    let (mut session, shifts, employees) = overload_session(true);

    let e1 = employee(1, 10);
    let s1 = shift(1, 1, 15);
    session.insert(employees, fact(&e1)).unwrap();
    session.insert(shifts, fact(&s1)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.constraint_score("overload"), Some(5));

    // Dropping below capacity removes the match without touching the key.
    s1.load.set(8);
    session.update(&fact(&s1)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.constraint_score("overload"), Some(0));
    assert_eq!(session.match_count("overload"), Some(0));

    // Capacity changes on the right side re-run the same matches.
    s1.load.set(8);
    e1.capacity.set(3);
    session.update(&fact(&e1)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.constraint_score("overload"), Some(5));
}

#[test]
fn cross_join_pairs_everything() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    let employees = builder.source();
    let joined = builder
        .join(shifts, employees, JoinSpec::cross())
        .unwrap();
    builder.scorer(joined, "pairs", unit_impact()).unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let staff: Vec<_> = (0..3).map(|i| employee(i, 10)).collect();
    let work: Vec<_> = (0..2).map(|i| shift(i, 0, 1)).collect();
    for e in &staff {
        session.insert(employees, fact(e)).unwrap();
    }
    for s in &work {
        session.insert(shifts, fact(s)).unwrap();
    }
    session.settle().unwrap();
    assert_eq!(session.match_count("pairs"), Some(6));

    session.retract(&fact(&staff[0])).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("pairs"), Some(4));
}

#[test]
fn retract_and_insert_in_one_cycle_do_not_meet() {
    let (mut session, shifts, employees) = pair_session();

    let e1 = employee(1, 10);
    session.insert(employees, fact(&e1)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("assigned"), Some(0));

    // The retract phase runs before the insert phase, so the new shift must
    // never observe the dying employee.
    let s1 = shift(1, 1, 5);
    session.retract(&fact(&e1)).unwrap();
    session.insert(shifts, fact(&s1)).unwrap();
    session.settle().unwrap();

    assert_eq!(session.match_count("assigned"), Some(0));
    assert_eq!(session.score(), 0);
    // Only the shift's root tuple survives.
    assert_eq!(session.network().live_tuples(), 1);
}

#[test]
fn self_join_retracts_cleanly() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    let joined = builder
        .join(
            shifts,
            shifts,
            JoinSpec::equal(vec![shift_employee_key()], vec![shift_employee_key()]),
        )
        .unwrap();
    builder.scorer(joined, "pairs", unit_impact()).unwrap();
    let mut session = Session::new(builder.build().unwrap());

    // A single shift pairs with itself.
    let s1 = shift(1, 1, 5);
    session.insert(shifts, fact(&s1)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("pairs"), Some(1));

    let s2 = shift(2, 1, 5);
    session.insert(shifts, fact(&s2)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("pairs"), Some(4));

    session.retract(&fact(&s1)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("pairs"), Some(1));

    session.retract(&fact(&s2)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("pairs"), Some(0));
    assert_eq!(session.network().live_tuples(), 0);
}

#[test]
fn self_join_detects_conflicting_shift_pairs() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    // Distinct-pair filter: each unordered conflict counted once.
    let joined = builder
        .join(
            shifts,
            shifts,
            JoinSpec::equal(vec![shift_employee_key()], vec![shift_employee_key()]).filtered(
                Rc::new(|left: &Tuple, right: &Tuple| {
                    left.fact_ref::<Shift>(0).unwrap().id
                        < right.fact_ref::<Shift>(0).unwrap().id
                }),
            ),
        )
        .unwrap();
    builder.scorer(joined, "conflicts", unit_impact()).unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let s1 = shift(1, 1, 5);
    let s2 = shift(2, 1, 5);
    let s3 = shift(3, 2, 5);
    for s in [&s1, &s2, &s3] {
        session.insert(shifts, fact(s)).unwrap();
    }
    session.settle().unwrap();
    assert_eq!(session.match_count("conflicts"), Some(1));

    // Moving s3 onto employee 1 adds two more conflicting pairs.
    s3.employee.set(1);
    session.update(&fact(&s3)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("conflicts"), Some(3));

    session.retract(&fact(&s2)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.match_count("conflicts"), Some(1));
}

#[test]
fn join_feeding_group_cascades_moves() {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    let employees = builder.source();
    let joined = builder
        .join(
            shifts,
            employees,
            JoinSpec::equal(vec![shift_employee_key()], vec![employee_id_key()]),
        )
        .unwrap();
    let per_employee = builder
        .group_by(
            joined,
            vec![Rc::new(|t: &Tuple| -> Rc<dyn KeyPart> {
                Rc::new(t.fact_ref::<Employee>(1).unwrap().id)
            })],
            vec![sum(Rc::new(|t: &Tuple| {
                t.fact_ref::<Shift>(0).unwrap().load.get()
            }))],
        )
        .unwrap();
    builder
        .scorer(
            per_employee,
            "excess",
            Rc::new(|t: &Tuple| (*t.fact_ref::<i64>(1).unwrap() - 10).max(0)),
        )
        .unwrap();
    let mut session = Session::new(builder.build().unwrap());

    let e1 = employee(1, 10);
    let e2 = employee(2, 10);
    let s1 = shift(1, 1, 6);
    let s2 = shift(2, 1, 7);
    session.insert(employees, fact(&e1)).unwrap();
    session.insert(employees, fact(&e2)).unwrap();
    session.insert(shifts, fact(&s1)).unwrap();
    session.insert(shifts, fact(&s2)).unwrap();
    session.settle().unwrap();
    // Employee 1 carries 13 of load, 3 over the threshold.
    assert_eq!(session.score(), 3);

    s2.employee.set(2);
    session.update(&fact(&s2)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 0);
    assert_eq!(session.match_count("excess"), Some(2));

    s2.employee.set(1);
    session.update(&fact(&s2)).unwrap();
    session.settle().unwrap();
    assert_eq!(session.score(), 3);
}
