//! Shared fixtures: a small employee-rostering fact model.

use std::cell::Cell;
use std::rc::Rc;

use scorenet_core::{Fact, KeyPart};

use crate::builder::{JoinSpec, NetworkBuilder};
use crate::node::{ImpactFn, JoinFilter, KeyExtractor, NodeId};
use crate::session::Session;
use crate::tuple::Tuple;

/// A shift assigned to an employee. Moves mutate the cells in place and
/// notify the session via `update`.
#[derive(Debug)]
pub struct Shift {
    pub id: u32,
    pub employee: Cell<u32>,
    pub load: Cell<i64>,
}

pub fn shift(id: u32, employee: u32, load: i64) -> Rc<Shift> {
    Rc::new(Shift {
        id,
        employee: Cell::new(employee),
        load: Cell::new(load),
    })
}

#[derive(Debug)]
pub struct Employee {
    pub id: u32,
    pub capacity: Cell<i64>,
}

pub fn employee(id: u32, capacity: i64) -> Rc<Employee> {
    Rc::new(Employee {
        id,
        capacity: Cell::new(capacity),
    })
}

/// Coerces a typed fact to the trait object the session works with. The
/// allocation is shared, so identity is preserved.
pub fn fact<T: Fact>(rc: &Rc<T>) -> Rc<dyn Fact> {
    rc.clone()
}

pub fn shift_employee_key() -> KeyExtractor {
    Rc::new(|t: &Tuple| -> Rc<dyn KeyPart> {
        Rc::new(t.fact_ref::<Shift>(0).unwrap().employee.get())
    })
}

pub fn employee_id_key() -> KeyExtractor {
    Rc::new(|t: &Tuple| -> Rc<dyn KeyPart> { Rc::new(t.fact_ref::<Employee>(0).unwrap().id) })
}

pub fn unit_impact() -> ImpactFn {
    Rc::new(|_| 1)
}

pub fn shift_load_impact() -> ImpactFn {
    Rc::new(|t: &Tuple| t.fact_ref::<Shift>(0).unwrap().load.get())
}

/// Impact of a joined (shift, employee) pair: how far the shift's load
/// exceeds the employee's capacity.
pub fn overload_impact() -> ImpactFn {
    Rc::new(|t: &Tuple| {
        let s = t.fact_ref::<Shift>(0).unwrap();
        let e = t.fact_ref::<Employee>(1).unwrap();
        s.load.get() - e.capacity.get()
    })
}

pub fn overload_filter() -> JoinFilter {
    Rc::new(|left: &Tuple, right: &Tuple| {
        left.fact_ref::<Shift>(0).unwrap().load.get()
            > right.fact_ref::<Employee>(0).unwrap().capacity.get()
    })
}

/// Shifts joined with employees on employee id, filtered to overloaded
/// pairs, scored
/// by the excess load. Used both indexed and as a nested-loop cross-check.
pub fn overload_session(indexed: bool) -> (Session, NodeId, NodeId) {
    let mut builder = NetworkBuilder::new();
    let shifts = builder.source();
    let employees = builder.source();
    let mut spec = JoinSpec::equal(vec![shift_employee_key()], vec![employee_id_key()])
        .filtered(overload_filter());
    if !indexed {
        spec = spec.unindexed();
    }
    let joined = builder.join(shifts, employees, spec).unwrap();
    builder.scorer(joined, "overload", overload_impact()).unwrap();
    (Session::new(builder.build().unwrap()), shifts, employees)
}
