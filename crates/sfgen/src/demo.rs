//! Small built-in catalogs for trying the engine out.
//!
//! Each catalog is a set of in-process [`Apply`](crate::operation::Apply)
//! adapters over plain Rust types.

use std::thread;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::operation::{ApplyError, Operation};
use crate::types::TypeDesc;
use crate::value::{ObjectRef, Value};

/// Capacity of the demo stack.
pub const STACK_CAPACITY: usize = 3;

pub fn counter_type() -> TypeDesc {
    TypeDesc::reference("Counter")
}

pub fn stack_type() -> TypeDesc {
    TypeDesc::reference("BoundedStack")
}

pub fn spinner_type() -> TypeDesc {
    TypeDesc::reference("Spinner")
}

struct Counter(i64);

struct BoundedStack(Vec<i64>);

struct Spinner;

fn object<'a>(inputs: &'a [Value], i: usize) -> Result<&'a ObjectRef, ApplyError> {
    inputs
        .get(i)
        .and_then(Value::as_object)
        .ok_or_else(|| ApplyError::Adapter(format!("input {i} is not an object")))
}

fn int(inputs: &[Value], i: usize) -> Result<i64, ApplyError> {
    inputs
        .get(i)
        .and_then(Value::as_int)
        .ok_or_else(|| ApplyError::Adapter(format!("input {i} is not an int")))
}

fn wrong_type(ty: &str) -> ApplyError {
    ApplyError::Adapter(format!("receiver is not a {ty}"))
}

// --- Counter ---

fn counter_new(_: &[Value]) -> Result<Value, ApplyError> {
    Ok(Value::object("Counter", Counter(0)))
}

fn counter_increment(inputs: &[Value]) -> Result<Value, ApplyError> {
    object(inputs, 0)?
        .with_mut(|c: &mut Counter| c.0 += 1)
        .ok_or_else(|| wrong_type("Counter"))?;
    Ok(Value::Unit)
}

fn counter_value(inputs: &[Value]) -> Result<Value, ApplyError> {
    let n = object(inputs, 0)?
        .with(|c: &Counter| c.0)
        .ok_or_else(|| wrong_type("Counter"))?;
    Ok(Value::Int(n))
}

fn counter_absorb(inputs: &[Value]) -> Result<Value, ApplyError> {
    if inputs.get(1).is_some_and(Value::is_null) {
        return Err(ApplyError::thrown("illegal_argument", "absorb(null)"));
    }
    let other = object(inputs, 1)?
        .with(|c: &Counter| c.0)
        .ok_or_else(|| wrong_type("Counter"))?;
    object(inputs, 0)?
        .with_mut(|c: &mut Counter| c.0 += other)
        .ok_or_else(|| wrong_type("Counter"))?;
    Ok(Value::Unit)
}

fn counter_ops() -> Vec<Operation> {
    let ty = counter_type();
    vec![
        Operation::constructor(&ty, vec![], counter_new),
        Operation::method(&ty, "increment", vec![], TypeDesc::void(), counter_increment),
        Operation::method(&ty, "value", vec![], TypeDesc::int(), counter_value),
    ]
}

/// `Counter()`, `increment()` and `value()`.
pub fn counter_catalog() -> Result<Catalog, EngineError> {
    Catalog::new(counter_ops())
}

// --- Bounded stack ---

fn stack_new(_: &[Value]) -> Result<Value, ApplyError> {
    Ok(Value::object("BoundedStack", BoundedStack(Vec::new())))
}

fn stack_push(inputs: &[Value]) -> Result<Value, ApplyError> {
    let x = int(inputs, 1)?;
    let pushed = object(inputs, 0)?
        .with_mut(|s: &mut BoundedStack| {
            if s.0.len() >= STACK_CAPACITY {
                false
            } else {
                s.0.push(x);
                true
            }
        })
        .ok_or_else(|| wrong_type("BoundedStack"))?;
    if !pushed {
        return Err(ApplyError::thrown("overflow", format!("stack holds {STACK_CAPACITY} items")));
    }
    Ok(Value::Unit)
}

fn stack_pop(inputs: &[Value]) -> Result<Value, ApplyError> {
    let top = object(inputs, 0)?
        .with_mut(|s: &mut BoundedStack| s.0.pop())
        .ok_or_else(|| wrong_type("BoundedStack"))?;
    top.map(Value::Int)
        .ok_or_else(|| ApplyError::thrown("underflow", "pop on empty stack"))
}

fn stack_size(inputs: &[Value]) -> Result<Value, ApplyError> {
    let n = object(inputs, 0)?
        .with(|s: &BoundedStack| s.0.len())
        .ok_or_else(|| wrong_type("BoundedStack"))?;
    Ok(Value::Int(n as i64))
}

fn stack_ops() -> Vec<Operation> {
    let ty = stack_type();
    vec![
        Operation::constructor(&ty, vec![], stack_new),
        Operation::method(&ty, "push", vec![TypeDesc::int()], TypeDesc::void(), stack_push),
        Operation::method(&ty, "pop", vec![], TypeDesc::int(), stack_pop),
        Operation::method(&ty, "size", vec![], TypeDesc::int(), stack_size),
    ]
}

/// A stack of capacity [`STACK_CAPACITY`] whose overflow throws.
pub fn stack_catalog() -> Result<Catalog, EngineError> {
    Catalog::new(stack_ops())
}

// --- Spinner ---

fn spinner_new(_: &[Value]) -> Result<Value, ApplyError> {
    Ok(Value::object("Spinner", Spinner))
}

fn spinner_spin(_: &[Value]) -> Result<Value, ApplyError> {
    loop {
        thread::sleep(Duration::from_millis(50));
    }
}

/// Counter and stack operations, `Counter.absorb(Counter)`, and a
/// `Spinner.spin()` that never returns. Needs a call timeout.
pub fn mixed_catalog() -> Result<Catalog, EngineError> {
    let counter = counter_type();
    let spinner = spinner_type();
    let mut ops = counter_ops();
    ops.push(Operation::method(
        &counter,
        "absorb",
        vec![counter.clone()],
        TypeDesc::void(),
        counter_absorb,
    ));
    ops.extend(stack_ops());
    ops.push(Operation::constructor(&spinner, vec![], spinner_new));
    ops.push(Operation::method(&spinner, "spin", vec![], TypeDesc::void(), spinner_spin));
    Catalog::new(ops)
}

#[cfg(test)]
mod demo_tests {
    use super::*;

    #[test]
    fn test_stack_overflow_throws() {
        let catalog = stack_catalog().unwrap();
        let new = catalog.get("BoundedStack.new").unwrap();
        let push = catalog.get("BoundedStack.push").unwrap();
        let stack = new.invoke(&[]).unwrap();
        for i in 0..STACK_CAPACITY as i64 {
            push.invoke(&[stack.clone(), Value::Int(i)]).unwrap();
        }
        match push.invoke(&[stack, Value::Int(9)]) {
            Err(ApplyError::Thrown(t)) => assert_eq!(t.kind, "overflow"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let catalog = mixed_catalog().unwrap();
        assert_eq!(catalog.len(), 10);
        assert!(catalog.get("Spinner.spin").is_some());
    }
}
