use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::{PrimitiveKind, TypeDesc};

/// Values produced and consumed while executing a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of a void operation
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Opaque instance owned by an adapter
    Object(ObjectRef),
}

impl Value {
    pub fn object<T: Any + Send>(type_name: impl Into<String>, inner: T) -> Self {
        Value::Object(ObjectRef::new(type_name, inner))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The primitive literal this value denotes, if any.
    pub fn to_literal(&self) -> Option<Literal> {
        match self {
            Value::Bool(b) => Some(Literal::Bool(*b)),
            Value::Int(n) => Some(Literal::Int(*n)),
            Value::Float(x) => Some(Literal::Float(*x)),
            Value::Str(s) => Some(Literal::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "{}@{:x}", obj.type_name, obj.addr()),
        }
    }
}

/// Shared handle to an adapter-owned object.
///
/// Statements that reuse a variable see the same instance, so mutations made
/// by one call are visible to the next.
#[derive(Clone)]
pub struct ObjectRef {
    type_name: String,
    handle: Arc<Mutex<Box<dyn Any + Send>>>,
}

impl ObjectRef {
    pub fn new<T: Any + Send>(type_name: impl Into<String>, inner: T) -> Self {
        ObjectRef {
            type_name: type_name.into(),
            handle: Arc::new(Mutex::new(Box::new(inner))),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Run `f` on the inner object if it has type `T`.
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.handle.lock();
        guard.downcast_ref::<T>().map(f)
    }

    /// Run `f` on the inner object mutably if it has type `T`.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.handle.lock();
        guard.downcast_mut::<T>().map(f)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.handle) as *const () as usize
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}@{:x})", self.type_name, self.addr())
    }
}

/// A primitive constant that a statement can produce without any call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Total-order identity of a literal; floats compare by bit pattern with
/// a single NaN.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LiteralKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

impl Literal {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Literal::Bool(_) => PrimitiveKind::Bool,
            Literal::Int(_) => PrimitiveKind::Int,
            Literal::Float(_) => PrimitiveKind::Float,
            Literal::Str(_) => PrimitiveKind::Str,
        }
    }

    pub fn type_desc(&self) -> TypeDesc {
        TypeDesc::primitive(self.kind())
    }

    pub fn to_value(&self) -> Value {
        match self {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::Str(s.clone()),
        }
    }

    /// Same literal with NaN replaced by the canonical NaN.
    pub fn canonical(self) -> Self {
        match self {
            Literal::Float(x) if x.is_nan() => Literal::Float(f64::NAN),
            other => other,
        }
    }

    pub fn key(&self) -> LiteralKey {
        match self {
            Literal::Bool(b) => LiteralKey::Bool(*b),
            Literal::Int(n) => LiteralKey::Int(*n),
            Literal::Float(x) if x.is_nan() => LiteralKey::Float(f64::NAN.to_bits()),
            Literal::Float(x) => LiteralKey::Float(x.to_bits()),
            Literal::Str(s) => LiteralKey::Str(s.clone()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => write!(f, "{s:?}"),
        }
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn test_object_handles_share_state() {
        let v = Value::object("Counter", 0i64);
        let alias = v.clone();
        alias.as_object().unwrap().with_mut(|n: &mut i64| *n += 5);
        assert_eq!(v.as_object().unwrap().with(|n: &i64| *n), Some(5));
        assert_eq!(v, alias);
        assert_ne!(v, Value::object("Counter", 5i64));
    }

    #[test]
    fn test_wrong_downcast_is_none() {
        let v = Value::object("Counter", 0i64);
        assert_eq!(v.as_object().unwrap().with(|s: &String| s.len()), None);
    }

    #[test]
    fn test_literal_rendering_and_nan_key() {
        assert_eq!(Literal::Float(1.0).to_string(), "1.0");
        assert_eq!(Literal::Str("hi!".into()).to_string(), "\"hi!\"");
        let a = Literal::Float(f64::NAN);
        let b = Literal::Float(-f64::NAN);
        assert_eq!(a.key(), b.key());
    }
}
