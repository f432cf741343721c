use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::types::TypeDesc;
use crate::value::{Literal, Value};

/// A failure raised by the code under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    /// Failure category, matched by the behavior classifier.
    pub kind: String,
    pub message: String,
}

impl Thrown {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Thrown {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    /// The code under test failed; execution continues.
    #[error("thrown {0}")]
    Thrown(Thrown),
    /// The adapter itself broke; the session stops.
    #[error("adapter: {0}")]
    Adapter(String),
}

impl ApplyError {
    pub fn thrown(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ApplyError::Thrown(Thrown::new(kind, message))
    }
}

/// Invokes the code behind an operation.
pub trait Apply: Send + Sync {
    fn apply(&self, inputs: &[Value]) -> Result<Value, ApplyError>;
}

impl<F> Apply for F
where
    F: Fn(&[Value]) -> Result<Value, ApplyError> + Send + Sync,
{
    fn apply(&self, inputs: &[Value]) -> Result<Value, ApplyError> {
        self(inputs)
    }
}

/// How a call statement is written when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    /// `T vN = T(args);`
    Constructor,
    /// `vR.name(args);` with input 0 as the receiver.
    Method,
    /// `name(args);`
    Function,
}

#[derive(Clone)]
pub enum OpKind {
    Call { style: CallStyle, apply: Arc<dyn Apply> },
    Literal(Literal),
    Null,
}

/// An invocable unit of the catalog.
#[derive(Clone)]
pub struct Operation {
    /// Catalog-unique identifier, e.g. `Counter.increment`.
    id: String,
    /// Name used when rendering a call.
    name: String,
    inputs: Vec<TypeDesc>,
    output: TypeDesc,
    kind: OpKind,
}

pub type OpRef = Arc<Operation>;

impl Operation {
    pub fn constructor(ty: &TypeDesc, params: Vec<TypeDesc>, apply: impl Apply + 'static) -> Self {
        Operation {
            id: format!("{}.new", ty.name),
            name: ty.name.clone(),
            inputs: params,
            output: ty.clone(),
            kind: OpKind::Call {
                style: CallStyle::Constructor,
                apply: Arc::new(apply),
            },
        }
    }

    /// An instance operation; the receiver type becomes input 0.
    pub fn method(
        receiver: &TypeDesc,
        name: &str,
        params: Vec<TypeDesc>,
        output: TypeDesc,
        apply: impl Apply + 'static,
    ) -> Self {
        let mut inputs = Vec::with_capacity(params.len() + 1);
        inputs.push(receiver.clone());
        inputs.extend(params);
        Operation {
            id: format!("{}.{}", receiver.name, name),
            name: name.to_string(),
            inputs,
            output,
            kind: OpKind::Call {
                style: CallStyle::Method,
                apply: Arc::new(apply),
            },
        }
    }

    pub fn function(name: &str, inputs: Vec<TypeDesc>, output: TypeDesc, apply: impl Apply + 'static) -> Self {
        Operation {
            id: name.to_string(),
            name: name.to_string(),
            inputs,
            output,
            kind: OpKind::Call {
                style: CallStyle::Function,
                apply: Arc::new(apply),
            },
        }
    }

    pub fn literal(value: Literal) -> Self {
        let output = value.type_desc();
        Operation {
            id: format!("literal:{}:{}", output.name, value),
            name: value.to_string(),
            inputs: Vec::new(),
            output,
            kind: OpKind::Literal(value),
        }
    }

    pub fn null(ty: &TypeDesc) -> Self {
        Operation {
            id: format!("null:{}", ty.name),
            name: "null".into(),
            inputs: Vec::new(),
            output: ty.clone(),
            kind: OpKind::Null,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[TypeDesc] {
        &self.inputs
    }

    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    pub fn output(&self) -> &TypeDesc {
        &self.output
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn style(&self) -> Option<CallStyle> {
        match &self.kind {
            OpKind::Call { style, .. } => Some(*style),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, OpKind::Call { .. })
    }

    pub fn has_receiver(&self) -> bool {
        self.style() == Some(CallStyle::Method)
    }

    /// Whether input `i` is the receiver of an instance operation.
    pub fn is_receiver(&self, i: usize) -> bool {
        i == 0 && self.has_receiver()
    }

    /// One line identifying the operation's shape, stable across runs.
    pub fn signature(&self) -> String {
        let inputs: Vec<&str> = self.inputs.iter().map(|t| t.name.as_str()).collect();
        format!("{}({}) -> {}", self.id, inputs.join(", "), self.output.name)
    }

    /// Run the operation on already-evaluated inputs.
    ///
    /// Literal and null operations evaluate directly. A null receiver is
    /// reported as a `null_receiver` failure without reaching the adapter.
    pub fn invoke(&self, inputs: &[Value]) -> Result<Value, ApplyError> {
        match &self.kind {
            OpKind::Literal(lit) => Ok(lit.to_value()),
            OpKind::Null => Ok(Value::Null),
            OpKind::Call { style, apply } => {
                if *style == CallStyle::Method && inputs.first().is_some_and(Value::is_null) {
                    return Err(ApplyError::thrown(
                        NULL_RECEIVER,
                        format!("{} called on null", self.id),
                    ));
                }
                apply.apply(inputs)
            }
        }
    }
}

/// Failure kind reported for a call on a null receiver.
pub const NULL_RECEIVER: &str = "null_receiver";

/// Failure kind reported when an application panics.
pub const PANIC: &str = "panic";

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({})", self.signature())
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.inputs == other.inputs && self.output == other.output
    }
}

impl Eq for Operation {}
