use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;

/// Id of the generic "changed" notification sent by `queue_changed`
pub const CHANGED: &str = "changed";

/// A single message argument.
#[derive(Clone)]
pub enum Variant {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// An opaque shared value; compared by identity
    Object(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Bool(v) => write!(f, "{v}"),
            Variant::Int(v) => write!(f, "{v}"),
            Variant::Float(v) => write!(f, "{v}"),
            Variant::String(v) => write!(f, "{v:?}"),
            Variant::Object(v) => write!(f, "<object {:p}>", Arc::as_ptr(v)),
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a == b,
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self { Variant::Bool(value) }
}
impl From<i64> for Variant {
    fn from(value: i64) -> Self { Variant::Int(value) }
}
impl From<i32> for Variant {
    fn from(value: i32) -> Self { Variant::Int(value.into()) }
}
impl From<f64> for Variant {
    fn from(value: f64) -> Self { Variant::Float(value) }
}
impl From<&str> for Variant {
    fn from(value: &str) -> Self { Variant::String(value.to_string()) }
}
impl From<String> for Variant {
    fn from(value: String) -> Self { Variant::String(value) }
}

/// An opaque (identifier, argument list) value.
///
/// Only the identifier takes part in coalescing: two queued messages with the same id
/// addressed to the same target are the same message, whatever their arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: Cow<'static, str>,
    args: Vec<Variant>,
}

impl Message {
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self { Self { id: id.into(), args: Vec::new() } }

    /// The fixed payload delivered by `queue_changed`
    pub fn changed() -> Self { Self::new(CHANGED) }

    pub fn with_arg(mut self, arg: impl Into<Variant>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn id(&self) -> &str { &self.id }

    pub fn args(&self) -> &[Variant] { &self.args }

    pub fn arg(&self, index: usize) -> Option<&Variant> { self.args.get(index) }

    pub fn is_changed(&self) -> bool { self.id == CHANGED }

    /// Coalescing identity: same id
    pub fn same_identity(&self, other: &Message) -> bool { self.id == other.id }
}
