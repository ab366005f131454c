//! Runtime values.
//!
//! `Value` is the closed set of things an attribute can hold and an attribute
//! read can be performed on. Heap variants are reference-counted handles, so
//! cloning a `Value` never copies an object.

use crate::object::class::PyClass;
use crate::object::instance::PyInstance;
use crate::object::module::PyModule;
use kestrel_core::ValueKind;
use std::fmt;
use std::sync::Arc;

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The `None` singleton.
    #[default]
    None,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Instance of a user class.
    Instance(Arc<PyInstance>),
    /// A class object.
    Class(Arc<PyClass>),
    /// A module namespace.
    Module(Arc<PyModule>),
}

impl Value {
    /// Create a string value.
    pub fn str(text: &str) -> Self {
        Value::Str(Arc::from(text))
    }

    /// Slot kind this value is stored in.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            _ => ValueKind::Boxed,
        }
    }

    /// Type name, as used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Instance(instance) => instance.class().name().to_string(),
            Value::Class(_) => "type".to_string(),
            Value::Module(_) => "module".to_string(),
        }
    }

    /// Get as integer.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Get as float.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Get as bool.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Raw slot bits of a primitive value. Boxed values encode as zero.
    #[inline]
    pub(crate) fn to_bits(&self) -> u64 {
        match self {
            Value::Int(value) => *value as u64,
            Value::Float(value) => value.to_bits(),
            Value::Bool(value) => u64::from(*value),
            _ => 0,
        }
    }

    /// Decode raw slot bits of the given primitive kind.
    #[inline]
    pub(crate) fn from_bits(kind: ValueKind, bits: u64) -> Self {
        match kind {
            ValueKind::Int => Value::Int(bits as i64),
            ValueKind::Float => Value::Float(f64::from_bits(bits)),
            ValueKind::Bool => Value::Bool(bits != 0),
            ValueKind::Boxed => Value::None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<Arc<PyInstance>> for Value {
    fn from(value: Arc<PyInstance>) -> Self {
        Value::Instance(value)
    }
}

impl From<Arc<PyClass>> for Value {
    fn from(value: Arc<PyClass>) -> Self {
        Value::Class(value)
    }
}

impl From<Arc<PyModule>> for Value {
    fn from(value: Arc<PyModule>) -> Self {
        Value::Module(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Str(text) => write!(f, "'{}'", text),
            Value::Instance(instance) => write!(f, "<{} object>", instance.class().name()),
            Value::Class(class) => write!(f, "<class '{}'>", class.name()),
            Value::Module(module) => write!(f, "<module '{}'>", module.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Value::Int(1).kind(), ValueKind::Int);
        assert_eq!(Value::Float(1.0).kind(), ValueKind::Float);
        assert_eq!(Value::Bool(true).kind(), ValueKind::Bool);
        assert_eq!(Value::None.kind(), ValueKind::Boxed);
        assert_eq!(Value::str("s").kind(), ValueKind::Boxed);
    }

    #[test]
    fn test_bits_preserve_primitives() {
        for value in [Value::Int(-42), Value::Int(i64::MAX), Value::Float(-0.25), Value::Bool(true)] {
            let decoded = Value::from_bits(value.kind(), value.to_bits());
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_equality_is_kind_strict() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Bool(true));
        assert_eq!(Value::str("a"), Value::str("a"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(false).to_string(), "False");
        assert_eq!(Value::Int(5).to_string(), "5");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::str("hi").to_string(), "'hi'");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::None.type_name(), "NoneType");
        assert_eq!(Value::Int(0).type_name(), "int");
        assert_eq!(Value::str("").type_name(), "str");
    }
}
