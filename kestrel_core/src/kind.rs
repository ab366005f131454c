//! Slot classification for attribute storage.

use std::fmt;

/// The representation a storage slot is typed for.
///
/// `Int`, `Float` and `Bool` are fixed-width 64-bit unboxed slots. Anything
/// else lives in a `Boxed` slot. A slot only ever widens from a primitive
/// kind to `Boxed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Unboxed 64-bit signed integer.
    Int,
    /// Unboxed 64-bit float.
    Float,
    /// Unboxed boolean.
    Bool,
    /// Generic boxed value.
    Boxed,
}

impl ValueKind {
    /// Check if this is one of the unboxed kinds.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, ValueKind::Boxed)
    }

    /// Check if a slot of this kind can hold a value of kind `incoming`
    /// without changing representation.
    #[inline]
    pub fn accepts(self, incoming: ValueKind) -> bool {
        self == ValueKind::Boxed || self == incoming
    }

    /// Human-readable kind name.
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Boxed => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
