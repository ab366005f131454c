//! Errors surfaced by the attribute-read path.

use crate::intern::InternedString;
use crate::kind::ValueKind;
use thiserror::Error;

/// An attribute was not found on the receiver, its class, or any ancestor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{receiver}' object has no attribute '{name}'")]
pub struct AttributeError {
    /// The attribute that was looked up.
    pub name: InternedString,
    /// Type name of the receiver.
    pub receiver: String,
}

impl AttributeError {
    /// Create a new attribute error.
    pub fn new(name: InternedString, receiver: impl Into<String>) -> Self {
        Self {
            name,
            receiver: receiver.into(),
        }
    }
}

/// Errors returned by inline-cache reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IcError {
    /// Name not found anywhere in the lookup chain.
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// A typed read found a value of another kind.
    #[error("expected {expected} attribute value, found {found}")]
    UnexpectedResult {
        /// The kind the caller asked for.
        expected: ValueKind,
        /// Rendering of the value actually stored.
        found: String,
    },

    /// A cache node was reached in a state its construction should have ruled out.
    #[error("invalid inline cache state: {0}")]
    InvalidState(String),
}

impl IcError {
    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        IcError::InvalidState(message.into())
    }

    /// Check if this is an `AttributeError`.
    #[inline]
    pub fn is_attribute_error(&self) -> bool {
        matches!(self, IcError::Attribute(_))
    }
}

/// Result alias for inline-cache reads.
pub type IcResult<T> = Result<T, IcError>;
