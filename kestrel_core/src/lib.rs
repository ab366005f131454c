//! Core primitives shared by every Kestrel crate.
//!
//! This crate provides:
//! - Interned attribute names (`InternedString`) with pointer-identity equality
//! - The slot classification used by shapes (`ValueKind`)
//! - The error taxonomy of the attribute-read path (`AttributeError`, `IcError`)

pub mod error;
pub mod intern;
pub mod kind;

pub use error::{AttributeError, IcError, IcResult};
pub use intern::{InternedString, intern};
pub use kind::ValueKind;
