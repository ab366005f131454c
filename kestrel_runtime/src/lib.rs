//! Object model for the Kestrel interpreter.
//!
//! This crate provides:
//! - Runtime values (`Value`)
//! - Interned shapes and typed storage locations
//! - Classes with single inheritance and invalidation assumptions
//! - Instances and module namespaces
//! - The closed `Receiver` variant consumed by attribute-read caches

pub mod object;
pub mod value;

// Re-export commonly used items
pub use object::Receiver;
pub use object::assumption::Assumption;
pub use object::class::{ClassId, HierarchyError, OwnLookup, PyClass};
pub use object::instance::PyInstance;
pub use object::module::PyModule;
pub use object::shape::{PropertyDescriptor, Shape, ShapeId, ShapeRegistry};
pub use object::storage::{AttributeStore, StorageLocation, StoreOutcome};
pub use value::Value;
