//! Object model backing attribute storage.
//!
//! Every object that can hold attributes (instances, classes, modules) keeps
//! them in an `AttributeStore` laid out by an interned `Shape`. Classes add a
//! superclass link and an `Assumption` that is renewed whenever their own
//! layout or superclass changes.

pub mod assumption;
pub mod class;
pub mod instance;
pub mod module;
pub mod shape;
pub mod storage;

use crate::object::class::PyClass;
use crate::object::instance::PyInstance;
use crate::object::module::PyModule;
use crate::object::shape::Shape;
use crate::object::storage::StorageLocation;
use crate::value::Value;
use kestrel_core::InternedString;
use std::sync::Arc;

// =============================================================================
// Receiver
// =============================================================================

/// A value that has attribute storage.
///
/// This is the closed set of receivers an attribute read can be specialized
/// for. Everything else (`int`, `str`, `None`, ...) has no attributes here.
#[derive(Debug, Clone, Copy)]
pub enum Receiver<'a> {
    /// Instance of a user class.
    Instance(&'a Arc<PyInstance>),
    /// A class object.
    Class(&'a Arc<PyClass>),
    /// A module namespace.
    Module(&'a Arc<PyModule>),
}

impl<'a> Receiver<'a> {
    /// View `value` as a receiver, if it has attribute storage.
    #[inline]
    pub fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::Instance(instance) => Some(Receiver::Instance(instance)),
            Value::Class(class) => Some(Receiver::Class(class)),
            Value::Module(module) => Some(Receiver::Module(module)),
            _ => None,
        }
    }

    /// Receiver description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Receiver::Instance(instance) => instance.class().name().to_string(),
            Receiver::Class(_) => "type".to_string(),
            Receiver::Module(_) => "module".to_string(),
        }
    }

    /// Get the receiver's current layout.
    #[inline]
    pub fn current_shape(&self) -> Arc<Shape> {
        match self {
            Receiver::Instance(instance) => instance.shape(),
            Receiver::Class(class) => class.shape(),
            Receiver::Module(module) => module.shape(),
        }
    }

    /// Check if the receiver itself stores `name`.
    pub fn is_own_attribute(&self, name: &InternedString) -> bool {
        match self {
            Receiver::Instance(instance) => instance.is_own_attribute(name),
            Receiver::Class(class) => class.is_own_attribute(name),
            Receiver::Module(module) => module.is_own_attribute(name),
        }
    }

    /// Read through a location captured for `shape`.
    ///
    /// Returns `None` if the receiver is no longer laid out by `shape`.
    #[inline]
    pub fn fetch_if_shape(&self, shape: &Arc<Shape>, location: StorageLocation) -> Option<Value> {
        match self {
            Receiver::Instance(instance) => instance.fetch_if_shape(shape, location),
            Receiver::Class(class) => class.fetch_if_shape(shape, location),
            Receiver::Module(module) => module.fetch_if_shape(shape, location),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
