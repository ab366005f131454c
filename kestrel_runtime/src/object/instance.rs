//! Instances of user classes.
//!
//! An instance owns its attributes directly in an `AttributeStore` and points
//! at its class. Its Shape is the instance's layout: any change to the set of
//! attributes or to a slot's kind moves the instance to a different Shape.

use crate::object::class::PyClass;
use crate::object::shape::{Shape, ShapeRegistry};
use crate::object::storage::{AttributeStore, StorageLocation, StoreOutcome};
use crate::value::Value;
use kestrel_core::InternedString;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// An instance of a `PyClass`.
pub struct PyInstance {
    class: Arc<PyClass>,
    attrs: RwLock<AttributeStore>,
}

impl PyInstance {
    /// Create an instance with no attributes.
    pub fn new(class: Arc<PyClass>, registry: &ShapeRegistry) -> Arc<Self> {
        Arc::new(Self {
            class,
            attrs: RwLock::new(AttributeStore::new(registry.empty_shape())),
        })
    }

    /// Get the class of this instance.
    #[inline]
    pub fn class(&self) -> &Arc<PyClass> {
        &self.class
    }

    /// Get the current layout.
    pub fn shape(&self) -> Arc<Shape> {
        Arc::clone(self.attrs.read().shape())
    }

    /// Set an attribute on the instance.
    pub fn set_attr(
        &self,
        name: InternedString,
        value: Value,
        registry: &ShapeRegistry,
    ) -> StoreOutcome {
        self.attrs.write().set(name, value, registry)
    }

    /// Get an attribute stored on the instance itself.
    pub fn get_own_attr(&self, name: &InternedString) -> Option<Value> {
        self.attrs.read().get(name)
    }

    /// Check if the instance itself stores `name`.
    pub fn is_own_attribute(&self, name: &InternedString) -> bool {
        self.attrs.read().contains(name)
    }

    /// Look up `name` and return it with the layout it was found under.
    pub fn lookup_own(
        &self,
        name: &InternedString,
    ) -> (Arc<Shape>, Option<(StorageLocation, Value)>) {
        let attrs = self.attrs.read();
        let found = attrs
            .location(name)
            .and_then(|location| attrs.fetch(location).map(|value| (location, value)));
        (Arc::clone(attrs.shape()), found)
    }

    /// Read through a location captured for `shape`.
    #[inline]
    pub fn fetch_if_shape(&self, shape: &Arc<Shape>, location: StorageLocation) -> Option<Value> {
        self.attrs.read().fetch_if_shape(shape, location)
    }

    /// Snapshot of the instance's attributes in definition order.
    pub fn attributes(&self) -> Vec<(InternedString, Value)> {
        self.attrs.read().iter().collect()
    }
}

impl fmt::Debug for PyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyInstance")
            .field("class", self.class.name())
            .field("shape", &self.attrs.read().shape().id())
            .finish()
    }
}
