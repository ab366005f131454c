//! Module namespaces.
//!
//! A module is a flat attribute namespace with no inheritance. Reads on a
//! module only ever see the module's own attributes.

use crate::object::shape::{Shape, ShapeRegistry};
use crate::object::storage::{AttributeStore, StorageLocation, StoreOutcome};
use crate::value::Value;
use kestrel_core::InternedString;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A module object.
pub struct PyModule {
    name: InternedString,
    attrs: RwLock<AttributeStore>,
}

impl PyModule {
    /// Create an empty module.
    pub fn new(name: InternedString, registry: &ShapeRegistry) -> Arc<Self> {
        Arc::new(Self {
            name,
            attrs: RwLock::new(AttributeStore::new(registry.empty_shape())),
        })
    }

    /// Get the module name.
    #[inline]
    pub fn name(&self) -> &InternedString {
        &self.name
    }

    /// Get the current layout.
    pub fn shape(&self) -> Arc<Shape> {
        Arc::clone(self.attrs.read().shape())
    }

    /// Bind a module-level name.
    pub fn set_attr(
        &self,
        name: InternedString,
        value: Value,
        registry: &ShapeRegistry,
    ) -> StoreOutcome {
        self.attrs.write().set(name, value, registry)
    }

    /// Get a module-level name.
    pub fn get_attr(&self, name: &InternedString) -> Option<Value> {
        self.attrs.read().get(name)
    }

    /// Check if the module binds `name`.
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
}

impl fmt::Debug for PyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyModule")
            .field("name", &self.name)
            .field("len", &self.attrs.read().len())
            .finish()
    }
}
