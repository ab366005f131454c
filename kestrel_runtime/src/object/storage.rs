//! Typed attribute storage.
//!
//! An `AttributeStore` pairs an object's current Shape with the slots that
//! back it. Primitive attributes (`int`, `float`, `bool`) live unboxed in a
//! `u64` slot vector; everything else lives in a boxed `Value` vector. A
//! `StorageLocation` names one slot in one of the two vectors and is only
//! meaningful together with the Shape that produced it.
//!
//! ```text
//! AttributeStore
//! ├── shape: Arc<Shape>
//! ├── primitives: [u64; N]   <- Int / Float / Bool locations
//! └── boxed:      [Value; M] <- Boxed locations
//! ```

use crate::object::shape::{Shape, ShapeRegistry};
use crate::value::Value;
use kestrel_core::{InternedString, ValueKind};
use smallvec::SmallVec;
use std::sync::Arc;

/// Slots kept inline before spilling to the heap.
pub const INLINE_SLOTS: usize = 4;

// =============================================================================
// Storage Location
// =============================================================================

/// A typed slot descriptor inside a Shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    kind: ValueKind,
    index: u32,
}

impl StorageLocation {
    /// Create a location of the given kind at `index` within its slot vector.
    #[inline]
    pub const fn new(kind: ValueKind, index: u32) -> Self {
        Self { kind, index }
    }

    /// Kind the slot is typed for.
    #[inline]
    pub const fn kind(self) -> ValueKind {
        self.kind
    }

    /// Index within the primitive or boxed slot vector.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Check if the slot is unboxed.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.kind.is_primitive()
    }
}

// =============================================================================
// Store Outcome
// =============================================================================

/// What a write did to the layout of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The value was written into an existing slot; the Shape is unchanged.
    InPlace,
    /// A new attribute was added; the store moved to a successor Shape.
    Added,
    /// An existing primitive slot was widened to boxed; the store moved to a
    /// successor Shape.
    Widened,
}

impl StoreOutcome {
    /// Check if the write transitioned the store to a different Shape.
    #[inline]
    pub fn changed_shape(self) -> bool {
        !matches!(self, StoreOutcome::InPlace)
    }
}

// =============================================================================
// Attribute Store
// =============================================================================

/// Shape plus the slots that back it.
#[derive(Debug, Clone)]
pub struct AttributeStore {
    shape: Arc<Shape>,
    primitives: SmallVec<[u64; INLINE_SLOTS]>,
    boxed: SmallVec<[Value; INLINE_SLOTS]>,
}

impl AttributeStore {
    /// Create an empty store laid out by `empty_shape`.
    pub fn new(empty_shape: Arc<Shape>) -> Self {
        debug_assert!(empty_shape.is_empty());
        Self {
            shape: empty_shape,
            primitives: SmallVec::new(),
            boxed: SmallVec::new(),
        }
    }

    /// Current shape.
    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Check if `name` is stored here.
    #[inline]
    pub fn contains(&self, name: &InternedString) -> bool {
        self.shape.contains(name)
    }

    /// Location of `name` in the current shape.
    #[inline]
    pub fn location(&self, name: &InternedString) -> Option<StorageLocation> {
        self.shape.find_storage_location(name)
    }

    /// Read the value at `location`.
    ///
    /// `location` must come from the current shape; `None` means it did not.
    #[inline]
    pub fn fetch(&self, location: StorageLocation) -> Option<Value> {
        let index = location.index() as usize;
        match location.kind() {
            ValueKind::Boxed => self.boxed.get(index).cloned(),
            kind => self
                .primitives
                .get(index)
                .map(|&bits| Value::from_bits(kind, bits)),
        }
    }

    /// Read the value at `location` if this store is laid out by `shape`.
    #[inline]
    pub fn fetch_if_shape(&self, shape: &Arc<Shape>, location: StorageLocation) -> Option<Value> {
        if Arc::ptr_eq(&self.shape, shape) {
            self.fetch(location)
        } else {
            None
        }
    }

    /// Read an attribute by name.
    pub fn get(&self, name: &InternedString) -> Option<Value> {
        self.location(name).and_then(|location| self.fetch(location))
    }

    /// Write an attribute, transitioning the shape when needed.
    pub fn set(
        &mut self,
        name: InternedString,
        value: Value,
        registry: &ShapeRegistry,
    ) -> StoreOutcome {
        let kind = value.kind();
        match self.location(&name) {
            Some(location) if location.kind().accepts(kind) => {
                self.place(location, value);
                StoreOutcome::InPlace
            }
            Some(_) => {
                let widened = registry.widen(&self.shape, &name);
                self.migrate(widened);
                if let Some(location) = self.location(&name) {
                    self.place(location, value);
                }
                StoreOutcome::Widened
            }
            None => {
                let next = registry.with_attribute(&self.shape, name, kind);
                let location = next
                    .property()
                    .map(|prop| prop.location)
                    .unwrap_or(StorageLocation::new(kind, 0));
                self.shape = next;
                self.place(location, value);
                StoreOutcome::Added
            }
        }
    }

    /// Number of attributes stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.shape.property_count() as usize
    }

    /// Check if no attributes are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(name, value)` pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (InternedString, Value)> + '_ {
        self.shape
            .all_descriptors()
            .into_iter()
            .filter_map(|desc| self.fetch(desc.location).map(|value| (desc.name, value)))
    }

    /// Write `value` at `location`, growing the slot vector for a fresh slot.
    fn place(&mut self, location: StorageLocation, value: Value) {
        let index = location.index() as usize;
        match location.kind() {
            ValueKind::Boxed => {
                if index < self.boxed.len() {
                    self.boxed[index] = value;
                } else {
                    debug_assert_eq!(index, self.boxed.len());
                    self.boxed.push(value);
                }
            }
            _ => {
                let bits = value.to_bits();
                if index < self.primitives.len() {
                    self.primitives[index] = bits;
                } else {
                    debug_assert_eq!(index, self.primitives.len());
                    self.primitives.push(bits);
                }
            }
        }
    }

    /// Re-lay the current values out according to `target`.
    fn migrate(&mut self, target: Arc<Shape>) {
        let values: Vec<(StorageLocation, Value)> = target
            .all_descriptors()
            .into_iter()
            .filter_map(|desc| self.get(&desc.name).map(|value| (desc.location, value)))
            .collect();

        self.primitives.clear();
        self.boxed.clear();
        self.shape = target;
        // Descriptors hand out indices in definition order, so pushing in the
        // same order reproduces the target layout.
        for (location, value) in values {
            self.place(location, value);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
