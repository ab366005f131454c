//! Shape system for attribute storage.
//!
//! A Shape (object layout) maps attribute names to typed storage locations.
//!
//! # Architecture
//!
//! Objects with the same sequence of attribute additions share a Shape. Shapes
//! are immutable once published and form a transition tree keyed by the added
//! name *and* the slot kind chosen for it:
//!
//! ```text
//!        EmptyShape
//!            |
//!      +-----+------+
//!      |            |
//!   ("x",Int)   ("x",Boxed)
//!      |            |
//!   Shape1       Shape2
//!      |
//!  ("y",Float)
//!      |
//!   Shape3 (x: int slot 0, y: float slot 1)
//! ```
//!
//! Because transitions are interned, shape equality is `Arc::ptr_eq`, never a
//! structural comparison.
//!
//! ## Widening
//!
//! A primitive slot that receives a value of another kind is widened to a boxed
//! slot. Widening replays the property list from the empty shape with that one
//! kind replaced, so two objects that widen the same attribute converge on the
//! same Shape again.

use crate::object::storage::StorageLocation;
use kestrel_core::{InternedString, ValueKind};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// =============================================================================
// Property Descriptor
// =============================================================================

/// Describes a single attribute in a Shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Attribute name (interned for fast comparison).
    pub name: InternedString,
    /// Where the attribute's value lives.
    pub location: StorageLocation,
}

impl PropertyDescriptor {
    /// Create a new descriptor.
    #[inline]
    pub fn new(name: InternedString, location: StorageLocation) -> Self {
        Self { name, location }
    }
}

// =============================================================================
// Shape ID
// =============================================================================

/// Unique identifier for a Shape.
///
/// Used for diagnostics and logging; identity checks use the `Arc` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ShapeId(pub u32);

impl ShapeId {
    /// The empty shape ID (no properties).
    pub const EMPTY: Self = Self(0);

    /// Check if this is the empty shape.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// =============================================================================
// Shape
// =============================================================================

/// Transition key: the added name plus the slot kind chosen for it.
type TransitionKey = (InternedString, ValueKind);

/// A Shape describes the attribute layout of objects.
///
/// Shapes are immutable once created. A `StorageLocation` found in a Shape is
/// valid for exactly the objects currently pointing at that Shape.
#[derive(Debug)]
pub struct Shape {
    /// Unique identifier for this shape.
    id: ShapeId,

    /// Parent shape (None for empty shape).
    parent: Option<Arc<Shape>>,

    /// Property added by this shape transition.
    property: Option<PropertyDescriptor>,

    /// Total number of properties in this shape chain.
    property_count: u32,

    /// Number of unboxed primitive slots in use.
    primitive_slots: u32,

    /// Number of boxed slots in use.
    boxed_slots: u32,

    /// Transitions to child shapes (lazily populated).
    transitions: RwLock<FxHashMap<TransitionKey, Arc<Shape>>>,
}

impl Shape {
    /// Create the empty shape (root of all shape trees).
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            id: ShapeId::EMPTY,
            parent: None,
            property: None,
            property_count: 0,
            primitive_slots: 0,
            boxed_slots: 0,
            transitions: RwLock::new(FxHashMap::default()),
        })
    }

    /// Create a new shape by adding a property to the parent.
    fn with_property(
        parent: Arc<Shape>,
        name: InternedString,
        kind: ValueKind,
        id: ShapeId,
    ) -> Arc<Self> {
        let (location, primitive_slots, boxed_slots) = if kind.is_primitive() {
            (
                StorageLocation::new(kind, parent.primitive_slots),
                parent.primitive_slots + 1,
                parent.boxed_slots,
            )
        } else {
            (
                StorageLocation::new(kind, parent.boxed_slots),
                parent.primitive_slots,
                parent.boxed_slots + 1,
            )
        };
        let property_count = parent.property_count + 1;

        Arc::new(Self {
            id,
            parent: Some(parent),
            property: Some(PropertyDescriptor::new(name, location)),
            property_count,
            primitive_slots,
            boxed_slots,
            transitions: RwLock::new(FxHashMap::default()),
        })
    }

    /// Get the shape ID.
    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Get the parent shape.
    #[inline]
    pub fn parent(&self) -> Option<&Arc<Shape>> {
        self.parent.as_ref()
    }

    /// Get the property descriptor for this shape's added property.
    #[inline]
    pub fn property(&self) -> Option<&PropertyDescriptor> {
        self.property.as_ref()
    }

    /// Get total property count.
    #[inline]
    pub fn property_count(&self) -> u32 {
        self.property_count
    }

    /// Number of unboxed slots an object of this shape needs.
    #[inline]
    pub fn primitive_slots(&self) -> u32 {
        self.primitive_slots
    }

    /// Number of boxed slots an object of this shape needs.
    #[inline]
    pub fn boxed_slots(&self) -> u32 {
        self.boxed_slots
    }

    /// Check if this is the empty shape.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Find the storage location of `name`, traversing the shape chain.
    ///
    /// Pure lookup, O(n) in the property count.
    pub fn find_storage_location(&self, name: &InternedString) -> Option<StorageLocation> {
        let mut current = self;
        loop {
            if let Some(prop) = &current.property {
                if &prop.name == name {
                    return Some(prop.location);
                }
            }
            match &current.parent {
                Some(parent) => current = parent.as_ref(),
                None => return None,
            }
        }
    }

    /// Check if `name` is part of this layout.
    #[inline]
    pub fn contains(&self, name: &InternedString) -> bool {
        self.find_storage_location(name).is_some()
    }

    /// Collect all property names in definition order.
    pub fn property_names(&self) -> Vec<InternedString> {
        self.all_descriptors()
            .into_iter()
            .map(|desc| desc.name)
            .collect()
    }

    /// Collect all property descriptors in definition order.
    pub fn all_descriptors(&self) -> Vec<PropertyDescriptor> {
        let mut descriptors = Vec::with_capacity(self.property_count as usize);
        let mut current = Some(self);
        while let Some(shape) = current {
            if let Some(prop) = &shape.property {
                descriptors.push(prop.clone());
            }
            current = shape.parent.as_deref();
        }
        descriptors.reverse();
        descriptors
    }

    /// Get an existing transition (if any).
    pub fn get_transition(&self, name: &InternedString, kind: ValueKind) -> Option<Arc<Shape>> {
        self.transitions.read().get(&(name.clone(), kind)).cloned()
    }

    /// Number of cached transitions out of this shape.
    pub fn transition_count(&self) -> usize {
        self.transitions.read().len()
    }
}

// =============================================================================
// Shape Registry
// =============================================================================

/// Registry that owns the root shape and mints new shapes.
///
/// Thread-safe: transition caches are behind per-shape locks and shape IDs
/// come from an atomic counter.
pub struct ShapeRegistry {
    /// Counter for generating unique shape IDs.
    next_id: AtomicU32,

    /// The empty shape (shared root).
    empty_shape: Arc<Shape>,
}

impl ShapeRegistry {
    /// Create a new shape registry.
    pub fn new() -> Self {
        Self {
            // ID 0 is reserved for empty shape
            next_id: AtomicU32::new(1),
            empty_shape: Shape::empty(),
        }
    }

    /// Get the empty shape.
    #[inline]
    pub fn empty_shape(&self) -> Arc<Shape> {
        Arc::clone(&self.empty_shape)
    }

    /// Successor of `from` after adding `name` with a slot of `kind`.
    ///
    /// The same starting shape and the same `(name, kind)` always yield the
    /// same successor.
    pub fn with_attribute(
        &self,
        from: &Arc<Shape>,
        name: InternedString,
        kind: ValueKind,
    ) -> Arc<Shape> {
        if let Some(existing) = from.get_transition(&name, kind) {
            return existing;
        }

        // Re-check under the write lock so racing creators agree on one shape.
        let mut transitions = from.transitions.write();
        if let Some(existing) = transitions.get(&(name.clone(), kind)) {
            return Arc::clone(existing);
        }
        let id = ShapeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let new_shape = Shape::with_property(Arc::clone(from), name.clone(), kind, id);
        transitions.insert((name, kind), Arc::clone(&new_shape));
        new_shape
    }

    /// Successor of `from` in which `name` lives in a boxed slot.
    ///
    /// Returns `from` unchanged if `name` is absent or already boxed.
    pub fn widen(&self, from: &Arc<Shape>, name: &InternedString) -> Arc<Shape> {
        match from.find_storage_location(name) {
            Some(location) if location.kind().is_primitive() => {}
            _ => return Arc::clone(from),
        }

        let mut shape = self.empty_shape();
        for desc in from.all_descriptors() {
            let kind = if &desc.name == name {
                ValueKind::Boxed
            } else {
                desc.location.kind()
            };
            shape = self.with_attribute(&shape, desc.name, kind);
        }
        shape
    }

    /// Get number of shapes created (including empty).
    pub fn shape_count(&self) -> u32 {
        self.next_id.load(Ordering::Relaxed)
    }
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::intern;

    // -------------------------------------------------------------------------
    // Shape Tests - Basic
    // -------------------------------------------------------------------------

    #[test]
    fn test_empty_shape() {
        let empty = Shape::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.id(), ShapeId::EMPTY);
        assert!(empty.parent().is_none());
        assert!(empty.property().is_none());
        assert_eq!(empty.property_count(), 0);
        assert_eq!(empty.primitive_slots(), 0);
        assert_eq!(empty.boxed_slots(), 0);
    }

    #[test]
    fn test_slot_indices_per_kind() {
        let registry = ShapeRegistry::new();
        let shape = registry.empty_shape();
        let shape = registry.with_attribute(&shape, intern("a"), ValueKind::Int);
        let shape = registry.with_attribute(&shape, intern("b"), ValueKind::Boxed);
        let shape = registry.with_attribute(&shape, intern("c"), ValueKind::Float);
        let shape = registry.with_attribute(&shape, intern("d"), ValueKind::Boxed);

        assert_eq!(shape.property_count(), 4);
        assert_eq!(shape.primitive_slots(), 2);
        assert_eq!(shape.boxed_slots(), 2);

        let a = shape.find_storage_location(&intern("a")).unwrap();
        let b = shape.find_storage_location(&intern("b")).unwrap();
        let c = shape.find_storage_location(&intern("c")).unwrap();
        let d = shape.find_storage_location(&intern("d")).unwrap();
        assert_eq!((a.kind(), a.index()), (ValueKind::Int, 0));
        assert_eq!((b.kind(), b.index()), (ValueKind::Boxed, 0));
        assert_eq!((c.kind(), c.index()), (ValueKind::Float, 1));
        assert_eq!((d.kind(), d.index()), (ValueKind::Boxed, 1));
    }

    #[test]
    fn test_find_storage_location_missing() {
        let registry = ShapeRegistry::new();
        let shape = registry.with_attribute(&registry.empty_shape(), intern("x"), ValueKind::Int);
        assert!(shape.find_storage_location(&intern("y")).is_none());
        assert!(Shape::empty().find_storage_location(&intern("x")).is_none());
    }

    #[test]
    fn test_property_names_order() {
        let registry = ShapeRegistry::new();
        let shape = registry.empty_shape();
        let shape = registry.with_attribute(&shape, intern("first"), ValueKind::Int);
        let shape = registry.with_attribute(&shape, intern("second"), ValueKind::Boxed);
        let shape = registry.with_attribute(&shape, intern("third"), ValueKind::Bool);

        let names = shape.property_names();
        assert_eq!(names.len(), 3);
        assert_eq!(names[0].as_str(), "first");
        assert_eq!(names[1].as_str(), "second");
        assert_eq!(names[2].as_str(), "third");
    }

    // -------------------------------------------------------------------------
    // Shape Tests - Transitions
    // -------------------------------------------------------------------------

    #[test]
    fn test_transition_caching() {
        let registry = ShapeRegistry::new();
        let empty = registry.empty_shape();

        let shape1 = registry.with_attribute(&empty, intern("x"), ValueKind::Int);
        let shape2 = registry.with_attribute(&empty, intern("x"), ValueKind::Int);

        assert!(Arc::ptr_eq(&shape1, &shape2));
        assert_eq!(empty.transition_count(), 1);
    }

    #[test]
    fn test_transition_keyed_by_kind() {
        let registry = ShapeRegistry::new();
        let empty = registry.empty_shape();

        let int_x = registry.with_attribute(&empty, intern("x"), ValueKind::Int);
        let boxed_x = registry.with_attribute(&empty, intern("x"), ValueKind::Boxed);

        assert!(!Arc::ptr_eq(&int_x, &boxed_x));
        assert_ne!(int_x.id(), boxed_x.id());
    }

    #[test]
    fn test_same_history_converges() {
        let registry = ShapeRegistry::new();
        let build = || {
            let shape = registry.empty_shape();
            let shape = registry.with_attribute(&shape, intern("x"), ValueKind::Int);
            registry.with_attribute(&shape, intern("y"), ValueKind::Boxed)
        };
        let first = build();
        let count = registry.shape_count();
        let second = build();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.shape_count(), count);
    }

    #[test]
    fn test_different_order_different_shape() {
        let registry = ShapeRegistry::new();
        let empty = registry.empty_shape();
        let xy = registry.with_attribute(
            &registry.with_attribute(&empty, intern("x"), ValueKind::Int),
            intern("y"),
            ValueKind::Int,
        );
        let yx = registry.with_attribute(
            &registry.with_attribute(&empty, intern("y"), ValueKind::Int),
            intern("x"),
            ValueKind::Int,
        );
        assert!(!Arc::ptr_eq(&xy, &yx));
    }

    // -------------------------------------------------------------------------
    // Shape Tests - Widening
    // -------------------------------------------------------------------------

    #[test]
    fn test_widen_boxes_one_slot() {
        let registry = ShapeRegistry::new();
        let shape = registry.empty_shape();
        let shape = registry.with_attribute(&shape, intern("x"), ValueKind::Int);
        let shape = registry.with_attribute(&shape, intern("y"), ValueKind::Float);

        let widened = registry.widen(&shape, &intern("x"));
        assert!(!Arc::ptr_eq(&shape, &widened));

        let x = widened.find_storage_location(&intern("x")).unwrap();
        let y = widened.find_storage_location(&intern("y")).unwrap();
        assert_eq!(x.kind(), ValueKind::Boxed);
        assert_eq!(y.kind(), ValueKind::Float);
        assert_eq!(widened.property_names(), shape.property_names());
    }

    #[test]
    fn test_widen_converges() {
        let registry = ShapeRegistry::new();
        let shape = registry.with_attribute(&registry.empty_shape(), intern("x"), ValueKind::Int);
        let first = registry.widen(&shape, &intern("x"));
        let second = registry.widen(&shape, &intern("x"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_widen_noop_for_boxed_or_missing() {
        let registry = ShapeRegistry::new();
        let shape =
            registry.with_attribute(&registry.empty_shape(), intern("x"), ValueKind::Boxed);
        assert!(Arc::ptr_eq(&shape, &registry.widen(&shape, &intern("x"))));
        assert!(Arc::ptr_eq(&shape, &registry.widen(&shape, &intern("nope"))));
    }

    // -------------------------------------------------------------------------
    // ShapeRegistry Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_registry_new() {
        let registry = ShapeRegistry::new();
        assert_eq!(registry.shape_count(), 1);
    }

    #[test]
    fn test_registry_unique_ids() {
        let registry = ShapeRegistry::new();
        let empty = registry.empty_shape();

        let mut ids: Vec<_> = (0..100)
            .map(|i| {
                registry
                    .with_attribute(&empty, intern(&format!("p{}", i)), ValueKind::Int)
                    .id()
            })
            .collect();
        ids.sort_by_key(|id| id.raw());
        ids.dedup();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_registries_are_independent() {
        let first = ShapeRegistry::new();
        let second = ShapeRegistry::new();
        let a = first.with_attribute(&first.empty_shape(), intern("x"), ValueKind::Int);
        let b = second.with_attribute(&second.empty_shape(), intern("x"), ValueKind::Int);

        assert!(!Arc::ptr_eq(&first.empty_shape(), &second.empty_shape()));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(first.shape_count(), 2);
        assert_eq!(second.shape_count(), 2);
    }

    #[test]
    fn test_slot_indices_past_u16() {
        let registry = ShapeRegistry::new();
        let count = u16::MAX as u32 + 4;
        let mut shape = registry.empty_shape();
        for i in 0..count {
            shape = registry.with_attribute(&shape, intern(&format!("wide_{}", i)), ValueKind::Int);
        }

        assert_eq!(shape.property_count(), count);
        assert_eq!(shape.primitive_slots(), count);
        let last = shape
            .find_storage_location(&intern(&format!("wide_{}", count - 1)))
            .unwrap();
        assert_eq!(last.index(), count - 1);
    }

    #[test]
    fn test_concurrent_transitions_agree() {
        use std::thread;

        let registry = Arc::new(ShapeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let empty = registry.empty_shape();
                    registry.with_attribute(&empty, intern("racy"), ValueKind::Int)
                })
            })
            .collect();
        let shapes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for shape in &shapes {
            assert!(Arc::ptr_eq(shape, &shapes[0]));
        }
        assert_eq!(registry.shape_count(), 2);
    }

    #[test]
    fn test_long_property_chain() {
        let registry = ShapeRegistry::new();
        let mut shape = registry.empty_shape();
        for i in 0..50 {
            shape = registry.with_attribute(&shape, intern(&format!("property_{}", i)), ValueKind::Boxed);
        }
        for i in 0..50 {
            let name = intern(&format!("property_{}", i));
            let location = shape.find_storage_location(&name).unwrap();
            assert_eq!(location.index(), i);
        }
    }
}
