//! Class object implementation.
//!
//! A `PyClass` is itself a shaped object: its own attributes (methods, class
//! variables) live in an `AttributeStore`. On top of that it carries a single
//! superclass link and the `Assumption` that guards "this class's own
//! attribute layout and superclass pointer have not changed".
//!
//! # Architecture
//!
//! ```text
//! PyClass
//! ├── name: InternedString
//! ├── id: ClassId
//! └── state: RwLock<ClassState>
//!     ├── attrs: AttributeStore      (class-level attributes)
//!     ├── superclass: Option<Arc<PyClass>>
//!     └── assumption: Assumption     (replaced on every layout change)
//! ```
//!
//! # Thread Safety
//!
//! Every mutation that changes the class layout or its superclass runs under
//! the state write lock and, in that same critical section, invalidates the
//! current assumption and installs a fresh one. A reader that fetches through
//! `fetch_if_stable` re-checks the assumption under the read lock, so it can
//! never observe a new layout through a stale location.

use crate::object::assumption::Assumption;
use crate::object::shape::{Shape, ShapeRegistry};
use crate::object::storage::{AttributeStore, StorageLocation, StoreOutcome};
use crate::value::Value;
use kestrel_core::InternedString;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::debug;

// =============================================================================
// Class ID
// =============================================================================

/// Global counter for allocating unique class IDs.
static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(1);

/// Unique identifier of a class (diagnostics and logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ClassId(pub u32);

/// Serializes superclass assignments so concurrent rewiring cannot race past
/// the cycle check.
static HIERARCHY_LOCK: Mutex<()> = parking_lot::const_mutex(());

fn allocate_class_id() -> ClassId {
    ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
}

// =============================================================================
// Errors
// =============================================================================

/// Errors raised when rewiring the class hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// The new superclass already inherits from the class being modified.
    #[error("cannot make '{superclass}' the base of '{class}': the hierarchy would contain a cycle")]
    Cycle {
        /// Class whose superclass was being set.
        class: InternedString,
        /// The rejected superclass.
        superclass: InternedString,
    },
}

// =============================================================================
// Own-Attribute Lookup
// =============================================================================

/// Consistent snapshot of one class for a single resolution hop.
///
/// All fields are read under one lock acquisition.
#[derive(Debug, Clone)]
pub struct OwnLookup {
    /// Location and value of the attribute, if the class owns it.
    pub found: Option<(StorageLocation, Value)>,
    /// The class's superclass.
    pub superclass: Option<Arc<PyClass>>,
    /// The class's current assumption.
    pub assumption: Assumption,
    /// The class's own layout.
    pub shape: Arc<Shape>,
}

// =============================================================================
// Class Object
// =============================================================================

struct ClassState {
    attrs: AttributeStore,
    superclass: Option<Arc<PyClass>>,
    assumption: Assumption,
}

impl ClassState {
    /// Retire the current assumption and mint its successor.
    fn renew_assumption(&mut self) -> Assumption {
        let retired = std::mem::replace(&mut self.assumption, Assumption::new());
        retired.invalidate();
        retired
    }
}

/// A class object with single inheritance.
pub struct PyClass {
    name: InternedString,
    id: ClassId,
    state: RwLock<ClassState>,
}

impl PyClass {
    /// Declare a new class.
    pub fn new(
        name: InternedString,
        superclass: Option<Arc<PyClass>>,
        registry: &ShapeRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            id: allocate_class_id(),
            state: RwLock::new(ClassState {
                attrs: AttributeStore::new(registry.empty_shape()),
                superclass,
                assumption: Assumption::new(),
            }),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the class name.
    #[inline]
    pub fn name(&self) -> &InternedString {
        &self.name
    }

    /// Get the class ID.
    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Get the superclass.
    pub fn superclass(&self) -> Option<Arc<PyClass>> {
        self.state.read().superclass.clone()
    }

    /// Check if `candidate` is exactly this class's superclass.
    pub fn has_superclass(&self, candidate: &Arc<PyClass>) -> bool {
        self.state
            .read()
            .superclass
            .as_ref()
            .is_some_and(|superclass| Arc::ptr_eq(superclass, candidate))
    }

    /// The assumption currently guarding this class.
    pub fn current_assumption(&self) -> Assumption {
        self.state.read().assumption.clone()
    }

    /// The layout of this class's own attributes.
    pub fn shape(&self) -> Arc<Shape> {
        Arc::clone(self.state.read().attrs.shape())
    }

    /// Check whether `self` is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &PyClass) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let mut current = self.superclass();
        while let Some(class) = current {
            if std::ptr::eq(class.as_ref(), other) {
                return true;
            }
            current = class.superclass();
        }
        false
    }

    // =========================================================================
    // Attribute Access
    // =========================================================================

    /// Check if the class itself (not an ancestor) defines `name`.
    pub fn is_own_attribute(&self, name: &InternedString) -> bool {
        self.state.read().attrs.contains(name)
    }

    /// Get an attribute defined on the class itself.
    pub fn get_own_attr(&self, name: &InternedString) -> Option<Value> {
        self.state.read().attrs.get(name)
    }

    /// Snapshot everything one resolution hop needs.
    pub fn lookup_own(&self, name: &InternedString) -> OwnLookup {
        let state = self.state.read();
        let found = state
            .attrs
            .location(name)
            .and_then(|location| state.attrs.fetch(location).map(|value| (location, value)));
        OwnLookup {
            found,
            superclass: state.superclass.clone(),
            assumption: state.assumption.clone(),
            shape: Arc::clone(state.attrs.shape()),
        }
    }

    /// Read through a location captured under `assumption`.
    ///
    /// Returns `None` if the assumption is no longer the class's current,
    /// valid one.
    #[inline]
    pub fn fetch_if_stable(
        &self,
        assumption: &Assumption,
        location: StorageLocation,
    ) -> Option<Value> {
        let state = self.state.read();
        if state.assumption.ptr_eq(assumption) && assumption.is_valid() {
            state.attrs.fetch(location)
        } else {
            None
        }
    }

    /// Read through a location captured for the class's own `shape`.
    #[inline]
    pub fn fetch_if_shape(&self, shape: &Arc<Shape>, location: StorageLocation) -> Option<Value> {
        self.state.read().attrs.fetch_if_shape(shape, location)
    }

    /// Set a class attribute.
    ///
    /// Adding an attribute or widening its slot changes the class layout and
    /// renews the class assumption. Overwriting a slot in place does not:
    /// captured locations stay valid and read the new value.
    pub fn set_attr(
        &self,
        name: InternedString,
        value: Value,
        registry: &ShapeRegistry,
    ) -> StoreOutcome {
        let mut state = self.state.write();
        let outcome = state.attrs.set(name.clone(), value, registry);
        if outcome.changed_shape() {
            let retired = state.renew_assumption();
            debug!(
                class = %self.name,
                attribute = %name,
                ?outcome,
                retired = retired.id(),
                "class layout changed"
            );
        }
        outcome
    }

    /// Replace the superclass.
    ///
    /// Always renews the class assumption. Rejects assignments that would make
    /// the class its own ancestor.
    pub fn set_superclass(&self, superclass: Option<Arc<PyClass>>) -> Result<(), HierarchyError> {
        let _hierarchy = HIERARCHY_LOCK.lock();
        if let Some(candidate) = &superclass {
            if candidate.is_subclass_of(self) {
                return Err(HierarchyError::Cycle {
                    class: self.name.clone(),
                    superclass: candidate.name.clone(),
                });
            }
        }

        let mut state = self.state.write();
        state.superclass = superclass;
        let retired = state.renew_assumption();
        debug!(
            class = %self.name,
            superclass = state.superclass.as_ref().map(|c| c.name.as_str()),
            retired = retired.id(),
            "class superclass changed"
        );
        Ok(())
    }

    /// Snapshot of the class's own attributes in definition order.
    pub fn own_attributes(&self) -> Vec<(InternedString, Value)> {
        self.state.read().attrs.iter().collect()
    }
}

impl fmt::Debug for PyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("PyClass")
            .field("name", &self.name)
            .field("id", &self.id)
            .field(
                "superclass",
                &state.superclass.as_ref().map(|c| c.name.clone()),
            )
            .field("shape", &state.attrs.shape().id())
            .field("assumption", &state.assumption)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
