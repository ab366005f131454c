//! Attribute resolution.
//!
//! The resolver answers "where does `receiver.name` live?" by walking the
//! receiver's own storage, then its class, then each superclass in turn. The
//! answer is a `Resolution`: how deep the attribute was found, the storage
//! location inside the defining object, the value read at resolution time and
//! everything a guard needs to decide later whether the answer still holds.
//!
//! # Depth
//!
//! ```text
//! instance receiver            class receiver
//! ─────────────────            ──────────────
//! depth 0: instance itself     depth 0: the class itself
//! depth 1: instance's class    depth 1: its superclass
//! depth n: n-1 hops above it   depth n: n hops above it
//! ```
//!
//! Module receivers only ever resolve at depth 0.

use crate::config::IcConfig;
use kestrel_core::{AttributeError, IcError, IcResult, InternedString};
use kestrel_runtime::{Assumption, PyClass, Receiver, Shape, StorageLocation, Value};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::warn;

/// Class hops kept inline in a resolution.
pub const INLINE_HOPS: usize = 4;

// =============================================================================
// Resolution Descriptor
// =============================================================================

/// What keeps a receiver's answer stable while its class is consulted.
#[derive(Debug, Clone)]
pub enum Stability {
    /// Instance receivers: the layout under which the attribute was absent.
    Layout(Arc<Shape>),
    /// Class receivers: the class's own assumption.
    Assumption(Assumption),
}

/// Receiver-side identity captured for inherited attributes.
#[derive(Debug, Clone)]
pub struct ReceiverCheck {
    /// The receiver's class (instances) or the receiver itself (classes).
    pub owner: Arc<PyClass>,
    /// Receiver stability token.
    pub stable: Stability,
}

/// One class visited by the resolution walk.
#[derive(Debug, Clone)]
pub struct Hop {
    /// The class.
    pub class: Arc<PyClass>,
    /// Its assumption when it was visited.
    pub assumption: Assumption,
}

/// Where the attribute was found.
#[derive(Debug, Clone)]
pub enum Placement {
    /// Stored on the receiver itself.
    Own {
        /// The receiver's layout.
        layout: Arc<Shape>,
    },
    /// Stored on a class reached from the receiver.
    Inherited {
        /// Receiver identity and stability.
        receiver: ReceiverCheck,
        /// Every class walked, ending with the defining class.
        hops: SmallVec<[Hop; INLINE_HOPS]>,
    },
}

/// The resolver's answer for one receiver and name.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// 0 for own attributes, otherwise the number of class hops.
    pub depth: usize,
    /// Slot inside the defining object.
    pub location: StorageLocation,
    /// Value read at resolution time.
    pub value: Value,
    /// Where the attribute was found.
    pub placement: Placement,
}

impl Resolution {
    /// Get the defining class, or `None` if the receiver owns the attribute.
    pub fn defining_class(&self) -> Option<&Arc<PyClass>> {
        match &self.placement {
            Placement::Own { .. } => None,
            Placement::Inherited { hops, .. } => hops.last().map(|hop| &hop.class),
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Full by-name attribute lookup.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    max_hierarchy_depth: usize,
}

impl Resolver {
    /// Create a resolver honoring `config`'s hierarchy limit.
    pub fn new(config: &IcConfig) -> Self {
        Self {
            max_hierarchy_depth: config.max_hierarchy_depth(),
        }
    }

    /// Get the hierarchy walk limit.
    #[inline]
    pub fn max_hierarchy_depth(&self) -> usize {
        self.max_hierarchy_depth
    }

    /// Resolve `name` on `receiver`.
    pub fn resolve(&self, receiver: Receiver<'_>, name: &InternedString) -> IcResult<Resolution> {
        match receiver {
            Receiver::Module(module) => {
                let (layout, found) = module.lookup_own(name);
                Self::own(layout, found)
                    .ok_or_else(|| AttributeError::new(name.clone(), receiver.describe()).into())
            }
            Receiver::Instance(instance) => {
                let (layout, found) = instance.lookup_own(name);
                if let Some(resolution) = Self::own(Arc::clone(&layout), found) {
                    return Ok(resolution);
                }
                let check = ReceiverCheck {
                    owner: Arc::clone(instance.class()),
                    stable: Stability::Layout(layout),
                };
                self.walk(receiver, name, check, Some(Arc::clone(instance.class())))
            }
            Receiver::Class(class) => {
                let snapshot = class.lookup_own(name);
                if let Some(resolution) = Self::own(snapshot.shape, snapshot.found) {
                    return Ok(resolution);
                }
                let check = ReceiverCheck {
                    owner: Arc::clone(class),
                    stable: Stability::Assumption(snapshot.assumption),
                };
                self.walk(receiver, name, check, snapshot.superclass)
            }
        }
    }

    /// Resolve `name` on any value; values without attribute storage fail.
    pub fn resolve_value(&self, value: &Value, name: &InternedString) -> IcResult<Resolution> {
        match Receiver::from_value(value) {
            Some(receiver) => self.resolve(receiver, name),
            None => Err(AttributeError::new(name.clone(), value.type_name()).into()),
        }
    }

    /// Generic read: resolve and return the value.
    #[inline]
    pub fn lookup(&self, receiver: Receiver<'_>, name: &InternedString) -> IcResult<Value> {
        self.resolve(receiver, name).map(|resolution| resolution.value)
    }

    fn own(layout: Arc<Shape>, found: Option<(StorageLocation, Value)>) -> Option<Resolution> {
        found.map(|(location, value)| Resolution {
            depth: 0,
            location,
            value,
            placement: Placement::Own { layout },
        })
    }

    /// Walk the class chain starting at `first`.
    fn walk(
        &self,
        receiver: Receiver<'_>,
        name: &InternedString,
        check: ReceiverCheck,
        first: Option<Arc<PyClass>>,
    ) -> IcResult<Resolution> {
        let mut hops: SmallVec<[Hop; INLINE_HOPS]> = SmallVec::new();
        let mut current = first;

        while let Some(class) = current {
            if hops.len() >= self.max_hierarchy_depth {
                warn!(
                    attribute = %name,
                    limit = self.max_hierarchy_depth,
                    "class hierarchy exceeds walk limit"
                );
                return Err(IcError::invalid_state(format!(
                    "class hierarchy deeper than {} while resolving '{}'",
                    self.max_hierarchy_depth, name
                )));
            }

            let snapshot = class.lookup_own(name);
            hops.push(Hop {
                class,
                assumption: snapshot.assumption,
            });
            if let Some((location, value)) = snapshot.found {
                return Ok(Resolution {
                    depth: hops.len(),
                    location,
                    value,
                    placement: Placement::Inherited {
                        receiver: check,
                        hops,
                    },
                });
            }
            current = snapshot.superclass;
        }

        Err(AttributeError::new(name.clone(), receiver.describe()).into())
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&IcConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
