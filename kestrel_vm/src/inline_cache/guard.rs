//! Guard predicates for cached attribute reads.
//!
//! A guard decides whether a cached `(location, defining object)` pair still
//! answers a read for the current receiver. The kind is picked once, from the
//! resolution depth, when the cached node is built:
//!
//! | Depth | Guard          | Checks                                          |
//! |-------|----------------|-------------------------------------------------|
//! | 0     | `LayoutGuard`  | receiver shape identity                         |
//! | 1     | `ClassGuard`   | receiver identity + two assumptions             |
//! | > 1   | `ChainGuard`   | receiver identity + every hop re-walked         |
//!
//! A failed check is either a **miss** (the receiver is simply a different
//! kind of object; try the next node) or **stale** (the receiver matches but
//! something the node depends on was invalidated; the node can never pass
//! again).

use crate::resolver::{Hop, INLINE_HOPS, Placement, ReceiverCheck, Resolution, Stability};
use kestrel_core::{IcError, IcResult};
use kestrel_runtime::{Assumption, PyClass, Receiver, Shape, StorageLocation, Value};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::warn;

// =============================================================================
// Outcomes
// =============================================================================

/// Which of the three guard kinds a node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// Shape identity (depth 0).
    Layout,
    /// Class identity with assumptions (depth 1).
    Class,
    /// Chain re-walk (depth > 1).
    Chain,
}

/// Result of a pure guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The cached location applies.
    Pass,
    /// Different receiver; try the next node.
    Miss,
    /// A captured assumption was invalidated.
    Stale,
}

/// Result of a guarded fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// Guard passed; the value at the cached location.
    Hit(Value),
    /// Different receiver.
    Miss,
    /// A captured assumption was invalidated.
    Stale,
}

impl From<GuardOutcome> for Probe {
    fn from(outcome: GuardOutcome) -> Self {
        match outcome {
            GuardOutcome::Miss => Probe::Miss,
            _ => Probe::Stale,
        }
    }
}

// =============================================================================
// Receiver Check
// =============================================================================

impl ReceiverCheck {
    /// Check the receiver is the one the resolution was made for.
    #[inline]
    pub fn check(&self, receiver: Receiver<'_>) -> GuardOutcome {
        match (receiver, &self.stable) {
            (Receiver::Instance(instance), Stability::Layout(layout)) => {
                if Arc::ptr_eq(instance.class(), &self.owner)
                    && Arc::ptr_eq(&instance.shape(), layout)
                {
                    GuardOutcome::Pass
                } else {
                    GuardOutcome::Miss
                }
            }
            (Receiver::Class(class), Stability::Assumption(assumption)) => {
                if !Arc::ptr_eq(class, &self.owner) {
                    GuardOutcome::Miss
                } else if assumption.is_valid() {
                    GuardOutcome::Pass
                } else {
                    GuardOutcome::Stale
                }
            }
            _ => GuardOutcome::Miss,
        }
    }
}

// =============================================================================
// Layout Guard
// =============================================================================

/// Shape-identity guard for own attributes.
#[derive(Debug, Clone)]
pub struct LayoutGuard {
    shape: Arc<Shape>,
}

impl LayoutGuard {
    /// Guard on `shape`.
    pub fn new(shape: Arc<Shape>) -> Self {
        Self { shape }
    }

    /// Get the guarded shape.
    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Check the receiver is laid out by the guarded shape.
    #[inline]
    pub fn check(&self, receiver: Receiver<'_>) -> GuardOutcome {
        if Arc::ptr_eq(&receiver.current_shape(), &self.shape) {
            GuardOutcome::Pass
        } else {
            GuardOutcome::Miss
        }
    }

    /// Check and fetch under one lock acquisition.
    #[inline]
    pub fn probe(&self, receiver: Receiver<'_>, location: StorageLocation) -> Probe {
        match receiver.fetch_if_shape(&self.shape, location) {
            Some(value) => Probe::Hit(value),
            None => Probe::Miss,
        }
    }
}

// =============================================================================
// Class Guard
// =============================================================================

/// Class-identity guard for attributes one hop away.
#[derive(Debug, Clone)]
pub struct ClassGuard {
    receiver: ReceiverCheck,
    class: Arc<PyClass>,
    class_stable: Assumption,
}

impl ClassGuard {
    /// Guard for an attribute defined on `hop`.
    pub fn new(receiver: ReceiverCheck, hop: Hop) -> Self {
        Self {
            receiver,
            class: hop.class,
            class_stable: hop.assumption,
        }
    }

    /// Get the defining class.
    #[inline]
    pub fn class(&self) -> &Arc<PyClass> {
        &self.class
    }

    /// Check receiver identity, receiver stability and class stability.
    #[inline]
    pub fn check(&self, receiver: Receiver<'_>) -> GuardOutcome {
        match self.receiver.check(receiver) {
            GuardOutcome::Pass if self.class_stable.is_valid() => GuardOutcome::Pass,
            GuardOutcome::Pass => GuardOutcome::Stale,
            outcome => outcome,
        }
    }

    /// Check, then fetch from the defining class.
    #[inline]
    pub fn probe(&self, receiver: Receiver<'_>, location: StorageLocation) -> Probe {
        match self.check(receiver) {
            GuardOutcome::Pass => self
                .class
                .fetch_if_stable(&self.class_stable, location)
                .map_or(Probe::Stale, Probe::Hit),
            outcome => outcome.into(),
        }
    }
}

// =============================================================================
// Chain Guard
// =============================================================================

/// Re-walking guard for attributes more than one hop away.
#[derive(Debug, Clone)]
pub struct ChainGuard {
    receiver: ReceiverCheck,
    hops: SmallVec<[Hop; INLINE_HOPS]>,
    depth: usize,
}

impl ChainGuard {
    /// Guard for an attribute found after walking `hops`.
    pub fn new(receiver: ReceiverCheck, hops: SmallVec<[Hop; INLINE_HOPS]>, depth: usize) -> Self {
        Self {
            receiver,
            hops,
            depth,
        }
    }

    /// Get the number of hops re-walked per check.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Get the defining class.
    #[inline]
    pub fn class(&self) -> Option<&Arc<PyClass>> {
        self.hops.last().map(|hop| &hop.class)
    }

    /// Check the receiver, then every hop down to the defining class.
    pub fn check(&self, receiver: Receiver<'_>) -> IcResult<GuardOutcome> {
        if self.depth == 0 || self.hops.len() != self.depth {
            warn!(
                depth = self.depth,
                hops = self.hops.len(),
                "chain guard built with inconsistent depth"
            );
            return Err(IcError::invalid_state(format!(
                "chain guard with depth {} over {} hops",
                self.depth,
                self.hops.len()
            )));
        }

        match self.receiver.check(receiver) {
            GuardOutcome::Pass => {}
            outcome => return Ok(outcome),
        }

        let first = &self.hops[0].class;
        if !Arc::ptr_eq(&self.receiver.owner, first) && !self.receiver.owner.has_superclass(first) {
            return Ok(GuardOutcome::Stale);
        }

        for (index, hop) in self.hops.iter().enumerate() {
            if !hop.assumption.is_valid() {
                return Ok(GuardOutcome::Stale);
            }
            if let Some(next) = self.hops.get(index + 1) {
                if !hop.class.has_superclass(&next.class) {
                    return Ok(GuardOutcome::Stale);
                }
            }
        }
        Ok(GuardOutcome::Pass)
    }

    /// Check, then fetch from the defining class.
    pub fn probe(&self, receiver: Receiver<'_>, location: StorageLocation) -> IcResult<Probe> {
        match self.check(receiver)? {
            GuardOutcome::Pass => {}
            outcome => return Ok(outcome.into()),
        }
        let Some(definer) = self.hops.last() else {
            return Err(IcError::invalid_state("chain guard without hops"));
        };
        Ok(definer
            .class
            .fetch_if_stable(&definer.assumption, location)
            .map_or(Probe::Stale, Probe::Hit))
    }
}

// =============================================================================
// Guard
// =============================================================================

/// The guard of one cached node.
#[derive(Debug, Clone)]
pub enum Guard {
    /// Depth 0.
    Layout(LayoutGuard),
    /// Depth 1.
    Class(ClassGuard),
    /// Depth > 1.
    Chain(ChainGuard),
}

impl Guard {
    /// Pick the guard for a resolution by its depth.
    pub fn for_resolution(resolution: &Resolution) -> IcResult<Self> {
        match (&resolution.placement, resolution.depth) {
            (Placement::Own { layout }, 0) => Ok(Guard::Layout(LayoutGuard::new(Arc::clone(layout)))),
            (Placement::Inherited { receiver, hops }, 1) if hops.len() == 1 => Ok(Guard::Class(
                ClassGuard::new(receiver.clone(), hops[0].clone()),
            )),
            (Placement::Inherited { receiver, hops }, depth) if depth > 1 => Ok(Guard::Chain(
                ChainGuard::new(receiver.clone(), hops.clone(), depth),
            )),
            (_, depth) => {
                warn!(depth, "resolution placement does not match its depth");
                Err(IcError::invalid_state(format!(
                    "resolution at depth {} with mismatched placement",
                    depth
                )))
            }
        }
    }

    /// Get the guard kind.
    #[inline]
    pub fn kind(&self) -> GuardKind {
        match self {
            Guard::Layout(_) => GuardKind::Layout,
            Guard::Class(_) => GuardKind::Class,
            Guard::Chain(_) => GuardKind::Chain,
        }
    }

    /// Pure check against the current receiver.
    pub fn check(&self, receiver: Receiver<'_>) -> IcResult<GuardOutcome> {
        match self {
            Guard::Layout(guard) => Ok(guard.check(receiver)),
            Guard::Class(guard) => Ok(guard.check(receiver)),
            Guard::Chain(guard) => guard.check(receiver),
        }
    }

    /// Check and, on success, fetch the value at `location`.
    #[inline]
    pub fn probe(&self, receiver: Receiver<'_>, location: StorageLocation) -> IcResult<Probe> {
        match self {
            Guard::Layout(guard) => Ok(guard.probe(receiver, location)),
            Guard::Class(guard) => Ok(guard.probe(receiver, location)),
            Guard::Chain(guard) => guard.probe(receiver, location),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
