//! Single-use validity tokens.
//!
//! An `Assumption` starts valid and is invalidated at most once. Checking one
//! is a single atomic load; invalidating one does not notify anybody. Caches
//! that captured it find out the next time they check.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Global counter for assumption IDs (diagnostics only).
static NEXT_ASSUMPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct AssumptionCell {
    id: u64,
    valid: AtomicBool,
}

/// A shared, monotonic valid → invalid token.
///
/// Clones share the same cell: invalidating any clone invalidates all of them.
#[derive(Clone)]
pub struct Assumption(Arc<AssumptionCell>);

impl Assumption {
    /// Mint a fresh, valid assumption.
    pub fn new() -> Self {
        Self(Arc::new(AssumptionCell {
            id: NEXT_ASSUMPTION_ID.fetch_add(1, Ordering::Relaxed),
            valid: AtomicBool::new(true),
        }))
    }

    /// Check if the assumption still holds.
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// Invalidate the assumption.
    ///
    /// Returns `true` if this call performed the transition.
    #[inline]
    pub fn invalidate(&self) -> bool {
        self.0.valid.swap(false, Ordering::AcqRel)
    }

    /// Check if two handles refer to the same token.
    #[inline]
    pub fn ptr_eq(&self, other: &Assumption) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Diagnostic identifier.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }
}

impl Default for Assumption {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assumption")
            .field("id", &self.id())
            .field("valid", &self.is_valid())
            .finish()
    }
}
