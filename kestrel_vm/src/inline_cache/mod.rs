//! Attribute-read inline caches.
//!
//! - `guard`: the three guard predicates and their outcomes
//! - `chain`: the self-specializing Uninitialized / Cached / Generic chain
//! - `stats`: per-site counters

pub mod chain;
pub mod guard;
pub mod stats;

pub use chain::{AttributeReadSite, ChainNode, ChainState, IcClassification, Terminal};
pub use guard::{ChainGuard, ClassGuard, Guard, GuardKind, GuardOutcome, LayoutGuard, Probe};
pub use stats::{SiteStats, StatsSnapshot};
