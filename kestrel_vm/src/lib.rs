//! Adaptive attribute-read inline caches for the Kestrel interpreter.
//!
//! This crate provides:
//! - The attribute resolver (own storage → class → superclass chain)
//! - Guard predicates for cached resolutions
//! - Self-specializing Uninitialized / Cached / Generic call-site chains
//! - A concurrent call-site table with statistics
//! - Inline-cache configuration

pub mod config;
pub mod ic_manager;
pub mod inline_cache;
pub mod resolver;

// Re-export commonly used items
pub use config::{ConfigError, IcConfig};
pub use ic_manager::{CodeId, IcManager, IcStats, SiteId};
pub use inline_cache::{
    AttributeReadSite, ChainState, GuardKind, GuardOutcome, IcClassification, Probe,
    StatsSnapshot, Terminal,
};
pub use resolver::{Placement, Resolution, Resolver};
