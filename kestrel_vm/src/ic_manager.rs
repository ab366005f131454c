//! Call-site table for attribute-read inline caches.
//!
//! Every `LOAD_ATTR`-style instruction is identified by a `SiteId` (code object
//! plus bytecode offset). The manager creates the site's chain on first use and
//! hands out shared handles, so the same site can be read from several threads
//! at once.
//!
//! # Architecture
//!
//! ```text
//! IcManager
//! ├── config: IcConfig
//! └── sites: DashMap<SiteId, Arc<AttributeReadSite>>
//!                               │
//!                               └── head ──▶ Cached ──▶ ... ──▶ terminal
//! ```

use crate::config::IcConfig;
use crate::inline_cache::{AttributeReadSite, IcClassification, StatsSnapshot};
use dashmap::DashMap;
use kestrel_core::{IcError, IcResult, InternedString};
use kestrel_runtime::Value;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use tracing::warn;

// =============================================================================
// Site Identifier
// =============================================================================

/// Identifier of a code object.
pub type CodeId = u32;

/// Unique identifier for an attribute-read site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteId {
    /// The code object containing this site.
    pub code_id: CodeId,
    /// Bytecode offset of the instruction.
    pub offset: u32,
}

impl SiteId {
    /// Create a new site identifier.
    #[inline]
    pub const fn new(code_id: CodeId, offset: u32) -> Self {
        Self { code_id, offset }
    }
}

// =============================================================================
// IC Manager
// =============================================================================

/// Owner of every attribute-read site in a VM.
#[derive(Debug)]
pub struct IcManager {
    config: IcConfig,
    sites: DashMap<SiteId, Arc<AttributeReadSite>, FxBuildHasher>,
}

impl IcManager {
    /// Create a manager whose sites use `config`.
    pub fn new(config: IcConfig) -> Self {
        Self {
            config,
            sites: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &IcConfig {
        &self.config
    }

    /// Get the site at `id`, creating it for `name` on first use.
    ///
    /// A site reads exactly one name; asking for another name at the same id
    /// is an `InvalidState`.
    pub fn site(&self, id: SiteId, name: &InternedString) -> IcResult<Arc<AttributeReadSite>> {
        let site = Arc::clone(
            self.sites
                .entry(id)
                .or_insert_with(|| Arc::new(AttributeReadSite::new(name.clone(), &self.config)))
                .value(),
        );
        if site.name() != name {
            warn!(
                code_id = id.code_id,
                offset = id.offset,
                cached = %site.name(),
                requested = %name,
                "attribute site reused for a different name"
            );
            return Err(IcError::invalid_state(format!(
                "site {}:{} reads '{}', not '{}'",
                id.code_id,
                id.offset,
                site.name(),
                name
            )));
        }
        Ok(site)
    }

    /// Execute the read at site `id`.
    #[inline]
    pub fn load_attr(&self, id: SiteId, name: &InternedString, receiver: &Value) -> IcResult<Value> {
        self.site(id, name)?.read(receiver)
    }

    /// Get an existing site.
    pub fn get(&self, id: SiteId) -> Option<Arc<AttributeReadSite>> {
        self.sites.get(&id).map(|site| Arc::clone(site.value()))
    }

    /// Get the classification of a site.
    pub fn classification(&self, id: SiteId) -> IcClassification {
        self.get(id)
            .map(|site| site.state().classification())
            .unwrap_or(IcClassification::Uninitialized)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get number of sites.
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Sum of all site counters.
    pub fn total_stats(&self) -> StatsSnapshot {
        self.sites
            .iter()
            .fold(StatsSnapshot::default(), |acc, site| acc.merge(site.stats()))
    }

    /// Get breakdown of site classifications.
    pub fn classification_breakdown(&self) -> IcStats {
        let mut stats = IcStats::default();
        for site in self.sites.iter() {
            match site.state().classification() {
                IcClassification::Uninitialized => stats.uninitialized += 1,
                IcClassification::Monomorphic => stats.monomorphic += 1,
                IcClassification::Polymorphic => stats.polymorphic += 1,
                IcClassification::Megamorphic => stats.megamorphic += 1,
            }
        }
        stats
    }

    /// Drop every site.
    pub fn clear(&self) {
        self.sites.clear();
    }
}

impl Default for IcManager {
    fn default() -> Self {
        Self::new(IcConfig::default())
    }
}

// =============================================================================
// IC Statistics
// =============================================================================

/// Statistics about site classifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IcStats {
    /// Number of unspecialized sites.
    pub uninitialized: usize,
    /// Number of monomorphic sites.
    pub monomorphic: usize,
    /// Number of polymorphic sites.
    pub polymorphic: usize,
    /// Number of megamorphic sites.
    pub megamorphic: usize,
}

impl IcStats {
    /// Total sites.
    pub fn total(&self) -> usize {
        self.uninitialized + self.monomorphic + self.polymorphic + self.megamorphic
    }

    /// Percentage that are monomorphic.
    pub fn monomorphic_percentage(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.monomorphic as f32 / total as f32) * 100.0
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::intern;
    use kestrel_runtime::{PyClass, PyInstance, ShapeRegistry};

    #[test]
    fn test_site_created_once() {
        let manager = IcManager::default();
        let id = SiteId::new(1, 10);

        let first = manager.site(id, &intern("x")).unwrap();
        let second = manager.site(id, &intern("x")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.site_count(), 1);
        assert!(manager.get(SiteId::new(1, 11)).is_none());
    }

    #[test]
    fn test_site_name_mismatch() {
        let manager = IcManager::default();
        let id = SiteId::new(1, 10);
        manager.site(id, &intern("x")).unwrap();

        let err = manager.site(id, &intern("y")).unwrap_err();
        assert!(matches!(err, IcError::InvalidState(_)));
    }

    #[test]
    fn test_load_attr_and_breakdown() {
        let registry = ShapeRegistry::new();
        let config = IcConfig::new().with_max_chain_depth(1).unwrap();
        let manager = IcManager::new(config);
        let a = PyClass::new(intern("A"), None, &registry);
        let b = PyClass::new(intern("B"), None, &registry);
        a.set_attr(intern("v"), Value::Int(1), &registry);
        b.set_attr(intern("v"), Value::Int(2), &registry);
        let on_a = Value::Instance(PyInstance::new(a, &registry));
        let on_b = Value::Instance(PyInstance::new(b, &registry));

        let mono = SiteId::new(7, 0);
        let mega = SiteId::new(7, 4);
        let untouched = SiteId::new(7, 8);
        let v = intern("v");

        assert_eq!(manager.load_attr(mono, &v, &on_a), Ok(Value::Int(1)));
        assert_eq!(manager.load_attr(mono, &v, &on_a), Ok(Value::Int(1)));
        assert_eq!(manager.load_attr(mega, &v, &on_a), Ok(Value::Int(1)));
        assert_eq!(manager.load_attr(mega, &v, &on_b), Ok(Value::Int(2)));
        manager.site(untouched, &v).unwrap();

        assert_eq!(manager.classification(mono), IcClassification::Monomorphic);
        assert_eq!(manager.classification(mega), IcClassification::Megamorphic);
        assert_eq!(
            manager.classification_breakdown(),
            IcStats {
                uninitialized: 1,
                monomorphic: 1,
                polymorphic: 0,
                megamorphic: 1,
            }
        );

        let totals = manager.total_stats();
        assert_eq!(totals.reads, 4);
        assert_eq!(totals.hits, 1);
        assert_eq!(totals.generic_reads, 1);

        manager.clear();
        assert_eq!(manager.site_count(), 0);
    }

    #[test]
    fn test_ic_stats_percentages() {
        let stats = IcStats {
            uninitialized: 0,
            monomorphic: 3,
            polymorphic: 1,
            megamorphic: 0,
        };
        assert_eq!(stats.total(), 4);
        assert!((stats.monomorphic_percentage() - 75.0).abs() < 0.01);
        assert_eq!(IcStats::default().monomorphic_percentage(), 0.0);
    }
}
