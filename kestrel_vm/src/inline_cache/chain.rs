//! Self-specializing attribute-read chains.
//!
//! Each call site owns a singly linked chain of nodes:
//!
//! ```text
//! head ──▶ Cached(guard₀) ──▶ Cached(guard₁) ──▶ ... ──▶ Uninitialized | Generic
//! ```
//!
//! A read walks the chain in order. The first `Cached` node whose guard passes
//! answers the read from its storage location. A read that falls off the end
//! lands on the terminal node:
//!
//! - `Uninitialized` resolves the attribute and splices a new `Cached` node in
//!   its place, followed by a fresh `Uninitialized` terminal. Once the chain
//!   holds `max_chain_depth` cached nodes it becomes `Generic` instead.
//! - `Generic` resolves by name on every read and is never rewritten.
//!
//! # Rewriting
//!
//! Every rewrite is a compare-and-swap of one parent link from the node the
//! writer observed to its replacement. Published nodes are never mutated. A
//! lost race only costs a later re-specialization; a link that holds `Generic`
//! is never overwritten.
//!
//! Pruning a stale node retires its `next` link under the parent's lock and
//! moves whatever that link held into the parent. A retired link refuses every
//! later rewrite, so a `Generic` installed below a pruned node is either
//! carried up or was never installed.

use crate::config::IcConfig;
use crate::inline_cache::guard::{Guard, GuardKind, Probe};
use crate::inline_cache::stats::{SiteStats, StatsSnapshot};
use crate::resolver::Resolver;
use kestrel_core::{AttributeError, IcError, IcResult, InternedString, ValueKind};
use kestrel_runtime::{Receiver, StorageLocation, Value};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

// =============================================================================
// Chain Nodes
// =============================================================================

/// One node of a call-site chain.
#[derive(Debug)]
pub enum ChainNode {
    /// Not specialized yet.
    Uninitialized,
    /// Guarded fast path.
    Cached(CachedNode),
    /// Megamorphic fallback; always resolves by name.
    Generic,
}

/// A guarded fast path and the rest of the chain.
#[derive(Debug)]
pub struct CachedNode {
    guard: Guard,
    location: StorageLocation,
    next: Link,
}

impl CachedNode {
    /// Get the guard.
    #[inline]
    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    /// Get the cached storage location.
    #[inline]
    pub fn location(&self) -> StorageLocation {
        self.location
    }
}

/// An atomically replaceable reference to a chain node.
pub struct Link {
    slot: RwLock<Slot>,
}

struct Slot {
    node: Arc<ChainNode>,
    /// Set once the owning node has been pruned from the chain.
    retired: bool,
}

impl Link {
    fn new(node: ChainNode) -> Self {
        Self {
            slot: RwLock::new(Slot {
                node: Arc::new(node),
                retired: false,
            }),
        }
    }

    /// Current node.
    #[inline]
    fn load(&self) -> Arc<ChainNode> {
        Arc::clone(&self.slot.read().node)
    }

    /// Swap `expected` for `node`.
    ///
    /// Fails if the link no longer holds `expected`, already holds `Generic`,
    /// or has been retired.
    fn replace(&self, expected: &Arc<ChainNode>, node: Arc<ChainNode>) -> bool {
        let mut slot = self.slot.write();
        if slot.retired
            || !Arc::ptr_eq(&slot.node, expected)
            || matches!(*slot.node, ChainNode::Generic)
        {
            return false;
        }
        slot.node = node;
        true
    }

    /// Unlink the cached node `expected` and splice its successor in.
    ///
    /// The successor link is retired and read under this link's lock, so no
    /// rewrite of it can land after the snapshot.
    fn prune(&self, expected: &Arc<ChainNode>) -> bool {
        let ChainNode::Cached(stale) = &**expected else {
            return false;
        };
        let mut slot = self.slot.write();
        if slot.retired || !Arc::ptr_eq(&slot.node, expected) {
            return false;
        }
        slot.node = stale.next.retire();
        true
    }

    /// Freeze the link and return its final node.
    fn retire(&self) -> Arc<ChainNode> {
        let mut slot = self.slot.write();
        slot.retired = true;
        Arc::clone(&slot.node)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.load(), f)
    }
}

// =============================================================================
// Chain Inspection
// =============================================================================

/// How a chain ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// More receivers can still be specialized.
    Uninitialized,
    /// The chain stopped growing.
    Generic,
}

/// Classification of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcClassification {
    /// Never specialized.
    Uninitialized,
    /// One cached node.
    Monomorphic,
    /// Several cached nodes.
    Polymorphic,
    /// Fell back to Generic.
    Megamorphic,
}

/// Snapshot of a chain's structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    /// Guard kinds of the cached nodes, head first.
    pub guards: Vec<GuardKind>,
    /// Terminal node.
    pub terminal: Terminal,
}

impl ChainState {
    /// Number of cached nodes.
    #[inline]
    pub fn cached_len(&self) -> usize {
        self.guards.len()
    }

    /// Check if the chain ends in `Generic`.
    #[inline]
    pub fn is_generic(&self) -> bool {
        self.terminal == Terminal::Generic
    }

    /// Classify the site.
    pub fn classification(&self) -> IcClassification {
        match (self.terminal, self.guards.len()) {
            (Terminal::Generic, _) => IcClassification::Megamorphic,
            (Terminal::Uninitialized, 0) => IcClassification::Uninitialized,
            (Terminal::Uninitialized, 1) => IcClassification::Monomorphic,
            (Terminal::Uninitialized, _) => IcClassification::Polymorphic,
        }
    }
}

// =============================================================================
// Attribute Read Site
// =============================================================================

/// The inline cache of one attribute-read call site.
#[derive(Debug)]
pub struct AttributeReadSite {
    name: InternedString,
    head: Link,
    max_chain_depth: usize,
    resolver: Resolver,
    stats: SiteStats,
}

impl AttributeReadSite {
    /// Create an unspecialized site reading `name`.
    pub fn new(name: InternedString, config: &IcConfig) -> Self {
        Self {
            name,
            head: Link::new(ChainNode::Uninitialized),
            max_chain_depth: config.max_chain_depth(),
            resolver: Resolver::new(config),
            stats: SiteStats::new(),
        }
    }

    /// Get the attribute name.
    #[inline]
    pub fn name(&self) -> &InternedString {
        &self.name
    }

    /// Get the polymorphism limit.
    #[inline]
    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    /// Read the attribute from `value`.
    pub fn read(&self, value: &Value) -> IcResult<Value> {
        match Receiver::from_value(value) {
            Some(receiver) => self.read_receiver(receiver),
            None => Err(AttributeError::new(self.name.clone(), value.type_name()).into()),
        }
    }

    /// Read the attribute from a receiver.
    #[inline]
    pub fn read_receiver(&self, receiver: Receiver<'_>) -> IcResult<Value> {
        self.stats.record_read();
        self.read_link(&self.head, 0, receiver)
    }

    /// Read an attribute expected to hold an `int`.
    pub fn read_int(&self, value: &Value) -> IcResult<i64> {
        let result = self.read(value)?;
        result.as_int().ok_or_else(|| unexpected(ValueKind::Int, &result))
    }

    /// Read an attribute expected to hold a `float`.
    pub fn read_float(&self, value: &Value) -> IcResult<f64> {
        let result = self.read(value)?;
        result.as_float().ok_or_else(|| unexpected(ValueKind::Float, &result))
    }

    /// Read an attribute expected to hold a `bool`.
    pub fn read_bool(&self, value: &Value) -> IcResult<bool> {
        let result = self.read(value)?;
        result.as_bool().ok_or_else(|| unexpected(ValueKind::Bool, &result))
    }

    /// Inspect the chain.
    pub fn state(&self) -> ChainState {
        let mut guards = Vec::new();
        let mut node = self.head.load();
        let terminal = loop {
            let next = match &*node {
                ChainNode::Cached(cached) => {
                    guards.push(cached.guard.kind());
                    cached.next.load()
                }
                ChainNode::Uninitialized => break Terminal::Uninitialized,
                ChainNode::Generic => break Terminal::Generic,
            };
            node = next;
        };
        ChainState { guards, terminal }
    }

    /// Get a snapshot of the site counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Read through `link`, which sits below `position` cached nodes.
    fn read_link(&self, link: &Link, position: usize, receiver: Receiver<'_>) -> IcResult<Value> {
        loop {
            let node = link.load();
            match &*node {
                ChainNode::Cached(cached) => match cached.guard.probe(receiver, cached.location)? {
                    Probe::Hit(value) => {
                        self.stats.record_hit();
                        return Ok(value);
                    }
                    Probe::Miss => {
                        trace!(attribute = %self.name, position, "guard miss");
                        self.stats.record_miss();
                        return self.read_link(&cached.next, position + 1, receiver);
                    }
                    Probe::Stale => {
                        if link.prune(&node) {
                            trace!(attribute = %self.name, position, "pruned stale node");
                            self.stats.record_prune();
                            continue;
                        }
                        // A retired link keeps its stale node; step past it.
                        if Arc::ptr_eq(&link.load(), &node) {
                            return self.read_link(&cached.next, position + 1, receiver);
                        }
                    }
                },
                ChainNode::Uninitialized => return self.specialize(link, &node, position, receiver),
                ChainNode::Generic => {
                    self.stats.record_generic_read();
                    return self.resolver.lookup(receiver, &self.name);
                }
            }
        }
    }

    /// Replace the `Uninitialized` terminal at `link`.
    #[cold]
    fn specialize(
        &self,
        link: &Link,
        expected: &Arc<ChainNode>,
        position: usize,
        receiver: Receiver<'_>,
    ) -> IcResult<Value> {
        if position >= self.max_chain_depth {
            if link.replace(expected, Arc::new(ChainNode::Generic)) {
                debug!(
                    attribute = %self.name,
                    cached = position,
                    "attribute read fell back to generic"
                );
                self.stats.record_generalization();
            }
            self.stats.record_generic_read();
            return self.resolver.lookup(receiver, &self.name);
        }

        let resolution = self.resolver.resolve(receiver, &self.name)?;
        let guard = Guard::for_resolution(&resolution)?;
        let kind = guard.kind();
        let node = ChainNode::Cached(CachedNode {
            guard,
            location: resolution.location,
            next: Link::new(ChainNode::Uninitialized),
        });
        if link.replace(expected, Arc::new(node)) {
            debug!(
                attribute = %self.name,
                depth = resolution.depth,
                guard = ?kind,
                position,
                "specialized attribute read"
            );
            self.stats.record_specialization();
        }
        Ok(resolution.value)
    }
}

fn unexpected(expected: ValueKind, found: &Value) -> IcError {
    IcError::UnexpectedResult {
        expected,
        found: found.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
