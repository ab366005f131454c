//! Inline-cache configuration.
//!
//! Resolved once when a VM is created and immutable afterwards; call sites copy
//! the limits they need at construction time.

use thiserror::Error;

/// Environment variable overriding `max_chain_depth`.
pub const ENV_MAX_DEPTH: &str = "KESTREL_IC_MAX_DEPTH";
/// Environment variable overriding `max_hierarchy_depth`.
pub const ENV_MAX_HIERARCHY: &str = "KESTREL_IC_MAX_HIERARCHY";
/// When set to a truthy value, the `KESTREL_*` overrides are ignored.
pub const ENV_IGNORE: &str = "KESTREL_IGNORE_ENV";

// =============================================================================
// Errors
// =============================================================================

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A limit was zero.
    #[error("{name} must be at least 1")]
    Zero {
        /// Setting name.
        name: &'static str,
    },

    /// An environment override did not parse as a positive integer.
    #[error("{var}={value:?} is not a positive integer")]
    Unparsable {
        /// Environment variable.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

// =============================================================================
// IC Configuration
// =============================================================================

/// Limits applied by every attribute-read call site.
///
/// Fields are private so every instance has passed [`IcConfig::validate`]:
///
/// ```compile_fail
/// let config = kestrel_vm::IcConfig { max_chain_depth: 0, max_hierarchy_depth: 1 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcConfig {
    /// Maximum `Cached` nodes per call site before falling back to Generic.
    max_chain_depth: usize,

    /// Maximum superclass hops walked by the resolver and the chain guard.
    max_hierarchy_depth: usize,
}

impl IcConfig {
    /// Default polymorphism limit.
    pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 4;
    /// Default hierarchy walk limit.
    pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 256;

    /// Default limits.
    pub const fn new() -> Self {
        Self {
            max_chain_depth: Self::DEFAULT_MAX_CHAIN_DEPTH,
            max_hierarchy_depth: Self::DEFAULT_MAX_HIERARCHY_DEPTH,
        }
    }

    /// Resolve the configuration from process environment variables.
    ///
    /// Unset variables keep their defaults. Nothing is read when
    /// `KESTREL_IGNORE_ENV` is truthy.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        if Self::truthy(lookup(ENV_IGNORE)) {
            return Ok(config);
        }

        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            config.max_chain_depth = Self::parse_limit(ENV_MAX_DEPTH, raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_HIERARCHY) {
            config.max_hierarchy_depth = Self::parse_limit(ENV_MAX_HIERARCHY, raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Maximum `Cached` nodes per call site.
    #[inline]
    pub const fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    /// Maximum superclass hops walked per resolution.
    #[inline]
    pub const fn max_hierarchy_depth(&self) -> usize {
        self.max_hierarchy_depth
    }

    /// Override the polymorphism limit.
    pub fn with_max_chain_depth(self, depth: usize) -> Result<Self, ConfigError> {
        let config = Self {
            max_chain_depth: depth,
            ..self
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the hierarchy walk limit.
    pub fn with_max_hierarchy_depth(self, depth: usize) -> Result<Self, ConfigError> {
        let config = Self {
            max_hierarchy_depth: depth,
            ..self
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every limit is positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chain_depth == 0 {
            return Err(ConfigError::Zero {
                name: "max_chain_depth",
            });
        }
        if self.max_hierarchy_depth == 0 {
            return Err(ConfigError::Zero {
                name: "max_hierarchy_depth",
            });
        }
        Ok(())
    }

    /// Check if a variable is set to a non-empty, truthy value.
    #[inline]
    fn truthy(value: Option<String>) -> bool {
        value.is_some_and(|v| !v.is_empty() && v != "0")
    }

    fn parse_limit(var: &'static str, raw: String) -> Result<usize, ConfigError> {
        match raw.trim().parse::<usize>() {
            Ok(0) | Err(_) => Err(ConfigError::Unparsable { var, value: raw }),
            Ok(value) => Ok(value),
        }
    }
}

impl Default for IcConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
