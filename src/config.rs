//! Startup configuration
//!
//! The typed configuration the coordinator consumes at startup. Property
//! file parsing happens upstream; this module only validates the resulting
//! struct: slice definitions, replicated type names, connectivity strictness
//! and the master slice used for sequence generation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Result, SliceError};

/// Definition of one physical slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceDef {
    /// Unique slice name.
    pub name: String,
    /// Opaque connection parameters handed to the store factory.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl SliceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Configuration for the whole distributed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// The slices, in configured order. Order matters: it is the registry
    /// order used by flush and concatenating merges, and the first slice is
    /// the default master.
    pub slices: Vec<SliceDef>,
    /// Entity type names mirrored on every active slice.
    #[serde(default)]
    pub replicated_types: Vec<String>,
    /// Lenient mode tolerates unreachable slices at startup by marking them
    /// inactive; strict mode fails startup instead.
    #[serde(default = "default_lenient")]
    pub lenient: bool,
    /// Name of the master slice (sequence generation). Defaults to the
    /// first configured slice.
    #[serde(default)]
    pub master: Option<String>,
    /// Worker pool size shared by flush and query fan-out. Zero means one
    /// worker per available CPU core.
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_lenient() -> bool {
    true
}

impl DistributedConfig {
    pub fn new(slices: Vec<SliceDef>) -> Self {
        Self {
            slices,
            replicated_types: Vec::new(),
            lenient: true,
            master: None,
            worker_threads: 0,
        }
    }

    pub fn replicate(mut self, type_name: impl Into<String>) -> Self {
        self.replicated_types.push(type_name.into());
        self
    }

    pub fn strict(mut self) -> Self {
        self.lenient = false;
        self
    }

    pub fn master(mut self, name: impl Into<String>) -> Self {
        self.master = Some(name.into());
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// The effective master slice name.
    pub fn master_name(&self) -> Option<&str> {
        self.master
            .as_deref()
            .or_else(|| self.slices.first().map(|s| s.name.as_str()))
    }

    /// Validate structural invariants before the registry is built.
    pub fn validate(&self) -> Result<()> {
        if self.slices.is_empty() {
            return Err(SliceError::Config("no slices configured".into()));
        }
        for (i, def) in self.slices.iter().enumerate() {
            if def.name.is_empty() {
                return Err(SliceError::Config(format!("slice {} has an empty name", i)));
            }
            if self.slices[..i].iter().any(|d| d.name == def.name) {
                return Err(SliceError::Config(format!(
                    "duplicate slice name '{}'",
                    def.name
                )));
            }
        }
        if let Some(master) = &self.master {
            if !self.slices.iter().any(|d| &d.name == master) {
                return Err(SliceError::Config(format!(
                    "master slice '{}' is not a configured slice",
                    master
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let config = DistributedConfig::new(vec![SliceDef::new("one"), SliceDef::new("two")]);
        assert!(config.validate().is_ok());
        assert_eq!(config.master_name(), Some("one"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = DistributedConfig::new(vec![SliceDef::new("one"), SliceDef::new("one")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_master_rejected() {
        let config =
            DistributedConfig::new(vec![SliceDef::new("one")]).master("nope");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_config_rejected() {
        let config = DistributedConfig::new(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_master() {
        let config = DistributedConfig::new(vec![SliceDef::new("one"), SliceDef::new("two")])
            .master("two");
        assert!(config.validate().is_ok());
        assert_eq!(config.master_name(), Some("two"));
    }
}
