//! Slice registry
//!
//! Owns the set of configured physical slices. Built once at startup from
//! the distributed configuration; each slice is probed for connectivity and
//! either activated, tolerated as inactive (lenient mode), or treated as a
//! fatal startup error (strict mode). Slices can be appended at runtime for
//! dynamic scale-out; the list is read-concurrent and mutated only by that
//! administrative path.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::{DistributedConfig, SliceDef};
use crate::store::{SliceStore, StoreFactory};
use crate::{Result, SliceError};

// ============================================================================
// Slice
// ============================================================================

/// Activation status of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceStatus {
    /// Slice is reachable and participates in routing.
    Active,
    /// Slice failed its connectivity probe and is skipped by routing.
    Inactive,
}

/// One physical database participating in the distributed store.
pub struct Slice {
    name: String,
    status: RwLock<SliceStatus>,
    store: Arc<dyn SliceStore>,
    created_at: i64,
}

impl Slice {
    fn new(name: impl Into<String>, store: Arc<dyn SliceStore>) -> Self {
        Self {
            name: name.into(),
            status: RwLock::new(SliceStatus::Inactive),
            store,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SliceStatus {
        *self.status.read()
    }

    pub fn is_active(&self) -> bool {
        self.status() == SliceStatus::Active
    }

    pub fn store(&self) -> &Arc<dyn SliceStore> {
        &self.store
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    fn set_status(&self, status: SliceStatus) {
        *self.status.write() = status;
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

// ============================================================================
// Slice Registry
// ============================================================================

/// Registry of all configured slices, in configuration order.
#[derive(Debug)]
pub struct SliceRegistry {
    slices: RwLock<Vec<Arc<Slice>>>,
    master: String,
    lenient: bool,
}

impl SliceRegistry {
    /// Build the registry from configuration, probing every slice.
    ///
    /// Lenient mode logs and deactivates unreachable slices; strict mode
    /// aborts with an error naming the first unreachable slice. Ending up
    /// with zero active slices is fatal in either mode.
    pub fn open(config: &DistributedConfig, factory: &StoreFactory) -> Result<Self> {
        config.validate()?;

        let mut slices = Vec::with_capacity(config.slices.len());
        for def in &config.slices {
            let slice = Self::connect(def, factory, config.lenient)?;
            slices.push(slice);
        }

        let active = slices.iter().filter(|s| s.is_active()).count();
        if active == 0 {
            return Err(SliceError::NoActiveSlice);
        }
        log::info!(
            "slice registry opened with {} active of {} configured slices",
            active,
            slices.len()
        );

        // master existence was checked by config.validate()
        let master = config.master_name().unwrap_or_default().to_string();

        Ok(Self {
            slices: RwLock::new(slices),
            master,
            lenient: config.lenient,
        })
    }

    /// Create, probe, and status a slice. A probe failure is fatal unless
    /// `lenient` is set.
    fn connect(def: &SliceDef, factory: &StoreFactory, lenient: bool) -> Result<Arc<Slice>> {
        let store = factory(def)?;
        let slice = Arc::new(Slice::new(&def.name, store));
        log::info!("connecting to slice '{}'", def.name);
        match slice.store.probe() {
            Ok(()) => slice.set_status(SliceStatus::Active),
            Err(e) if lenient => {
                log::warn!("slice '{}' unreachable, marked inactive: {}", def.name, e);
            }
            Err(e) => {
                return Err(SliceError::Connect {
                    slice: def.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(slice)
    }

    /// All active slices, in configuration order.
    pub fn active_slices(&self) -> Vec<Arc<Slice>> {
        self.slices
            .read()
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    /// Names of all active slices, in configuration order.
    pub fn active_names(&self) -> Vec<String> {
        self.active_slices()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Look up a slice by name, irrespective of status.
    pub fn slice(&self, name: &str) -> Option<Arc<Slice>> {
        self.slices
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Like [`slice`](Self::slice), but a missing name is an error.
    pub fn expect_slice(&self, name: &str) -> Result<Arc<Slice>> {
        self.slice(name)
            .ok_or_else(|| SliceError::SliceNotFound(name.to_string()))
    }

    /// The master slice used for sequence generation.
    pub fn master_slice(&self) -> Result<Arc<Slice>> {
        self.expect_slice(&self.master)
    }

    pub fn len(&self) -> usize {
        self.slices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.read().is_empty()
    }

    /// Append a new slice at runtime (dynamic scale-out).
    ///
    /// The slice is probed the same way as at startup, but a probe failure
    /// here is always an error: an administrator adding a dead slice should
    /// hear about it. In-flight operations keep the slice list they already
    /// read; the new slice becomes visible to subsequent operations.
    pub fn add_slice(&self, def: &SliceDef, factory: &StoreFactory) -> Result<Arc<Slice>> {
        if self.slice(&def.name).is_some() {
            return Err(SliceError::Config(format!(
                "slice '{}' already exists",
                def.name
            )));
        }
        let slice = Self::connect(def, factory, false)?;
        self.slices.write().push(slice.clone());
        log::info!("slice '{}' added at runtime", def.name);
        Ok(slice)
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{RowStream, TranslatedQuery};
    use std::sync::Arc;

    /// A store whose connectivity probe always fails.
    struct UnreachableStore;

    impl SliceStore for UnreachableStore {
        fn probe(&self) -> Result<()> {
            Err(SliceError::Internal("connection refused".into()))
        }
        fn flush(&self, _: &[Arc<crate::object::ManagedObject>]) -> Vec<SliceError> {
            Vec::new()
        }
        fn execute_query(&self, _: &TranslatedQuery) -> Result<RowStream> {
            Ok(Box::new(std::iter::empty()))
        }
        fn commit(&self) -> Result<()> {
            Ok(())
        }
        fn rollback(&self) -> Result<()> {
            Ok(())
        }
        fn next_sequence(&self, _: &str) -> Result<u64> {
            Ok(0)
        }
    }

    fn factory(def: &SliceDef) -> Result<Arc<dyn SliceStore>> {
        if def.params.contains_key("unreachable") {
            Ok(Arc::new(UnreachableStore))
        } else {
            Ok(MemoryStore::new(&def.name) as Arc<dyn SliceStore>)
        }
    }

    fn two_slice_config() -> DistributedConfig {
        DistributedConfig::new(vec![SliceDef::new("one"), SliceDef::new("two")])
    }

    #[test]
    fn test_open_activates_all() {
        let registry = SliceRegistry::open(&two_slice_config(), &factory).unwrap();
        assert_eq!(registry.active_names(), vec!["one", "two"]);
        assert_eq!(registry.master_slice().unwrap().name(), "one");
    }

    #[test]
    fn test_lenient_deactivates_unreachable() {
        let config = DistributedConfig::new(vec![
            SliceDef::new("good"),
            SliceDef::new("bad").with_param("unreachable", "true"),
        ]);
        let registry = SliceRegistry::open(&config, &factory).unwrap();
        assert_eq!(registry.active_names(), vec!["good"]);
        assert_eq!(registry.slice("bad").unwrap().status(), SliceStatus::Inactive);
    }

    #[test]
    fn test_strict_aborts_on_unreachable() {
        let config = DistributedConfig::new(vec![
            SliceDef::new("good"),
            SliceDef::new("bad").with_param("unreachable", "true"),
        ])
        .strict();
        let err = SliceRegistry::open(&config, &factory).unwrap_err();
        match err {
            SliceError::Connect { slice, .. } => assert_eq!(slice, "bad"),
            other => panic!("expected Connect error, got {:?}", other),
        }
    }

    #[test]
    fn test_all_unreachable_is_fatal_even_lenient() {
        let config = DistributedConfig::new(vec![
            SliceDef::new("bad").with_param("unreachable", "true")
        ]);
        assert!(matches!(
            SliceRegistry::open(&config, &factory),
            Err(SliceError::NoActiveSlice)
        ));
    }

    #[test]
    fn test_add_slice() {
        let registry = SliceRegistry::open(&two_slice_config(), &factory).unwrap();
        registry
            .add_slice(&SliceDef::new("three"), &factory)
            .unwrap();
        assert_eq!(registry.active_names(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let registry = SliceRegistry::open(&two_slice_config(), &factory).unwrap();
        assert!(registry.add_slice(&SliceDef::new("one"), &factory).is_err());
    }

    #[test]
    fn test_add_unreachable_rejected() {
        let registry = SliceRegistry::open(&two_slice_config(), &factory).unwrap();
        let def = SliceDef::new("bad").with_param("unreachable", "true");
        assert!(matches!(
            registry.add_slice(&def, &factory),
            Err(SliceError::Connect { .. })
        ));
        assert!(registry.slice("bad").is_none());
    }

    #[test]
    fn test_explicit_master() {
        let config = two_slice_config().master("two");
        let registry = SliceRegistry::open(&config, &factory).unwrap();
        assert_eq!(registry.master_slice().unwrap().name(), "two");
    }
}
