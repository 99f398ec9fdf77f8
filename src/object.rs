//! Managed object handle and routing metadata
//!
//! The coordinator never owns an entity's identity or field state; it only
//! attaches a routing annotation (the resolved owning slice names) and reads
//! a version cell so replicated flushes can restore versions after a partial
//! failure.

use parking_lot::{Mutex, RwLock};

// ============================================================================
// Slice Assignment
// ============================================================================

/// The resolved owning slice name(s) of a managed object.
///
/// Single-element for distributed objects, multi-element for replicated
/// ones. Order follows the producing policy and is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceAssignment {
    names: Vec<String>,
}

impl SliceAssignment {
    /// Assignment to a single slice.
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
        }
    }

    /// Assignment to multiple slices, dropping duplicates but keeping order.
    pub fn new(names: Vec<String>) -> Self {
        let mut seen = Vec::with_capacity(names.len());
        for name in names {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        Self { names: seen }
    }

    /// The slice names, in policy order.
    pub fn slices(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================================
// Managed Object
// ============================================================================

/// An opaque handle to an entity instance plus its routing metadata.
///
/// The upstream persistence context owns the entity; the coordinator reads
/// and writes only the assignment annotation and the optimistic version
/// cell. Once assigned, an object resolves to the same slice(s) for its
/// whole lifetime.
#[derive(Debug)]
pub struct ManagedObject {
    id: u64,
    type_name: String,
    version: Mutex<u64>,
    assignment: RwLock<Option<SliceAssignment>>,
}

impl ManagedObject {
    pub fn new(id: u64, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            version: Mutex::new(0),
            assignment: RwLock::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Current optimistic version value.
    pub fn version(&self) -> u64 {
        *self.version.lock()
    }

    /// Overwrite the version cell. Used by stores when a flush succeeds and
    /// by the flush coordinator when restoring a snapshotted version.
    pub fn set_version(&self, version: u64) {
        *self.version.lock() = version;
    }

    /// Whether routing metadata has already been resolved for this object.
    pub fn is_assigned(&self) -> bool {
        self.assignment.read().is_some()
    }

    /// The cached assignment, if any.
    pub fn assignment(&self) -> Option<SliceAssignment> {
        self.assignment.read().clone()
    }

    /// Cache the resolved assignment onto the object.
    pub fn assign(&self, assignment: SliceAssignment) {
        *self.assignment.write() = Some(assignment);
    }
}

// ============================================================================
// Tests
// ============================================================================
