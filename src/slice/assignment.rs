//! Slice assignment resolution
//!
//! Decides which slice(s) own a managed object, in strict precedence order:
//! cached metadata on the object, then the origin hint of a query-loaded
//! object, then the replication policy for replicated types, then the
//! distribution policy. The decision is written back onto the object, so
//! routing is idempotent for the object's lifetime.

use std::sync::Arc;

use ahash::AHashSet;

use super::policy::{validate_decision, PolicySet};
use super::registry::SliceRegistry;
use crate::object::{ManagedObject, SliceAssignment};
use crate::Result;

// ============================================================================
// Replicated Types
// ============================================================================

/// The set of entity type names mirrored on every active slice.
///
/// Computed once from configuration and cached; a type is either replicated
/// or singly-owned, never both.
#[derive(Debug, Default)]
pub struct ReplicatedTypes {
    names: AHashSet<String>,
}

impl ReplicatedTypes {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.names.contains(type_name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================================
// Assignment Resolver
// ============================================================================

/// Resolves and caches the owning slice(s) of managed objects.
pub struct AssignmentResolver {
    registry: Arc<SliceRegistry>,
    policies: PolicySet,
    replicated: ReplicatedTypes,
}

impl AssignmentResolver {
    pub fn new(
        registry: Arc<SliceRegistry>,
        policies: PolicySet,
        replicated: ReplicatedTypes,
    ) -> Self {
        Self {
            registry,
            policies,
            replicated,
        }
    }

    pub fn replicated(&self) -> &ReplicatedTypes {
        &self.replicated
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Whether the object's type is mirrored on every active slice.
    pub fn is_replicated(&self, object: &ManagedObject) -> bool {
        self.replicated.contains(object.type_name())
    }

    /// Resolve the owning slice(s) of `object`.
    ///
    /// `origin` names the slice whose query result materialized the object,
    /// when known. Replicated types ignore the hint: they must land on every
    /// replica regardless of which one they were read from. The resolved
    /// assignment is cached on the object before returning, so the first
    /// branch short-circuits every subsequent call.
    pub fn resolve(
        &self,
        object: &ManagedObject,
        origin: Option<&str>,
        context: &str,
    ) -> Result<SliceAssignment> {
        if let Some(existing) = object.assignment() {
            return Ok(existing);
        }

        let actives = self.registry.active_slices();
        let assignment = if self.is_replicated(object) {
            let names = self
                .policies
                .replication
                .replicate(object.type_name(), &actives, context);
            let names =
                validate_decision("ReplicationPolicy", object.type_name(), names, &actives)?;
            SliceAssignment::new(names)
        } else if let Some(origin) = origin {
            // adopted verbatim: the hint came from an actual slice result
            self.registry.expect_slice(origin)?;
            SliceAssignment::single(origin)
        } else {
            let names = self
                .policies
                .distribution
                .distribute(object, &actives, context);
            let candidate = format!("{}#{}", object.type_name(), object.id());
            let names = validate_decision("DistributionPolicy", &candidate, names, &actives)?;
            SliceAssignment::new(names)
        };

        object.assign(assignment.clone());
        Ok(assignment)
    }
}

// ============================================================================
// Tests
// ============================================================================
