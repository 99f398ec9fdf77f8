//! Routing policies
//!
//! Pluggable decision points injected into the coordinator at construction.
//! All four share one contract shape: given a candidate (object or type
//! name), the active slices, and a context string, return one or more slice
//! names. A policy that returns no slice, or a name outside the active set,
//! is a broken deployment and surfaces as a fatal configuration error.

use std::sync::Arc;

use rand::Rng;

use super::registry::Slice;
use crate::object::ManagedObject;
use crate::{Result, SliceError};

// ============================================================================
// Policy Traits
// ============================================================================

/// Places a new, non-replicated object on its owning slice.
pub trait DistributionPolicy: Send + Sync {
    fn distribute(
        &self,
        object: &ManagedObject,
        actives: &[Arc<Slice>],
        context: &str,
    ) -> Vec<String>;
}

/// Places a replicated-type object on its owning slices.
pub trait ReplicationPolicy: Send + Sync {
    fn replicate(&self, type_name: &str, actives: &[Arc<Slice>], context: &str) -> Vec<String>;
}

/// Picks the slices a query should touch.
pub trait QueryTargetPolicy: Send + Sync {
    fn targets(&self, query: &str, actives: &[Arc<Slice>], context: &str) -> Vec<String>;
}

/// Picks the slices a find-by-id lookup should probe.
pub trait FinderTargetPolicy: Send + Sync {
    fn targets(&self, type_name: &str, actives: &[Arc<Slice>], context: &str) -> Vec<String>;
}

// ============================================================================
// Default Implementations
// ============================================================================

/// Default distribution: uniformly random among active slices.
#[derive(Debug, Default)]
pub struct RandomDistribution;

impl DistributionPolicy for RandomDistribution {
    fn distribute(&self, _: &ManagedObject, actives: &[Arc<Slice>], _: &str) -> Vec<String> {
        if actives.is_empty() {
            return Vec::new();
        }
        let pick = rand::thread_rng().gen_range(0..actives.len());
        vec![actives[pick].name().to_string()]
    }
}

/// Default replication: every active slice.
#[derive(Debug, Default)]
pub struct FullReplication;

impl ReplicationPolicy for FullReplication {
    fn replicate(&self, _: &str, actives: &[Arc<Slice>], _: &str) -> Vec<String> {
        actives.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Default query/finder target: every active slice. Callers narrow the set
/// with an explicit per-operation hint instead of a custom policy.
#[derive(Debug, Default)]
pub struct AllSliceTargets;

impl QueryTargetPolicy for AllSliceTargets {
    fn targets(&self, _: &str, actives: &[Arc<Slice>], _: &str) -> Vec<String> {
        actives.iter().map(|s| s.name().to_string()).collect()
    }
}

impl FinderTargetPolicy for AllSliceTargets {
    fn targets(&self, _: &str, actives: &[Arc<Slice>], _: &str) -> Vec<String> {
        actives.iter().map(|s| s.name().to_string()).collect()
    }
}

// ============================================================================
// Policy Set
// ============================================================================

/// The four policies, injected together at construction.
pub struct PolicySet {
    pub distribution: Box<dyn DistributionPolicy>,
    pub replication: Box<dyn ReplicationPolicy>,
    pub query_target: Box<dyn QueryTargetPolicy>,
    pub finder_target: Box<dyn FinderTargetPolicy>,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            distribution: Box::new(RandomDistribution),
            replication: Box::new(FullReplication),
            query_target: Box::new(AllSliceTargets),
            finder_target: Box::new(AllSliceTargets),
        }
    }
}

impl PolicySet {
    pub fn with_distribution(mut self, policy: Box<dyn DistributionPolicy>) -> Self {
        self.distribution = policy;
        self
    }

    pub fn with_replication(mut self, policy: Box<dyn ReplicationPolicy>) -> Self {
        self.replication = policy;
        self
    }

    pub fn with_query_target(mut self, policy: Box<dyn QueryTargetPolicy>) -> Self {
        self.query_target = policy;
        self
    }

    pub fn with_finder_target(mut self, policy: Box<dyn FinderTargetPolicy>) -> Self {
        self.finder_target = policy;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a policy decision against the active slice set.
///
/// An empty decision or an unknown slice name is a deployment defect and is
/// raised immediately, never silently corrected or retried.
pub(crate) fn validate_decision(
    policy: &'static str,
    candidate: &str,
    names: Vec<String>,
    actives: &[Arc<Slice>],
) -> Result<Vec<String>> {
    if names.is_empty() {
        return Err(SliceError::EmptyPolicyResult {
            policy,
            candidate: candidate.to_string(),
        });
    }
    for name in &names {
        if !actives.iter().any(|s| s.name() == name) {
            return Err(SliceError::UnknownPolicySlice {
                policy,
                slice: name.clone(),
            });
        }
    }
    Ok(names)
}

// ============================================================================
// Tests
// ============================================================================
