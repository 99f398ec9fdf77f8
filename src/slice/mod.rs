//! Slice management
//!
//! Everything that decides *where* a managed object or query goes.
//!
//! Architecture:
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SliceRegistry                                           │
//! │  - Holds the configured physical slices                  │
//! │  - Probes connectivity at startup and on add-slice       │
//! │  - Tracks the master slice for sequence generation       │
//! ├──────────────────────────────────────────────────────────┤
//! │  Routing Policies                                        │
//! │  - DistributionPolicy: owner of a new object             │
//! │  - ReplicationPolicy: owners of a replicated type        │
//! │  - Query/FinderTargetPolicy: slices a read should touch  │
//! ├──────────────────────────────────────────────────────────┤
//! │  AssignmentResolver                                      │
//! │  - Cached metadata first, then origin hint, then policy  │
//! │  - Writes the decision back so routing stays idempotent  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod assignment;
pub mod policy;
pub mod registry;

pub use assignment::{AssignmentResolver, ReplicatedTypes};
pub use policy::{
    DistributionPolicy, FinderTargetPolicy, PolicySet, QueryTargetPolicy, ReplicationPolicy,
};
pub use registry::{Slice, SliceRegistry, SliceStatus};
