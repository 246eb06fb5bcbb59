//! Host-facing model for Stasis.
//!
//! Stasis never owns the simulation it gates. This crate defines how it sees
//! the host: entity handles with a liveness oracle, read-only world queries,
//! a topology-agnostic scheduler, and the probe-able internal surface the
//! capability bridge resolves against. The [`sandbox`] module implements all
//! of them in memory for tests and the CLI.

/// Entity handles, identifiers, kinds and positions.
pub mod entity;
/// Error types reported by host collaborators.
pub mod error;
/// In-memory host used by tests and the CLI.
pub mod sandbox;
/// Scheduler abstraction over single and regionized topologies.
pub mod schedule;
/// Probe-able host internals.
pub mod surface;
/// World identifiers and read-only world queries.
pub mod world;

/// Re-export entity types.
pub use entity::{EntityHandle, EntityId, EntityKind, EntityRef, EntityTraits, Position};
/// Re-export error types.
pub use error::{HostError, HostResult};
/// Re-export scheduler types.
pub use schedule::{RegionKey, RepeatingTask, Scheduler, Task, TaskHandle, Topology};
/// Re-export surface types.
pub use surface::{
    AccessTarget, Accessor, AiApi, ApiLevel, FieldValue, HostSurface, InternalType,
    SpawnApi, SpawnCategory, TickRateApi, TickingApi,
};
/// Re-export world types.
pub use world::{ClientSnapshot, WorldId, WorldQuery};
