//! The host's probe-able internal surface.
//!
//! Hosts differ across versions: a capability might be offered through a
//! stable API, through a fragile extended API, or only by poking an internal
//! slot whose name changes between releases. This module describes those
//! three layers so the engine can resolve each capability once at startup.

use std::fmt;
use std::sync::Arc;

use crate::entity::EntityHandle;
use crate::error::HostResult;
use crate::world::WorldId;

/// Internal host types whose slots may be looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InternalType {
    /// Base entity type.
    Entity,
    /// Mob type carrying behaviour AI.
    Mob,
    /// The server singleton.
    Server,
    /// A world's tuning configuration.
    WorldConfig,
}

impl fmt::Display for InternalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Mob => write!(f, "mob"),
            Self::Server => write!(f, "server"),
            Self::WorldConfig => write!(f, "world config"),
        }
    }
}

/// A value read from or written to an internal slot.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean slot.
    Bool(bool),
    /// Integer slot of any width.
    Int(i64),
    /// Floating point slot.
    Float(f64),
    /// Array of recent samples, most recent first.
    Samples(Vec<f64>),
}

impl FieldValue {
    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Samples(_) => "samples",
        }
    }
}

/// What an accessor reads or writes.
#[derive(Clone, Copy)]
pub enum AccessTarget<'a> {
    /// An entity instance.
    Entity(&'a dyn EntityHandle),
    /// The server singleton.
    Server,
    /// A world's configuration.
    World(&'a WorldId),
}

/// A resolved internal slot.
pub trait Accessor: Send + Sync {
    /// The name under which the slot was resolved.
    fn name(&self) -> &str;

    /// Read the slot.
    fn get(&self, target: AccessTarget<'_>) -> HostResult<FieldValue>;

    /// Write the slot.
    fn set(&self, target: AccessTarget<'_>, value: FieldValue) -> HostResult<()>;
}

/// Which API layer a binding comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiLevel {
    /// Stable public host API.
    Public,
    /// Documented but version-fragile extension API.
    Extended,
}

/// Toggle whether an entity's per-step update runs.
pub trait TickingApi: Send + Sync {
    /// Enable or disable ticking.
    fn set_ticking(&self, entity: &dyn EntityHandle, enabled: bool) -> HostResult<()>;
}

/// Toggle and read behaviour AI of living entities.
pub trait AiApi: Send + Sync {
    /// Enable or disable AI evaluation.
    fn set_ai(&self, entity: &dyn EntityHandle, enabled: bool) -> HostResult<()>;

    /// Whether AI evaluation is enabled.
    fn is_aware(&self, entity: &dyn EntityHandle) -> HostResult<bool>;
}

/// Recent simulation-rate samples.
pub trait TickRateApi: Send + Sync {
    /// Steps completed per wall-clock second over the shortest window.
    fn recent_rate(&self) -> HostResult<f64>;
}

/// Spawn categories with separate spawn cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnCategory {
    /// Passive animals.
    Animals,
    /// Hostile monsters.
    Monsters,
}

/// Public per-world spawn tuning.
pub trait SpawnApi: Send + Sync {
    /// Ticks between spawn attempts for `category` in `world`.
    fn set_ticks_per_spawn(&self, world: &WorldId, category: SpawnCategory, ticks: u32) -> HostResult<()>;
}

/// Everything the capability bridge may probe.
pub trait HostSurface: Send + Sync {
    /// Human readable host version.
    fn version(&self) -> String;

    /// Ticking control at the given API layer.
    fn ticking_api(&self, level: ApiLevel) -> Option<Arc<dyn TickingApi>>;

    /// AI control at the given API layer.
    fn ai_api(&self, level: ApiLevel) -> Option<Arc<dyn AiApi>>;

    /// Tick-rate samples at the given API layer.
    fn tick_rate_api(&self, level: ApiLevel) -> Option<Arc<dyn TickRateApi>>;

    /// Public spawn tuning, if any.
    fn spawn_api(&self) -> Option<Arc<dyn SpawnApi>>;

    /// Resolve an internal slot by name.
    fn accessor(&self, owner: InternalType, name: &str) -> HostResult<Arc<dyn Accessor>>;
}
