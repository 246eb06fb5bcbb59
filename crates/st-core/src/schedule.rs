use std::fmt;
use std::sync::Arc;

use crate::entity::{EntityRef, Position};
use crate::world::WorldId;

/// A one-shot unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work run on every period of a repeating schedule.
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// Opaque handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

/// How the host partitions authority over its simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One authoritative execution context runs the whole simulation.
    Single,
    /// Each square region of `region_size` blocks has its own authoritative thread.
    Regionized {
        /// Edge length of a region in world units.
        region_size: u32,
    },
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Regionized { region_size } => write!(f, "regionized({region_size})"),
        }
    }
}

/// Identifies the region that owns a location under a regionized topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey {
    /// World the region belongs to.
    pub world: WorldId,
    /// Region column along x.
    pub x: i32,
    /// Region row along z.
    pub z: i32,
}

impl RegionKey {
    /// The region of `region_size` that contains `position`.
    pub fn containing(world: &WorldId, position: Position, region_size: u32) -> Self {
        let size = f64::from(region_size.max(1));
        Self {
            world: world.clone(),
            x: (position.x / size).floor() as i32,
            z: (position.z / size).floor() as i32,
        }
    }
}

/// The host's scheduler, abstracted over topology.
///
/// "Global" work runs on the context that owns world-wide state. Work that
/// mutates an entity must go through [`run_for_entity`](Self::run_for_entity)
/// so it lands on the context owning that entity's current location.
pub trait Scheduler: Send + Sync {
    /// Active topology.
    fn topology(&self) -> Topology;

    /// The host's current tick number.
    fn current_tick(&self) -> u64;

    /// Run on the global context as soon as possible.
    fn run_now(&self, task: Task) -> TaskHandle;

    /// Run on the global context after `delay_ticks`.
    fn run_delayed(&self, delay_ticks: u64, task: Task) -> TaskHandle;

    /// Run on the global context after `delay_ticks`, then every `period_ticks`.
    fn run_periodic(&self, delay_ticks: u64, period_ticks: u64, task: RepeatingTask) -> TaskHandle;

    /// Run on a background worker. Must not touch simulation state.
    fn run_async(&self, task: Task) -> TaskHandle;

    /// Run on the context owning `entity`. Returns `None` when the entity is
    /// already retired and the task was dropped.
    fn run_for_entity(&self, entity: &EntityRef, task: Task) -> Option<TaskHandle>;

    /// Run on the context owning `position` in `world`.
    fn run_at(&self, world: &WorldId, position: Position, task: Task) -> TaskHandle;

    /// Cancel a pending or repeating task. Unknown handles are ignored.
    fn cancel(&self, handle: TaskHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_key_floors_negative_coordinates() {
        let world = WorldId::new("world");
        let key = RegionKey::containing(&world, Position::new(-1.0, 64.0, 511.0), 256);
        assert_eq!((key.x, key.z), (-1, 1));
        let key = RegionKey::containing(&world, Position::new(0.0, 64.0, 0.0), 256);
        assert_eq!((key.x, key.z), (0, 0));
    }

    #[test]
    fn zero_region_size_does_not_divide_by_zero() {
        let world = WorldId::new("world");
        let key = RegionKey::containing(&world, Position::new(3.5, 0.0, -2.5), 0);
        assert_eq!((key.x, key.z), (3, -3));
    }
}
