//! An in-memory host.
//!
//! The sandbox owns worlds full of entities, a clock, a scheduler that can
//! emulate either topology, and a surface whose capabilities are chosen per
//! [`SurfaceProfile`]. It stands in for a real world server in tests and in
//! the `stasis simulate` command.

mod clock;
mod host;
mod scheduler;
mod surface;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::HostClock;
pub use host::{SandboxEntity, SandboxHost};
pub use scheduler::TickScheduler;
pub use surface::{SandboxSurface, SlotRole, SurfaceCalls, SurfaceProfile, WORLD_FIELDS};

/// Lock a sandbox mutex. A panicking task must not wedge the rest of the host.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
