//! Candidate selection.
//!
//! Selection works on a [`WorldSnapshot`] taken once per pass, so it may run
//! on a background worker: it reads positions and flags and never touches a
//! record or a marker. Under the `parallel` feature the entity scan is spread
//! over rayon's pool.

use st_core::{EntityKind, EntityRef, EntityTraits, Position, WorldId, WorldQuery};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::activity::{ActivityLedger, MARKER_KEY};
use crate::policy::SuspensionPolicy;

/// What selection knows about one entity.
#[derive(Clone)]
pub struct EntitySnapshot {
    /// Live handle; may have gone stale since capture.
    pub handle: EntityRef,
    /// Entity category at capture.
    pub kind: EntityKind,
    /// Exclusion-relevant state at capture.
    pub traits: EntityTraits,
    /// Position at capture.
    pub position: Position,
    /// The ledger holds a record for it.
    pub suspended: bool,
    /// It carries the durable marker.
    pub marked: bool,
}

impl EntitySnapshot {
    /// Read everything selection needs from a live handle.
    pub fn of(handle: EntityRef, ledger: &ActivityLedger) -> Self {
        let world = handle.world();
        Self {
            kind: handle.kind(),
            traits: handle.traits(),
            position: handle.position(),
            suspended: ledger.is_suspended(&world, handle.id()),
            marked: handle.has_tag(MARKER_KEY),
            handle,
        }
    }
}

impl std::fmt::Debug for EntitySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySnapshot")
            .field("id", &self.handle.id())
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("suspended", &self.suspended)
            .field("marked", &self.marked)
            .finish()
    }
}

/// Client positions and living entities of one world, read at one instant.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    /// The world captured.
    pub world: WorldId,
    /// Positions of connected clients.
    pub clients: Vec<Position>,
    /// Every living entity except client avatars.
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    /// Capture `world`. Must run where reading the host is allowed.
    pub fn capture(query: &dyn WorldQuery, world: &WorldId, ledger: &ActivityLedger) -> Self {
        let clients = query.clients(world).into_iter().map(|c| c.position).collect();
        let entities = query
            .entities(world)
            .into_iter()
            .filter(|e| e.is_alive())
            .map(|e| EntitySnapshot::of(e, ledger))
            .collect();
        Self {
            world: world.clone(),
            clients,
            entities,
        }
    }

    /// Whether any client was connected when the snapshot was taken.
    pub fn has_clients(&self) -> bool {
        !self.clients.is_empty()
    }
}

/// Whether `position` is within the tracking radius of any client.
///
/// The boundary is inclusive: exactly `radius²` away counts as in range.
#[inline]
pub fn within_radius(clients: &[Position], position: &Position, radius_squared: f64) -> bool {
    clients
        .iter()
        .any(|client| client.distance_squared(position) <= radius_squared)
}

#[cfg(feature = "parallel")]
fn collect_matching(
    entities: &[EntitySnapshot],
    keep: impl Fn(&EntitySnapshot) -> bool + Sync + Send,
) -> Vec<EntityRef> {
    entities
        .par_iter()
        .filter(|&e| keep(e))
        .map(|e| e.handle.clone())
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn collect_matching(
    entities: &[EntitySnapshot],
    keep: impl Fn(&EntitySnapshot) -> bool + Sync + Send,
) -> Vec<EntityRef> {
    entities
        .iter()
        .filter(|&e| keep(e))
        .map(|e| e.handle.clone())
        .collect()
}

/// Entities to suspend: eligible, not yet suspended, and out of every client's range.
///
/// With no client connected every eligible entity qualifies.
pub fn suspension_candidates(snapshot: &WorldSnapshot, policy: &SuspensionPolicy) -> Vec<EntityRef> {
    let radius_squared = policy.radius_squared();
    let clients = snapshot.clients.as_slice();
    collect_matching(&snapshot.entities, |e| {
        !e.suspended
            && !policy.is_excluded(&e.kind, &e.traits)
            && !within_radius(clients, &e.position, radius_squared)
    })
}

/// Entities to restore: recorded or marked, and within some client's range.
pub fn restoration_candidates(snapshot: &WorldSnapshot, policy: &SuspensionPolicy) -> Vec<EntityRef> {
    let radius_squared = policy.radius_squared();
    snapshot
        .entities
        .iter()
        .filter(|e| e.suspended || e.marked)
        .filter(|e| within_radius(&snapshot.clients, &e.position, radius_squared))
        .map(|e| e.handle.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use proptest::prelude::*;
    use st_core::EntityHandle;
    use st_core::sandbox::{SandboxHost, SurfaceProfile};

    use crate::bridge::CapabilityBridge;

    fn world() -> WorldId {
        WorldId::new("world")
    }

    fn ledger(host: &SandboxHost) -> ActivityLedger {
        let bridge = Arc::new(CapabilityBridge::resolve(host.surface(), 20.0));
        ActivityLedger::new(bridge, true, true)
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let ledger = ledger(&host);
        host.connect_client(&world(), Position::new(0.0, 64.0, 0.0));
        let at_1024 = host.spawn(&world(), EntityKind::Monster, Position::new(32.0, 64.0, 0.0));
        let at_1025 = host.spawn(&world(), EntityKind::Monster, Position::new(32.0, 64.0, 1.0));

        let policy = SuspensionPolicy {
            tracking_radius: 32.0,
            ..SuspensionPolicy::default()
        };
        let snapshot = WorldSnapshot::capture(&host, &world(), &ledger);
        let ids: Vec<_> = suspension_candidates(&snapshot, &policy)
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(ids, vec![at_1025.id()]);
        assert!(!ids.contains(&at_1024.id()));
    }

    #[test]
    fn no_clients_means_everything_eligible() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let ledger = ledger(&host);
        for x in 0..10 {
            host.spawn(&world(), EntityKind::Animal, Position::new(f64::from(x), 64.0, 0.0));
        }
        host.spawn(&world(), EntityKind::Item, Position::default());
        let snapshot = WorldSnapshot::capture(&host, &world(), &ledger);
        assert!(!snapshot.has_clients());
        assert_eq!(
            suspension_candidates(&snapshot, &SuspensionPolicy::default()).len(),
            10
        );
    }

    #[test]
    fn suspended_entities_are_not_candidates_twice() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let ledger = ledger(&host);
        let cow = host.spawn(&world(), EntityKind::Animal, Position::default());
        ledger.suspend(&*cow, &SuspensionPolicy::default());
        let snapshot = WorldSnapshot::capture(&host, &world(), &ledger);
        assert!(suspension_candidates(&snapshot, &SuspensionPolicy::default()).is_empty());
    }

    #[test]
    fn restoration_needs_record_or_marker_and_proximity() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let ledger = ledger(&host);
        let policy = SuspensionPolicy::default();
        let near = host.spawn(&world(), EntityKind::Animal, Position::new(5.0, 64.0, 0.0));
        let far = host.spawn(&world(), EntityKind::Animal, Position::new(500.0, 64.0, 0.0));
        let marked_only = host.spawn(&world(), EntityKind::Animal, Position::new(-5.0, 64.0, 0.0));
        host.spawn(&world(), EntityKind::Animal, Position::new(1.0, 64.0, 0.0));
        ledger.suspend(&*near, &policy);
        ledger.suspend(&*far, &policy);
        marked_only.set_tag(MARKER_KEY).unwrap();
        host.connect_client(&world(), Position::new(0.0, 64.0, 0.0));

        let snapshot = WorldSnapshot::capture(&host, &world(), &ledger);
        let mut ids: Vec<_> = restoration_candidates(&snapshot, &policy)
            .iter()
            .map(|e| e.id())
            .collect();
        ids.sort();
        let mut expected = vec![near.id(), marked_only.id()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    proptest! {
        #[test]
        fn within_radius_matches_euclidean_distance(
            cx in -1000.0f64..1000.0,
            cz in -1000.0f64..1000.0,
            ex in -1000.0f64..1000.0,
            ez in -1000.0f64..1000.0,
            radius in 1.0f64..200.0,
        ) {
            let client = Position::new(cx, 64.0, cz);
            let entity = Position::new(ex, 64.0, ez);
            let distance = ((cx - ex).powi(2) + (cz - ez).powi(2)).sqrt();
            prop_assume!((distance - radius).abs() > 1e-6);
            prop_assert_eq!(
                within_radius(&[client], &entity, radius * radius),
                distance < radius
            );
        }

        #[test]
        fn no_clients_never_in_range(x in -1e6f64..1e6, z in -1e6f64..1e6) {
            prop_assert!(!within_radius(&[], &Position::new(x, 0.0, z), 1e12));
        }
    }
}
