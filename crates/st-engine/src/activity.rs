//! The activity state machine.
//!
//! Every suspend and restore goes through [`ActivityLedger`]. An entity is
//! suspended when its world's record set holds its id; the durable marker on
//! the entity mirrors that record so suspension survives a reload of the
//! in-memory state. Marker and record change together while the world's
//! record set is locked.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use st_core::{EntityHandle, EntityId, EntityRef, WorldId};
use tracing::debug;

use crate::bridge::CapabilityBridge;
use crate::policy::{Exclusion, SuspensionPolicy};

/// Durable tag marking an entity as suspended.
pub const MARKER_KEY: &str = "stasis:suspended";

/// Outcome of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Marker written, record added and the host toggles turned off.
    Suspended,
    /// Host toggles turned back on, marker and record cleared.
    Restored,
    /// Already in the requested state; nothing reached the host.
    Unchanged,
    /// The entity is gone. Its record, if any, was dropped.
    Stale,
    /// A policy rule keeps the entity active.
    Excluded(Exclusion),
    /// The host refused the durable marker. The entity was left untouched.
    Refused,
}

impl Transition {
    /// Whether the entity changed state.
    pub fn changed(self) -> bool {
        matches!(self, Self::Suspended | Self::Restored)
    }
}

/// Records of suspended entities, per world.
pub struct ActivityLedger {
    records: DashMap<WorldId, HashSet<EntityId>>,
    bridge: Arc<CapabilityBridge>,
    disable_ticking: AtomicBool,
    disable_ai: AtomicBool,
}

impl std::fmt::Debug for ActivityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLedger")
            .field("worlds", &self.records.len())
            .field("suspended", &self.suspended_count())
            .finish()
    }
}

impl ActivityLedger {
    /// Create an empty ledger driving `bridge`.
    pub fn new(bridge: Arc<CapabilityBridge>, disable_ticking: bool, disable_ai: bool) -> Self {
        Self {
            records: DashMap::new(),
            bridge,
            disable_ticking: AtomicBool::new(disable_ticking),
            disable_ai: AtomicBool::new(disable_ai),
        }
    }

    /// Which toggles future suspensions apply.
    pub fn set_toggles(&self, disable_ticking: bool, disable_ai: bool) {
        self.disable_ticking.store(disable_ticking, Ordering::Relaxed);
        self.disable_ai.store(disable_ai, Ordering::Relaxed);
    }

    /// The bridge transitions go through.
    pub fn bridge(&self) -> &Arc<CapabilityBridge> {
        &self.bridge
    }

    /// Suspend `handle` unless it is gone, excluded or already suspended.
    ///
    /// A repeat call on a suspended entity makes no host call and writes no marker.
    pub fn suspend(&self, handle: &dyn EntityHandle, policy: &SuspensionPolicy) -> Transition {
        if !handle.is_alive() {
            return Transition::Stale;
        }
        let kind = handle.kind();
        if let Some(exclusion) = policy.exclusion(&kind, &handle.traits()) {
            return Transition::Excluded(exclusion);
        }

        let id = handle.id();
        let mut records = self.records.entry(handle.world()).or_default();
        if records.contains(&id) {
            return Transition::Unchanged;
        }

        // The marker goes first: an entity is never frozen without one.
        let marker = if handle.has_tag(MARKER_KEY) {
            Ok(())
        } else {
            handle.set_tag(MARKER_KEY)
        };
        if let Err(e) = marker {
            debug!(entity = %id, error = %e, "marker write failed, entity left active");
            return Transition::Refused;
        }
        records.insert(id);

        if self.disable_ticking.load(Ordering::Relaxed) {
            self.bridge.set_ticking(handle, false);
        }
        if self.disable_ai.load(Ordering::Relaxed) && kind.is_living() {
            self.bridge.set_ai(handle, false);
        }
        Transition::Suspended
    }

    /// Restore `handle` if either its record or its marker says it is suspended.
    ///
    /// On an entity with neither this makes no host call at all.
    pub fn restore(&self, handle: &dyn EntityHandle) -> Transition {
        let id = handle.id();
        let world = handle.world();
        if !handle.is_alive() {
            self.forget(&world, id);
            return Transition::Stale;
        }

        let mut records = self.records.entry(world).or_default();
        let recorded = records.contains(&id);
        let marked = handle.has_tag(MARKER_KEY);
        if !recorded && !marked {
            return Transition::Unchanged;
        }

        self.bridge.set_ticking(handle, true);
        if handle.kind().is_living() {
            self.bridge.set_ai(handle, true);
        }
        let cleared = if marked {
            handle.remove_tag(MARKER_KEY)
        } else {
            Ok(())
        };
        if let Err(e) = cleared {
            debug!(entity = %id, error = %e, "marker removal failed");
        }
        records.remove(&id);
        Transition::Restored
    }

    /// Restore every entity in `handles` that carries a marker or a record,
    /// then empty the world's record set. Returns how many were restored.
    pub fn force_restore_all(&self, world: &WorldId, handles: &[EntityRef]) -> usize {
        let restored = handles
            .iter()
            .filter(|h| h.world() == *world)
            .filter(|h| self.restore(h.as_ref()) == Transition::Restored)
            .count();
        if let Some(mut records) = self.records.get_mut(world) {
            let leftover = records.len();
            if leftover > 0 {
                debug!(world = %world, count = leftover, "dropping records of unreachable entities");
            }
            records.clear();
        }
        restored
    }

    /// Re-create the record for a marker found without one. Returns whether it was missing.
    pub fn reconcile(&self, world: &WorldId, id: EntityId) -> bool {
        self.records.entry(world.clone()).or_default().insert(id)
    }

    /// Drop the record of an entity that left the simulation.
    pub fn forget(&self, world: &WorldId, id: EntityId) -> bool {
        self.records
            .get_mut(world)
            .is_some_and(|mut records| records.remove(&id))
    }

    /// Keep only records whose entity is in `present`. Returns how many were dropped.
    pub fn retain(&self, world: &WorldId, present: &HashSet<EntityId>) -> usize {
        let Some(mut records) = self.records.get_mut(world) else {
            return 0;
        };
        let before = records.len();
        records.retain(|id| present.contains(id));
        before - records.len()
    }

    /// Whether the entity has a record.
    pub fn is_suspended(&self, world: &WorldId, id: EntityId) -> bool {
        self.records
            .get(world)
            .is_some_and(|records| records.contains(&id))
    }

    /// Suspended entities across all worlds.
    pub fn suspended_count(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    /// Suspended entities in `world`.
    pub fn suspended_in(&self, world: &WorldId) -> usize {
        self.records.get(world).map_or(0, |records| records.len())
    }

    /// Ids of suspended entities in `world`.
    pub fn records(&self, world: &WorldId) -> HashSet<EntityId> {
        self.records
            .get(world)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Worlds with a record set, empty or not.
    pub fn worlds(&self) -> Vec<WorldId> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Start tracking `world` with an empty record set.
    pub fn ensure_world(&self, world: &WorldId) {
        self.records.entry(world.clone()).or_default();
    }

    /// Stop tracking `world`. Returns how many records were discarded.
    pub fn drop_world(&self, world: &WorldId) -> usize {
        self.records.remove(world).map_or(0, |(_, records)| records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    use st_core::sandbox::{SandboxEntity, SandboxHost, SurfaceProfile};
    use st_core::{EntityKind, EntityTraits, HostError, HostResult, Position, WorldQuery};

    /// A sandbox entity whose durable storage can refuse writes or removals.
    struct FlakyStorage {
        inner: Arc<SandboxEntity>,
        refuse_set: bool,
        refuse_remove: bool,
    }

    impl EntityHandle for FlakyStorage {
        fn id(&self) -> EntityId {
            self.inner.id()
        }
        fn world(&self) -> WorldId {
            self.inner.world()
        }
        fn is_alive(&self) -> bool {
            self.inner.is_alive()
        }
        fn position(&self) -> Position {
            self.inner.position()
        }
        fn kind(&self) -> EntityKind {
            self.inner.kind()
        }
        fn traits(&self) -> EntityTraits {
            self.inner.traits()
        }
        fn has_tag(&self, key: &str) -> bool {
            self.inner.has_tag(key)
        }
        fn set_tag(&self, key: &str) -> HostResult<()> {
            if self.refuse_set {
                return Err(HostError::Unsupported("read-only storage".into()));
            }
            self.inner.set_tag(key)
        }
        fn remove_tag(&self, key: &str) -> HostResult<()> {
            if self.refuse_remove {
                return Err(HostError::Unsupported("read-only storage".into()));
            }
            self.inner.remove_tag(key)
        }
        fn as_any(&self) -> &dyn Any {
            self.inner.as_any()
        }
    }

    fn setup(profile: SurfaceProfile) -> (SandboxHost, ActivityLedger) {
        let host = SandboxHost::with_world(profile, "world");
        let bridge = Arc::new(CapabilityBridge::resolve(host.surface(), 20.0));
        (host, ActivityLedger::new(bridge, true, true))
    }

    fn world() -> WorldId {
        WorldId::new("world")
    }

    #[test]
    fn suspend_sets_marker_record_and_toggles() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let zombie = host.spawn(&world(), EntityKind::Monster, Position::default());
        let policy = SuspensionPolicy::default();

        assert_eq!(ledger.suspend(&*zombie, &policy), Transition::Suspended);
        assert!(ledger.is_suspended(&world(), zombie.id()));
        assert!(zombie.has_tag(MARKER_KEY));
        assert!(!zombie.is_ticking());
        assert!(!zombie.is_aware());
    }

    #[test]
    fn suspend_twice_is_a_no_op() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let zombie = host.spawn(&world(), EntityKind::Monster, Position::default());
        let policy = SuspensionPolicy::default();
        ledger.suspend(&*zombie, &policy);
        let calls = host.surface().calls().mutations();

        assert_eq!(ledger.suspend(&*zombie, &policy), Transition::Unchanged);
        assert_eq!(host.surface().calls().mutations(), calls);
        assert_eq!(zombie.tags().len(), 1);
        assert_eq!(ledger.suspended_count(), 1);
    }

    #[test]
    fn restore_active_entity_makes_no_host_call() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let cow = host.spawn(&world(), EntityKind::Animal, Position::default());
        assert_eq!(ledger.restore(&*cow), Transition::Unchanged);
        assert_eq!(host.surface().calls().mutations(), 0);
    }

    #[test]
    fn restore_on_marker_alone() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let cow = host.spawn(&world(), EntityKind::Animal, Position::default());
        ledger.suspend(&*cow, &SuspensionPolicy::default());
        // Simulate a lost in-memory index.
        ledger.drop_world(&world());

        assert_eq!(ledger.restore(&*cow), Transition::Restored);
        assert!(!cow.has_tag(MARKER_KEY));
        assert!(cow.is_ticking() && cow.is_aware());
    }

    #[test]
    fn restore_on_record_alone() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let cow = host.spawn(&world(), EntityKind::Animal, Position::default());
        ledger.suspend(&*cow, &SuspensionPolicy::default());
        cow.remove_tag(MARKER_KEY).unwrap();

        assert_eq!(ledger.restore(&*cow), Transition::Restored);
        assert!(!ledger.is_suspended(&world(), cow.id()));
        assert!(cow.is_ticking());
    }

    #[test]
    fn excluded_and_stale_entities() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let policy = SuspensionPolicy::default();
        let drop = host.spawn(&world(), EntityKind::Item, Position::default());
        assert_eq!(
            ledger.suspend(&*drop, &policy),
            Transition::Excluded(Exclusion::Drop)
        );

        let cow = host.spawn(&world(), EntityKind::Animal, Position::default());
        ledger.suspend(&*cow, &policy);
        host.kill(&world(), cow.id());
        assert_eq!(ledger.restore(&*cow), Transition::Stale);
        assert_eq!(ledger.suspended_count(), 0);
        assert_eq!(ledger.suspend(&*cow, &policy), Transition::Stale);
    }

    #[test]
    fn ticking_only_when_ai_disabled_in_config() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        ledger.set_toggles(true, false);
        let zombie = host.spawn(&world(), EntityKind::Monster, Position::default());
        ledger.suspend(&*zombie, &SuspensionPolicy::default());
        assert!(!zombie.is_ticking());
        assert!(zombie.is_aware());
    }

    #[test]
    fn force_restore_all_empties_world() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let policy = SuspensionPolicy::default();
        for i in 0..5 {
            let e = host.spawn(&world(), EntityKind::Monster, Position::new(f64::from(i), 0.0, 0.0));
            ledger.suspend(&*e, &policy);
        }
        let gone = host.mobs(&world())[0].id();
        host.kill(&world(), gone);

        let handles = host.entities(&world());
        assert_eq!(ledger.force_restore_all(&world(), &handles), 4);
        assert_eq!(ledger.suspended_in(&world()), 0);
        assert!(host.mobs(&world()).iter().all(|e| e.is_ticking() && !e.has_tag(MARKER_KEY)));
    }

    #[test]
    fn reconcile_and_retain() {
        let (_, ledger) = setup(SurfaceProfile::bare());
        let a = EntityId::new();
        let b = EntityId::new();
        assert!(ledger.reconcile(&world(), a));
        assert!(!ledger.reconcile(&world(), a));
        ledger.reconcile(&world(), b);

        let present: HashSet<EntityId> = [a].into_iter().collect();
        assert_eq!(ledger.retain(&world(), &present), 1);
        assert!(ledger.is_suspended(&world(), a));
        assert!(ledger.forget(&world(), a));
        assert!(!ledger.forget(&world(), a));
        assert_eq!(ledger.retain(&WorldId::new("nowhere"), &present), 0);
    }

    #[test]
    fn refused_marker_leaves_entity_active() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let cow = FlakyStorage {
            inner: host.spawn(&world(), EntityKind::Animal, Position::default()),
            refuse_set: true,
            refuse_remove: false,
        };

        assert_eq!(ledger.suspend(&cow, &SuspensionPolicy::default()), Transition::Refused);
        assert!(cow.inner.is_ticking());
        assert!(cow.inner.is_aware());
        assert!(!cow.has_tag(MARKER_KEY));
        assert!(!ledger.is_suspended(&world(), cow.id()));
        assert_eq!(host.surface().calls().mutations(), 0);
        assert_eq!(ledger.restore(&cow), Transition::Unchanged);
    }

    #[test]
    fn failed_marker_removal_still_reenables() {
        let (host, ledger) = setup(SurfaceProfile::modern());
        let inner = host.spawn(&world(), EntityKind::Monster, Position::default());
        ledger.suspend(&*inner, &SuspensionPolicy::default());
        let zombie = FlakyStorage {
            inner,
            refuse_set: false,
            refuse_remove: true,
        };

        assert_eq!(ledger.restore(&zombie), Transition::Restored);
        assert!(zombie.inner.is_ticking());
        assert!(zombie.inner.is_aware());
        assert!(!ledger.is_suspended(&world(), zombie.id()));
        // The stuck marker keeps the entity eligible for another restore.
        assert_eq!(ledger.restore(&zombie), Transition::Restored);
    }
}
