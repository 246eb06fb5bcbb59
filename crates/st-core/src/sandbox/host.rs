use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::entity::{EntityHandle, EntityId, EntityKind, EntityRef, EntityTraits, Position};
use crate::error::{HostError, HostResult};
use crate::world::{ClientSnapshot, WorldId, WorldQuery};

use super::clock::HostClock;
use super::lock;
use super::surface::{SandboxSurface, SurfaceProfile};

#[derive(Debug)]
struct EntityState {
    position: Position,
    alive: bool,
    traits: EntityTraits,
    ticking: bool,
    activated_tick: i64,
    aware: bool,
    tags: BTreeSet<String>,
}

/// An entity living in the sandbox host.
#[derive(Debug)]
pub struct SandboxEntity {
    id: EntityId,
    world: WorldId,
    kind: EntityKind,
    state: Mutex<EntityState>,
}

impl SandboxEntity {
    /// Create a live, ticking, aware entity.
    pub fn new(world: WorldId, kind: EntityKind, position: Position) -> Self {
        Self {
            id: EntityId::new(),
            world,
            kind,
            state: Mutex::new(EntityState {
                position,
                alive: true,
                traits: EntityTraits::default(),
                ticking: true,
                activated_tick: 0,
                aware: true,
                tags: BTreeSet::new(),
            }),
        }
    }

    /// Replace the entity's exclusion-relevant traits.
    pub fn with_traits(self, traits: EntityTraits) -> Self {
        lock(&self.state).traits = traits;
        self
    }

    /// Pre-load a durable tag, as if read back from saved entity data.
    pub fn with_tag(self, key: &str) -> Self {
        lock(&self.state).tags.insert(key.to_string());
        self
    }

    /// Whether the entity's per-step update runs.
    pub fn is_ticking(&self) -> bool {
        lock(&self.state).ticking
    }

    /// Whether the entity's AI runs.
    pub fn is_aware(&self) -> bool {
        lock(&self.state).aware
    }

    /// Value of the internal activation slot.
    pub fn activated_tick(&self) -> i64 {
        lock(&self.state).activated_tick
    }

    /// Move the entity.
    pub fn set_position(&self, position: Position) {
        lock(&self.state).position = position;
    }

    /// Replace the entity's traits in place.
    pub fn set_traits(&self, traits: EntityTraits) {
        lock(&self.state).traits = traits;
    }

    /// Durable tags currently stored on the entity.
    pub fn tags(&self) -> Vec<String> {
        lock(&self.state).tags.iter().cloned().collect()
    }

    pub(crate) fn mark_dead(&self) {
        lock(&self.state).alive = false;
    }

    pub(crate) fn set_ticking(&self, enabled: bool) {
        lock(&self.state).ticking = enabled;
    }

    pub(crate) fn set_activated_tick(&self, value: i64) {
        let mut state = lock(&self.state);
        state.activated_tick = value;
        state.ticking = value != i64::from(i32::MIN);
    }

    pub(crate) fn set_aware(&self, aware: bool) {
        lock(&self.state).aware = aware;
    }

    /// Whether the host treats this entity as a mob with an AI slot.
    pub fn is_mob(&self) -> bool {
        self.kind.is_living() && !matches!(self.kind, EntityKind::Player | EntityKind::ArmorStand)
    }
}

impl EntityHandle for SandboxEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn world(&self) -> WorldId {
        self.world.clone()
    }

    fn is_alive(&self) -> bool {
        lock(&self.state).alive
    }

    fn position(&self) -> Position {
        lock(&self.state).position
    }

    fn kind(&self) -> EntityKind {
        self.kind.clone()
    }

    fn traits(&self) -> EntityTraits {
        lock(&self.state).traits.clone()
    }

    fn has_tag(&self, key: &str) -> bool {
        lock(&self.state).tags.contains(key)
    }

    fn set_tag(&self, key: &str) -> HostResult<()> {
        let mut state = lock(&self.state);
        if !state.alive {
            return Err(HostError::EntityGone(self.id));
        }
        state.tags.insert(key.to_string());
        Ok(())
    }

    fn remove_tag(&self, key: &str) -> HostResult<()> {
        lock(&self.state).tags.remove(key);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct SandboxWorld {
    entities: Vec<Arc<SandboxEntity>>,
    clients: BTreeSet<EntityId>,
}

/// An in-memory host: worlds, entities, clients, a clock and a probe-able surface.
#[derive(Debug)]
pub struct SandboxHost {
    clock: Arc<HostClock>,
    surface: Arc<SandboxSurface>,
    worlds: Mutex<BTreeMap<WorldId, SandboxWorld>>,
}

impl SandboxHost {
    /// Create an empty host whose surface follows `profile`.
    pub fn new(profile: SurfaceProfile) -> Self {
        let clock = Arc::new(HostClock::default());
        let surface = Arc::new(SandboxSurface::new(profile, Arc::clone(&clock)));
        Self {
            clock,
            surface,
            worlds: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a host with one loaded world.
    pub fn with_world(profile: SurfaceProfile, world: impl Into<WorldId>) -> Self {
        let host = Self::new(profile);
        host.load_world(world.into());
        host
    }

    /// The clock shared with the scheduler and surface.
    pub fn clock(&self) -> Arc<HostClock> {
        Arc::clone(&self.clock)
    }

    /// The probe-able surface.
    pub fn surface(&self) -> Arc<SandboxSurface> {
        Arc::clone(&self.surface)
    }

    /// Set the tick rate the surface reports.
    pub fn set_tick_rate(&self, rate: f64) {
        self.clock.set_rate(rate);
    }

    /// Load an empty world. Loading an already loaded world is a no-op.
    pub fn load_world(&self, world: WorldId) {
        lock(&self.worlds).entry(world).or_default();
    }

    /// Unload a world, returning the entities it held.
    pub fn unload_world(&self, world: &WorldId) -> Vec<Arc<SandboxEntity>> {
        lock(&self.worlds)
            .remove(world)
            .map(|w| w.entities)
            .unwrap_or_default()
    }

    /// Re-insert previously unloaded entities, as when a world is read back from disk.
    pub fn restore_world(&self, world: WorldId, entities: Vec<Arc<SandboxEntity>>) {
        let mut worlds = lock(&self.worlds);
        let slot = worlds.entry(world).or_default();
        slot.entities.extend(entities.into_iter().filter(|e| e.is_alive()));
    }

    /// Spawn an entity of `kind` at `position`.
    pub fn spawn(&self, world: &WorldId, kind: EntityKind, position: Position) -> Arc<SandboxEntity> {
        self.insert(SandboxEntity::new(world.clone(), kind, position))
    }

    /// Insert a pre-built entity into its world, loading the world if needed.
    pub fn insert(&self, entity: SandboxEntity) -> Arc<SandboxEntity> {
        let entity = Arc::new(entity);
        lock(&self.worlds)
            .entry(entity.world.clone())
            .or_default()
            .entities
            .push(Arc::clone(&entity));
        entity
    }

    /// Connect a client whose avatar stands at `position`.
    pub fn connect_client(&self, world: &WorldId, position: Position) -> Arc<SandboxEntity> {
        let avatar = self.spawn(world, EntityKind::Player, position);
        if let Some(w) = lock(&self.worlds).get_mut(world) {
            w.clients.insert(avatar.id);
        }
        avatar
    }

    /// Disconnect a client and remove its avatar.
    pub fn disconnect_client(&self, world: &WorldId, id: EntityId) {
        if let Some(w) = lock(&self.worlds).get_mut(world) {
            w.clients.remove(&id);
        }
        self.kill(world, id);
    }

    /// Remove an entity from the simulation. Returns whether it existed.
    pub fn kill(&self, world: &WorldId, id: EntityId) -> bool {
        let mut worlds = lock(&self.worlds);
        let Some(w) = worlds.get_mut(world) else {
            return false;
        };
        let Some(index) = w.entities.iter().position(|e| e.id == id) else {
            return false;
        };
        let entity = w.entities.swap_remove(index);
        entity.mark_dead();
        true
    }

    /// Concrete handle for inspection in tests and reports.
    pub fn sandbox_entity(&self, world: &WorldId, id: EntityId) -> Option<Arc<SandboxEntity>> {
        lock(&self.worlds)
            .get(world)?
            .entities
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// All non-client entities in `world`.
    pub fn mobs(&self, world: &WorldId) -> Vec<Arc<SandboxEntity>> {
        lock(&self.worlds)
            .get(world)
            .map(|w| {
                w.entities
                    .iter()
                    .filter(|e| !w.clients.contains(&e.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl WorldQuery for SandboxHost {
    fn worlds(&self) -> Vec<WorldId> {
        lock(&self.worlds).keys().cloned().collect()
    }

    fn entities(&self, world: &WorldId) -> Vec<EntityRef> {
        lock(&self.worlds)
            .get(world)
            .map(|w| {
                w.entities
                    .iter()
                    .filter(|e| e.is_alive())
                    .map(|e| Arc::clone(e) as EntityRef)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clients(&self, world: &WorldId) -> Vec<ClientSnapshot> {
        let worlds = lock(&self.worlds);
        let Some(w) = worlds.get(world) else {
            return Vec::new();
        };
        w.entities
            .iter()
            .filter(|e| w.clients.contains(&e.id) && e.is_alive())
            .map(|e| ClientSnapshot {
                id: e.id,
                position: e.position(),
            })
            .collect()
    }

    fn entity(&self, world: &WorldId, id: EntityId) -> Option<EntityRef> {
        self.sandbox_entity(world, id).map(|e| e as EntityRef)
    }

    fn is_loaded(&self, world: &WorldId) -> bool {
        lock(&self.worlds).contains_key(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> WorldId {
        WorldId::new("world")
    }

    #[test]
    fn spawn_and_query() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let zombie = host.spawn(&world(), EntityKind::Monster, Position::new(10.0, 64.0, 0.0));
        let player = host.connect_client(&world(), Position::default());

        assert_eq!(host.entities(&world()).len(), 2);
        let clients = host.clients(&world());
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, player.id());
        assert_eq!(host.mobs(&world()).len(), 1);
        assert!(host.entity(&world(), zombie.id()).is_some());
    }

    #[test]
    fn kill_invalidates_handle() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let cow = host.spawn(&world(), EntityKind::Animal, Position::default());
        let handle: EntityRef = cow.clone();
        assert!(host.kill(&world(), cow.id()));
        assert!(!handle.is_alive());
        assert!(host.entities(&world()).is_empty());
        assert!(handle.set_tag("k").is_err());
        assert!(!host.kill(&world(), cow.id()));
    }

    #[test]
    fn tags_survive_world_reload() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let cow = host.spawn(&world(), EntityKind::Animal, Position::default());
        cow.set_tag("stasis:suspended").unwrap();

        let saved = host.unload_world(&world());
        assert!(!host.is_loaded(&world()));
        host.restore_world(world(), saved);

        let reloaded = host.entity(&world(), cow.id()).unwrap();
        assert!(reloaded.has_tag("stasis:suspended"));
    }

    #[test]
    fn disconnect_removes_client() {
        let host = SandboxHost::with_world(SurfaceProfile::modern(), "world");
        let player = host.connect_client(&world(), Position::default());
        host.disconnect_client(&world(), player.id());
        assert!(host.clients(&world()).is_empty());
        assert!(!player.is_alive());
    }

    #[test]
    fn activation_slot_drives_ticking() {
        let entity = SandboxEntity::new(world(), EntityKind::Monster, Position::default());
        entity.set_activated_tick(i64::from(i32::MIN));
        assert!(!entity.is_ticking());
        entity.set_activated_tick(42);
        assert!(entity.is_ticking());
    }
}
