use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::entity::EntityHandle;
use crate::error::{HostError, HostResult};
use crate::surface::{
    AccessTarget, Accessor, AiApi, ApiLevel, FieldValue, HostSurface, InternalType, SpawnApi,
    SpawnCategory, TickRateApi, TickingApi,
};
use crate::world::WorldId;

use super::clock::HostClock;
use super::host::SandboxEntity;
use super::lock;

/// What an internal slot controls in the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Entity activation tick; `i32::MIN` disables ticking.
    ActivatedTick,
    /// Mob awareness flag.
    Aware,
    /// Server array of recent tick-rate samples.
    RecentRate,
    /// Server tick counter.
    CurrentTick,
    /// A named world tuning field.
    WorldField,
}

/// World tuning fields a host typically exposes.
pub const WORLD_FIELDS: [&str; 6] = [
    "mobSpawnRange",
    "tickInactiveVillagers",
    "animalActivationRange",
    "monsterActivationRange",
    "raiderActivationRange",
    "miscActivationRange",
];

/// Describes which capabilities a sandbox host version offers, and how.
#[derive(Debug, Clone, Default)]
pub struct SurfaceProfile {
    /// Reported host version.
    pub version: String,
    /// Layer offering a ticking API, if any.
    pub ticking: Option<ApiLevel>,
    /// Layer offering an AI API, if any.
    pub ai: Option<ApiLevel>,
    /// Layer offering tick-rate samples, if any.
    pub tick_rate: Option<ApiLevel>,
    /// Whether public spawn tuning exists.
    pub spawn_api: bool,
    /// Internal slots that resolve by name.
    pub slots: BTreeMap<(InternalType, String), SlotRole>,
}

impl SurfaceProfile {
    /// A current host: public AI and tick-rate APIs, ticking only via an internal slot.
    pub fn modern() -> Self {
        let mut profile = Self {
            version: "1.21.4-sandbox".into(),
            ticking: None,
            ai: Some(ApiLevel::Public),
            tick_rate: Some(ApiLevel::Public),
            spawn_api: true,
            slots: BTreeMap::new(),
        }
        .with_slot(InternalType::Entity, "activatedTick", SlotRole::ActivatedTick)
        .with_slot(InternalType::Server, "currentTick", SlotRole::CurrentTick);
        for field in WORLD_FIELDS {
            profile = profile.with_slot(InternalType::WorldConfig, field, SlotRole::WorldField);
        }
        profile
    }

    /// An old host with obfuscated internals and no public APIs.
    pub fn legacy() -> Self {
        let mut profile = Self {
            version: "1.16.5-sandbox".into(),
            spawn_api: true,
            ..Self::default()
        }
        .with_slot(InternalType::Entity, "Y", SlotRole::ActivatedTick)
        .with_slot(InternalType::Mob, "bp", SlotRole::Aware)
        .with_slot(InternalType::Server, "recentTps", SlotRole::RecentRate)
        .with_slot(InternalType::Server, "currentTick", SlotRole::CurrentTick);
        for field in WORLD_FIELDS.iter().filter(|f| **f != "raiderActivationRange") {
            profile = profile.with_slot(InternalType::WorldConfig, field, SlotRole::WorldField);
        }
        profile
    }

    /// A host exposing nothing at all.
    pub fn bare() -> Self {
        Self {
            version: "unknown-sandbox".into(),
            ..Self::default()
        }
    }

    /// Look up a profile by name: `modern`, `legacy` or `bare`.
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "modern" => Some(Self::modern()),
            "legacy" => Some(Self::legacy()),
            "bare" => Some(Self::bare()),
            _ => None,
        }
    }

    /// Make an internal slot resolvable.
    pub fn with_slot(mut self, owner: InternalType, name: &str, role: SlotRole) -> Self {
        self.slots.insert((owner, name.to_string()), role);
        self
    }

    /// Remove every way of controlling AI.
    pub fn without_ai(mut self) -> Self {
        self.ai = None;
        self.slots.retain(|_, role| *role != SlotRole::Aware);
        self
    }

    /// Remove every way of controlling ticking.
    pub fn without_ticking(mut self) -> Self {
        self.ticking = None;
        self.slots.retain(|_, role| *role != SlotRole::ActivatedTick);
        self
    }

    /// Remove every way of reading the tick rate.
    pub fn without_tick_rate(mut self) -> Self {
        self.tick_rate = None;
        self.slots.retain(|_, role| *role != SlotRole::RecentRate);
        self
    }
}

/// Counts of calls that reached the sandbox host through any layer.
#[derive(Debug, Default)]
pub struct SurfaceCalls {
    ticking_writes: AtomicUsize,
    ai_writes: AtomicUsize,
    awareness_reads: AtomicUsize,
    rate_reads: AtomicUsize,
}

impl SurfaceCalls {
    /// Ticking toggles received.
    pub fn ticking_writes(&self) -> usize {
        self.ticking_writes.load(Ordering::Relaxed)
    }

    /// AI toggles received.
    pub fn ai_writes(&self) -> usize {
        self.ai_writes.load(Ordering::Relaxed)
    }

    /// AI reads received.
    pub fn awareness_reads(&self) -> usize {
        self.awareness_reads.load(Ordering::Relaxed)
    }

    /// Tick-rate reads received.
    pub fn rate_reads(&self) -> usize {
        self.rate_reads.load(Ordering::Relaxed)
    }

    /// Every call that changed entity state.
    pub fn mutations(&self) -> usize {
        self.ticking_writes() + self.ai_writes()
    }
}

#[derive(Debug)]
struct SurfaceState {
    clock: Arc<HostClock>,
    calls: SurfaceCalls,
    world_fields: Mutex<BTreeMap<(WorldId, String), FieldValue>>,
    spawn_ticks: Mutex<BTreeMap<(WorldId, &'static str), u32>>,
}

fn sandbox_entity(entity: &dyn EntityHandle) -> HostResult<&SandboxEntity> {
    let concrete = entity
        .as_any()
        .downcast_ref::<SandboxEntity>()
        .ok_or(HostError::ForeignHandle)?;
    if !concrete.is_alive() {
        return Err(HostError::EntityGone(concrete.id()));
    }
    Ok(concrete)
}

/// The sandbox host's probe-able internals.
#[derive(Debug)]
pub struct SandboxSurface {
    profile: SurfaceProfile,
    state: Arc<SurfaceState>,
}

impl SandboxSurface {
    /// Create a surface over `clock` following `profile`.
    pub fn new(profile: SurfaceProfile, clock: Arc<HostClock>) -> Self {
        Self {
            profile,
            state: Arc::new(SurfaceState {
                clock,
                calls: SurfaceCalls::default(),
                world_fields: Mutex::new(BTreeMap::new()),
                spawn_ticks: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Calls that reached the host so far.
    pub fn calls(&self) -> &SurfaceCalls {
        &self.state.calls
    }

    /// The profile this surface follows.
    pub fn profile(&self) -> &SurfaceProfile {
        &self.profile
    }

    /// Last value written to a world tuning field.
    pub fn world_field(&self, world: &WorldId, name: &str) -> Option<FieldValue> {
        lock(&self.state.world_fields)
            .get(&(world.clone(), name.to_string()))
            .cloned()
    }

    /// Last spawn cadence written for `category`.
    pub fn ticks_per_spawn(&self, world: &WorldId, category: SpawnCategory) -> Option<u32> {
        lock(&self.state.spawn_ticks)
            .get(&(world.clone(), category_key(category)))
            .copied()
    }
}

fn category_key(category: SpawnCategory) -> &'static str {
    match category {
        SpawnCategory::Animals => "animals",
        SpawnCategory::Monsters => "monsters",
    }
}

struct SandboxTicking(Arc<SurfaceState>);

impl TickingApi for SandboxTicking {
    fn set_ticking(&self, entity: &dyn EntityHandle, enabled: bool) -> HostResult<()> {
        let entity = sandbox_entity(entity)?;
        entity.set_ticking(enabled);
        self.0.calls.ticking_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct SandboxAi(Arc<SurfaceState>);

impl AiApi for SandboxAi {
    fn set_ai(&self, entity: &dyn EntityHandle, enabled: bool) -> HostResult<()> {
        let entity = sandbox_entity(entity)?;
        if !entity.kind().is_living() {
            return Err(HostError::Unsupported(format!("{} has no AI", entity.kind())));
        }
        entity.set_aware(enabled);
        self.0.calls.ai_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_aware(&self, entity: &dyn EntityHandle) -> HostResult<bool> {
        let entity = sandbox_entity(entity)?;
        self.0.calls.awareness_reads.fetch_add(1, Ordering::Relaxed);
        Ok(entity.is_aware())
    }
}

struct SandboxRate(Arc<SurfaceState>);

impl TickRateApi for SandboxRate {
    fn recent_rate(&self) -> HostResult<f64> {
        self.0.calls.rate_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.0.clock.rate())
    }
}

struct SandboxSpawn(Arc<SurfaceState>);

impl SpawnApi for SandboxSpawn {
    fn set_ticks_per_spawn(&self, world: &WorldId, category: SpawnCategory, ticks: u32) -> HostResult<()> {
        lock(&self.0.spawn_ticks).insert((world.clone(), category_key(category)), ticks);
        Ok(())
    }
}

struct SandboxSlot {
    name: String,
    role: SlotRole,
    state: Arc<SurfaceState>,
}

impl SandboxSlot {
    fn mismatch(&self, expected: &'static str) -> HostError {
        HostError::TypeMismatch {
            name: self.name.clone(),
            expected,
        }
    }

    fn wrong_target(&self) -> HostError {
        HostError::Unsupported(format!("`{}` does not apply to this target", self.name))
    }
}

impl Accessor for SandboxSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, target: AccessTarget<'_>) -> HostResult<FieldValue> {
        match (self.role, target) {
            (SlotRole::ActivatedTick, AccessTarget::Entity(e)) => {
                Ok(FieldValue::Int(sandbox_entity(e)?.activated_tick()))
            }
            (SlotRole::Aware, AccessTarget::Entity(e)) => {
                let entity = sandbox_entity(e)?;
                if !entity.is_mob() {
                    return Err(self.wrong_target());
                }
                self.state.calls.awareness_reads.fetch_add(1, Ordering::Relaxed);
                Ok(FieldValue::Bool(entity.is_aware()))
            }
            (SlotRole::RecentRate, AccessTarget::Server) => {
                self.state.calls.rate_reads.fetch_add(1, Ordering::Relaxed);
                let rate = self.state.clock.rate();
                Ok(FieldValue::Samples(vec![rate, rate, rate]))
            }
            (SlotRole::CurrentTick, AccessTarget::Server) => {
                Ok(FieldValue::Int(self.state.clock.tick() as i64))
            }
            (SlotRole::WorldField, AccessTarget::World(world)) => lock(&self.state.world_fields)
                .get(&(world.clone(), self.name.clone()))
                .cloned()
                .ok_or_else(|| self.wrong_target()),
            _ => Err(self.wrong_target()),
        }
    }

    fn set(&self, target: AccessTarget<'_>, value: FieldValue) -> HostResult<()> {
        match (self.role, target) {
            (SlotRole::ActivatedTick, AccessTarget::Entity(e)) => {
                let FieldValue::Int(tick) = value else {
                    return Err(self.mismatch("int"));
                };
                sandbox_entity(e)?.set_activated_tick(tick);
                self.state.calls.ticking_writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            (SlotRole::Aware, AccessTarget::Entity(e)) => {
                let FieldValue::Bool(aware) = value else {
                    return Err(self.mismatch("bool"));
                };
                let entity = sandbox_entity(e)?;
                if !entity.is_mob() {
                    return Err(self.wrong_target());
                }
                entity.set_aware(aware);
                self.state.calls.ai_writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            (SlotRole::WorldField, AccessTarget::World(world)) => {
                lock(&self.state.world_fields).insert((world.clone(), self.name.clone()), value);
                Ok(())
            }
            _ => Err(self.wrong_target()),
        }
    }
}

impl HostSurface for SandboxSurface {
    fn version(&self) -> String {
        self.profile.version.clone()
    }

    fn ticking_api(&self, level: ApiLevel) -> Option<Arc<dyn TickingApi>> {
        (self.profile.ticking == Some(level))
            .then(|| Arc::new(SandboxTicking(Arc::clone(&self.state))) as Arc<dyn TickingApi>)
    }

    fn ai_api(&self, level: ApiLevel) -> Option<Arc<dyn AiApi>> {
        (self.profile.ai == Some(level))
            .then(|| Arc::new(SandboxAi(Arc::clone(&self.state))) as Arc<dyn AiApi>)
    }

    fn tick_rate_api(&self, level: ApiLevel) -> Option<Arc<dyn TickRateApi>> {
        (self.profile.tick_rate == Some(level))
            .then(|| Arc::new(SandboxRate(Arc::clone(&self.state))) as Arc<dyn TickRateApi>)
    }

    fn spawn_api(&self) -> Option<Arc<dyn SpawnApi>> {
        self.profile
            .spawn_api
            .then(|| Arc::new(SandboxSpawn(Arc::clone(&self.state))) as Arc<dyn SpawnApi>)
    }

    fn accessor(&self, owner: InternalType, name: &str) -> HostResult<Arc<dyn Accessor>> {
        let role = self
            .profile
            .slots
            .get(&(owner, name.to_string()))
            .copied()
            .ok_or_else(|| HostError::UnknownAccessor {
                owner,
                name: name.to_string(),
            })?;
        Ok(Arc::new(SandboxSlot {
            name: name.to_string(),
            role,
            state: Arc::clone(&self.state),
        }))
    }
}
