//! Runtime capability bridge.
//!
//! Hosts expose entity toggles through different layers depending on their
//! version. The bridge probes each capability once, public API first, then the
//! extended API, then internal slots by candidate name, and keeps the first
//! binding that resolves. Everything after resolution is fault-isolated: a
//! failing host call is logged at debug level and swallowed, and a capability
//! that never resolved logs a single warning the first time it is needed.

mod binding;
mod strategy;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use st_core::{
    AccessTarget, ApiLevel, EntityHandle, FieldValue, HostError, HostResult, HostSurface,
    InternalType, SpawnCategory, WorldId,
};
use tracing::{debug, warn};

use crate::config::HostDefaults;

use binding::{AiBinding, RateBinding, TickingBinding};
pub use strategy::{Capability, CapabilityStatus, Resolution, Tier};
use strategy::{Strategy, resolve_first};

/// Candidate names of the per-entity activation slot, newest host first.
pub const TICKING_SLOTS: [&str; 5] = ["activatedTick", "activeTick", "Y", "ae", "ag"];

/// Candidate names of the mob awareness slot.
pub const AWARE_SLOTS: [&str; 5] = ["aware", "bp", "bq", "bM", "bO"];

/// Server slot holding recent tick-rate samples.
pub const RATE_SAMPLES_SLOT: &str = "recentTps";

/// Server slot holding the current tick number.
pub const CURRENT_TICK_SLOT: &str = "currentTick";

fn missing_api(what: &str, level: ApiLevel) -> HostError {
    HostError::Unsupported(format!("no {level:?} {what} API"))
}

/// Which host defaults were applied to a world.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultsReport {
    /// Fields written successfully.
    pub written: Vec<&'static str>,
    /// Fields the host refused, with the reason.
    pub skipped: Vec<(&'static str, String)>,
}

/// Typed access to the host capabilities resolved at startup.
pub struct CapabilityBridge {
    surface: Arc<dyn HostSurface>,
    version: String,
    target_rate: f64,
    ticking: Option<TickingBinding>,
    ai: Option<AiBinding>,
    rate: Option<RateBinding>,
    report: Vec<Resolution>,
    warned: [AtomicBool; 3],
    warnings: AtomicUsize,
}

impl std::fmt::Debug for CapabilityBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityBridge")
            .field("version", &self.version)
            .field("report", &self.report)
            .finish()
    }
}

impl CapabilityBridge {
    /// Probe `surface` once for every capability.
    ///
    /// `target_rate` is what [`aggregate_tick_rate`](Self::aggregate_tick_rate)
    /// reports when the rate cannot be read, and the ceiling on samples.
    pub fn resolve(surface: Arc<dyn HostSurface>, target_rate: f64) -> Self {
        let host: &dyn HostSurface = &*surface;

        let mut ticking_strategies = vec![
            Strategy::new(Tier::Public, "set_ticking", || {
                host.ticking_api(ApiLevel::Public)
                    .map(TickingBinding::Api)
                    .ok_or_else(|| missing_api("ticking", ApiLevel::Public))
            }),
            Strategy::new(Tier::Extended, "set_ticking", || {
                host.ticking_api(ApiLevel::Extended)
                    .map(TickingBinding::Api)
                    .ok_or_else(|| missing_api("ticking", ApiLevel::Extended))
            }),
        ];
        ticking_strategies.extend(TICKING_SLOTS.into_iter().map(|name| {
            Strategy::new(Tier::Internal, name, move || {
                Ok(TickingBinding::Slot {
                    slot: host.accessor(InternalType::Entity, name)?,
                    clock: host.accessor(InternalType::Server, CURRENT_TICK_SLOT)?,
                })
            })
        }));

        let mut ai_strategies = vec![
            Strategy::new(Tier::Public, "set_ai", || {
                host.ai_api(ApiLevel::Public)
                    .map(AiBinding::Api)
                    .ok_or_else(|| missing_api("ai", ApiLevel::Public))
            }),
            Strategy::new(Tier::Extended, "set_ai", || {
                host.ai_api(ApiLevel::Extended)
                    .map(AiBinding::Api)
                    .ok_or_else(|| missing_api("ai", ApiLevel::Extended))
            }),
        ];
        ai_strategies.extend(AWARE_SLOTS.into_iter().map(|name| {
            Strategy::new(Tier::Internal, name, move || {
                host.accessor(InternalType::Mob, name).map(AiBinding::Slot)
            })
        }));

        let rate_strategies = vec![
            Strategy::new(Tier::Public, "tick_rate", || {
                host.tick_rate_api(ApiLevel::Public)
                    .map(RateBinding::Api)
                    .ok_or_else(|| missing_api("tick rate", ApiLevel::Public))
            }),
            Strategy::new(Tier::Extended, "recent_tick_rate", || {
                host.tick_rate_api(ApiLevel::Extended)
                    .map(RateBinding::Api)
                    .ok_or_else(|| missing_api("tick rate", ApiLevel::Extended))
            }),
            Strategy::new(Tier::Internal, RATE_SAMPLES_SLOT, || {
                host.accessor(InternalType::Server, RATE_SAMPLES_SLOT)
                    .map(RateBinding::Samples)
            }),
        ];

        let (ticking, ticking_res) = resolve_first(Capability::Ticking, ticking_strategies);
        let (ai, ai_res) = resolve_first(Capability::Ai, ai_strategies);
        let (rate, rate_res) = resolve_first(Capability::TickRate, rate_strategies);

        let version = host.version();
        debug!(version = %version, "capability bridge resolved");

        Self {
            version,
            surface,
            target_rate,
            ticking,
            ai,
            rate,
            report: vec![ticking_res, ai_res, rate_res],
            warned: Default::default(),
            warnings: AtomicUsize::new(0),
        }
    }

    /// The host version reported at resolution time.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// How each capability resolved.
    pub fn report(&self) -> &[Resolution] {
        &self.report
    }

    /// Whether `capability` resolved to some strategy.
    pub fn is_available(&self, capability: Capability) -> bool {
        match capability {
            Capability::Ticking => self.ticking.is_some(),
            Capability::Ai => self.ai.is_some(),
            Capability::TickRate => self.rate.is_some(),
        }
    }

    /// Warnings logged for unavailable capabilities so far. At most one each.
    pub fn warnings_emitted(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    fn unavailable(&self, capability: Capability) {
        if !self.warned[capability.index()].swap(true, Ordering::Relaxed) {
            self.warnings.fetch_add(1, Ordering::Relaxed);
            warn!(
                capability = %capability,
                version = %self.version,
                "capability unavailable on this host, skipping it"
            );
        }
    }

    fn isolate(capability: Capability, entity: &dyn EntityHandle, result: HostResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(capability = %capability, entity = %entity.id(), error = %e, "host call failed");
                false
            }
        }
    }

    /// Enable or disable the entity's per-step update. Returns whether the host accepted it.
    pub fn set_ticking(&self, entity: &dyn EntityHandle, enabled: bool) -> bool {
        match &self.ticking {
            Some(binding) => Self::isolate(Capability::Ticking, entity, binding.set(entity, enabled)),
            None => {
                self.unavailable(Capability::Ticking);
                false
            }
        }
    }

    /// Enable or disable behaviour AI. Returns whether the host accepted it.
    pub fn set_ai(&self, entity: &dyn EntityHandle, enabled: bool) -> bool {
        match &self.ai {
            Some(binding) => Self::isolate(Capability::Ai, entity, binding.set(entity, enabled)),
            None => {
                self.unavailable(Capability::Ai);
                false
            }
        }
    }

    /// Whether the entity's AI runs. Unknown reads as aware.
    pub fn is_aware(&self, entity: &dyn EntityHandle) -> bool {
        match &self.ai {
            Some(binding) => binding.is_aware(entity).unwrap_or_else(|e| {
                debug!(entity = %entity.id(), error = %e, "awareness read failed");
                true
            }),
            None => {
                self.unavailable(Capability::Ai);
                true
            }
        }
    }

    /// Most recent steps-per-second sample, capped at the target rate.
    ///
    /// Falls back to the target rate when the capability is unavailable or
    /// the read fails, so a broken probe never looks like lag.
    pub fn aggregate_tick_rate(&self) -> f64 {
        let Some(binding) = &self.rate else {
            self.unavailable(Capability::TickRate);
            return self.target_rate;
        };
        match binding.read() {
            Ok(rate) if rate.is_finite() => rate.min(self.target_rate),
            Ok(rate) => {
                debug!(rate, "ignoring non-finite tick rate sample");
                self.target_rate
            }
            Err(e) => {
                debug!(error = %e, "tick rate read failed");
                self.target_rate
            }
        }
    }

    /// Write host tuning for `world`. Each field succeeds or fails on its own.
    pub fn override_host_defaults(&self, world: &WorldId, defaults: &HostDefaults) -> DefaultsReport {
        let mut report = DefaultsReport::default();
        let fields: [(&'static str, FieldValue); 6] = [
            ("mobSpawnRange", FieldValue::Int(defaults.mob_spawn_range)),
            ("tickInactiveVillagers", FieldValue::Bool(defaults.tick_inactive_villagers)),
            ("animalActivationRange", FieldValue::Int(defaults.animal_activation_range)),
            ("monsterActivationRange", FieldValue::Int(defaults.monster_activation_range)),
            ("raiderActivationRange", FieldValue::Int(defaults.raider_activation_range)),
            ("miscActivationRange", FieldValue::Int(defaults.misc_activation_range)),
        ];
        for (name, value) in fields {
            let result = self
                .surface
                .accessor(InternalType::WorldConfig, name)
                .and_then(|slot| slot.set(AccessTarget::World(world), value));
            report.record(world, name, result);
        }

        let spawns = [
            ("animalTicksPerSpawn", SpawnCategory::Animals, defaults.animal_ticks_per_spawn),
            ("monsterTicksPerSpawn", SpawnCategory::Monsters, defaults.monster_ticks_per_spawn),
        ];
        let api = self.surface.spawn_api();
        for (name, category, ticks) in spawns {
            let result = match &api {
                Some(api) => api.set_ticks_per_spawn(world, category, ticks),
                None => Err(HostError::Unsupported("no spawn API".into())),
            };
            report.record(world, name, result);
        }
        report
    }
}

impl DefaultsReport {
    fn record(&mut self, world: &WorldId, name: &'static str, result: HostResult<()>) {
        match result {
            Ok(()) => self.written.push(name),
            Err(e) => {
                debug!(world = %world, field = name, error = %e, "host default not applied");
                self.skipped.push((name, e.to_string()));
            }
        }
    }
}
