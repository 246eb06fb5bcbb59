use std::path::Path;

use serde::{Deserialize, Serialize};
use st_core::WorldId;

use crate::error::{EngineError, EngineResult};
use crate::policy::SuspensionPolicy;

/// What makes a trigger fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fire on every interval.
    Always,
    /// Fire when the aggregate tick rate is below `threshold`.
    AggregateRateBelow {
        /// Steps per second under which the host counts as lagging.
        threshold: f64,
    },
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::AggregateRateBelow { threshold } => write!(f, "rate<{threshold}"),
        }
    }
}

/// One suspension trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// What makes the trigger fire.
    #[serde(flatten)]
    pub kind: TriggerKind,
    /// Ticks between evaluations.
    pub interval_ticks: u64,
    /// Minimum ticks between two firings.
    #[serde(default)]
    pub rearm_cooldown_ticks: u64,
}

impl TriggerConfig {
    /// A trigger that fires every `interval_ticks`.
    pub fn always(interval_ticks: u64) -> Self {
        Self {
            kind: TriggerKind::Always,
            interval_ticks,
            rearm_cooldown_ticks: 0,
        }
    }

    /// A trigger that fires when the tick rate drops below `threshold`.
    pub fn rate_below(threshold: f64, interval_ticks: u64) -> Self {
        Self {
            kind: TriggerKind::AggregateRateBelow { threshold },
            interval_ticks,
            rearm_cooldown_ticks: 0,
        }
    }

    /// Set the re-arm cooldown.
    pub fn with_cooldown(mut self, ticks: u64) -> Self {
        self.rearm_cooldown_ticks = ticks;
        self
    }
}

/// Which pass summaries and transitions are logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One info line per completed pass.
    pub summary: bool,
    /// One debug line and one event per transition.
    pub detailed: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            summary: true,
            detailed: false,
        }
    }
}

/// Periodic tick-rate logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLogConfig {
    /// Whether the rate log job is registered.
    pub enabled: bool,
    /// Ticks between log lines.
    pub interval_ticks: u64,
}

impl Default for RateLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ticks: 1200,
        }
    }
}

/// Host tuning written once per managed world at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostDefaults {
    /// Chunk radius around clients that mobs spawn in.
    pub mob_spawn_range: i64,
    /// Whether villagers outside activation range keep ticking.
    pub tick_inactive_villagers: bool,
    /// Activation range for animals, in blocks.
    pub animal_activation_range: i64,
    /// Activation range for monsters, in blocks.
    pub monster_activation_range: i64,
    /// Activation range for raiders, in blocks.
    pub raider_activation_range: i64,
    /// Activation range for everything else, in blocks.
    pub misc_activation_range: i64,
    /// Ticks between animal spawn attempts.
    pub animal_ticks_per_spawn: u32,
    /// Ticks between monster spawn attempts.
    pub monster_ticks_per_spawn: u32,
}

impl Default for HostDefaults {
    fn default() -> Self {
        Self {
            mob_spawn_range: 3,
            tick_inactive_villagers: false,
            animal_activation_range: 16,
            monster_activation_range: 16,
            raider_activation_range: 25,
            misc_activation_range: 2,
            animal_ticks_per_spawn: 70,
            monster_ticks_per_spawn: 6,
        }
    }
}

/// An immutable engine configuration snapshot.
///
/// Loaded once, validated, then shared as `Arc<EngineConfig>`. A reload
/// swaps the whole snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worlds the engine manages. Others are never touched.
    pub worlds: Vec<WorldId>,
    /// Triggers that start suspension passes. Empty means restore only.
    pub triggers: Vec<TriggerConfig>,
    /// Radius, batching and exclusion rules.
    pub policy: SuspensionPolicy,
    /// Ticks between restoration scans.
    pub restore_interval_ticks: u64,
    /// Turn entity ticking off on suspension.
    pub disable_ticking: bool,
    /// Turn mob AI off on suspension.
    pub disable_ai: bool,
    /// Restore every marked entity at start, healing state left by a crash.
    pub heal_on_start: bool,
    /// Nominal steps per second; reported when the tick rate is unreadable.
    pub target_tick_rate: f64,
    /// Pass and transition logging.
    pub log: LogConfig,
    /// Periodic tick-rate logging.
    pub rate_log: RateLogConfig,
    /// Host tuning to apply at start. `None` leaves the host alone.
    pub host_defaults: Option<HostDefaults>,
    /// Maximum event log size (oldest events dropped when exceeded). 0 = unlimited.
    pub max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worlds: vec![
                WorldId::new("world"),
                WorldId::new("world_nether"),
                WorldId::new("world_the_end"),
            ],
            triggers: vec![
                TriggerConfig::always(600),
                TriggerConfig::rate_below(18.5, 450),
            ],
            policy: SuspensionPolicy::default(),
            restore_interval_ticks: 35,
            disable_ticking: true,
            disable_ai: true,
            heal_on_start: false,
            target_tick_rate: 20.0,
            log: LogConfig::default(),
            rate_log: RateLogConfig::default(),
            host_defaults: None,
            max_events: 1000,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON snapshot. Missing fields take their defaults.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON snapshot from disk.
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether `world` is managed by this configuration.
    pub fn manages(&self, world: &WorldId) -> bool {
        self.worlds.contains(world)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));
        let radius = self.policy.tracking_radius;
        if !radius.is_finite() || radius <= 0.0 {
            return invalid(format!("tracking_radius must be positive, got {radius}"));
        }
        if self.policy.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.restore_interval_ticks == 0 {
            return invalid("restore_interval_ticks must be at least 1".into());
        }
        if !self.target_tick_rate.is_finite() || self.target_tick_rate <= 0.0 {
            return invalid(format!(
                "target_tick_rate must be positive, got {}",
                self.target_tick_rate
            ));
        }
        if self.rate_log.enabled && self.rate_log.interval_ticks == 0 {
            return invalid("rate_log.interval_ticks must be at least 1".into());
        }
        for (i, trigger) in self.triggers.iter().enumerate() {
            if trigger.interval_ticks == 0 {
                return invalid(format!("trigger #{i} ({}) has a zero interval", trigger.kind));
            }
            match trigger.kind {
                TriggerKind::AggregateRateBelow { threshold }
                    if !threshold.is_finite() || threshold <= 0.0 =>
                {
                    return invalid(format!("trigger #{i} has an invalid threshold {threshold}"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Set the managed worlds.
    pub fn with_worlds<I, W>(mut self, worlds: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<WorldId>,
    {
        self.worlds = worlds.into_iter().map(Into::into).collect();
        self
    }

    /// Replace all triggers.
    pub fn with_triggers(mut self, triggers: Vec<TriggerConfig>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Set the tracking radius.
    pub fn with_tracking_radius(mut self, radius: f64) -> Self {
        self.policy.tracking_radius = radius;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.policy.batch_size = batch_size;
        self
    }

    /// Replace the whole suspension policy.
    pub fn with_policy(mut self, policy: SuspensionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the restoration scan interval.
    pub fn with_restore_interval(mut self, ticks: u64) -> Self {
        self.restore_interval_ticks = ticks;
        self
    }

    /// Choose which host controls suspension toggles.
    pub fn with_toggles(mut self, ticking: bool, ai: bool) -> Self {
        self.disable_ticking = ticking;
        self.disable_ai = ai;
        self
    }

    /// Restore marked entities at start.
    pub fn with_heal_on_start(mut self, heal: bool) -> Self {
        self.heal_on_start = heal;
        self
    }

    /// Apply host tuning at start.
    pub fn with_host_defaults(mut self, defaults: HostDefaults) -> Self {
        self.host_defaults = Some(defaults);
        self
    }

    /// Set per-transition logging.
    pub fn with_detailed_log(mut self, detailed: bool) -> Self {
        self.log.detailed = detailed;
        self
    }

    /// Set the maximum event log size (0 = unlimited).
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }
}
