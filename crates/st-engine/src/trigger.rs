//! Suspension triggers.
//!
//! Each trigger is evaluated every `interval_ticks` and, once it fires, stays
//! cooling down for `rearm_cooldown_ticks` before it can fire again. Triggers
//! are independent; two firing in the same tick each request a pass and the
//! per-world pass guard collapses the overlap.

use crate::config::{TriggerConfig, TriggerKind};

/// Where a trigger is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Will fire on its next evaluation if its condition holds.
    Armed,
    /// Fired recently; ignores evaluations until `until`.
    CoolingDown {
        /// First tick at which the trigger re-arms.
        until: u64,
    },
}

#[derive(Debug)]
struct TriggerState {
    config: TriggerConfig,
    next_eval: u64,
    phase: Phase,
    last_fired: Option<u64>,
}

/// The configured triggers and their state.
#[derive(Debug, Default)]
pub struct TriggerSet {
    triggers: Vec<TriggerState>,
}

impl TriggerSet {
    /// Arm `configs`. Each is first evaluated one interval after `start_tick`.
    pub fn new(configs: &[TriggerConfig], start_tick: u64) -> Self {
        let triggers = configs
            .iter()
            .map(|config| TriggerState {
                config: config.clone(),
                next_eval: start_tick + config.interval_ticks.max(1),
                phase: Phase::Armed,
                last_fired: None,
            })
            .collect();
        Self { triggers }
    }

    /// Evaluate every trigger due at `now`. Returns the ones that fired.
    ///
    /// `rate` is read at most once per poll, and only if a rate trigger is
    /// actually evaluated.
    pub fn poll(&mut self, now: u64, rate: impl Fn() -> f64) -> Vec<TriggerKind> {
        let mut sampled: Option<f64> = None;
        let mut fired = Vec::new();

        for trigger in &mut self.triggers {
            if matches!(trigger.phase, Phase::CoolingDown { until } if now >= until) {
                trigger.phase = Phase::Armed;
            }
            if now < trigger.next_eval {
                continue;
            }
            trigger.next_eval = now + trigger.config.interval_ticks.max(1);
            if trigger.phase != Phase::Armed {
                continue;
            }

            let condition = match trigger.config.kind {
                TriggerKind::Always => true,
                TriggerKind::AggregateRateBelow { threshold } => {
                    *sampled.get_or_insert_with(&rate) < threshold
                }
            };
            if !condition {
                continue;
            }

            trigger.last_fired = Some(now);
            let cooldown = trigger.config.rearm_cooldown_ticks;
            trigger.phase = if cooldown > 0 {
                Phase::CoolingDown {
                    until: now + cooldown,
                }
            } else {
                Phase::Armed
            };
            fired.push(trigger.config.kind.clone());
        }
        fired
    }

    /// Current phase of every trigger, in configuration order.
    pub fn phases(&self) -> Vec<Phase> {
        self.triggers.iter().map(|t| t.phase).collect()
    }

    /// Tick each trigger last fired at, in configuration order.
    pub fn last_fired(&self) -> Vec<Option<u64>> {
        self.triggers.iter().map(|t| t.last_fired).collect()
    }

    /// Number of configured triggers.
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    /// Whether no triggers are configured.
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
