use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::event::EngineEventKind;
use crate::pipeline::begin_suspension_pass;
use crate::restore::begin_restoration_scan;

/// A periodic engine task.
///
/// Jobs are registered with the host scheduler at start, in registration
/// order, and all run on the global context.
pub trait Job: std::fmt::Debug + Send + Sync {
    /// Human-readable name for this job.
    fn name(&self) -> &str;

    /// Ticks from registration to the first run.
    fn delay(&self, config: &EngineConfig) -> u64;

    /// Ticks between runs.
    fn period(&self, config: &EngineConfig) -> u64;

    /// Called once per period.
    fn run(&self, ctx: &Arc<EngineContext>);
}

/// Polls the triggers every tick and starts a suspension pass per managed world when one fires.
#[derive(Debug, Default)]
pub struct TriggerJob;

impl Job for TriggerJob {
    fn name(&self) -> &str {
        "triggers"
    }

    fn delay(&self, _config: &EngineConfig) -> u64 {
        1
    }

    fn period(&self, _config: &EngineConfig) -> u64 {
        1
    }

    fn run(&self, ctx: &Arc<EngineContext>) {
        let now = ctx.tick();
        let fired = ctx
            .triggers()
            .poll(now, || ctx.bridge.aggregate_tick_rate());
        if fired.is_empty() {
            return;
        }

        let config = ctx.config();
        for trigger in fired {
            debug!(trigger = %trigger, tick = now, "trigger fired");
            ctx.emit(
                EngineEventKind::TriggerFired {
                    trigger: trigger.clone(),
                },
                format!("{trigger} trigger fired"),
            );
            for world in &config.worlds {
                if ctx.world.is_loaded(world) {
                    begin_suspension_pass(ctx, world);
                }
            }
        }
    }
}

/// Scans every managed world for suspended entities a client came back to.
#[derive(Debug, Default)]
pub struct RestoreJob;

impl Job for RestoreJob {
    fn name(&self) -> &str {
        "restore"
    }

    fn delay(&self, config: &EngineConfig) -> u64 {
        config.restore_interval_ticks + 1
    }

    fn period(&self, config: &EngineConfig) -> u64 {
        config.restore_interval_ticks
    }

    fn run(&self, ctx: &Arc<EngineContext>) {
        for world in &ctx.config().worlds {
            begin_restoration_scan(ctx, world);
        }
    }
}

/// Logs the aggregate tick rate.
#[derive(Debug, Default)]
pub struct RateLogJob;

impl Job for RateLogJob {
    fn name(&self) -> &str {
        "rate-log"
    }

    fn delay(&self, _config: &EngineConfig) -> u64 {
        1
    }

    fn period(&self, config: &EngineConfig) -> u64 {
        config.rate_log.interval_ticks
    }

    fn run(&self, ctx: &Arc<EngineContext>) {
        let rate = ctx.bridge.aggregate_tick_rate();
        info!(
            rate = %format!("{rate:.2}"),
            suspended = ctx.ledger.suspended_count(),
            "tick rate"
        );
    }
}

/// The jobs `config` asks for, in registration order.
pub fn jobs_for(config: &EngineConfig) -> Vec<Box<dyn Job>> {
    let mut jobs: Vec<Box<dyn Job>> = Vec::new();
    if !config.triggers.is_empty() {
        jobs.push(Box::new(TriggerJob));
    }
    jobs.push(Box::new(RestoreJob));
    if config.rate_log.enabled {
        jobs.push(Box::new(RateLogJob));
    }
    jobs
}
