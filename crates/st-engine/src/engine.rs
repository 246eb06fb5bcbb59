use std::sync::Arc;

use st_core::{EntityId, EntityRef, HostSurface, Scheduler, TaskHandle, WorldId, WorldQuery};
use tracing::{debug, info, warn};

use crate::activity::{MARKER_KEY, Transition};
use crate::bridge::{CapabilityBridge, Resolution};
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, EngineEventKind};
use crate::job::jobs_for;
use crate::pipeline::{Operation, commit};
use crate::select::{WorldSnapshot, suspension_candidates};

struct Running {
    ctx: Arc<EngineContext>,
    tasks: Vec<TaskHandle>,
}

/// The top-level suspension engine.
///
/// Owns the host collaborators and, while running, the shared
/// [`EngineContext`] and the periodic jobs registered for it. Dropping a
/// running engine stops it, restoring every suspended entity.
pub struct Engine {
    world: Arc<dyn WorldQuery>,
    scheduler: Arc<dyn Scheduler>,
    surface: Arc<dyn HostSurface>,
    running: Option<Running>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("topology", &self.scheduler.topology())
            .field("running", &self.running.is_some())
            .field("tasks", &self.running.as_ref().map_or(0, |r| r.tasks.len()))
            .field("suspended", &self.suspended_count())
            .finish()
    }
}

impl Engine {
    /// Create a stopped engine over the host's collaborators.
    pub fn new(
        world: Arc<dyn WorldQuery>,
        scheduler: Arc<dyn Scheduler>,
        surface: Arc<dyn HostSurface>,
    ) -> Self {
        Self {
            world,
            scheduler,
            surface,
            running: None,
        }
    }

    /// Resolve capabilities, prepare every managed world and register the jobs.
    pub fn start(&mut self, config: EngineConfig) -> EngineResult<()> {
        if self.running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        config.validate()?;

        let bridge = Arc::new(CapabilityBridge::resolve(
            Arc::clone(&self.surface),
            config.target_tick_rate,
        ));
        for resolution in bridge.report() {
            info!(
                capability = %resolution.capability,
                status = %resolution.status,
                "capability resolved"
            );
        }

        let config = Arc::new(config);
        let ctx = Arc::new(EngineContext::new(
            Arc::clone(&config),
            bridge,
            Arc::clone(&self.world),
            Arc::clone(&self.scheduler),
        ));
        for world in &config.worlds {
            if ctx.world.is_loaded(world) {
                prepare_world(&ctx, &config, world);
            } else {
                debug!(world = %world, "managed world not loaded yet");
            }
        }

        let tasks = register_jobs(&ctx, &config);
        info!(
            version = ctx.bridge.version(),
            worlds = config.worlds.len(),
            radius = config.policy.tracking_radius,
            topology = %self.scheduler.topology(),
            "stasis engine started"
        );
        self.running = Some(Running { ctx, tasks });
        Ok(())
    }

    /// Cancel every job and pipeline, then restore every suspended entity.
    ///
    /// Returns how many entities were restored. A stopped engine returns 0.
    pub fn stop(&mut self) -> usize {
        let Some(running) = self.running.take() else {
            return 0;
        };
        for handle in &running.tasks {
            self.scheduler.cancel(*handle);
        }
        running.ctx.cancel();

        let ctx = &running.ctx;
        let mut worlds = ctx.config().worlds.clone();
        for world in ctx.ledger.worlds() {
            if !worlds.contains(&world) {
                worlds.push(world);
            }
        }
        let restored: usize = worlds.iter().map(|world| release_world(ctx, world)).sum();
        info!(restored, "stasis engine stopped");
        restored
    }

    /// Swap in a new configuration snapshot.
    ///
    /// Worlds no longer managed are released first. Jobs are re-registered so
    /// new intervals take effect, and triggers restart their cycle.
    pub fn reload(&mut self, config: EngineConfig) -> EngineResult<()> {
        config.validate()?;
        let Some(running) = self.running.as_mut() else {
            return Err(EngineError::NotRunning);
        };
        let ctx = Arc::clone(&running.ctx);
        let previous = ctx.config();

        for world in previous.worlds.iter().filter(|w| !config.manages(w)) {
            release_world(&ctx, world);
            ctx.ledger.drop_world(world);
        }
        for handle in running.tasks.drain(..) {
            self.scheduler.cancel(handle);
        }

        let config = Arc::new(config);
        ctx.replace_config(Arc::clone(&config));
        for world in config.worlds.iter().filter(|w| !previous.manages(w)) {
            if ctx.world.is_loaded(world) {
                prepare_world(&ctx, &config, world);
            }
        }
        running.tasks = register_jobs(&ctx, &config);
        info!(worlds = config.worlds.len(), "configuration reloaded");
        Ok(())
    }

    /// Suspend every candidate in `world` right now, bypassing batching.
    ///
    /// Returns 0 if the engine is stopped, the world is unmanaged, or a
    /// suspension pass is already running there.
    pub fn force_suspend_sweep(&self, world: &WorldId) -> usize {
        let Some(ctx) = self.context() else {
            return 0;
        };
        let config = ctx.config();
        if !config.manages(world) || !ctx.world.is_loaded(world) {
            return 0;
        }
        let Some(_ticket) = ctx.passes.try_begin(world, Operation::Suspend) else {
            debug!(world = %world, "suspension pass already running, sweep skipped");
            return 0;
        };

        let snapshot = WorldSnapshot::capture(ctx.world.as_ref(), world, &ctx.ledger);
        let candidates = suspension_candidates(&snapshot, &config.policy);
        let changed = candidates
            .iter()
            .filter(|handle| commit(ctx, handle, Operation::Suspend, &config) == Transition::Suspended)
            .count();
        ctx.emit(
            EngineEventKind::PassCompleted {
                world: world.clone(),
                operation: Operation::Suspend,
                changed,
                candidates: candidates.len(),
            },
            format!("forced suspend on {world}: {changed}/{}", candidates.len()),
        );
        if config.log.summary {
            info!(world = %world, count = changed, "forced suspension sweep");
        }
        changed
    }

    /// Restore every suspended entity in `world` and empty its records.
    pub fn force_restore_all(&self, world: &WorldId) -> usize {
        self.context().map_or(0, |ctx| release_world(ctx, world))
    }

    /// Suspended entities across all worlds.
    pub fn suspended_count(&self) -> usize {
        self.context().map_or(0, |ctx| ctx.ledger.suspended_count())
    }

    /// Suspended entities in `world`.
    pub fn suspended_in(&self, world: &WorldId) -> usize {
        self.context().map_or(0, |ctx| ctx.ledger.suspended_in(world))
    }

    /// How each capability was resolved. Empty while stopped.
    pub fn capabilities(&self) -> Vec<Resolution> {
        self.context()
            .map(|ctx| ctx.bridge.report().to_vec())
            .unwrap_or_default()
    }

    /// Unavailable-capability warnings emitted so far.
    pub fn capability_warnings(&self) -> usize {
        self.context().map_or(0, |ctx| ctx.bridge.warnings_emitted())
    }

    /// A copy of the retained event log.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.context()
            .map(|ctx| ctx.events().events().to_vec())
            .unwrap_or_default()
    }

    /// Events recorded at or after `tick`.
    pub fn events_since(&self, tick: u64) -> Vec<EngineEvent> {
        self.context()
            .map(|ctx| ctx.events().since(tick).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The active configuration snapshot.
    pub fn config(&self) -> Option<Arc<EngineConfig>> {
        self.context().map(|ctx| ctx.config())
    }

    /// Whether `start` succeeded and `stop` has not run since.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The shared context of a running engine.
    pub fn context(&self) -> Option<&Arc<EngineContext>> {
        self.running.as_ref().map(|r| &r.ctx)
    }

    // --- Host hooks ---

    /// A world finished loading.
    pub fn on_world_load(&self, world: &WorldId) {
        let Some(ctx) = self.context() else {
            return;
        };
        let config = ctx.config();
        if config.manages(world) {
            prepare_world(ctx, &config, world);
        }
    }

    /// A world is about to unload. Its entities are restored and its records dropped.
    pub fn on_world_unload(&self, world: &WorldId) -> usize {
        let Some(ctx) = self.context() else {
            return 0;
        };
        let restored = release_world(ctx, world);
        ctx.ledger.drop_world(world);
        restored
    }

    /// A chunk is about to unload with `entities` in it.
    ///
    /// They are restored first so nothing is written to disk suspended.
    pub fn on_chunk_unload(&self, world: &WorldId, entities: &[EntityRef]) -> usize {
        let Some(ctx) = self.context() else {
            return 0;
        };
        let restored = entities
            .iter()
            .filter(|handle| handle.world() == *world)
            .filter(|handle| ctx.ledger.restore(handle.as_ref()) == Transition::Restored)
            .count();
        if restored > 0 {
            debug!(world = %world, count = restored, "restored entities of unloading chunk");
        }
        restored
    }

    /// An entity left the simulation.
    pub fn on_entity_removed(&self, world: &WorldId, id: EntityId) {
        let forgotten = self
            .context()
            .is_some_and(|ctx| ctx.ledger.forget(world, id));
        if forgotten {
            debug!(entity = %id, "record dropped for removed entity");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start tracking `world`, apply host defaults and heal leftovers from a previous run.
fn prepare_world(ctx: &EngineContext, config: &EngineConfig, world: &WorldId) {
    ctx.ledger.ensure_world(world);

    if let Some(defaults) = &config.host_defaults {
        let report = ctx.bridge.override_host_defaults(world, defaults);
        if !report.skipped.is_empty() {
            warn!(
                world = %world,
                written = report.written.len(),
                skipped = report.skipped.len(),
                "some host defaults could not be applied"
            );
        }
    }

    if config.heal_on_start {
        let marked: Vec<EntityRef> = ctx
            .world
            .entities(world)
            .into_iter()
            .filter(|e| e.has_tag(MARKER_KEY))
            .collect();
        let healed = ctx.ledger.force_restore_all(world, &marked);
        if healed > 0 {
            info!(world = %world, count = healed, "restored entities left suspended by a previous run");
        }
    }
}

/// Restore everything suspended in `world`.
fn release_world(ctx: &EngineContext, world: &WorldId) -> usize {
    let entities = ctx.world.entities(world);
    let restored = ctx.ledger.force_restore_all(world, &entities);
    ctx.emit(
        EngineEventKind::WorldReleased {
            world: world.clone(),
            restored,
        },
        format!("released {restored} entities in {world}"),
    );
    if restored > 0 {
        info!(world = %world, count = restored, "restored all suspended entities");
    }
    restored
}

fn register_jobs(ctx: &Arc<EngineContext>, config: &EngineConfig) -> Vec<TaskHandle> {
    jobs_for(config)
        .into_iter()
        .map(|job| {
            let delay = job.delay(config);
            let period = job.period(config);
            debug!(job = job.name(), delay, period, "registering job");
            let job_ctx = Arc::clone(ctx);
            ctx.scheduler
                .run_periodic(delay, period, Arc::new(move || job.run(&job_ctx)))
        })
        .collect()
}
