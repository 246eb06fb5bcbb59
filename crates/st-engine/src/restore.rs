//! The restoration scan.
//!
//! A scan runs per managed world on the global context. It first repairs the
//! ledger against the world, then restores everything suspended that a client
//! has come within range of. Records of entities that left are dropped on the
//! spot, since nothing owns them any more. Markers found without a record get
//! one back on the entity's owning context.

use std::collections::HashSet;
use std::sync::Arc;

use st_core::{EntityId, EntityRef, WorldId};
use tracing::debug;

use crate::activity::MARKER_KEY;
use crate::context::EngineContext;
use crate::event::EngineEventKind;
use crate::pipeline::{BatchPipeline, Operation, drive};
use crate::select::{WorldSnapshot, restoration_candidates};

/// Scan `world` for suspended entities a client came back to.
///
/// Worlds with no connected client are skipped outright, since nothing there
/// can be in range. Returns whether a scan was started.
pub fn begin_restoration_scan(ctx: &Arc<EngineContext>, world: &WorldId) -> bool {
    if !ctx.world.is_loaded(world) || ctx.world.clients(world).is_empty() {
        return false;
    }
    let Some(ticket) = ctx.passes.try_begin(world, Operation::Restore) else {
        debug!(world = %world, "restoration scan already running, skipping");
        ctx.emit(
            EngineEventKind::PassSkipped {
                world: world.clone(),
                operation: Operation::Restore,
            },
            format!("restoration scan on {world} skipped"),
        );
        return false;
    };

    let config = ctx.config();
    let mut snapshot = WorldSnapshot::capture(ctx.world.as_ref(), world, &ctx.ledger);
    repair(ctx, &mut snapshot);

    let worker_ctx = Arc::clone(ctx);
    ctx.scheduler.run_async(Box::new(move || {
        let candidates = restoration_candidates(&snapshot, &config.policy);
        if candidates.is_empty() {
            return;
        }
        let pipeline = BatchPipeline::new(snapshot.world, Operation::Restore, candidates, config, ticket);
        let driver = Arc::clone(&worker_ctx);
        worker_ctx
            .scheduler
            .run_now(Box::new(move || drive(driver, pipeline)));
    }));
    true
}

/// Bring the ledger in line with what `snapshot` saw.
fn repair(ctx: &Arc<EngineContext>, snapshot: &mut WorldSnapshot) {
    let world = &snapshot.world;
    let present: HashSet<EntityId> = snapshot.entities.iter().map(|e| e.handle.id()).collect();
    let dropped = ctx.ledger.retain(world, &present);
    if dropped > 0 {
        debug!(world = %world, count = dropped, "dropped records of departed entities");
        ctx.emit(
            EngineEventKind::RecordsDropped {
                world: world.clone(),
                count: dropped,
            },
            format!("dropped {dropped} records in {world}"),
        );
    }

    for entity in snapshot.entities.iter_mut().filter(|e| e.marked && !e.suspended) {
        let task_ctx = Arc::clone(ctx);
        let task_world = world.clone();
        let handle = Arc::clone(&entity.handle);
        let dispatched = ctx.scheduler.run_for_entity(
            &entity.handle,
            Box::new(move || reconcile(&task_ctx, &task_world, &handle)),
        );
        if dispatched.is_some() {
            entity.suspended = true;
        }
    }
}

/// Re-create the record of a marked entity. Runs on the entity's owning context.
fn reconcile(ctx: &EngineContext, world: &WorldId, handle: &EntityRef) {
    if !handle.is_alive() || !handle.has_tag(MARKER_KEY) {
        return;
    }
    let id = handle.id();
    if ctx.ledger.reconcile(world, id) {
        debug!(entity = %id, "record re-created from marker");
        ctx.emit(
            EngineEventKind::Reconciled { entity: id },
            format!("reconciled {id}"),
        );
    }
}
