//! Batched commit of state transitions.
//!
//! A pass hands its candidates to a [`BatchPipeline`]. Each step dispatches
//! one batch, every entity to the context that owns it, then yields a tick
//! before the next batch. Commits re-check liveness and the cancel token
//! because the world moved on since the snapshot was taken.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use st_core::{EntityRef, WorldId};
use tracing::{debug, info};

use crate::activity::Transition;
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::event::EngineEventKind;
use crate::select::{WorldSnapshot, suspension_candidates};

/// The transition a pass applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Freeze entities no client can observe.
    Suspend,
    /// Wake entities a client came back to.
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspend => write!(f, "suspend"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// Allows one pass per world and operation at a time.
#[derive(Debug, Default)]
pub struct PassGuard {
    active: Mutex<HashSet<(WorldId, Operation)>>,
}

impl PassGuard {
    /// Claim the pass slot. `None` if a pass of this kind is already running.
    pub fn try_begin(self: &Arc<Self>, world: &WorldId, operation: Operation) -> Option<PassTicket> {
        let key = (world.clone(), operation);
        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then(|| PassTicket {
            guard: Arc::clone(self),
            key,
        })
    }

    /// Whether a pass of this kind is running for `world`.
    pub fn is_active(&self, world: &WorldId, operation: Operation) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(world.clone(), operation))
    }
}

/// Holds a pass slot until dropped.
#[derive(Debug)]
pub struct PassTicket {
    guard: Arc<PassGuard>,
    key: (WorldId, Operation),
}

impl Drop for PassTicket {
    fn drop(&mut self) {
        self.guard
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Set once at teardown; in-flight pipelines stop at their next step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Stop every holder of this token at its next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether any clone was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Candidates of one pass, committed a batch per tick.
pub struct BatchPipeline {
    world: WorldId,
    operation: Operation,
    config: Arc<EngineConfig>,
    queue: VecDeque<EntityRef>,
    candidates: usize,
    changed: Arc<AtomicUsize>,
    _ticket: PassTicket,
}

impl fmt::Debug for BatchPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchPipeline")
            .field("world", &self.world)
            .field("operation", &self.operation)
            .field("remaining", &self.queue.len())
            .field("candidates", &self.candidates)
            .finish()
    }
}

impl BatchPipeline {
    /// Queue `candidates` for `operation`, holding `ticket` until the pass finishes.
    pub fn new(
        world: WorldId,
        operation: Operation,
        candidates: Vec<EntityRef>,
        config: Arc<EngineConfig>,
        ticket: PassTicket,
    ) -> Self {
        Self {
            world,
            operation,
            config,
            candidates: candidates.len(),
            queue: candidates.into(),
            changed: Arc::new(AtomicUsize::new(0)),
            _ticket: ticket,
        }
    }

    /// Entities not yet dispatched.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

/// Dispatch the next batch of `pipeline`, then reschedule it one tick later.
///
/// Once the queue is empty the pipeline waits one more tick so the last
/// batch's commits have landed, then reports and releases its pass slot.
pub fn drive(ctx: Arc<EngineContext>, mut pipeline: BatchPipeline) {
    if ctx.is_cancelled() {
        debug!(world = %pipeline.world, operation = %pipeline.operation, "pipeline cancelled");
        return;
    }
    if pipeline.queue.is_empty() {
        finish(&ctx, &pipeline);
        return;
    }

    let take = pipeline.config.policy.batch_size.min(pipeline.queue.len());
    let batch: Vec<EntityRef> = pipeline.queue.drain(..take).collect();
    for handle in batch {
        dispatch(&ctx, &pipeline, handle);
    }

    let next = Arc::clone(&ctx);
    ctx.scheduler
        .run_delayed(1, Box::new(move || drive(next, pipeline)));
}

fn dispatch(ctx: &Arc<EngineContext>, pipeline: &BatchPipeline, handle: EntityRef) {
    let id = handle.id();
    let task_ctx = Arc::clone(ctx);
    let task_handle = Arc::clone(&handle);
    let operation = pipeline.operation;
    let config = Arc::clone(&pipeline.config);
    let changed = Arc::clone(&pipeline.changed);

    let task = Box::new(move || {
        if task_ctx.is_cancelled() {
            return;
        }
        let outcome = commit(&task_ctx, &task_handle, operation, &config);
        if outcome.changed() {
            changed.fetch_add(1, Ordering::Relaxed);
        }
    });
    if ctx.scheduler.run_for_entity(&handle, task).is_none() {
        debug!(entity = %id, "entity retired before dispatch");
        if operation == Operation::Restore {
            ctx.ledger.forget(&pipeline.world, id);
        }
    }
}

/// Apply `operation` to one entity on its owning context.
pub(crate) fn commit(
    ctx: &EngineContext,
    handle: &EntityRef,
    operation: Operation,
    config: &EngineConfig,
) -> Transition {
    let outcome = match operation {
        Operation::Suspend => ctx.ledger.suspend(handle.as_ref(), &config.policy),
        Operation::Restore => ctx.ledger.restore(handle.as_ref()),
    };
    if config.log.detailed {
        let entity = handle.id();
        match outcome {
            Transition::Suspended => {
                debug!(entity = %entity, kind = %handle.kind(), "suspended");
                ctx.emit(EngineEventKind::Suspended { entity }, format!("suspended {entity}"));
            }
            Transition::Restored => {
                debug!(entity = %entity, kind = %handle.kind(), "restored");
                ctx.emit(EngineEventKind::Restored { entity }, format!("restored {entity}"));
            }
            _ => {}
        }
    }
    outcome
}

fn finish(ctx: &EngineContext, pipeline: &BatchPipeline) {
    let changed = pipeline.changed.load(Ordering::Relaxed);
    if pipeline.config.log.summary && changed > 0 {
        info!(
            world = %pipeline.world,
            operation = %pipeline.operation,
            count = changed,
            candidates = pipeline.candidates,
            "pass complete"
        );
    }
    ctx.emit(
        EngineEventKind::PassCompleted {
            world: pipeline.world.clone(),
            operation: pipeline.operation,
            changed,
            candidates: pipeline.candidates,
        },
        format!(
            "{} pass on {}: {changed}/{}",
            pipeline.operation, pipeline.world, pipeline.candidates
        ),
    );
}

/// Start a suspension pass over `world`.
///
/// Runs on the global context: snapshots the world, selects on a background
/// worker, then feeds a pipeline. Returns `false` when a pass is already running.
pub fn begin_suspension_pass(ctx: &Arc<EngineContext>, world: &WorldId) -> bool {
    let Some(ticket) = ctx.passes.try_begin(world, Operation::Suspend) else {
        debug!(world = %world, "suspension pass already running, skipping");
        ctx.emit(
            EngineEventKind::PassSkipped {
                world: world.clone(),
                operation: Operation::Suspend,
            },
            format!("suspension pass on {world} skipped"),
        );
        return false;
    };

    let config = ctx.config();
    let snapshot = WorldSnapshot::capture(ctx.world.as_ref(), world, &ctx.ledger);
    let worker_ctx = Arc::clone(ctx);
    ctx.scheduler.run_async(Box::new(move || {
        let candidates = suspension_candidates(&snapshot, &config.policy);
        if candidates.is_empty() {
            return;
        }
        let pipeline = BatchPipeline::new(snapshot.world, Operation::Suspend, candidates, config, ticket);
        let driver = Arc::clone(&worker_ctx);
        worker_ctx
            .scheduler
            .run_now(Box::new(move || drive(driver, pipeline)));
    }));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_guard_serializes_per_world_and_operation() {
        let guard = Arc::new(PassGuard::default());
        let world = WorldId::new("world");
        let ticket = guard.try_begin(&world, Operation::Suspend).unwrap();
        assert!(guard.try_begin(&world, Operation::Suspend).is_none());
        assert!(guard.try_begin(&world, Operation::Restore).is_some());
        assert!(guard.try_begin(&WorldId::new("other"), Operation::Suspend).is_some());
        assert!(guard.is_active(&world, Operation::Suspend));

        drop(ticket);
        assert!(!guard.is_active(&world, Operation::Suspend));
        assert!(guard.try_begin(&world, Operation::Suspend).is_some());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::default();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
