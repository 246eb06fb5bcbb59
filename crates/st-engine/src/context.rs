use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use st_core::{Scheduler, WorldQuery};

use crate::activity::ActivityLedger;
use crate::bridge::CapabilityBridge;
use crate::config::EngineConfig;
use crate::event::{EngineEvent, EngineEventKind, EventLog};
use crate::pipeline::{CancelToken, PassGuard};
use crate::trigger::TriggerSet;

/// Everything a running engine's jobs and pipelines share.
///
/// One context lives from `start` to `stop`. Scheduled tasks hold it by `Arc`.
pub struct EngineContext {
    config: RwLock<Arc<EngineConfig>>,
    /// Capabilities resolved at start.
    pub bridge: Arc<CapabilityBridge>,
    /// Read access to the host's worlds.
    pub world: Arc<dyn WorldQuery>,
    /// Where jobs and pipeline steps are dispatched.
    pub scheduler: Arc<dyn Scheduler>,
    /// Suspension records per world.
    pub ledger: ActivityLedger,
    /// One pass per world and operation.
    pub passes: Arc<PassGuard>,
    triggers: Mutex<TriggerSet>,
    events: Mutex<EventLog>,
    cancel: CancelToken,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("bridge", &self.bridge)
            .field("ledger", &self.ledger)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl EngineContext {
    /// Assemble a context around an already resolved bridge.
    pub fn new(
        config: Arc<EngineConfig>,
        bridge: Arc<CapabilityBridge>,
        world: Arc<dyn WorldQuery>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let ledger = ActivityLedger::new(
            Arc::clone(&bridge),
            config.disable_ticking,
            config.disable_ai,
        );
        let triggers = TriggerSet::new(&config.triggers, scheduler.current_tick());
        let events = EventLog::new(config.max_events);
        Self {
            config: RwLock::new(config),
            bridge,
            world,
            scheduler,
            ledger,
            passes: Arc::new(PassGuard::default()),
            triggers: Mutex::new(triggers),
            events: Mutex::new(events),
            cancel: CancelToken::default(),
        }
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a new snapshot. Triggers restart their cycle from now.
    pub fn replace_config(&self, config: Arc<EngineConfig>) {
        self.ledger
            .set_toggles(config.disable_ticking, config.disable_ai);
        *self.triggers() = TriggerSet::new(&config.triggers, self.tick());
        self.events().set_max_events(config.max_events);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// The host's current tick.
    pub fn tick(&self) -> u64 {
        self.scheduler.current_tick()
    }

    /// Record an event at the current tick.
    pub fn emit(&self, kind: EngineEventKind, description: impl Into<String>) {
        let event = EngineEvent::new(self.tick(), kind, description);
        self.events().push(event);
    }

    /// Lock the event log.
    pub fn events(&self) -> MutexGuard<'_, EventLog> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the trigger set.
    pub fn triggers(&self) -> MutexGuard<'_, TriggerSet> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop every in-flight pipeline at its next step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether `cancel` was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
