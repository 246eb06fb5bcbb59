use st_core::{EntityId, WorldId};

use crate::config::TriggerKind;
use crate::pipeline::Operation;

/// What kind of engine event occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    // Triggers
    /// A trigger requested a suspension pass.
    TriggerFired {
        /// The trigger that fired.
        trigger: TriggerKind,
    },
    /// A pass was not started because one was already running for the world.
    PassSkipped {
        /// World whose pass was skipped.
        world: WorldId,
        /// The operation that was skipped.
        operation: Operation,
    },
    /// A batched pass ran to completion or was cancelled.
    PassCompleted {
        /// World the pass ran on.
        world: WorldId,
        /// The pass operation.
        operation: Operation,
        /// Entities that changed state.
        changed: usize,
        /// Candidates the pass started with.
        candidates: usize,
    },

    // Transitions (only with detailed logging)
    /// An entity was suspended.
    Suspended {
        /// The suspended entity.
        entity: EntityId,
    },
    /// An entity was restored.
    Restored {
        /// The restored entity.
        entity: EntityId,
    },

    // Repairs
    /// A marker without a record was found and the record re-created.
    Reconciled {
        /// The entity whose record was re-created.
        entity: EntityId,
    },
    /// Records of entities that left the world were dropped.
    RecordsDropped {
        /// World the records belonged to.
        world: WorldId,
        /// How many were dropped.
        count: usize,
    },

    // Lifecycle
    /// A world's suspended entities were force-restored.
    WorldReleased {
        /// The world that was released.
        world: WorldId,
        /// Entities restored.
        restored: usize,
    },
}

impl EngineEventKind {
    /// Check whether a given entity is involved in this event.
    pub fn involves(&self, id: EntityId) -> bool {
        match self {
            Self::Suspended { entity } | Self::Restored { entity } | Self::Reconciled { entity } => {
                *entity == id
            }
            _ => false,
        }
    }

    /// The world this event concerns, if it concerns one.
    pub fn world(&self) -> Option<&WorldId> {
        match self {
            Self::PassSkipped { world, .. }
            | Self::PassCompleted { world, .. }
            | Self::RecordsDropped { world, .. }
            | Self::WorldReleased { world, .. } => Some(world),
            _ => None,
        }
    }
}

/// A record of something the engine did.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    /// The host tick when this event occurred.
    pub tick: u64,
    /// The specific kind of event that occurred.
    pub kind: EngineEventKind,
    /// A human-readable description of the event.
    pub description: String,
}

impl EngineEvent {
    /// Create a new engine event with the given tick, kind, and description.
    pub fn new(tick: u64, kind: EngineEventKind, description: impl Into<String>) -> Self {
        Self {
            tick,
            kind,
            description: description.into(),
        }
    }
}

/// Accumulates engine events for operators and tests.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<EngineEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log with the given maximum capacity (0 = unlimited).
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            max_events,
        }
    }

    /// Append an event, dropping the oldest events if the log exceeds its capacity.
    pub fn push(&mut self, event: EngineEvent) {
        self.events.push(event);
        if self.max_events > 0 && self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(..drain_count);
        }
    }

    /// Return a slice of all recorded events.
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Events recorded after `tick` (exclusive).
    pub fn since(&self, tick: u64) -> Vec<&EngineEvent> {
        self.events.iter().filter(|e| e.tick > tick).collect()
    }

    /// Return all events involving the given entity.
    pub fn events_for_entity(&self, id: EntityId) -> Vec<&EngineEvent> {
        self.events.iter().filter(|e| e.kind.involves(id)).collect()
    }

    /// Count events matching `pred`.
    pub fn count(&self, pred: impl Fn(&EngineEventKind) -> bool) -> usize {
        self.events.iter().filter(|e| pred(&e.kind)).count()
    }

    /// Return the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Return `true` if no events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Change the capacity, trimming immediately if needed.
    pub fn set_max_events(&mut self, max_events: usize) {
        self.max_events = max_events;
        if max_events > 0 && self.events.len() > max_events {
            let drain_count = self.events.len() - max_events;
            self.events.drain(..drain_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspended(tick: u64, entity: EntityId) -> EngineEvent {
        EngineEvent::new(tick, EngineEventKind::Suspended { entity }, "test")
    }

    #[test]
    fn event_log_push_and_query() {
        let mut log = EventLog::new(0);
        let id = EntityId::new();
        log.push(suspended(1, id));
        log.push(EngineEvent::new(
            2,
            EngineEventKind::TriggerFired {
                trigger: TriggerKind::Always,
            },
            "always",
        ));
        assert_eq!(log.len(), 2);
        assert_eq!(log.since(1).len(), 1);
        assert_eq!(log.events_for_entity(id).len(), 1);
        assert_eq!(
            log.count(|k| matches!(k, EngineEventKind::TriggerFired { .. })),
            1
        );
    }

    #[test]
    fn event_log_max_events_trims() {
        let mut log = EventLog::new(2);
        let id = EntityId::new();
        for i in 0..5 {
            log.push(suspended(i, id));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.events()[0].tick, 3);
        assert_eq!(log.events()[1].tick, 4);

        log.set_max_events(1);
        assert_eq!(log.events()[0].tick, 4);
    }

    #[test]
    fn event_world_accessor() {
        let world = WorldId::new("world");
        let kind = EngineEventKind::PassCompleted {
            world: world.clone(),
            operation: Operation::Suspend,
            changed: 3,
            candidates: 4,
        };
        assert_eq!(kind.world(), Some(&world));
        assert!(!kind.involves(EntityId::new()));
        assert_eq!(EngineEventKind::Restored { entity: EntityId::new() }.world(), None);
    }

    #[test]
    fn event_log_clear() {
        let mut log = EventLog::new(0);
        log.push(suspended(1, EntityId::new()));
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }
}
