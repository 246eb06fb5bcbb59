//! Entity suspension engine for Stasis.
//!
//! Gates the behaviour processing of entities no client can observe. A set of
//! triggers starts suspension passes over each managed world, a periodic scan
//! restores entities a client came back to, and every transition goes through
//! the [`activity::ActivityLedger`]. Host access is resolved once at start by
//! the [`bridge::CapabilityBridge`], which degrades per capability instead of
//! failing.

/// The activity ledger: the only place entities change state.
pub mod activity;
/// Runtime capability resolution against the host surface.
pub mod bridge;
/// Configuration snapshot types.
pub mod config;
/// Shared state of a running engine.
pub mod context;
/// Top-level engine lifecycle and host hooks.
pub mod engine;
/// Error types for the engine crate.
pub mod error;
/// Engine event types and the event log.
pub mod event;
/// Periodic jobs registered with the host scheduler.
pub mod job;
/// Batched commit of suspension and restoration passes.
pub mod pipeline;
/// Exclusion rules deciding which entities may be suspended.
pub mod policy;
/// The restoration scan.
pub mod restore;
/// Candidate selection over world snapshots.
pub mod select;
/// Suspension triggers and their cooldowns.
pub mod trigger;

/// Re-exports of [`activity::ActivityLedger`], [`activity::Transition`], and [`activity::MARKER_KEY`].
pub use activity::{ActivityLedger, MARKER_KEY, Transition};
/// Re-exports of the bridge and its resolution report types.
pub use bridge::{Capability, CapabilityBridge, CapabilityStatus, DefaultsReport, Resolution, Tier};
/// Re-exports of the configuration types.
pub use config::{EngineConfig, HostDefaults, LogConfig, RateLogConfig, TriggerConfig, TriggerKind};
/// Re-export of [`context::EngineContext`].
pub use context::EngineContext;
/// Re-export of [`engine::Engine`].
pub use engine::Engine;
/// Re-exports of [`error::EngineError`] and [`error::EngineResult`].
pub use error::{EngineError, EngineResult};
/// Re-exports of [`event::EventLog`], [`event::EngineEvent`], and [`event::EngineEventKind`].
pub use event::{EngineEvent, EngineEventKind, EventLog};
/// Re-export of [`job::Job`].
pub use job::Job;
/// Re-exports of [`pipeline::Operation`] and [`pipeline::PassGuard`].
pub use pipeline::{Operation, PassGuard};
/// Re-exports of [`policy::SuspensionPolicy`], [`policy::IgnoreRules`], and [`policy::Exclusion`].
pub use policy::{Exclusion, IgnoreRules, SuspensionPolicy};
