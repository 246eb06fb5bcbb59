//! Integration tests for the engine lifecycle.

use std::fs;
use std::sync::Arc;

use st_core::sandbox::{SandboxEntity, SandboxHost, SurfaceProfile, TickScheduler};
use st_core::{EntityHandle, EntityKind, EntityRef, Position, Topology, WorldId};
use st_engine::{
    Capability, Engine, EngineConfig, EngineError, EngineEventKind, MARKER_KEY, Operation,
    TriggerConfig,
};
use tempfile::TempDir;

struct Harness {
    host: Arc<SandboxHost>,
    scheduler: Arc<TickScheduler>,
    engine: Engine,
}

fn world() -> WorldId {
    WorldId::new("world")
}

fn harness(profile: SurfaceProfile, topology: Topology) -> Harness {
    let host = Arc::new(SandboxHost::with_world(profile, "world"));
    let scheduler = Arc::new(TickScheduler::new(topology, host.clock()));
    let engine = Engine::new(host.clone(), scheduler.clone(), host.surface());
    Harness {
        host,
        scheduler,
        engine,
    }
}

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_worlds(["world"])
        .with_triggers(vec![TriggerConfig::always(20)])
        .with_restore_interval(10)
}

fn cow_at(host: &SandboxHost, x: f64) -> Arc<SandboxEntity> {
    host.spawn(&world(), EntityKind::Animal, Position::new(x, 64.0, 0.0))
}

fn is_suspended(entity: &SandboxEntity) -> bool {
    !entity.is_ticking() && entity.has_tag(MARKER_KEY)
}

#[test]
fn trigger_suspends_only_entities_out_of_range() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    h.host.connect_client(&world(), Position::new(0.0, 64.0, 0.0));
    let near = cow_at(&h.host, 10.0);
    let far = cow_at(&h.host, 200.0);
    h.engine.start(config()).unwrap();

    h.scheduler.run_ticks(19);
    assert!(!is_suspended(&far));

    h.scheduler.run_ticks(2);
    assert!(is_suspended(&far));
    assert!(!far.is_aware());
    assert!(!is_suspended(&near));
    assert!(near.is_aware());
    assert_eq!(h.engine.suspended_in(&world()), 1);

    let completed = h.engine.events().iter().any(|e| {
        matches!(
            e.kind,
            EngineEventKind::PassCompleted {
                operation: Operation::Suspend,
                changed: 1,
                ..
            }
        )
    });
    assert!(completed);
}

#[test]
fn repeated_suspension_is_idempotent() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    for x in 0..5 {
        cow_at(&h.host, f64::from(x) * 10.0);
    }
    h.engine.start(config()).unwrap();

    assert_eq!(h.engine.force_suspend_sweep(&world()), 5);
    let calls = h.host.surface().calls().mutations();
    let tags: Vec<_> = h.host.mobs(&world()).iter().map(|m| m.tags()).collect();

    assert_eq!(h.engine.force_suspend_sweep(&world()), 0);
    assert_eq!(h.host.surface().calls().mutations(), calls);
    let after: Vec<_> = h.host.mobs(&world()).iter().map(|m| m.tags()).collect();
    assert_eq!(tags, after);
    assert_eq!(h.engine.suspended_count(), 5);
}

#[test]
fn restoring_an_active_entity_touches_nothing() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let cow = cow_at(&h.host, 0.0);
    h.engine.start(config()).unwrap();

    let handle: EntityRef = cow.clone();
    assert_eq!(h.engine.on_chunk_unload(&world(), &[handle]), 0);
    assert_eq!(h.host.surface().calls().mutations(), 0);
    assert!(cow.tags().is_empty());
}

#[test]
fn force_restore_all_empties_the_world() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let cows: Vec<_> = (0..8).map(|x| cow_at(&h.host, f64::from(x))).collect();
    h.engine.start(config()).unwrap();
    h.engine.force_suspend_sweep(&world());
    assert_eq!(h.engine.suspended_count(), 8);

    assert_eq!(h.engine.force_restore_all(&world()), 8);
    assert_eq!(h.engine.suspended_count(), 0);
    assert!(cows.iter().all(|c| c.is_ticking() && c.is_aware()));
    assert!(cows.iter().all(|c| !c.has_tag(MARKER_KEY)));
}

#[test]
fn approaching_client_restores_within_one_scan() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let avatar = h.host.connect_client(&world(), Position::new(0.0, 64.0, 0.0));
    let cow = cow_at(&h.host, 300.0);
    h.engine.start(config()).unwrap();
    h.scheduler.run_ticks(21);
    assert!(is_suspended(&cow));

    avatar.set_position(Position::new(290.0, 64.0, 0.0));
    // One full restore interval plus the pipeline's closing tick.
    h.scheduler.run_ticks(11);
    assert!(cow.is_ticking());
    assert!(cow.is_aware());
    assert!(!cow.has_tag(MARKER_KEY));
    assert_eq!(h.engine.suspended_count(), 0);
}

#[test]
fn tracking_radius_boundary_is_inclusive() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    h.host.connect_client(&world(), Position::new(0.0, 64.0, 0.0));
    let on_edge = h
        .host
        .spawn(&world(), EntityKind::Monster, Position::new(32.0, 64.0, 0.0));
    let past_edge = h
        .host
        .spawn(&world(), EntityKind::Monster, Position::new(32.0, 64.0, 1.0));
    h.engine.start(config().with_tracking_radius(32.0)).unwrap();

    assert_eq!(h.engine.force_suspend_sweep(&world()), 1);
    assert!(!is_suspended(&on_edge));
    assert!(is_suspended(&past_edge));
}

#[test]
fn rate_trigger_fires_once_per_cooldown_window() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    h.host.set_tick_rate(15.0);
    cow_at(&h.host, 0.0);
    let config = config().with_triggers(vec![
        TriggerConfig::rate_below(18.0, 1).with_cooldown(9000),
    ]);
    h.engine.start(config).unwrap();

    h.scheduler.run_ticks(18000);
    let fired: Vec<u64> = h
        .engine
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EngineEventKind::TriggerFired { .. }))
        .map(|e| e.tick)
        .collect();
    assert_eq!(fired, vec![1, 9001]);
}

#[test]
fn healthy_rate_never_fires_rate_trigger() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let cow = cow_at(&h.host, 0.0);
    let config = config().with_triggers(vec![TriggerConfig::rate_below(18.5, 5)]);
    h.engine.start(config).unwrap();

    h.scheduler.run_ticks(200);
    assert!(!is_suspended(&cow));
    h.host.set_tick_rate(12.0);
    h.scheduler.run_ticks(7);
    assert!(is_suspended(&cow));
}

#[test]
fn orphan_marker_is_reconciled_within_one_scan() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    h.host.connect_client(&world(), Position::new(0.0, 64.0, 0.0));
    let far = h.host.insert(
        SandboxEntity::new(world(), EntityKind::Animal, Position::new(500.0, 64.0, 0.0))
            .with_tag(MARKER_KEY),
    );
    let near = h.host.insert(
        SandboxEntity::new(world(), EntityKind::Animal, Position::new(4.0, 64.0, 0.0))
            .with_tag(MARKER_KEY),
    );
    h.engine
        .start(config().with_triggers(Vec::new()))
        .unwrap();
    assert_eq!(h.engine.suspended_count(), 0);

    h.scheduler.run_ticks(12);
    let reconciled = h
        .engine
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EngineEventKind::Reconciled { .. }))
        .count();
    assert_eq!(reconciled, 2);
    assert_eq!(h.engine.suspended_count(), 1);
    assert!(far.has_tag(MARKER_KEY));
    assert!(!near.has_tag(MARKER_KEY));
}

#[test]
fn missing_ai_capability_still_disables_ticking() {
    let mut h = harness(SurfaceProfile::modern().without_ai(), Topology::Single);
    let cows: Vec<_> = (0..20).map(|x| cow_at(&h.host, f64::from(x))).collect();
    h.engine.start(config()).unwrap();

    assert_eq!(h.engine.force_suspend_sweep(&world()), 20);
    assert!(cows.iter().all(|c| !c.is_ticking() && c.is_aware()));
    assert_eq!(h.engine.capability_warnings(), 1);
    let ai = h
        .engine
        .capabilities()
        .into_iter()
        .find(|r| r.capability == Capability::Ai)
        .unwrap();
    assert!(!ai.status.is_available());
}

#[test]
fn overlapping_passes_are_skipped() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    cow_at(&h.host, 0.0);
    let config = config().with_triggers(vec![TriggerConfig::always(20), TriggerConfig::always(20)]);
    h.engine.start(config).unwrap();

    h.scheduler.run_ticks(21);
    let events = h.engine.events();
    let fired = events
        .iter()
        .filter(|e| matches!(e.kind, EngineEventKind::TriggerFired { .. }))
        .count();
    let skipped = events
        .iter()
        .filter(|e| matches!(e.kind, EngineEventKind::PassSkipped { .. }))
        .count();
    assert_eq!(fired, 2);
    assert_eq!(skipped, 1);
    assert_eq!(h.engine.suspended_count(), 1);
}

#[test]
fn batches_are_spread_over_ticks() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    for x in 0..25 {
        cow_at(&h.host, f64::from(x));
    }
    h.engine
        .start(config().with_batch_size(10))
        .unwrap();

    h.scheduler.run_ticks(20);
    assert_eq!(h.engine.suspended_count(), 10);
    h.scheduler.run_ticks(1);
    assert_eq!(h.engine.suspended_count(), 20);
    h.scheduler.run_ticks(1);
    assert_eq!(h.engine.suspended_count(), 25);
}

#[test]
fn regionized_host_commits_on_region_threads() {
    let mut h = harness(
        SurfaceProfile::modern(),
        Topology::Regionized { region_size: 64 },
    );
    let cows: Vec<_> = (0..12)
        .map(|i| cow_at(&h.host, f64::from(i) * 100.0 - 600.0))
        .collect();
    h.engine.start(config()).unwrap();

    h.scheduler.run_ticks(21);
    assert!(cows.iter().all(|c| is_suspended(c)));
    assert_eq!(h.engine.suspended_count(), 12);

    assert_eq!(h.engine.stop(), 12);
    assert!(cows.iter().all(|c| c.is_ticking() && !c.has_tag(MARKER_KEY)));
}

#[test]
fn stop_restores_everything() {
    let mut h = harness(SurfaceProfile::legacy(), Topology::Single);
    let cows: Vec<_> = (0..4).map(|x| cow_at(&h.host, f64::from(x))).collect();
    h.engine.start(config()).unwrap();
    h.engine.force_suspend_sweep(&world());

    assert_eq!(h.engine.stop(), 4);
    assert!(!h.engine.is_running());
    assert!(cows.iter().all(|c| c.is_ticking() && c.is_aware()));
    assert_eq!(h.engine.suspended_count(), 0);

    // Jobs are gone: nothing is suspended again.
    h.scheduler.run_ticks(100);
    assert!(cows.iter().all(|c| !is_suspended(c)));
}

#[test]
fn chunk_unload_restores_its_entities() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let a = cow_at(&h.host, 0.0);
    let b = cow_at(&h.host, 1.0);
    h.engine.start(config()).unwrap();
    h.engine.force_suspend_sweep(&world());

    let chunk = [a.clone() as EntityRef];
    assert_eq!(h.engine.on_chunk_unload(&world(), &chunk), 1);
    assert!(!is_suspended(&a));
    assert!(is_suspended(&b));
    assert_eq!(h.engine.suspended_count(), 1);
}

#[test]
fn removed_entities_lose_their_record() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let cow = cow_at(&h.host, 0.0);
    h.engine.start(config()).unwrap();
    h.engine.force_suspend_sweep(&world());

    h.host.kill(&world(), cow.id());
    h.engine.on_entity_removed(&world(), cow.id());
    assert_eq!(h.engine.suspended_count(), 0);
}

#[test]
fn world_unload_releases_the_world() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let cow = cow_at(&h.host, 0.0);
    h.engine.start(config()).unwrap();
    h.engine.force_suspend_sweep(&world());

    assert_eq!(h.engine.on_world_unload(&world()), 1);
    assert!(!is_suspended(&cow));
    assert!(h.engine.events().iter().any(|e| matches!(
        e.kind,
        EngineEventKind::WorldReleased { restored: 1, .. }
    )));
}

#[test]
fn unmanaged_worlds_are_left_alone() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let other = WorldId::new("creative");
    let cow = h.host.spawn(&other, EntityKind::Animal, Position::default());
    h.engine.start(config()).unwrap();

    assert_eq!(h.engine.force_suspend_sweep(&other), 0);
    h.scheduler.run_ticks(50);
    assert!(!is_suspended(&cow));
}

#[test]
fn heal_on_start_clears_leftover_markers() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let leftover = h.host.insert(
        SandboxEntity::new(world(), EntityKind::Monster, Position::default()).with_tag(MARKER_KEY),
    );
    h.engine
        .start(config().with_heal_on_start(true))
        .unwrap();
    assert!(!leftover.has_tag(MARKER_KEY));
    assert_eq!(h.engine.suspended_count(), 0);
}

#[test]
fn host_defaults_are_written_at_start() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    let defaults = st_engine::HostDefaults::default();
    h.engine
        .start(config().with_host_defaults(defaults))
        .unwrap();
    let surface = h.host.surface();
    assert!(surface.world_field(&world(), "mobSpawnRange").is_some());
    assert_eq!(
        surface.ticks_per_spawn(&world(), st_core::SpawnCategory::Monsters),
        Some(6)
    );
}

#[test]
fn lifecycle_errors() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    assert!(matches!(
        h.engine.reload(config()),
        Err(EngineError::NotRunning)
    ));
    h.engine.start(config()).unwrap();
    assert!(matches!(
        h.engine.start(config()),
        Err(EngineError::AlreadyRunning)
    ));
    assert!(matches!(
        h.engine.reload(config().with_batch_size(0)),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn reload_releases_dropped_worlds() {
    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    h.host.load_world(WorldId::new("world_nether"));
    let nether_cow = h.host.spawn(
        &WorldId::new("world_nether"),
        EntityKind::Monster,
        Position::default(),
    );
    let cow = cow_at(&h.host, 0.0);
    h.engine
        .start(config().with_worlds(["world", "world_nether"]))
        .unwrap();
    h.engine.force_suspend_sweep(&world());
    h.engine.force_suspend_sweep(&WorldId::new("world_nether"));
    assert_eq!(h.engine.suspended_count(), 2);

    h.engine.reload(config()).unwrap();
    assert!(!is_suspended(&nether_cow));
    assert!(is_suspended(&cow));
    assert_eq!(h.engine.suspended_count(), 1);
    assert_eq!(h.engine.config().unwrap().worlds, vec![world()]);
}

#[test]
fn config_file_drives_the_engine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stasis.json");
    fs::write(
        &path,
        r#"{
    "worlds": ["world"],
    "triggers": [{ "type": "always", "interval_ticks": 5 }],
    "policy": { "tracking_radius": 16.0, "batch_size": 50 },
    "restore_interval_ticks": 20
}"#,
    )
    .unwrap();

    let config = EngineConfig::from_path(&path).unwrap();
    assert!(config.disable_ai);
    assert!(config.policy.ignore.drops);

    let mut h = harness(SurfaceProfile::modern(), Topology::Single);
    h.host.connect_client(&world(), Position::new(0.0, 64.0, 0.0));
    let cow = cow_at(&h.host, 20.0);
    h.engine.start(config).unwrap();
    h.scheduler.run_ticks(6);
    assert!(is_suspended(&cow));
}
