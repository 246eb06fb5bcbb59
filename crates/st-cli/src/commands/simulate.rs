use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use st_core::sandbox::{SandboxEntity, SandboxHost, TickScheduler};
use st_core::{EntityHandle, EntityKind, EntityTraits, Position, Topology, WorldId};
use st_engine::{Engine, EngineConfig, EngineEventKind, Operation};

/// Edge length of the square the scenario spawns into, centred on the origin.
const AREA: f64 = 800.0;
/// Furthest a client walks in one move.
const STRIDE: f64 = 12.0;
/// Ticks between client moves.
const MOVE_EVERY: u64 = 20;

/// Everything `stasis simulate` was asked to do.
pub struct Scenario {
    pub config: Option<PathBuf>,
    pub ticks: u64,
    pub seed: u64,
    pub entities: usize,
    pub clients: usize,
    pub profile: String,
    pub regions: Option<u32>,
    pub lag: Option<String>,
    pub sample: u64,
    pub show_events: bool,
}

/// A window of ticks during which the host reports a degraded rate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LagWindow {
    start: u64,
    end: u64,
    rate: f64,
}

impl LagWindow {
    fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.split(':').collect();
        let [start, end, rate] = parts.as_slice() else {
            return Err(format!("invalid lag window '{s}' (expected START:END:RATE)"));
        };
        let start: u64 = start
            .parse()
            .map_err(|_| format!("invalid lag start '{start}'"))?;
        let end: u64 = end.parse().map_err(|_| format!("invalid lag end '{end}'"))?;
        let rate: f64 = rate.parse().map_err(|_| format!("invalid lag rate '{rate}'"))?;
        if end <= start {
            return Err(format!("lag window ends ({end}) before it starts ({start})"));
        }
        Ok(Self { start, end, rate })
    }

    fn contains(&self, tick: u64) -> bool {
        (self.start..self.end).contains(&tick)
    }
}

/// Entity mix: mostly mobs, with some of everything the policy has an opinion on.
fn random_kind(rng: &mut StdRng) -> EntityKind {
    match rng.random_range(0..100) {
        0..35 => EntityKind::Monster,
        35..65 => EntityKind::Animal,
        65..72 => EntityKind::WaterAnimal,
        72..77 => EntityKind::Ambient,
        77..85 => EntityKind::Villager,
        85..93 => EntityKind::Item,
        93..96 => EntityKind::ArmorStand,
        96..98 => EntityKind::ItemFrame,
        _ => EntityKind::Projectile,
    }
}

fn random_position(rng: &mut StdRng) -> Position {
    let half = AREA / 2.0;
    Position::new(
        rng.random_range(-half..half),
        64.0,
        rng.random_range(-half..half),
    )
}

fn spawn_population(host: &SandboxHost, world: &WorldId, count: usize, rng: &mut StdRng) {
    for _ in 0..count {
        let kind = random_kind(rng);
        let traits = EntityTraits {
            custom_name: rng.random_bool(0.03).then(|| "Named".to_string()),
            tamed: matches!(kind, EntityKind::Animal) && rng.random_bool(0.1),
            ..EntityTraits::default()
        };
        host.insert(
            SandboxEntity::new(world.clone(), kind, random_position(rng)).with_traits(traits),
        );
    }
}

fn walk(client: &SandboxEntity, rng: &mut StdRng) {
    let half = AREA / 2.0;
    let p = client.position();
    let x = (p.x + rng.random_range(-STRIDE..=STRIDE)).clamp(-half, half);
    let z = (p.z + rng.random_range(-STRIDE..=STRIDE)).clamp(-half, half);
    client.set_position(Position::new(x, p.y, z));
}

pub fn run(scenario: &Scenario) -> Result<(), String> {
    let world = WorldId::new("world");
    let config = match &scenario.config {
        Some(path) => super::load_config(path)?,
        None => EngineConfig::default().with_worlds([world.clone()]),
    };
    if !config.manages(&world) {
        return Err(format!("config does not manage the sandbox world '{world}'"));
    }
    let lag = scenario.lag.as_deref().map(LagWindow::parse).transpose()?;
    let sample = scenario.sample.max(1);

    let profile = super::build_profile(&scenario.profile, &[])?;
    let host = Arc::new(SandboxHost::with_world(profile, world.clone()));
    let topology = scenario
        .regions
        .map_or(Topology::Single, |region_size| Topology::Regionized { region_size });
    let scheduler = Arc::new(TickScheduler::new(topology, host.clock()));

    let mut rng = StdRng::seed_from_u64(scenario.seed);
    spawn_population(&host, &world, scenario.entities, &mut rng);
    let clients: Vec<Arc<SandboxEntity>> = (0..scenario.clients)
        .map(|_| host.connect_client(&world, random_position(&mut rng)))
        .collect();

    let mut engine = Engine::new(host.clone(), scheduler.clone(), host.surface());
    engine
        .start(config)
        .map_err(|e| format!("engine failed to start: {e}"))?;

    let mut timeline = Table::new();
    timeline.set_content_arrangement(ContentArrangement::Dynamic);
    timeline.set_header(vec!["Tick", "Rate", "Suspended", "Suspend passes", "Restore passes"]);
    let mut last_row = 0;

    for tick in 1..=scenario.ticks {
        let window = lag.filter(|w| w.contains(tick));
        let lagging = window.is_some();
        host.set_tick_rate(window.map_or(host.clock().target_rate(), |w| w.rate));

        if tick % MOVE_EVERY == 0 {
            for client in &clients {
                walk(client, &mut rng);
            }
        }
        scheduler.advance();

        if tick % sample == 0 || tick == scenario.ticks {
            let events = engine.events_since(last_row + 1);
            let passes = |op: Operation| {
                events
                    .iter()
                    .filter(|e| {
                        matches!(&e.kind, EngineEventKind::PassCompleted { operation, .. } if *operation == op)
                    })
                    .count()
            };
            let rate = host.clock().rate();
            let rate_cell = if lagging {
                format!("{rate:.1}").red().to_string()
            } else {
                format!("{rate:.1}")
            };
            timeline.add_row(vec![
                tick.to_string(),
                rate_cell,
                engine.suspended_count().to_string(),
                passes(Operation::Suspend).to_string(),
                passes(Operation::Restore).to_string(),
            ]);
            debug!(tick, suspended = engine.suspended_count(), "timeline sample");
            last_row = tick;
        }
    }

    let events = engine.events();
    let suspended = engine.suspended_count();
    let restored = engine.stop();

    // Header
    println!(
        "  {} {}",
        "Simulation".bold(),
        format!(
            "({} ticks, seed={}, {} entities, {} clients, {})",
            scenario.ticks, scenario.seed, scenario.entities, scenario.clients, topology
        )
        .dimmed()
    );
    println!("  {} events logged, {} suspended at the end", events.len(), suspended);
    println!();

    println!("  {}", "Timeline".bold().underline());
    println!();
    println!("{timeline}");
    println!();

    if scenario.show_events {
        println!("  {}", "Event Log".bold().underline());
        println!();
        for event in &events {
            let tick_label = format!("[tick {:>5}]", event.tick).dimmed();
            let desc = colorize_event(&event.kind, &event.description);
            println!("  {tick_label} {desc}");
        }
        if events.is_empty() {
            println!("  {}", "(no events)".dimmed());
        }
        println!();
    }

    println!(
        "  {} restored {} entities on shutdown",
        "STOP".cyan().bold(),
        restored
    );
    let frozen = host
        .mobs(&world)
        .iter()
        .filter(|m| !m.is_ticking())
        .count();
    if frozen > 0 {
        return Err(format!("{frozen} entities still frozen after shutdown"));
    }

    Ok(())
}

fn colorize_event(kind: &EngineEventKind, description: &str) -> colored::ColoredString {
    match kind {
        EngineEventKind::TriggerFired { .. } => description.yellow(),
        EngineEventKind::PassSkipped { .. } => description.dimmed(),
        EngineEventKind::PassCompleted { .. } => description.normal(),
        EngineEventKind::Suspended { .. } => description.blue(),
        EngineEventKind::Restored { .. } => description.green(),
        EngineEventKind::Reconciled { .. } | EngineEventKind::RecordsDropped { .. } => {
            description.magenta()
        }
        EngineEventKind::WorldReleased { .. } => description.cyan(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_window_parses() {
        let window = LagWindow::parse("600:1200:14.5").unwrap();
        assert_eq!(
            window,
            LagWindow {
                start: 600,
                end: 1200,
                rate: 14.5
            }
        );
        assert!(window.contains(600));
        assert!(!window.contains(1200));
    }

    #[test]
    fn lag_window_rejects_garbage() {
        assert!(LagWindow::parse("600:1200").is_err());
        assert!(LagWindow::parse("a:1200:10").is_err());
        assert!(LagWindow::parse("1200:600:10").is_err());
    }

    #[test]
    fn same_seed_same_population() {
        let kinds = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50).map(|_| random_kind(&mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(kinds(7), kinds(7));
    }
}
