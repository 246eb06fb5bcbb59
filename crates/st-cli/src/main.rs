//! CLI frontend for the Stasis entity suspension engine.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "stasis",
    about = "Stasis: suspend entities no client can see",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log engine decisions at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Where to write the configuration
        #[arg(default_value = "stasis.json")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file and summarise it
    Check {
        /// Configuration file to check
        config: PathBuf,
    },

    /// Show how each capability resolves against a sandbox host
    Probe {
        /// Host profile: modern, legacy or bare
        #[arg(short, long, default_value = "modern")]
        profile: String,

        /// Capabilities to take away: ticking, ai, tick-rate
        #[arg(long, value_delimiter = ',')]
        without: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the engine against a seeded sandbox scenario
    Simulate {
        /// Configuration file (default: built-in defaults on world "world")
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of ticks to simulate
        #[arg(short, long, default_value = "2400")]
        ticks: u64,

        /// RNG seed for a deterministic scenario
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Entities to spawn
        #[arg(short, long, default_value = "300")]
        entities: usize,

        /// Connected clients
        #[arg(long, default_value = "3")]
        clients: usize,

        /// Host profile: modern, legacy or bare
        #[arg(short, long, default_value = "modern")]
        profile: String,

        /// Run regionized with this region size instead of single-threaded
        #[arg(long)]
        regions: Option<u32>,

        /// Degraded-rate window as START:END:RATE, e.g. 600:1200:14.5
        #[arg(long)]
        lag: Option<String>,

        /// Ticks between timeline rows
        #[arg(long, default_value = "200")]
        sample: u64,

        /// Print the full event log
        #[arg(long)]
        events: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "st_engine=debug,st_cli=debug"
    } else {
        "st_engine=info,st_cli=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init { path, force } => commands::init::run(&path, force),
        Commands::Check { config } => commands::check::run(&config),
        Commands::Probe {
            profile,
            without,
            json,
        } => commands::probe::run(&profile, &without, json),
        Commands::Simulate {
            config,
            ticks,
            seed,
            entities,
            clients,
            profile,
            regions,
            lag,
            sample,
            events,
        } => commands::simulate::run(&commands::simulate::Scenario {
            config,
            ticks,
            seed,
            entities,
            clients,
            profile,
            regions,
            lag,
            sample,
            show_events: events,
        }),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
