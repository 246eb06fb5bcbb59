use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use st_core::WorldId;
use st_core::sandbox::SandboxHost;
use st_engine::{CapabilityBridge, CapabilityStatus, HostDefaults};

pub fn run(profile: &str, without: &[String], json: bool) -> Result<(), String> {
    let profile = super::build_profile(profile, without)?;
    let world = WorldId::new("world");
    let host = SandboxHost::with_world(profile, world.clone());
    let bridge = CapabilityBridge::resolve(host.surface(), 20.0);
    let defaults = bridge.override_host_defaults(&world, &HostDefaults::default());

    if json {
        let capabilities: Vec<_> = bridge
            .report()
            .iter()
            .map(|r| {
                serde_json::json!({
                    "capability": r.capability.to_string(),
                    "available": r.status.is_available(),
                    "status": r.status.to_string(),
                })
            })
            .collect();
        let skipped: Vec<_> = defaults
            .skipped
            .iter()
            .map(|(field, reason)| serde_json::json!({ "field": field, "reason": reason }))
            .collect();
        let report = serde_json::json!({
            "version": bridge.version(),
            "capabilities": capabilities,
            "host_defaults": {
                "written": defaults.written,
                "skipped": skipped,
            },
        });
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("JSON serialization error: {e}"))?;
        println!("{out}");
        return Ok(());
    }

    println!("  {} {}", "Host".bold(), bridge.version());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Capability", "Resolution"]);
    for resolution in bridge.report() {
        let status = match &resolution.status {
            CapabilityStatus::Resolved { .. } => resolution.status.to_string().green(),
            CapabilityStatus::Unavailable { .. } => resolution.status.to_string().red(),
        };
        table.add_row(vec![resolution.capability.to_string(), status.to_string()]);
    }
    println!("{table}");
    println!();

    println!(
        "  Host defaults: {} written, {} skipped",
        defaults.written.len(),
        defaults.skipped.len()
    );
    for (field, reason) in &defaults.skipped {
        println!("    {} {field}: {}", "skip".yellow(), reason.dimmed());
    }

    Ok(())
}
