use std::path::Path;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

pub fn run(path: &Path) -> Result<(), String> {
    let config = super::load_config(path)?;

    println!("  All checks passed for '{}'.", path.display());
    let worlds: Vec<&str> = config.worlds.iter().map(|w| w.as_str()).collect();
    println!("  Worlds: {}", worlds.join(", "));
    println!(
        "  Radius {} blocks, batches of {}, restore scan every {} ticks",
        config.policy.tracking_radius, config.policy.batch_size, config.restore_interval_ticks
    );
    println!(
        "  Disables: ticking {}, AI {}",
        on_off(config.disable_ticking),
        on_off(config.disable_ai)
    );
    println!();

    if config.triggers.is_empty() {
        println!("  {}", "No triggers: entities are only ever restored.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Trigger", "Interval", "Cooldown"]);
    for trigger in &config.triggers {
        table.add_row(vec![
            trigger.kind.to_string(),
            format!("{} ticks", trigger.interval_ticks),
            if trigger.rearm_cooldown_ticks > 0 {
                format!("{} ticks", trigger.rearm_cooldown_ticks)
            } else {
                "--".to_string()
            },
        ]);
    }
    println!("{table}");

    Ok(())
}

fn on_off(flag: bool) -> colored::ColoredString {
    if flag { "on".green() } else { "off".dimmed() }
}
