use std::fs;
use std::path::Path;

use st_engine::EngineConfig;

pub fn run(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "'{}' already exists (use --force to overwrite)",
            path.display()
        ));
    }

    let json = EngineConfig::default()
        .to_json_pretty()
        .map_err(|e| format!("cannot serialize config: {e}"))?;
    fs::write(path, json + "\n").map_err(|e| format!("cannot write {}: {e}", path.display()))?;

    println!("Created {}", path.display());
    println!();
    println!("Next steps:");
    println!("  # Edit worlds, triggers and policy to taste");
    println!("  stasis check {}     # Validate it", path.display());
    println!("  stasis simulate -c {}  # Try it on a sandbox world", path.display());

    Ok(())
}
