pub mod check;
pub mod init;
pub mod probe;
pub mod simulate;

use std::path::Path;

use st_core::sandbox::SurfaceProfile;
use st_engine::EngineConfig;

/// Load and validate a configuration file.
fn load_config(path: &Path) -> Result<EngineConfig, String> {
    let config = EngineConfig::from_path(path).map_err(|e| e.to_string())?;
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Build a sandbox profile by name, minus the listed capabilities.
fn build_profile(name: &str, without: &[String]) -> Result<SurfaceProfile, String> {
    let mut profile = SurfaceProfile::named(name)
        .ok_or_else(|| format!("unknown profile '{name}' (expected modern, legacy or bare)"))?;
    for capability in without {
        profile = match capability.as_str() {
            "ticking" => profile.without_ticking(),
            "ai" => profile.without_ai(),
            "tick-rate" | "tick_rate" | "rate" => profile.without_tick_rate(),
            other => {
                return Err(format!(
                    "unknown capability '{other}' (expected ticking, ai or tick-rate)"
                ));
            }
        };
    }
    Ok(profile)
}
