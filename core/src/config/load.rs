use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// Get the default reflow data directory: ~/.reflow
pub fn get_reflow_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".reflow"))
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<AppConfig> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    toml::from_str::<AppConfig>(&s).with_context(|| format!("Failed to parse config {:?}", path))
}

/// Resolve the configuration.
///
/// Priority: explicit path, `~/.reflow/config.toml`, `./reflow.toml`,
/// built-in defaults. Environment variables are applied last.
pub fn load_default(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let mut cfg = match explicit {
        Some(path) => load_from_path(path)?,
        None => {
            let home_config = get_reflow_data_dir().ok().map(|d| d.join("config.toml"));
            let local_config = Path::new("reflow.toml");

            match home_config.filter(|p| p.exists()) {
                Some(path) => load_from_path(path)?,
                None if local_config.exists() => load_from_path(local_config)?,
                None => AppConfig::default(),
            }
        }
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("REFLOW_TASKS_FILE") {
        if !v.trim().is_empty() {
            cfg.tasks_file = v;
        }
    }

    if let Ok(v) = std::env::var("REFLOW_STATE_DIR") {
        if !v.trim().is_empty() {
            let dir = PathBuf::from(v);
            cfg.storage.state_file = dir.join("workflow_state.json").to_string_lossy().to_string();
            cfg.storage.versions_file = dir
                .join("version_history.json")
                .to_string_lossy()
                .to_string();
        }
    }

    if let Ok(v) = std::env::var("REFLOW_MAX_CONCURRENCY") {
        match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => cfg.engine.max_concurrency = n,
            _ => tracing::warn!(value = %v, "ignoring invalid REFLOW_MAX_CONCURRENCY"),
        }
    }
}
