/// `load_config` module: Loads a static YAML config file into the core [`SyncConfig`].
///
/// This is the only place where user-supplied YAML is parsed. Secrets never
/// live in the file: the docs host API key is read from the environment by
/// [`crate::upload::ApiKey::from_env`].
///
/// Every key is optional; missing keys fall back to the defaults of the
/// CI workflow this tool replaces (`integrations/`, `hatch run docs`,
/// `_readme_*.md`, version `2.0`). Unknown keys are rejected so typos do not
/// silently fall back.
///
/// # Errors
/// All errors use `anyhow::Error` with the config path in the message and are
/// surfaced at the CLI boundary.
use anyhow::Result;
use docs_sync_core::config::SyncConfig;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Loads a static YAML config file (no secrets). An empty file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    parse_config(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        e.context(format!("Invalid config file {:?}", path_ref))
    })
}

/// Parses YAML config content.
pub fn parse_config(content: &str) -> Result<SyncConfig> {
    if content.trim().is_empty() {
        info!("Config is empty, using defaults");
        return Ok(SyncConfig::default());
    }

    let config: SyncConfig = serde_yaml::from_str(content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;

    if config.build.command.is_empty() {
        anyhow::bail!("build.command must name a program");
    }
    if config.build.max_parallel == 0 {
        anyhow::bail!("build.max_parallel must be at least 1");
    }
    if config.publish.version.trim().is_empty() {
        anyhow::bail!("publish.version must not be empty");
    }

    config.trace_loaded();
    Ok(config)
}
