use serde::Deserialize;
use std::{fs, path::Path};

fn default_service_name() -> String {
    "warden".to_string()
}

/// One supervised command. Immutable once parsed.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    pub command: String,
    /// Carried through from the config format. Restart-on-crash is not
    /// implemented, so this is parsed and stored but never consulted.
    #[serde(default)]
    pub max_retry: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
}

/// Parses and validates a YAML config document. Empty command lines never
/// reach the supervision core.
pub fn from_str(text: &str) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(text)?;
    for process in &config.processes {
        if process.command.trim().is_empty() {
            anyhow::bail!("empty command in process entry");
        }
    }
    Ok(config)
}

/// Reads the config file and hands the raw YAML to `from_str`. Any I/O error
/// (file not found, permission denied, ...) is returned as an `Err`.
pub fn parser(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let text = fs::read_to_string(path.as_ref())?;
    from_str(&text)
}
