//! YAML server configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub terminal: TerminalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Public listener, serving data and terminal clients.
    pub bind_address: String,
    pub bind_port: u16,
    /// Internal listener for the upstream producer and the process
    /// instrumentation; keep it loopback-only.
    pub internal_address: String,
    pub internal_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            bind_port: 8076,
            internal_address: "127.0.0.1".into(),
            internal_port: 8077,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted session tokens for remote clients.
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Interactive command hosted in the shared terminal session, program
    /// first, then its arguments.
    pub shell: Vec<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: vec!["/bin/bash".into(), "-i".into()],
        }
    }
}

pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Resolve the config: explicit CLI path, then `./server_config.yaml`, then
/// built-in defaults.
pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
    if let Some(path) = cli_path {
        info!(path = %path.display(), "loading config file");
        return load(&path);
    }
    let fallback = Path::new("server_config.yaml");
    if fallback.exists() {
        info!("loading config file ./server_config.yaml");
        return load(fallback);
    }
    warn!("no config file discovered, using defaults");
    Ok(ServerConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_partial_yaml_over_defaults() {
        let config: ServerConfig = serde_yaml::from_str(
            r#"
network:
  bind_port: 9100
auth:
  tokens: ["alpha", "beta"]
"#,
        )
        .unwrap();

        assert_eq!(config.network.bind_port, 9100);
        assert_eq!(config.network.internal_address, "127.0.0.1");
        assert_eq!(config.auth.tokens, vec!["alpha", "beta"]);
        assert_eq!(config.terminal.shell[0], "/bin/bash");
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "terminal:\n  shell: [\"ipython\", \"--simple-prompt\"]").unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.terminal.shell, vec!["ipython", "--simple-prompt"]);
    }

    #[test]
    fn missing_cli_path_falls_back_to_defaults() {
        // No ./server_config.yaml in the test working directory is assumed;
        // guard against one existing.
        if Path::new("server_config.yaml").exists() {
            return;
        }
        let config = load_or_default(None).unwrap();
        assert!(config.auth.tokens.is_empty());
    }
}
