//! Server configuration.

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use dap_mux_core::MuxConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 4711;
const DEFAULT_ADAPTER: &str = "127.0.0.1:4712";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address consumers connect to.
    pub listen: SocketAddr,
    /// TCP address of the debug adapter.
    pub adapter: String,
    pub mux: MuxConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            adapter: DEFAULT_ADAPTER.to_string(),
            mux: MuxConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dap-mux").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            adapter = "10.0.0.5:9000"

            [mux]
            workspace_root = "/srv/project"
            "#,
        )
        .unwrap();

        assert_eq!(config.adapter, "10.0.0.5:9000");
        assert_eq!(config.listen, ServerConfig::default().listen);
        assert_eq!(config.mux.workspace_root, PathBuf::from("/srv/project"));
        assert_eq!(config.mux.remote_source_prefix, "remote:");
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = ServerConfig::load_from(Path::new("/nonexistent/dap-mux.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }
}
