//! Multiplexer configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_REMOTE_SOURCE_PREFIX: &str = "remote:";

/// Settings the multiplexer needs to rewrite source paths.
///
/// Paths under `workspace_root` belong to this installation. Every other
/// path lives in some other participant's workspace and is handed to
/// consumers with `remote_source_prefix` in front of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Root of the local workspace.
    pub workspace_root: PathBuf,

    /// Marker prepended to source paths outside the workspace.
    pub remote_source_prefix: String,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl MuxConfig {
    /// Create a config rooted at `workspace_root` with the default marker.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            remote_source_prefix: DEFAULT_REMOTE_SOURCE_PREFIX.to_string(),
        }
    }

    /// Override the remote source marker.
    #[must_use]
    pub fn with_remote_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remote_source_prefix = prefix.into();
        self
    }

    /// Whether `path` lies under the local workspace root.
    #[must_use]
    pub fn is_local(&self, path: &str) -> bool {
        Path::new(path).starts_with(&self.workspace_root)
    }

    /// Whether `path` already carries the remote marker.
    #[must_use]
    pub fn is_marked_remote(&self, path: &str) -> bool {
        !self.remote_source_prefix.is_empty() && path.starts_with(&self.remote_source_prefix)
    }

    /// Path as a consumer should see it.
    #[must_use]
    pub fn to_consumer_path(&self, path: &str) -> String {
        if self.is_marked_remote(path) || self.is_local(path) {
            path.to_string()
        } else {
            format!("{}{path}", self.remote_source_prefix)
        }
    }

    /// Path as the adapter knows it.
    #[must_use]
    pub fn to_adapter_path<'a>(&self, path: &'a str) -> &'a str {
        if self.remote_source_prefix.is_empty() {
            return path;
        }
        path.strip_prefix(self.remote_source_prefix.as_str())
            .unwrap_or(path)
    }
}
