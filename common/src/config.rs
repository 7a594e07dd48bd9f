use anyhow::Result;
use serde::{Deserialize, Serialize};
use sopcheck_protocol::SessionId;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:5000/ws";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub server_url: String,
    pub session_id: Option<SessionId>,
    pub log_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            session_id: None,
            log_path: None,
        }
    }
}

impl SyncConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find config directory"))?
            .join("sopcheck");
        Ok(config_dir.join("config.json"))
    }

    /// Load configuration from a JSON file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: SyncConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if given, else from the user config dir, falling back to defaults.
    /// Environment variables are applied on top.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path).await?,
            None => match Self::config_path() {
                Ok(path) if path.exists() => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    Self::load_from_file(&path).await?
                }
                _ => {
                    tracing::debug!("Using default configuration");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay `SOPCHECK_*` variables using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SOPCHECK_URL") {
            self.server_url = url;
        }
        if let Some(id) = lookup("SOPCHECK_SESSION_ID") {
            self.session_id = Some(SessionId::new(id));
        }
        if let Some(path) = lookup("SOPCHECK_LOG_PATH") {
            self.log_path = Some(PathBuf::from(path));
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn require_session_id(&self) -> Result<SessionId> {
        self.session_id.clone().ok_or_else(|| {
            anyhow::anyhow!("no session id configured (use --session-id or SOPCHECK_SESSION_ID)")
        })
    }
}
