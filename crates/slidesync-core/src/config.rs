//! Session and relay configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::readiness::DEFAULT_READINESS_INTERVAL_MS;
use crate::relay::ChannelId;
use crate::renderer::RendererOptions;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

#[cfg(target_arch = "wasm32")]
use web_time::Duration;

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:3030/ws";

/// Converted document the renderer should load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideResource {
    pub task_id: String,
    pub url: String,
}

/// Configuration for one mounted viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identifies the document instance; scopes the sync channel.
    pub document_id: String,
    /// Scene directory for the deck. Defaults to `/slides/<document_id>`.
    pub base_scene_path: Option<String>,
    pub readiness_interval_ms: u64,
    /// Jump to the page other clients persist in shared state.
    pub follow_shared_page: bool,
    pub resource: Option<SlideResource>,
    pub renderer: RendererOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            document_id: String::new(),
            base_scene_path: None,
            readiness_interval_ms: DEFAULT_READINESS_INTERVAL_MS,
            follow_shared_page: true,
            resource: None,
            renderer: RendererOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.document_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "document_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.readiness_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "readiness_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        if let Some(path) = &self.base_scene_path {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field: "base_scene_path",
                    reason: format!("{path:?} is not absolute"),
                });
            }
        }
        Ok(())
    }

    pub fn base_scene_path(&self) -> String {
        self.base_scene_path
            .clone()
            .unwrap_or_else(|| format!("/slides/{}", self.document_id))
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn channel(&self) -> ChannelId {
        ChannelId::for_document(&self.document_id)
    }
}

/// Where to reach the WebSocket relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
        }
    }
}
