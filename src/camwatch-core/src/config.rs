//! Configuration management
//!
//! TOML file with one table per concern and a `[[cameras]]` seed list. Every
//! section has defaults, so an empty or missing file is a valid config.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub roster: RosterConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub mock: MockConfig,

    /// Fixed camera roster
    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraSeed>,
}

/// Ingestion service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the streaming endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Frame polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum unfinished poll cycles per camera
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Frame rate for cameras the server reports without one
    #[serde(default = "default_fps")]
    pub default_fps: u32,
}

/// Roster reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

/// Preview surface size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,
}

/// Local mock ingestion service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_mock_port")]
    pub port: u16,
}

/// One seeded camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSeed {
    pub id: String,
    pub name: String,
    pub rtsp_url: String,
    #[serde(default)]
    pub fps: Option<u32>,
}

// Default value functions
fn default_endpoint() -> String { "http://127.0.0.1:8090/rtsp-stream".to_string() }
fn default_request_timeout_ms() -> u64 { 2000 }
fn default_max_in_flight() -> usize { 4 }
fn default_fps() -> u32 { 25 }
fn default_reconcile_interval_secs() -> u64 { 5 }
fn default_width() -> u32 { camwatch_render::DEFAULT_WIDTH }
fn default_height() -> u32 { camwatch_render::DEFAULT_HEIGHT }
fn default_mock_port() -> u16 { 8090 }

fn default_cameras() -> Vec<CameraSeed> {
    (1..=6)
        .map(|i| CameraSeed {
            id: format!("cam-{:03}", i),
            name: format!("Camera Service {:02}", i),
            rtsp_url: format!("rtsp://192.168.1.{}:554/stream1", 100 + i),
            fps: None,
        })
        .collect()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            default_fps: default_fps(),
        }
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self { port: default_mock_port() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            poll: PollConfig::default(),
            roster: RosterConfig::default(),
            render: RenderConfig::default(),
            mock: MockConfig::default(),
            cameras: default_cameras(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or from the default location if it exists
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// `<config dir>/camwatch/camwatch.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("camwatch").join("camwatch.toml"))
    }

    /// Reject configs the dashboard cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.render.width == 0 || self.render.height == 0 {
            bail!(
                "render surface must be non-zero (got {}x{})",
                self.render.width,
                self.render.height
            );
        }
        if self.poll.max_in_flight == 0 {
            bail!("poll.max_in_flight must be at least 1");
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                bail!("camera id must not be empty");
            }
            if !seen.insert(camera.id.as_str()) {
                bail!("duplicate camera id: {}", camera.id);
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.roster.reconcile_interval_secs.max(1))
    }

    /// Default fps, clamped to at least 1
    pub fn default_fps(&self) -> u32 {
        self.poll.default_fps.max(1)
    }

    pub fn camera(&self, id: &str) -> Option<&CameraSeed> {
        self.cameras.iter().find(|c| c.id == id)
    }
}
