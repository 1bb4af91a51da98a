//! Configuration for embed-probe
//!
//! Loads configuration from TOML file at `~/.config/embed-probe/config.toml`
//! Auto-generates default config file on first run if missing.
//! The widget and embed method always come from the command line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub emulator: EmulatorConfig,
    pub container: ContainerConfig,
    pub discovery: DiscoveryConfig,
    pub launch: LaunchConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .context("Failed to read config file")?;

        let config = Self::from_toml(&content)?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse a config document; missing keys fall back to defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("embed-probe");

        Ok(config_dir.join("config.toml"))
    }

    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// What gets launched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Binary name or path, looked up in PATH
    pub program: String,
    /// Fixed arguments
    pub args: Vec<String>,
    /// WM_CLASS instance and class of the emulator's top-level window
    pub window_class: String,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            program: "previous".to_string(),
            args: vec!["-m".to_string(), "-z".to_string(), "2".to_string()],
            window_class: "previous".to_string(),
        }
    }
}

impl EmulatorConfig {
    /// Literal `xwininfo -tree` marker for the class, e.g. `"previous" "previous"`
    pub fn tree_marker(&self) -> String {
        format!("\"{0}\" \"{0}\"", self.window_class)
    }
}

/// Container size request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub width: u16,
    pub height: u16,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
        }
    }
}

/// Window lookup backend for the reparent method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryBackend {
    /// Walk the X window tree and read WM_CLASS directly
    X11,
    /// Parse `xwininfo -root -tree` output
    Xwininfo,
}

/// Discovery retry budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub backend: DiscoveryBackend,
    /// Total lookups before giving up
    pub attempts: u32,
    /// Sleep after each empty lookup
    pub retry_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: DiscoveryBackend::X11,
            attempts: 8,
            retry_delay_ms: 1000,
        }
    }
}

impl DiscoveryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// One-shot launch timer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Delay between showing the window and launching the emulator
    pub delay_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self { delay_ms: 1000 }
    }
}

impl LaunchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
