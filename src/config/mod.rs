//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;

/// Name of the default crawl-state directory.
pub const DEFAULT_BASE_DIR: &str = ".crawl-once";

/// Main configuration for crawl-once.
///
/// These are the three values the gate consumes at construction time; they
/// are supplied by the host crawler, either directly or via a config file.
#[derive(Debug, Clone)]
pub struct CrawlOnceConfig {
    /// Whether the dedup mechanism is enabled at all.
    pub enabled: bool,
    /// Base directory holding one seen-set database per crawl target.
    pub base_dir: PathBuf,
    /// Default dedup behavior for requests that carry no explicit override.
    pub default_enabled: bool,
}

impl Default for CrawlOnceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            default_enabled: false,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Whether the mechanism is enabled.
    pub enabled: Option<bool>,
    /// Base storage directory.
    pub base_dir: Option<String>,
    /// Default per-request dedup behavior.
    pub default_enabled: Option<bool>,
}

impl CrawlOnceConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::Error::Storage {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| crate::Error::Storage {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/crawl-once/` on macOS)
    /// 2. XDG config dir (`~/.config/crawl-once/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        // Check platform-specific config dir first
        let platform_config = base_dirs.config_dir().join("crawl-once").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        // Fall back to XDG-style ~/.config/crawl-once/ for Unix compatibility
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("crawl-once")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `CrawlOnceConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(enabled) = file.enabled {
            config.enabled = enabled;
        }
        if let Some(base_dir) = file.base_dir {
            config.base_dir = PathBuf::from(base_dir);
        }
        if let Some(default_enabled) = file.default_enabled {
            config.default_enabled = default_enabled;
        }

        config
    }

    /// Sets whether the mechanism is enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the base storage directory.
    #[must_use]
    pub fn with_base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = path.into();
        self
    }

    /// Sets the default per-request dedup behavior.
    #[must_use]
    pub const fn with_default_enabled(mut self, default_enabled: bool) -> Self {
        self.default_enabled = default_enabled;
        self
    }
}
