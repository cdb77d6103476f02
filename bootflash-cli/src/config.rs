//! Configuration file support for bootflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BOOTFLASH_*)
//! 3. File given with `--config` (replaces 4 and 5)
//! 4. Local config file (./bootflash.toml)
//! 5. Global config file (~/.config/bootflash/config.toml)

use crate::Cli;
use bootflash::DeviceProfile;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Device profile overrides. Unset fields keep the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Bytes per flash page.
    pub page_size: Option<u32>,
    /// First flashable address.
    pub base_address: Option<u32>,
    /// Padding byte for partial pages.
    pub fill_byte: Option<u8>,
    /// Re-sends allowed per page.
    pub max_retries: Option<u32>,
    /// Flashable bytes starting at the base address.
    pub address_space: Option<u32>,
}

impl ProfileConfig {
    /// Apply the set fields on top of `profile`.
    pub fn apply(&self, mut profile: DeviceProfile) -> DeviceProfile {
        if let Some(page_size) = self.page_size {
            profile = profile.with_page_size(page_size);
        }
        if let Some(base) = self.base_address {
            profile = profile.with_base_address(base);
        }
        if let Some(fill) = self.fill_byte {
            profile = profile.with_fill_byte(fill);
        }
        if let Some(retries) = self.max_retries {
            profile = profile.with_max_retries(retries);
        }
        if let Some(space) = self.address_space {
            profile = profile.with_address_space(space);
        }
        profile
    }

    fn merge(&mut self, other: Self) {
        if other.page_size.is_some() {
            self.page_size = other.page_size;
        }
        if other.base_address.is_some() {
            self.base_address = other.base_address;
        }
        if other.fill_byte.is_some() {
            self.fill_byte = other.fill_byte;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.address_space.is_some() {
            self.address_space = other.address_space;
        }
    }
}

impl From<&DeviceProfile> for ProfileConfig {
    fn from(profile: &DeviceProfile) -> Self {
        Self {
            page_size: Some(profile.page_size),
            base_address: Some(profile.base_address),
            fill_byte: Some(profile.fill_byte),
            max_retries: Some(profile.max_retries),
            address_space: Some(profile.address_space),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device profile settings.
    #[serde(default)]
    pub profile: ProfileConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new("bootflash.toml")) {
            debug!("Loaded local config from bootflash.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "bootflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        self.profile.merge(other.profile);
    }

    /// The effective device profile: defaults, then files, then the
    /// command line (which carries environment variables through clap).
    pub fn device_profile(&self, cli: &Cli) -> anyhow::Result<DeviceProfile> {
        let overrides = ProfileConfig {
            page_size: cli.page_size,
            base_address: cli.base_address,
            fill_byte: cli.fill_byte,
            max_retries: cli.max_retries,
            address_space: cli.address_space,
        };
        let mut layered = self.profile.clone();
        layered.merge(overrides);

        let profile = layered.apply(DeviceProfile::default());
        profile.validate()?;
        debug!("Effective profile: {profile:?}");
        Ok(profile)
    }
}
