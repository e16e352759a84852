//! Configuration management for cttsfs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default attribute cache lifetime in seconds
pub const DEFAULT_ATTR_TTL_SECS: u64 = 1;

/// Default filesystem name shown in the mount table
pub const DEFAULT_FS_NAME: &str = "cttsfs";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Backing directory served through the overlay
    pub source: PathBuf,

    /// Mount configuration
    pub mount: MountConfig,
}

/// Mount configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MountConfig {
    /// Mount point path
    pub mount_point: PathBuf,

    /// Filesystem name shown in the mount table
    pub fs_name: String,

    /// Allow other users to access the mount
    pub allow_other: bool,

    /// Allow root to access the mount
    pub allow_root: bool,

    /// Unmount automatically when the process exits
    pub auto_unmount: bool,

    /// Attribute and entry cache lifetime in seconds
    pub attr_ttl_secs: u64,

    /// Extra `-o` style mount options
    pub options: Vec<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            mount_point: PathBuf::new(),
            fs_name: DEFAULT_FS_NAME.to_string(),
            allow_other: false,
            allow_root: false,
            auto_unmount: true,
            attr_ttl_secs: DEFAULT_ATTR_TTL_SECS,
            options: Vec::new(),
        }
    }
}

impl MountConfig {
    /// Attribute cache lifetime
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    /// Build the option list handed to `fuser`.
    ///
    /// The mount is always read-only.
    pub fn mount_options(&self) -> Result<Vec<fuser::MountOption>> {
        let mut options = vec![
            fuser::MountOption::RO,
            fuser::MountOption::FSName(self.fs_name.clone()),
        ];

        if self.allow_other {
            options.push(fuser::MountOption::AllowOther);
        }
        if self.allow_root {
            options.push(fuser::MountOption::AllowRoot);
        }
        if self.auto_unmount {
            options.push(fuser::MountOption::AutoUnmount);
        }

        for raw in &self.options {
            let option = parse_mount_option(raw)?;
            if !options.contains(&option) {
                options.push(option);
            }
        }

        Ok(options)
    }
}

/// Translate a single `-o` option string
fn parse_mount_option(raw: &str) -> Result<fuser::MountOption> {
    use fuser::MountOption;

    let option = match raw.trim() {
        "" => return Err(Error::InvalidConfig("empty mount option".to_string())),
        "rw" => {
            return Err(Error::InvalidConfig(
                "the overlay is read-only, 'rw' is not allowed".to_string(),
            ))
        }
        "ro" => MountOption::RO,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "noatime" => MountOption::NoAtime,
        "nodev" => MountOption::NoDev,
        "nosuid" => MountOption::NoSuid,
        "noexec" => MountOption::NoExec,
        other => {
            if let Some(name) = other.strip_prefix("fsname=") {
                MountOption::FSName(name.to_string())
            } else if let Some(name) = other.strip_prefix("subtype=") {
                MountOption::Subtype(name.to_string())
            } else {
                MountOption::CUSTOM(other.to_string())
            }
        }
    };
    Ok(option)
}

impl Config {
    /// Configuration for serving `source` at `mount_point`
    pub fn new(source: PathBuf, mount_point: PathBuf) -> Self {
        Config {
            source,
            mount: MountConfig {
                mount_point,
                ..MountConfig::default()
            },
        }
    }

    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Effective configuration for a mount.
    ///
    /// Layers apply in order: the config file (or defaults), then the
    /// environment, then the command line.
    pub fn for_mount(
        config_file: Option<&Path>,
        source: PathBuf,
        mount_point: PathBuf,
        options: Vec<String>,
    ) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Config::load(path)?,
            None => {
                let mut config = Config::new(source.clone(), mount_point.clone());
                config.apply_env_overrides();
                config
            }
        };

        config.source = source;
        config.mount.mount_point = mount_point;
        config.mount.options.extend(options);
        Ok(config)
    }

    /// Apply environment variable overrides to configuration.
    ///
    /// Unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(allow_other) = std::env::var("CTTSFS_ALLOW_OTHER") {
            if let Ok(value) = allow_other.trim().parse::<bool>() {
                self.mount.allow_other = value;
            }
        }

        if let Ok(ttl) = std::env::var("CTTSFS_ATTR_TTL") {
            if let Ok(secs) = ttl.trim().parse::<u64>() {
                self.mount.attr_ttl_secs = secs;
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.source.exists() {
            return Err(Error::PathNotFound(self.source.display().to_string()));
        }

        if !self.source.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "Source {} is not a directory",
                self.source.display()
            )));
        }

        if self.mount.mount_point.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("Mount point is required".to_string()));
        }

        if self.mount.fs_name.is_empty() {
            return Err(Error::InvalidConfig(
                "Filesystem name must not be empty".to_string(),
            ));
        }

        self.mount.mount_options()?;
        Ok(())
    }
}
