//! Named CLI profiles persisted as TOML.
//!
//! ```toml
//! default_profile = "lab"
//!
//! [store]
//! default = "/data/strudex.json"
//!
//! [profiles.lab]
//! store = "/data/lab.json"
//! workers = 8
//! ltol = 0.15
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A validated profile. Unset fields fall back to command flags or library
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    pub store: Option<PathBuf>,
    pub rows: Option<usize>,
    pub cols: Option<usize>,
    pub workers: Option<usize>,
    pub flush_every: Option<u64>,
    pub ltol: Option<f64>,
    pub stol: Option<f64>,
    pub angle_tol: Option<f64>,
}

impl Profile {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, value: String| ConfigError::InvalidValue {
            profile: self.name.clone(),
            field,
            value,
        };
        let counts = [
            ("rows", self.rows.map(|v| v as u64)),
            ("cols", self.cols.map(|v| v as u64)),
            ("workers", self.workers.map(|v| v as u64)),
            ("flush_every", self.flush_every),
        ];
        if let Some((field, _)) = counts.iter().find(|(_, value)| *value == Some(0)) {
            return Err(invalid(*field, "0".into()));
        }
        let tolerances = [
            ("ltol", self.ltol),
            ("stol", self.stol),
            ("angle_tol", self.angle_tol),
        ];
        for (field, value) in tolerances {
            match value {
                Some(tol) if !(tol.is_finite() && tol > 0.0) => {
                    return Err(invalid(field, tol.to_string()))
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, update: ProfileUpdate) {
        self.store = update.store.or(self.store.take());
        self.rows = update.rows.or(self.rows);
        self.cols = update.cols.or(self.cols);
        self.workers = update.workers.or(self.workers);
        self.flush_every = update.flush_every.or(self.flush_every);
        self.ltol = update.ltol.or(self.ltol);
        self.stol = update.stol.or(self.stol);
        self.angle_tol = update.angle_tol.or(self.angle_tol);
    }
}

/// Fields set by `profile save`; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub store: Option<PathBuf>,
    pub rows: Option<usize>,
    pub cols: Option<usize>,
    pub workers: Option<usize>,
    pub flush_every: Option<u64>,
    pub ltol: Option<f64>,
    pub stol: Option<f64>,
    pub angle_tol: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ConfigFile {
    #[serde(default)]
    default_profile: Option<String>,
    #[serde(default)]
    store: StoreDefaults,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct StoreDefaults {
    default: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    file: ConfigFile,
}

impl CliConfig {
    /// Reads `explicit`, or the per-user default location. A missing file
    /// yields an empty config.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let file = match &path {
            Some(path) if path.exists() => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    action: "read",
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            _ => ConfigFile::default(),
        };
        let mut config = Self { path, file };
        config.check()?;
        Ok(config)
    }

    pub fn default_store_path(&self) -> Option<&PathBuf> {
        self.file.store.default.as_ref()
    }

    pub fn default_profile_name(&self) -> Option<&str> {
        self.file.default_profile.as_deref()
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.file.profiles.get(name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.file.profiles.values()
    }

    pub fn set_default_profile(&mut self, name: Option<&str>) -> Result<(), ConfigError> {
        if let Some(name) = name {
            self.require(name)?;
        }
        self.file.default_profile = name.map(str::to_string);
        Ok(())
    }

    pub fn upsert_profile(&mut self, name: &str, update: ProfileUpdate) -> Result<(), ConfigError> {
        let mut profile = self.file.profiles.get(name).cloned().unwrap_or_default();
        profile.name = name.to_string();
        profile.apply(update);
        profile.validate()?;
        self.file.profiles.insert(name.to_string(), profile);
        Ok(())
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<(), ConfigError> {
        self.require(name)?;
        self.file.profiles.remove(name);
        if self.file.default_profile.as_deref() == Some(name) {
            self.file.default_profile = None;
        }
        Ok(())
    }

    /// Writes the config back and returns where it went.
    pub fn persist(&self) -> Result<PathBuf, ConfigError> {
        let target = self
            .path
            .clone()
            .or_else(default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;
        let io_error = |action: &'static str, path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| ConfigError::Io {
                action,
                path,
                source,
            }
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error("create", parent))?;
        }
        let text = toml::to_string_pretty(&self.file).map_err(ConfigError::Serialize)?;
        fs::write(&target, text).map_err(io_error("write", &target))?;
        Ok(target)
    }

    fn require(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.file
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// Names every profile after its table key, validates it, and checks the
    /// default points at an existing profile.
    fn check(&mut self) -> Result<(), ConfigError> {
        for (name, profile) in &mut self.file.profiles {
            profile.name = name.clone();
            profile.validate()?;
        }
        if let Some(name) = &self.file.default_profile {
            self.require(name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to {action} CLI config {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to encode CLI config: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },
    #[error("profile '{profile}' has invalid {field} '{value}'")]
    InvalidValue {
        profile: String,
        field: &'static str,
        value: String,
    },
    #[error("no config directory found; pass --config or set STRUDEX_CONFIG")]
    NoConfigPath,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("strudex").join("cli.toml"))
}
