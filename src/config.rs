use crate::storage::DEFAULT_QUOTA_BYTES;
use crate::view::AuthMode;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding project-level config, storage and transcripts.
pub const APP_DIR: &str = ".classdesk";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where and how the key-value store is kept
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<usize>,
    /// Revert the in-memory change when a write fails (default: keep it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_on_write_failure: Option<bool>,
}

impl StorageConfig {
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Path::new(APP_DIR).join("storage.json"))
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes.unwrap_or(DEFAULT_QUOTA_BYTES)
    }

    pub fn rollback_on_write_failure(&self) -> bool {
        self.rollback_on_write_failure.unwrap_or(false)
    }
}

/// Splash screen settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IntroConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Playback multiplier; 2.0 plays twice as fast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl IntroConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn speed(&self) -> f64 {
        self.speed.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    /// "signup" or "login"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<String>,
}

impl AuthConfig {
    pub fn default_mode(&self) -> AuthMode {
        self.default_mode
            .as_deref()
            .and_then(AuthMode::from_str)
            .unwrap_or_default()
    }
}

/// Activity transcript settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TranscriptConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl TranscriptConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| Path::new(APP_DIR).join("sessions"))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub intro: IntroConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

impl Config {
    /// Config file locations in increasing priority:
    /// user (~/.classdesk/config.toml) < project (.classdesk/config.toml)
    /// < local (.classdesk/config.local.toml, should be gitignored)
    pub fn default_layers() -> Vec<PathBuf> {
        let mut layers = Vec::new();
        if let Some(home) = dirs::home_dir() {
            layers.push(home.join(APP_DIR).join("config.toml"));
        }
        layers.push(Path::new(APP_DIR).join("config.toml"));
        layers.push(Path::new(APP_DIR).join("config.local.toml"));
        layers
    }

    /// Load configuration from the default paths
    pub fn load() -> Result<Self> {
        Self::load_layers(&Self::default_layers())
    }

    /// Merge each existing file in order; missing files are skipped
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut config = Self::default();
        for path in paths {
            if path.exists() {
                tracing::debug!("loading config layer {}", path.display());
                config.merge(Self::load_from(path)?);
            }
        }
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Merge another config into this one; values set in `other` win
    pub fn merge(&mut self, other: Config) {
        if other.storage.path.is_some() {
            self.storage.path = other.storage.path;
        }
        if other.storage.quota_bytes.is_some() {
            self.storage.quota_bytes = other.storage.quota_bytes;
        }
        if other.storage.rollback_on_write_failure.is_some() {
            self.storage.rollback_on_write_failure = other.storage.rollback_on_write_failure;
        }

        if other.intro.enabled.is_some() {
            self.intro.enabled = other.intro.enabled;
        }
        if other.intro.speed.is_some() {
            self.intro.speed = other.intro.speed;
        }

        if other.auth.default_mode.is_some() {
            self.auth.default_mode = other.auth.default_mode;
        }

        if other.transcript.enabled.is_some() {
            self.transcript.enabled = other.transcript.enabled;
        }
        if other.transcript.dir.is_some() {
            self.transcript.dir = other.transcript.dir;
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(path) = &self.storage.path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError {
                    field: "storage.path".to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
        }

        if self.storage.quota_bytes == Some(0) {
            errors.push(ValidationError {
                field: "storage.quota_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(speed) = self.intro.speed {
            if !(speed > 0.0 && speed.is_finite()) {
                errors.push(ValidationError {
                    field: "intro.speed".to_string(),
                    message: format!("Must be a positive number, got {}", speed),
                });
            }
        }

        if let Some(mode) = &self.auth.default_mode {
            if AuthMode::from_str(mode).is_none() {
                errors.push(ValidationError {
                    field: "auth.default_mode".to_string(),
                    message: format!("Invalid mode '{}', expected 'signup' or 'login'", mode),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(
            config.storage.path(),
            Path::new(".classdesk").join("storage.json")
        );
        assert_eq!(config.storage.quota_bytes(), 5 * 1024 * 1024);
        assert!(!config.storage.rollback_on_write_failure());
        assert!(config.intro.enabled());
        assert_eq!(config.auth.default_mode(), AuthMode::Signup);
        assert!(config.transcript.enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
[storage]
path = "/tmp/desk.json"
rollback_on_write_failure = true

[intro]
enabled = false

[auth]
default_mode = "login"
"#,
        )
        .unwrap();
        assert_eq!(config.storage.path(), PathBuf::from("/tmp/desk.json"));
        assert!(config.storage.rollback_on_write_failure());
        assert!(!config.intro.enabled());
        assert_eq!(config.auth.default_mode(), AuthMode::Login);
    }

    #[test]
    fn test_layers_override_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("config.toml");
        let local = dir.path().join("config.local.toml");
        std::fs::write(
            &project,
            "[storage]\nquota_bytes = 1024\n\n[intro]\nspeed = 2.0\n",
        )
        .unwrap();
        std::fs::write(&local, "[intro]\nspeed = 4.0\n").unwrap();

        let config = Config::load_layers(&[
            dir.path().join("missing.toml"),
            project,
            local,
        ])
        .unwrap();
        assert_eq!(config.storage.quota_bytes(), 1024);
        assert_eq!(config.intro.speed(), 4.0);
        assert!(config.intro.enabled());
    }

    #[test]
    fn test_load_from_reports_path_on_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[storage\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.storage.quota_bytes = Some(0);
        config.intro.speed = Some(-1.0);
        config.auth.default_mode = Some("register".to_string());
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "storage.quota_bytes"));
        assert!(errors.iter().any(|e| e.message.contains("register")));
    }

    #[test]
    fn test_to_toml_skips_unset() {
        let mut config = Config::default();
        config.intro.enabled = Some(false);
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("enabled = false"));
        assert!(!rendered.contains("quota_bytes"));
    }
}
