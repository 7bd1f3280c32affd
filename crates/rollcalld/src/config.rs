use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rollcall_core::GeminiConfig;
use serde::Deserialize;

/// Daemon configuration, loaded from environment variables with an
/// optional TOML file underneath.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path for live capture (default: /dev/video0).
    pub camera_device: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Recognition service credential. `None` leaves the daemon running but
    /// every determination fails until one is configured.
    pub api_key: Option<String>,
    /// Recognition model name.
    pub model: String,
    /// Recognition service base URL.
    pub endpoint: String,
    /// Timeout in seconds for one recognition request.
    pub request_timeout_secs: u64,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
}

/// Keys accepted in the `ROLLCALL_CONFIG` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    db_path: Option<PathBuf>,
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    request_timeout_secs: Option<u64>,
    warmup_frames: Option<usize>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables.
    ///
    /// When `ROLLCALL_CONFIG` names a TOML file its values are used as
    /// defaults; environment variables win over the file.
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => load_file(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let defaults = GeminiConfig::default();
        let parsed = |key: &str| env(key).and_then(|v| v.parse().ok());

        Self {
            camera_device: env("ROLLCALL_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            db_path: env("ROLLCALL_DB_PATH")
                .map(PathBuf::from)
                .or(file.db_path)
                .unwrap_or_else(|| data_dir.join("rollcall.db")),
            api_key: env("ROLLCALL_API_KEY")
                .and_then(non_blank)
                .or_else(|| env("GEMINI_API_KEY").and_then(non_blank))
                .or_else(|| file.api_key.and_then(non_blank)),
            model: env("ROLLCALL_MODEL")
                .or(file.model)
                .unwrap_or(defaults.model),
            endpoint: env("ROLLCALL_ENDPOINT")
                .or(file.endpoint)
                .unwrap_or(defaults.endpoint),
            request_timeout_secs: parsed("ROLLCALL_REQUEST_TIMEOUT_SECS")
                .or(file.request_timeout_secs)
                .unwrap_or(defaults.timeout.as_secs()),
            warmup_frames: parsed("ROLLCALL_WARMUP_FRAMES")
                .map(|n: u64| n as usize)
                .or(file.warmup_frames)
                .unwrap_or(4),
        }
    }

    /// Recognition client settings derived from this configuration.
    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Blank values count as unset so the next source gets a chance.
fn non_blank(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn load_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let file = toml::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(FileConfig::default(), env_of(&[("HOME", "/home/t")]));
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.db_path, PathBuf::from("/home/t/.local/share/rollcall/rollcall.db"));
        assert_eq!(config.model, GeminiConfig::default().model);
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.warmup_frames, 4);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            camera_device = "/dev/video4"
            model = "from-file"
            warmup_frames = 9
            "#,
        )
        .unwrap();
        let config = Config::resolve(
            file,
            env_of(&[("ROLLCALL_MODEL", "from-env"), ("XDG_DATA_HOME", "/data")]),
        );
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.model, "from-env");
        assert_eq!(config.warmup_frames, 9);
        assert_eq!(config.db_path, PathBuf::from("/data/rollcall/rollcall.db"));
    }

    #[test]
    fn test_api_key_fallback_and_blank() {
        let config = Config::resolve(FileConfig::default(), env_of(&[("GEMINI_API_KEY", "g-key")]));
        assert_eq!(config.api_key.as_deref(), Some("g-key"));

        let config = Config::resolve(
            FileConfig::default(),
            env_of(&[("ROLLCALL_API_KEY", "r-key"), ("GEMINI_API_KEY", "g-key")]),
        );
        assert_eq!(config.api_key.as_deref(), Some("r-key"));

        let config = Config::resolve(FileConfig::default(), env_of(&[("ROLLCALL_API_KEY", "  ")]));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_blank_api_key_falls_through() {
        let config = Config::resolve(
            FileConfig::default(),
            env_of(&[("ROLLCALL_API_KEY", ""), ("GEMINI_API_KEY", "g-key")]),
        );
        assert_eq!(config.api_key.as_deref(), Some("g-key"));

        let file: FileConfig = toml::from_str(r#"api_key = "file-key""#).unwrap();
        let config = Config::resolve(
            file,
            env_of(&[("ROLLCALL_API_KEY", " "), ("GEMINI_API_KEY", "")]),
        );
        assert_eq!(config.api_key.as_deref(), Some("file-key"));

        let file: FileConfig = toml::from_str("api_key = ''").unwrap();
        assert!(Config::resolve(file, env_of(&[])).api_key.is_none());
    }

    #[test]
    fn test_unparseable_numbers_use_defaults() {
        let config = Config::resolve(
            FileConfig::default(),
            env_of(&[("ROLLCALL_REQUEST_TIMEOUT_SECS", "soon")]),
        );
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.gemini().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        assert!(toml::from_str::<FileConfig>("similarity_threshold = 0.4").is_err());
    }
}
