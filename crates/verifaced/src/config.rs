use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use veriface_net::FetchPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Euclidean distance below which two faces match.
    pub tolerance: f32,
    /// Total download attempts per image.
    pub fetch_attempts: u32,
    /// Per-attempt download timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Fixed delay between download attempts in milliseconds.
    pub fetch_backoff_ms: u64,
    /// Largest accepted image body in bytes.
    pub max_image_bytes: usize,
    /// Deadline for a whole verification (both downloads, embedding, comparison).
    pub request_deadline_secs: u64,
    /// Number of embedding worker threads, each with its own model instance.
    pub engine_workers: usize,
    /// Include underlying error details in 500 responses.
    pub expose_error_details: bool,
}

/// Optional TOML file layer; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    model_dir: Option<PathBuf>,
    tolerance: Option<f32>,
    fetch_attempts: Option<u32>,
    fetch_timeout_secs: Option<u64>,
    fetch_backoff_ms: Option<u64>,
    max_image_bytes: Option<usize>,
    request_deadline_secs: Option<u64>,
    engine_workers: Option<usize>,
    expose_error_details: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            model_dir: veriface_core::default_model_dir(),
            tolerance: veriface_core::EuclideanMatcher::DEFAULT_TOLERANCE,
            fetch_attempts: 3,
            fetch_timeout_secs: 20,
            fetch_backoff_ms: 1000,
            max_image_bytes: 16 * 1024 * 1024,
            request_deadline_secs: 75,
            engine_workers: 2,
            expose_error_details: true,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file named by
    /// `VERIFACE_CONFIG` (if set), then `VERIFACE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("VERIFACE_CONFIG") {
            let path = PathBuf::from(path);
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let file: FileConfig =
                toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
            config.apply_file(file)?;
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(bind) = file.bind {
            self.bind = parse_bind(&bind)?;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.tolerance {
            self.tolerance = v;
        }
        if let Some(v) = file.fetch_attempts {
            self.fetch_attempts = v;
        }
        if let Some(v) = file.fetch_timeout_secs {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = file.fetch_backoff_ms {
            self.fetch_backoff_ms = v;
        }
        if let Some(v) = file.max_image_bytes {
            self.max_image_bytes = v;
        }
        if let Some(v) = file.request_deadline_secs {
            self.request_deadline_secs = v;
        }
        if let Some(v) = file.engine_workers {
            self.engine_workers = v;
        }
        if let Some(v) = file.expose_error_details {
            self.expose_error_details = v;
        }
        Ok(())
    }

    /// Override from environment. Unparsable numeric values keep the current value.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(bind) = var("VERIFACE_BIND") {
            self.bind = parse_bind(&bind)?;
        }
        if let Some(dir) = var("VERIFACE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        self.tolerance = parsed(&var, "VERIFACE_TOLERANCE", self.tolerance);
        self.fetch_attempts = parsed(&var, "VERIFACE_FETCH_ATTEMPTS", self.fetch_attempts);
        self.fetch_timeout_secs = parsed(&var, "VERIFACE_FETCH_TIMEOUT_SECS", self.fetch_timeout_secs);
        self.fetch_backoff_ms = parsed(&var, "VERIFACE_FETCH_BACKOFF_MS", self.fetch_backoff_ms);
        self.max_image_bytes = parsed(&var, "VERIFACE_MAX_IMAGE_BYTES", self.max_image_bytes);
        self.request_deadline_secs =
            parsed(&var, "VERIFACE_REQUEST_DEADLINE_SECS", self.request_deadline_secs);
        self.engine_workers = parsed(&var, "VERIFACE_ENGINE_WORKERS", self.engine_workers);
        if let Some(v) = var("VERIFACE_EXPOSE_ERROR_DETAILS") {
            self.expose_error_details = v != "0";
        }
        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_attempts: self.fetch_attempts.max(1),
            attempt_timeout: Duration::from_secs(self.fetch_timeout_secs),
            backoff: Duration::from_millis(self.fetch_backoff_ms),
            max_bytes: self.max_image_bytes,
        }
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }

    /// True when the configured tolerance is stricter than `recommended`,
    /// the value the embedding backend is calibrated for.
    pub fn tolerance_stricter_than(&self, recommended: f32) -> bool {
        self.tolerance < recommended
    }
}

/// Accepts `host:port` or the `:port` shorthand for all interfaces.
fn parse_bind(value: &str) -> Result<SocketAddr, ConfigError> {
    let full = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };
    full.parse()
        .map_err(|_| ConfigError::InvalidBind(value.to_string()))
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind.port(), 5000);
        assert_eq!(config.tolerance, 0.4);
        assert_eq!(config.fetch_attempts, 3);
        assert_eq!(config.fetch_policy().backoff, Duration::from_secs(1));
        assert!(config.expose_error_details);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("VERIFACE_BIND", ":8080"),
                ("VERIFACE_TOLERANCE", "0.6"),
                ("VERIFACE_FETCH_ATTEMPTS", "5"),
                ("VERIFACE_EXPOSE_ERROR_DETAILS", "0"),
            ]))
            .unwrap();

        assert_eq!(config.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.fetch_attempts, 5);
        assert!(!config.expose_error_details);
    }

    #[test]
    fn test_env_unparsable_keeps_value() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("VERIFACE_FETCH_TIMEOUT_SECS", "soon")]))
            .unwrap();
        assert_eq!(config.fetch_timeout_secs, 20);
    }

    #[test]
    fn test_env_invalid_bind() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("VERIFACE_BIND", "nowhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBind(_)));
    }

    #[test]
    fn test_file_layer_then_env() {
        let file: FileConfig = toml::from_str(
            r#"
            bind = "127.0.0.1:7000"
            tolerance = 0.5
            engine_workers = 4
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(file).unwrap();
        config
            .apply_env(env(&[("VERIFACE_TOLERANCE", "0.45")]))
            .unwrap();

        assert_eq!(config.bind, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.engine_workers, 4);
        assert_eq!(config.tolerance, 0.45);
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        assert!(toml::from_str::<FileConfig>("tolerence = 0.5").is_err());
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let config = Config {
            fetch_attempts: 0,
            ..Config::default()
        };
        assert_eq!(config.fetch_policy().max_attempts, 1);
    }

    #[test]
    fn test_default_tolerance_is_stricter_than_onnx_calibration() {
        let recommended = veriface_core::OnnxFaceEmbedder::RECOMMENDED_TOLERANCE;
        assert!(Config::default().tolerance_stricter_than(recommended));

        let calibrated = Config {
            tolerance: recommended,
            ..Config::default()
        };
        assert!(!calibrated.tolerance_stricter_than(recommended));
    }
}
