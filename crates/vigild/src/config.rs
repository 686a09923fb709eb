use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 5001;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP listener binds to (default: 0.0.0.0:5001).
    pub bind_addr: SocketAddr,
    /// Landmark file written by `vigil generate`.
    pub landmarks_path: PathBuf,
    /// User dataset override; the embedded dataset is used when unset.
    pub users_path: Option<PathBuf>,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Average region similarity a face must exceed to verify.
    pub similarity_threshold: f32,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind_addr: parse_var(&var, "VIGIL_BIND_ADDR")
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))),
            landmarks_path: var("VIGIL_LANDMARKS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("user_landmarks.json")),
            users_path: var("VIGIL_USERS_PATH").map(PathBuf::from),
            model_dir: var("VIGIL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(vigil_core::default_model_dir),
            similarity_threshold: parse_var(&var, "VIGIL_SIMILARITY_THRESHOLD")
                .filter(|t: &f32| {
                    let ok = t.is_finite();
                    if !ok {
                        tracing::warn!(key = "VIGIL_SIMILARITY_THRESHOLD", value = %t, "ignoring non-finite config value");
                    }
                    ok
                })
                .unwrap_or(vigil_core::SIMILARITY_THRESHOLD),
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = var(key)?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparseable config value");
            None
        }
    }
}
