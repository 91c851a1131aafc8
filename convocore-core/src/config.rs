/// Process-wide configuration loaded from the environment.
///
/// Grounded on `adk-telemetry::TelemetryConfig::from_env`: parse each
/// variable independently, fall back to a logged-at-caller default on a
/// missing or malformed value rather than failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub rate_limit_per_minute: u32,
    pub rate_limit_per_hour: u32,
    pub bind_addr: String,
    pub gemini_model: String,
}

const DEFAULT_PER_MINUTE: u32 = 60;
const DEFAULT_PER_HOUR: u32 = 500;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

impl Default for Config {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: DEFAULT_PER_MINUTE,
            rate_limit_per_hour: DEFAULT_PER_HOUR,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment, warning (via
    /// `tracing::warn!`) and falling back to the default on any variable
    /// that is set but fails to parse.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_env_u32("RATE_LIMIT_PER_MINUTE") {
            config.rate_limit_per_minute = v;
        }
        if let Some(v) = parse_env_u32("RATE_LIMIT_PER_HOUR") {
            config.rate_limit_per_hour = v;
        }
        if let Ok(bind) = std::env::var("CONVOCORE_BIND") {
            if !bind.trim().is_empty() {
                config.bind_addr = bind;
            }
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                config.gemini_model = model;
            }
        }

        config
    }
}

fn parse_env_u32(key: &str) -> Option<u32> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u32>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, raw, "failed to parse env var as u32, using default");
                None
            }
        },
        Err(_) => None,
    }
}
