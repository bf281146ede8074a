use crate::services::operator_stats::{AnalysisOptions, DEFAULT_MAX_PAYLOAD_BYTES, OutputFormat};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Smallest payload budget accepted; below this not even the summary fits
pub const MIN_PAYLOAD_BYTES: usize = 1_000;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Upper bound for a serialized payload in bytes (accepts "100KB", "1MB")
    #[serde(deserialize_with = "deserialize_byte_size")]
    pub max_payload_bytes: usize,
    /// Layout used when a request does not pick one
    pub default_format: OutputFormat,
}

impl Config {
    /// Load configuration with environment variable override support
    ///
    /// Loading order:
    /// 1. Load from config.toml file
    /// 2. Override with environment variables (prefixed with APP_)
    /// 3. Validate the final configuration
    pub fn load() -> Result<Self, anyhow::Error> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Analysis settings derived from the analyzer section
    pub fn analysis_options(&self, format: Option<OutputFormat>) -> AnalysisOptions {
        AnalysisOptions {
            format: format.unwrap_or(self.analyzer.default_format),
            max_payload_bytes: self.analyzer.max_payload_bytes,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST: Server host (default: 0.0.0.0)
    /// - APP_SERVER_PORT: Server port (default: 8080)
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,profile_diagnostics=debug")
    /// - APP_MAX_PAYLOAD_BYTES: Payload budget (accepts "100000", "100KB", "1MB")
    /// - APP_OUTPUT_FORMAT: Default layout ("compact" or "expanded")
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(budget) = std::env::var("APP_MAX_PAYLOAD_BYTES") {
            match parse_byte_size(&budget) {
                Ok(val) => {
                    self.analyzer.max_payload_bytes = val;
                    tracing::info!(
                        "Override analyzer.max_payload_bytes from env: {}",
                        self.analyzer.max_payload_bytes
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_MAX_PAYLOAD_BYTES '{}': {} (keep {})",
                    budget,
                    e,
                    self.analyzer.max_payload_bytes
                ),
            }
        }

        if let Ok(format) = std::env::var("APP_OUTPUT_FORMAT") {
            match format.parse::<OutputFormat>() {
                Ok(val) => {
                    self.analyzer.default_format = val;
                    tracing::info!("Override analyzer.default_format from env: {}", val.as_str());
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_OUTPUT_FORMAT '{}': {} (keep {})",
                    format,
                    e,
                    self.analyzer.default_format.as_str()
                ),
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.analyzer.max_payload_bytes < MIN_PAYLOAD_BYTES {
            anyhow::bail!(
                "analyzer.max_payload_bytes must be at least {} (got {})",
                MIN_PAYLOAD_BYTES,
                self.analyzer.max_payload_bytes
            );
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,profile_diagnostics=debug".to_string(), file: None }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES, default_format: OutputFormat::Compact }
    }
}

// =========================
// Helpers for parsing values
// =========================

/// Parse a byte size in decimal units ("100000", "100KB", "1MB")
fn parse_byte_size(input: &str) -> Result<usize, String> {
    if let Ok(val) = input.trim().parse::<usize>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: usize = num_str.parse().map_err(|_| "invalid number".to_string())?;
    let multiplier = match unit.trim() {
        "b" | "bytes" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        other => return Err(format!("unsupported unit: {}", other)),
    };
    n.checked_mul(multiplier).ok_or_else(|| "size overflows".to_string())
}

// Custom serde deserializer to support numeric or human-friendly string values
fn deserialize_byte_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = usize;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of bytes or a string like '100KB' or '1MB'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            usize::try_from(v).map_err(E::custom)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { usize::try_from(v).map_err(E::custom) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_byte_size(v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}
