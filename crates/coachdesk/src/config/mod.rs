use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::intake::HiddenAnswerPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub generation: GenerationConfig,
    pub monitor: MonitorConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidValue {
                var: "APP_LOG_FORMAT",
                value: raw,
            })?,
            Err(_) => LogFormat::Compact,
        };

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            worker_count: at_least_one("GENERATION_WORKERS", defaults.worker_count)?,
            max_attempts: at_least_one("GENERATION_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base: millis("GENERATION_BACKOFF_BASE_MS", defaults.backoff_base)?,
            backoff_max: millis("GENERATION_BACKOFF_MAX_MS", defaults.backoff_max)?,
            job_timeout: seconds("GENERATION_JOB_TIMEOUT_SECS", defaults.job_timeout)?,
            poll_interval: millis("GENERATION_POLL_INTERVAL_MS", defaults.poll_interval)?,
        };

        let defaults = MonitorConfig::default();
        let failure_rate_threshold =
            parsed("MONITOR_FAILURE_RATE", defaults.failure_rate_threshold)?;
        if !(failure_rate_threshold > 0.0 && failure_rate_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                var: "MONITOR_FAILURE_RATE",
                value: failure_rate_threshold.to_string(),
            });
        }
        let monitor = MonitorConfig {
            backlog_high_water: parsed("MONITOR_BACKLOG_HIGH_WATER", defaults.backlog_high_water)?,
            failure_rate_threshold,
            failure_window: seconds("MONITOR_FAILURE_WINDOW_SECS", defaults.failure_window)?,
            min_sample: parsed("MONITOR_MIN_SAMPLE", defaults.min_sample)?,
            stall_grace: seconds("MONITOR_STALL_GRACE_SECS", defaults.stall_grace)?,
            check_interval: seconds("MONITOR_INTERVAL_SECS", defaults.check_interval)?,
        };

        let hidden_answers = match env::var("INTAKE_HIDDEN_ANSWERS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "INTAKE_HIDDEN_ANSWERS",
                value: raw,
            })?,
            Err(_) => HiddenAnswerPolicy::default(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            generation,
            monitor,
            intake: IntakeConfig { hidden_answers },
        })
    }
}

fn parsed<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn at_least_one<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + From<u8> + fmt::Display,
{
    let value = parsed(var, default)?;
    if value < T::from(1) {
        return Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn millis(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parsed(var, default.as_millis() as u64).map(Duration::from_millis)
}

fn seconds(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parsed(var, default.as_secs()).map(Duration::from_secs)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output layout for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Worker pool sizing, retry budget, and per-attempt timeout for packet generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub worker_count: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
            job_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Thresholds used by the queue monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub backlog_high_water: usize,
    pub failure_rate_threshold: f64,
    pub failure_window: Duration,
    pub min_sample: usize,
    pub stall_grace: Duration,
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backlog_high_water: 100,
            failure_rate_threshold: 0.2,
            failure_window: Duration::from_secs(3600),
            min_sample: 5,
            stall_grace: Duration::from_secs(120),
            check_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntakeConfig {
    pub hidden_answers: HiddenAnswerPolicy,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { var, value } => {
                write!(f, "{var} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
        }
    }
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    use std::sync::{Mutex, OnceLock};

    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(()))
}
