use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

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
    pub outreach: OutreachConfig,
    pub provider: ProviderConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            outreach: OutreachConfig::load()?,
            provider: ProviderConfig::load(),
        })
    }
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the scheduler, worker, and event pipeline.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// Workspace served by this deployment, resolved once at the trigger
    /// boundary and threaded through every pipeline call.
    pub workspace: String,
    /// Bearer secret guarding the cron trigger; unset means unguarded.
    pub cron_secret: Option<String>,
    pub scheduler_batch_size: usize,
    pub worker_batch_size: usize,
    pub event_batch_size: usize,
    pub max_send_attempts: u32,
    pub send_timeout: Duration,
}

impl OutreachConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            workspace: env::var("OUTREACH_WORKSPACE").unwrap_or_else(|_| "ws-default".to_string()),
            cron_secret: env::var("OUTREACH_CRON_SECRET").ok().filter(|s| !s.is_empty()),
            scheduler_batch_size: parse_count("OUTREACH_SCHEDULER_BATCH", 100)?,
            worker_batch_size: parse_count("OUTREACH_WORKER_BATCH", 25)?,
            event_batch_size: parse_count("OUTREACH_EVENT_BATCH", 100)?,
            max_send_attempts: parse_count("OUTREACH_MAX_ATTEMPTS", 3)? as u32,
            send_timeout: Duration::from_secs(parse_count("OUTREACH_SEND_TIMEOUT_SECS", 30)? as u64),
        })
    }
}

/// Transactional email provider credentials and sender identity defaults.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key for the HTTP provider adapter; unset falls back to the
    /// console provider (local development).
    pub api_key: Option<String>,
    pub base_url: String,
    pub from_address: String,
    pub from_name: String,
}

impl ProviderConfig {
    fn load() -> Self {
        Self {
            api_key: env::var("EMAIL_PROVIDER_API_KEY").ok().filter(|s| !s.is_empty()),
            base_url: env::var("EMAIL_PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            from_address: env::var("EMAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "outreach@example.com".to_string()),
            from_name: env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Outreach".to_string()),
        }
    }
}

fn parse_count(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidCount { name }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCount { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCount { name } => {
                write!(f, "{} must be a non-negative integer", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidCount { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "OUTREACH_WORKSPACE",
            "OUTREACH_CRON_SECRET",
            "OUTREACH_SCHEDULER_BATCH",
            "OUTREACH_WORKER_BATCH",
            "OUTREACH_EVENT_BATCH",
            "OUTREACH_MAX_ATTEMPTS",
            "OUTREACH_SEND_TIMEOUT_SECS",
            "EMAIL_PROVIDER_API_KEY",
            "EMAIL_PROVIDER_BASE_URL",
            "EMAIL_FROM_ADDRESS",
            "EMAIL_FROM_NAME",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.outreach.workspace, "ws-default");
        assert!(config.outreach.cron_secret.is_none());
        assert_eq!(config.outreach.worker_batch_size, 25);
        assert_eq!(config.outreach.max_send_attempts, 3);
        assert_eq!(config.outreach.send_timeout, Duration::from_secs(30));
        assert!(config.provider.api_key.is_none());
    }

    #[test]
    fn rejects_non_numeric_batch_size() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("OUTREACH_WORKER_BATCH", "lots");
        let err = AppConfig::load().expect_err("bad batch size rejected");
        assert!(err.to_string().contains("OUTREACH_WORKER_BATCH"));
        reset_env();
    }

    #[test]
    fn empty_cron_secret_counts_as_unset() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("OUTREACH_CRON_SECRET", "");
        let config = AppConfig::load().expect("config loads");
        assert!(config.outreach.cron_secret.is_none());
        reset_env();
    }
}
