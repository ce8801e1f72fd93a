//! Configuration for the timer broker process.
//!
//! Settings are environment-driven first (so the process behaves the same
//! whether started by a supervisor, a container orchestrator, or a shell),
//! with an optional `clap`-derived CLI layer for local-development overrides.
//! There is no config file: the broker persists nothing (see §6/§"Persistence"
//! of the spec), so there is nothing on disk to load or save.

use std::time::Duration;

use clap::Parser;

/// Deployment environment, mirroring the `NODE_ENV`-style flag from the
/// original spec's environment table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }
}

/// Runtime configuration for the broker.
#[derive(Clone, Debug)]
pub struct Config {
    /// Interface to bind the HTTP/WebSocket listener to.
    pub host: String,
    /// Port for the HTTP surface (public lookup API).
    pub port: u16,
    /// Port for the WebSocket surface. Defaults to `port` when unset.
    pub ws_port: u16,
    /// Period of the broker's offline-tracking / reaping ticker.
    pub cleanup_interval: Duration,
    /// `log` crate filter string (e.g. `"info"`, `"timer_broker=debug"`).
    pub log_level: String,
    /// Master switch for logging output, independent of `log_level`.
    pub log_enabled: bool,
    /// Deployment environment.
    pub environment: Environment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            ws_port: 3000,
            cleanup_interval: crate::constants::DEFAULT_CLEANUP_INTERVAL,
            log_level: "info".to_string(),
            log_enabled: true,
            environment: Environment::Development,
        }
    }
}

impl Config {
    /// Builds the configuration from environment variables, then applies any
    /// CLI overrides on top.
    ///
    /// Environment variables: `HOST`, `PORT`, `WS_PORT`, `CLEANUP_INTERVAL`
    /// (milliseconds), `LOG_LEVEL`, `LOG_ENABLED`, `TIMER_BROKER_ENV`.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();

        let cli = Cli::parse();
        cli.apply(&mut config);

        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                self.port = parsed;
                self.ws_port = parsed;
            }
        }

        if let Ok(ws_port) = std::env::var("WS_PORT") {
            if let Ok(parsed) = ws_port.parse::<u16>() {
                self.ws_port = parsed;
            }
        }

        if let Ok(cleanup_ms) = std::env::var("CLEANUP_INTERVAL") {
            if let Ok(parsed) = cleanup_ms.parse::<u64>() {
                self.cleanup_interval = Duration::from_millis(parsed);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = level;
        }

        if let Ok(enabled) = std::env::var("LOG_ENABLED") {
            self.log_enabled = enabled != "0" && !enabled.eq_ignore_ascii_case("false");
        }

        if let Ok(env) = std::env::var("TIMER_BROKER_ENV") {
            self.environment = Environment::from_env_value(&env);
        }
    }

    /// Initializes the `env_logger` backend from this configuration.
    ///
    /// No-op (beyond a disabled filter) when `log_enabled` is false.
    pub fn init_logging(&self) {
        let filter = if self.log_enabled {
            self.log_level.as_str()
        } else {
            "off"
        };
        env_logger::Builder::new()
            .parse_filters(filter)
            .format_timestamp_millis()
            .init();
    }
}

/// CLI overrides for local development.
///
/// Every flag is optional; unset flags leave the environment-derived value
/// in place. This mirrors the teacher's pattern of an env-first `Config`
/// with a thin `clap` layer for ad hoc runs, rather than making the CLI the
/// source of truth.
#[derive(Parser, Debug, Default)]
#[command(name = "timer-broker", about = "Collaborative timer session broker")]
struct Cli {
    /// Override `HOST`.
    #[arg(long)]
    host: Option<String>,

    /// Override `PORT` (and `WS_PORT` unless `--ws-port` is also given).
    #[arg(long)]
    port: Option<u16>,

    /// Override `WS_PORT`.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override `CLEANUP_INTERVAL`, in milliseconds.
    #[arg(long)]
    cleanup_interval_ms: Option<u64>,

    /// Override `LOG_LEVEL`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
            config.ws_port = port;
        }
        if let Some(ws_port) = self.ws_port {
            config.ws_port = ws_port;
        }
        if let Some(ms) = self.cleanup_interval_ms {
            config.cleanup_interval = Duration::from_millis(ms);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}
