use crate::service::MatchmakingPolicy;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub lobby: LobbyConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Redis,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            other => Err(anyhow::anyhow!("unknown store backend: {other}")),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub redis_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    pub capacity: usize,
    pub drop_rate: f64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            drop_rate: 0.0,
        }
    }
}

/// Engine tuning shared by every actor on the host
#[derive(Debug, Deserialize, Clone)]
pub struct LobbyConfig {
    pub policy: MatchmakingPolicy,
    /// Pause between clearing a match and draining the queue, so the
    /// clearing notification reaches other actors first
    pub drain_delay: Duration,
    pub upcoming_retention: Duration,
    pub poll_interval: Duration,
    pub write_retries: u32,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            policy: MatchmakingPolicy::Queue,
            drain_delay: Duration::from_millis(300),
            upcoming_retention: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(2000),
            write_retries: 16,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub rust_log: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(name: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let lobby_defaults = LobbyConfig::default();
        let bus_defaults = BusConfig::default();

        let store_kind: StoreKind = parse_or("STORE_BACKEND", StoreKind::Memory)?;
        let redis_url = var_or("REDIS_URL", "redis://127.0.0.1:6379/");
        let policy: MatchmakingPolicy = parse_or("MATCHMAKING_POLICY", lobby_defaults.policy)?;
        let drain_delay_ms: u64 = parse_or("DRAIN_DELAY_MS", 300)?;
        let retention_secs: u64 = parse_or("UPCOMING_RETENTION_SECS", 3600)?;
        let poll_interval_ms: u64 = parse_or("POLL_INTERVAL_MS", 2000)?;
        let write_retries: u32 = parse_or("WRITE_RETRIES", lobby_defaults.write_retries)?;
        let bus_capacity: usize = parse_or("BUS_CAPACITY", bus_defaults.capacity)?;
        let bus_drop_rate: f64 = parse_or("BUS_DROP_RATE", bus_defaults.drop_rate)?;
        let port: u16 = parse_or("PORT", 8080)?;
        let host = var_or("HOST", "127.0.0.1");
        let rust_log = var_or("RUST_LOG", "rps_lobby=info,actix_web=info");

        let config = Config {
            store: StoreConfig {
                kind: store_kind,
                redis_url,
            },
            bus: BusConfig {
                capacity: bus_capacity,
                drop_rate: bus_drop_rate,
            },
            lobby: LobbyConfig {
                policy,
                drain_delay: Duration::from_millis(drain_delay_ms),
                upcoming_retention: Duration::from_secs(retention_secs),
                poll_interval: Duration::from_millis(poll_interval_ms),
                write_retries,
            },
            server: ServerConfig {
                port,
                host,
                rust_log,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Refuses settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        // contains() is false for NaN
        if !(0.0..=1.0).contains(&self.bus.drop_rate) {
            anyhow::bail!(
                "BUS_DROP_RATE must be within 0.0..=1.0, got {}",
                self.bus.drop_rate
            );
        }
        if self.lobby.poll_interval.is_zero() {
            anyhow::bail!("POLL_INTERVAL_MS must be greater than zero");
        }
        if self.lobby.write_retries == 0 {
            anyhow::bail!("WRITE_RETRIES must be at least 1");
        }
        Ok(())
    }
}
