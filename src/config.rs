//! Configuration management for Ratewarden.
//!
//! Defaults are compiled in, an optional YAML file overrides them, and the
//! environment overrides both. Limits are fixed for the process lifetime; a
//! restart is required to change them.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{RatewardenError, Result};

/// Main configuration for the Ratewarden service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatewardenConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-dimension rate limits and the counting window
    #[serde(default)]
    pub limits: LimitSettings,

    /// Redis cluster connection settings
    #[serde(default)]
    pub redis: RedisSettings,

    /// Admission cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Update batcher settings
    #[serde(default)]
    pub batcher: BatcherSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,

    /// Prometheus metrics listener address
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    "0.0.0.0:8081".parse().unwrap()
}

fn default_metrics_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

/// Per-dimension requests-per-window limits and the window itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Counting window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests per window per client IP
    #[serde(default = "default_ip_limit")]
    pub ip: u64,

    /// Requests per window per request path
    #[serde(default = "default_path_limit")]
    pub path: u64,

    /// Requests per window per company
    #[serde(default = "default_company_limit")]
    pub company: u64,

    /// Requests per window per user
    #[serde(default = "default_user_limit")]
    pub user: u64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            ip: default_ip_limit(),
            path: default_path_limit(),
            company: default_company_limit(),
            user: default_user_limit(),
        }
    }
}

impl LimitSettings {
    /// The counting window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_ip_limit() -> u64 {
    1000
}

fn default_path_limit() -> u64 {
    500
}

fn default_company_limit() -> u64 {
    10000
}

fn default_user_limit() -> u64 {
    100
}

/// Redis cluster connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Seed endpoints for the Redis cluster
    #[serde(default = "default_cluster_addrs")]
    pub cluster_addrs: Vec<String>,

    /// Per-command response timeout in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Initial connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum cluster redirects followed per command
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            cluster_addrs: default_cluster_addrs(),
            response_timeout_ms: default_response_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_cluster_addrs() -> Vec<String> {
    vec![
        "redis-cluster-0.redis:6379".to_string(),
        "redis-cluster-1.redis:6379".to_string(),
        "redis-cluster-2.redis:6379".to_string(),
    ]
}

fn default_response_timeout_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_redirects() -> u32 {
    3
}

/// Admission cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Total cost budget; each cached counter has unit cost
    #[serde(default = "default_cache_max_cost")]
    pub max_cost: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cost: default_cache_max_cost(),
        }
    }
}

fn default_cache_max_cost() -> u64 {
    10_000_000
}

/// Update batcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatcherSettings {
    /// Capacity of the shared ingress queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of batching worker tasks
    #[serde(default = "default_worker_count")]
    pub workers: usize,

    /// Per-worker buffer size that triggers a flush
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Periodic flush interval in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for BatcherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_worker_count(),
            buffer_capacity: default_buffer_capacity(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl BatcherSettings {
    /// The periodic flush interval as a duration.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

fn default_queue_capacity() -> usize {
    10000
}

fn default_worker_count() -> usize {
    10
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    100
}

impl RatewardenConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RatewardenConfig = serde_yaml::from_str(&contents)
            .map_err(|e| RatewardenError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of the loaded values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("RATE_LIMIT_WINDOW") {
            self.limits.window_secs = parse_window(&value)?;
        }
        if let Ok(value) = std::env::var("IP_RATE_LIMIT") {
            self.limits.ip = parse_limit("IP_RATE_LIMIT", &value)?;
        }
        if let Ok(value) = std::env::var("COMPANY_RATE_LIMIT") {
            self.limits.company = parse_limit("COMPANY_RATE_LIMIT", &value)?;
        }
        if let Ok(value) = std::env::var("PATH_RATE_LIMIT") {
            self.limits.path = parse_limit("PATH_RATE_LIMIT", &value)?;
        }
        if let Ok(value) = std::env::var("USER_RATE_LIMIT") {
            self.limits.user = parse_limit("USER_RATE_LIMIT", &value)?;
        }
        if let Ok(value) = std::env::var("REDIS_CLUSTER_ADDRS") {
            let addrs: Vec<String> = value
                .split(',')
                .map(|addr| addr.trim().to_string())
                .filter(|addr| !addr.is_empty())
                .collect();
            if addrs.is_empty() {
                return Err(RatewardenError::Config(
                    "REDIS_CLUSTER_ADDRS must list at least one endpoint".to_string(),
                ));
            }
            self.redis.cluster_addrs = addrs;
        }
        Ok(())
    }
}

fn parse_limit(name: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|e| {
        RatewardenError::Config(format!("Invalid {}: {}: {}", name, value, e))
    })
}

/// Parse a window duration given as bare seconds or with an `s`/`m`/`h`
/// suffix (e.g. `60s`, `5m`).
fn parse_window(value: &str) -> Result<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.as_bytes().last().copied() {
        Some(b's') => (&value[..value.len() - 1], 1),
        Some(b'm') => (&value[..value.len() - 1], 60),
        Some(b'h') => (&value[..value.len() - 1], 3600),
        _ => (value, 1),
    };
    let seconds: u64 = digits.trim().parse().map_err(|e| {
        RatewardenError::Config(format!("Invalid RATE_LIMIT_WINDOW: {}: {}", value, e))
    })?;
    if seconds == 0 {
        return Err(RatewardenError::Config(
            "RATE_LIMIT_WINDOW must be positive".to_string(),
        ));
    }
    Ok(seconds * multiplier)
}
