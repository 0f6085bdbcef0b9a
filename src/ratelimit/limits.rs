//! Dimension mapping and the static limit table.
//!
//! A descriptor entry key selects a limiting dimension; the dimension plus
//! the entry value names a counter key of the form `<dimension>:<value>`.

use crate::config::LimitSettings;
use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::RateLimitDescriptor;

/// A limiting dimension, determining which limit applies to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    /// Per client IP, selected by the `remote_address` descriptor key
    Ip,
    /// Per request path, selected by the `path` descriptor key
    Path,
    /// Per company, selected by the `company_id` descriptor key
    Company,
    /// Per user, selected by the `user_id` descriptor key
    User,
}

impl Dimension {
    /// Map a descriptor entry key to its dimension. Unrecognized keys map to
    /// nothing and are skipped during selection.
    pub fn from_entry_key(key: &str) -> Option<Self> {
        match key {
            "remote_address" => Some(Dimension::Ip),
            "path" => Some(Dimension::Path),
            "company_id" => Some(Dimension::Company),
            "user_id" => Some(Dimension::User),
            _ => None,
        }
    }

    /// The counter key prefix for this dimension.
    pub fn prefix(&self) -> &'static str {
        match self {
            Dimension::Ip => "ip",
            Dimension::Path => "path",
            Dimension::Company => "company",
            Dimension::User => "user",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// The dimension, counter key and limit selected from one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedLimit {
    /// The limiting dimension
    pub dimension: Dimension,
    /// The counter key, `<dimension>:<value>`
    pub key: String,
    /// Requests allowed per window on this key
    pub limit: u64,
}

/// Static mapping from dimension to requests-per-window. Immutable for the
/// process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct LimitTable {
    /// Requests per window per client IP
    pub ip: u64,
    /// Requests per window per request path
    pub path: u64,
    /// Requests per window per company
    pub company: u64,
    /// Requests per window per user
    pub user: u64,
}

impl LimitTable {
    /// The configured limit for a dimension.
    pub fn limit(&self, dimension: Dimension) -> u64 {
        match dimension {
            Dimension::Ip => self.ip,
            Dimension::Path => self.path,
            Dimension::Company => self.company,
            Dimension::User => self.user,
        }
    }

    /// Select the counter key and limit for a descriptor.
    ///
    /// Entries are scanned in order and the last recognized entry wins.
    /// Returns `None` when no entry carries a recognized key.
    pub fn select(&self, descriptor: &RateLimitDescriptor) -> Option<SelectedLimit> {
        let mut selected = None;
        for entry in &descriptor.entries {
            if let Some(dimension) = Dimension::from_entry_key(&entry.key) {
                selected = Some(SelectedLimit {
                    dimension,
                    key: format!("{}:{}", dimension.prefix(), entry.value),
                    limit: self.limit(dimension),
                });
            }
        }
        selected
    }
}

impl From<&LimitSettings> for LimitTable {
    fn from(settings: &LimitSettings) -> Self {
        Self {
            ip: settings.ip,
            path: settings.path,
            company: settings.company,
            user: settings.user,
        }
    }
}

impl Default for LimitTable {
    fn default() -> Self {
        Self::from(&LimitSettings::default())
    }
}
