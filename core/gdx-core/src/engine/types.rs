//! Geodatabase Engine Types — durability, configuration and connection properties

use crate::error::{GdxError, GdxResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Journal 내구성 수준 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurabilityLevel {
    /// 모든 커밋마다 journal flush 수행 (최대 안전)
    Full,
    /// sled 백그라운드 flush에 맡김
    #[default]
    Lazy,
    /// journal을 기록하지 않음 (메모리 전용 내구성)
    None,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeodatabaseConfig {
    pub durability: DurabilityLevel,
    /// Entries in the ancestor-list LRU.
    pub chain_cache_capacity: usize,
    /// Rows per [`Cursor::next_batch`](crate::engine::Cursor::next_batch) call.
    pub cursor_batch_size: usize,
    /// Candidate rows above which reconcile diffs run on the rayon pool.
    pub parallel_diff_threshold: usize,
    /// Compact superseded deltas after every post.
    pub auto_compact: bool,
    /// Owner recorded on versions this handle creates.
    pub user: Option<String>,
}

impl Default for GeodatabaseConfig {
    fn default() -> Self {
        Self {
            durability: DurabilityLevel::Lazy,
            chain_cache_capacity: 1024,
            cursor_batch_size: 1024,
            parallel_diff_threshold: 512,
            auto_compact: true,
            user: None,
        }
    }
}

impl GeodatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn durability(mut self, durability: DurabilityLevel) -> Self {
        self.durability = durability;
        self
    }

    pub fn chain_cache_capacity(mut self, capacity: usize) -> Self {
        self.chain_cache_capacity = capacity;
        self
    }

    pub fn cursor_batch_size(mut self, size: usize) -> Self {
        self.cursor_batch_size = size.max(1);
        self
    }

    pub fn parallel_diff_threshold(mut self, threshold: usize) -> Self {
        self.parallel_diff_threshold = threshold;
        self
    }

    pub fn auto_compact(mut self, enabled: bool) -> Self {
        self.auto_compact = enabled;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Storage location descriptor for [`Geodatabase::connect`](crate::Geodatabase::connect).
///
/// `instance` is a local directory, or empty / `:memory:` for an in-memory
/// geodatabase. Remote `host:port` instances are not reachable from this engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub instance: String,
    /// Sub-directory of `instance` holding the geodatabase.
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Version name or path to connect to; defaults to `DEFAULT`.
    pub version: Option<String>,
    pub durability: Option<DurabilityLevel>,
}

impl ConnectionProperties {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            ..Default::default()
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Parses `instance=...;database=...;user=...;password=...;version=...;durability=full`.
    pub fn from_connection_string(s: &str) -> GdxResult<Self> {
        let mut props = ConnectionProperties::default();
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| GdxError::Connection {
                location: s.to_string(),
                message: format!("expected key=value, got '{}'", part),
            })?;
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "instance" | "server" | "path" => props.instance = value,
                "database" => props.database = Some(value),
                "user" | "username" => props.user = Some(value),
                "password" => props.password = Some(value),
                "version" => props.version = Some(value),
                "durability" => {
                    props.durability = Some(match value.to_ascii_lowercase().as_str() {
                        "full" => DurabilityLevel::Full,
                        "lazy" => DurabilityLevel::Lazy,
                        "none" => DurabilityLevel::None,
                        other => {
                            return Err(GdxError::Connection {
                                location: s.to_string(),
                                message: format!("unknown durability '{}'", other),
                            });
                        }
                    })
                }
                other => {
                    return Err(GdxError::Connection {
                        location: s.to_string(),
                        message: format!("unknown connection property '{}'", other),
                    });
                }
            }
        }
        Ok(props)
    }

    pub(crate) fn is_in_memory(&self) -> bool {
        let i = self.instance.trim();
        i.is_empty() || i.eq_ignore_ascii_case(":memory:")
    }

    /// Local directory the properties point at.
    pub(crate) fn local_path(&self) -> GdxResult<PathBuf> {
        let instance = self.instance.trim();
        if looks_remote(instance) {
            return Err(GdxError::Connection {
                location: instance.to_string(),
                message: "remote instances are not supported; use a local directory".to_string(),
            });
        }
        let mut path = PathBuf::from(instance);
        if let Some(db) = &self.database {
            path.push(db);
        }
        Ok(path)
    }
}

/// `host:port` or `scheme://...`
fn looks_remote(instance: &str) -> bool {
    if instance.contains("://") {
        return true;
    }
    match instance.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && !host.contains(['/', '\\'])
                && host.len() > 1
                && !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_string() {
        let props = ConnectionProperties::from_connection_string(
            "instance=/data/gdb; database=city; user=ana; version=DEFAULT/edits; durability=full",
        )
        .unwrap();
        assert_eq!(props.instance, "/data/gdb");
        assert_eq!(props.database.as_deref(), Some("city"));
        assert_eq!(props.version.as_deref(), Some("DEFAULT/edits"));
        assert_eq!(props.durability, Some(DurabilityLevel::Full));
        assert_eq!(props.local_path().unwrap(), PathBuf::from("/data/gdb/city"));
    }

    #[test]
    fn rejects_remote_and_malformed() {
        assert!(matches!(
            ConnectionProperties::new("gis-server:5151").local_path(),
            Err(GdxError::Connection { .. })
        ));
        assert!(matches!(
            ConnectionProperties::new("sde://gis").local_path(),
            Err(GdxError::Connection { .. })
        ));
        // drive letters are local
        assert!(ConnectionProperties::new("C:\\gdb").local_path().is_ok());
        assert!(ConnectionProperties::from_connection_string("instance").is_err());
        assert!(ConnectionProperties::from_connection_string("colour=blue").is_err());
        assert!(ConnectionProperties::new(":memory:").is_in_memory());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = GeodatabaseConfig::new()
            .durability(DurabilityLevel::Full)
            .cursor_batch_size(0)
            .user("ana");
        assert_eq!(config.cursor_batch_size, 1);
        let json = serde_json::to_string(&config).unwrap();
        let back: GeodatabaseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        let partial: GeodatabaseConfig = serde_json::from_str(r#"{"auto_compact":false}"#).unwrap();
        assert!(!partial.auto_compact);
        assert_eq!(partial.chain_cache_capacity, 1024);
    }
}
