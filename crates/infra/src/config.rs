//! Configuration loading and representation.
//!
//! Everything comes from environment variables; `from_lookup` exists so tests
//! can feed a map instead of mutating the process environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use shelfaudit_inventory::InventoryRecord;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SESSION_LIST_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error("failed to load catalog seed {path}: {reason}")]
    Seed { path: PathBuf, reason: String },
}

/// Where sessions, records and the catalog live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    /// Cap applied to "list sessions".
    pub session_list_limit: usize,
    /// JSON array of catalog records loaded into the in-memory index.
    pub catalog_seed_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080))),
            store: StoreBackend::InMemory,
            session_list_limit: DEFAULT_SESSION_LIST_LIMIT,
            catalog_seed_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                name: "BIND_ADDR",
                value: v,
            })?,
            None => defaults.bind_addr,
        };

        let use_persistent = match lookup("USE_PERSISTENT_STORES") {
            Some(v) => v.trim().parse::<bool>().map_err(|_| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                value: v,
            })?,
            None => false,
        };

        let store = if use_persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            StoreBackend::Postgres { database_url }
        } else {
            StoreBackend::InMemory
        };

        let session_list_limit = match lookup("SESSION_LIST_LIMIT") {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "SESSION_LIST_LIMIT",
                        value: v,
                    });
                }
            },
            None => defaults.session_list_limit,
        };

        let catalog_seed_path = lookup("CATALOG_SEED_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bind_addr,
            store,
            session_list_limit,
            catalog_seed_path,
        })
    }

    /// Read the configured catalog seed; empty when no path is set.
    pub fn load_catalog_seed(&self) -> Result<Vec<InventoryRecord>, ConfigError> {
        match &self.catalog_seed_path {
            Some(path) => load_catalog_seed(path),
            None => Ok(Vec::new()),
        }
    }
}

fn load_catalog_seed(path: &Path) -> Result<Vec<InventoryRecord>, ConfigError> {
    let seed_err = |reason: String| ConfigError::Seed {
        path: path.to_path_buf(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| seed_err(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| seed_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_in_memory() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.session_list_limit, 50);
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn persistent_requires_database_url() {
        let err = AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let cfg = AppConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/audit"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/audit".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_values() {
        for (name, value) in [
            ("BIND_ADDR", "not-an-addr"),
            ("USE_PERSISTENT_STORES", "yes"),
            ("SESSION_LIST_LIMIT", "0"),
            ("SESSION_LIST_LIMIT", "many"),
        ] {
            let err = AppConfig::from_lookup(lookup(&[(name, value)])).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { name: n, .. } if *n == name),
                "{name}={value} gave {err}"
            );
        }
    }

    #[test]
    fn missing_seed_file_is_reported() {
        let cfg = AppConfig::from_lookup(lookup(&[(
            "CATALOG_SEED_PATH",
            "/definitely/not/here.json",
        )]))
        .unwrap();
        assert!(matches!(cfg.load_catalog_seed(), Err(ConfigError::Seed { .. })));
    }

    #[test]
    fn seed_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("shelfaudit-seed-{}.json", uuid::Uuid::now_v7()));
        std::fs::write(
            &path,
            r#"[{"identifier":"i1","accessionNumber":"A1","title":"T","author":"A",
                "location":{"rack":"1","shelf":"5"}}]"#,
        )
        .unwrap();

        let cfg = AppConfig {
            catalog_seed_path: Some(path.clone()),
            ..AppConfig::default()
        };
        let records = cfg.load_catalog_seed().unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier.as_str(), "I1");
    }
}
