use anyhow::Context;
use oxmetrics_common::env::{parse_bool, parse_secs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Seconds between file snapshots. `0` flushes after every write.
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,
    /// Snapshot file for the in-memory store.
    #[serde(default = "default_store_file")]
    pub store_file: Option<String>,
    /// Load the snapshot file on startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// SQLite database. When set, takes precedence over `store_file`.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// Drop the metrics table on startup.
    #[serde(default)]
    pub drop_database: bool,
    /// Shared key for payload integrity tags. Empty disables verification.
    #[serde(default)]
    pub key: String,
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_store_interval_secs() -> u64 {
    300
}

fn default_store_file() -> Option<String> {
    Some("/tmp/oxmetrics-db.json".to_string())
}

fn default_restore() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval_secs: default_store_interval_secs(),
            store_file: default_store_file(),
            restore: default_restore(),
            database_dsn: None,
            drop_database: false,
            key: String::new(),
        }
    }
}

impl ServerConfig {
    /// Reads the TOML file at `path` (defaults when missing), then applies
    /// environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("invalid server config {path}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("cannot read {path}")),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `ADDRESS`, `STORE_INTERVAL`, `STORE_FILE`, `RESTORE`,
    /// `DATABASE_DSN`, `DROP_DATABASE` and `KEY` as returned by `lookup`.
    ///
    /// An empty `STORE_FILE` or `DATABASE_DSN` unsets the field.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("ADDRESS") {
            self.address = address;
        }
        if let Some(raw) = lookup("STORE_INTERVAL") {
            self.store_interval_secs =
                parse_secs(&raw).with_context(|| format!("invalid STORE_INTERVAL '{raw}'"))?;
        }
        if let Some(file) = lookup("STORE_FILE") {
            self.store_file = non_empty(file);
        }
        if let Some(raw) = lookup("RESTORE") {
            self.restore = parse_bool(&raw).with_context(|| format!("invalid RESTORE '{raw}'"))?;
        }
        if let Some(dsn) = lookup("DATABASE_DSN") {
            self.database_dsn = non_empty(dsn);
        }
        if let Some(raw) = lookup("DROP_DATABASE") {
            self.drop_database =
                parse_bool(&raw).with_context(|| format!("invalid DROP_DATABASE '{raw}'"))?;
        }
        if let Some(key) = lookup("KEY") {
            self.key = key;
        }
        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
