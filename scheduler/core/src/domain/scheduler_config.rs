// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Scheduler Configuration Types
//
// Defines the configuration schema for a slotkeeper deployment:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Storage backend and locking strategy selection
// - Claim policy (conflict retries, slot restoration on cancel)
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::domain::repository::{LockingStrategy, PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "slotkeeper/v1";
pub const KIND: &str = "SchedulerConfig";

/// Top-level Kubernetes-style scheduler configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfigManifest {
    /// API version (must be "slotkeeper/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SchedulerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: SchedulerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable deployment name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub claims: ClaimsConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackendKind,

    /// Postgres connection string, required when backend is postgres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub locking: LockingStrategy,

    /// Upper bound on waiting for an exclusive activity lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: None,
            max_connections: default_max_connections(),
            locking: LockingStrategy::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StorageConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimsConfig {
    /// How many times a claim that lost a write conflict is re-run from the
    /// top. Unset means 0 for pessimistic and 8 for optimistic locking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_retries: Option<u32>,

    /// Return the slot to the pool when a participant cancels
    #[serde(default)]
    pub restore_slot_on_cancel: bool,
}

impl ClaimsConfig {
    pub fn effective_conflict_retries(&self, locking: LockingStrategy) -> u32 {
        self.conflict_retries.unwrap_or(match locking {
            LockingStrategy::Pessimistic => 0,
            LockingStrategy::Optimistic => DEFAULT_OPTIMISTIC_RETRIES,
        })
    }
}

const DEFAULT_OPTIMISTIC_RETRIES: u32 = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_backend() -> StorageBackendKind {
    StorageBackendKind::InMemory
}

fn default_max_connections() -> u32 {
    5
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for SchedulerConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "slotkeeper".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: SchedulerConfigSpec::default(),
        }
    }
}

impl SchedulerConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SLOTKEEPER_CONFIG_PATH environment variable
    /// 2. ./slotkeeper-config.yaml (working directory)
    /// 3. ~/.slotkeeper/config.yaml (user home)
    /// 4. /etc/slotkeeper/config.yaml (system, Unix) or C:\ProgramData\Slotkeeper\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SLOTKEEPER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./slotkeeper-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".slotkeeper").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/slotkeeper/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Slotkeeper\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails loudly if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides so container deployments can
    /// reconfigure storage without editing the manifest
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SLOTKEEPER_DATABASE_URL") {
            tracing::info!("Environment override: SLOTKEEPER_DATABASE_URL (backend=postgres)");
            self.spec.storage.database_url = Some(url);
            self.spec.storage.backend = StorageBackendKind::Postgres;
        }

        if let Ok(val) = std::env::var("SLOTKEEPER_LOCKING") {
            match val.parse::<LockingStrategy>() {
                Ok(locking) => {
                    tracing::info!("Environment override: SLOTKEEPER_LOCKING={}", locking);
                    self.spec.storage.locking = locking;
                }
                Err(e) => tracing::warn!("{}. Ignoring SLOTKEEPER_LOCKING.", e),
            }
        }

        if let Ok(val) = std::env::var("SLOTKEEPER_LOCK_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: SLOTKEEPER_LOCK_TIMEOUT_MS={}", ms);
                    self.spec.storage.lock_timeout_ms = ms;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for SLOTKEEPER_LOCK_TIMEOUT_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("SLOTKEEPER_RESTORE_SLOT_ON_CANCEL") {
            match parse_bool(&val) {
                Some(restore) => {
                    tracing::info!("Environment override: SLOTKEEPER_RESTORE_SLOT_ON_CANCEL={}", restore);
                    self.spec.claims.restore_slot_on_cancel = restore;
                }
                None => tracing::warn!(
                    "Invalid value for SLOTKEEPER_RESTORE_SLOT_ON_CANCEL: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let storage = &self.spec.storage;
        if storage.backend == StorageBackendKind::Postgres {
            match &storage.database_url {
                Some(url) if !url.is_empty() => {}
                _ => anyhow::bail!("spec.storage.database_url is required for the postgres backend"),
            }
            if storage.max_connections == 0 {
                anyhow::bail!("spec.storage.max_connections must be at least 1");
            }
        }

        if storage.lock_timeout_ms == 0 {
            anyhow::bail!("spec.storage.lock_timeout_ms must be greater than zero");
        }

        Ok(())
    }

    /// Resolve the storage section into the backend the repository factory takes
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        let storage = &self.spec.storage;
        match storage.backend {
            StorageBackendKind::InMemory => Ok(StorageBackend::InMemory),
            StorageBackendKind::Postgres => {
                let connection_string = storage.database_url.clone().ok_or_else(|| {
                    anyhow::anyhow!("spec.storage.database_url is required for the postgres backend")
                })?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string,
                    max_connections: storage.max_connections,
                }))
            }
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
