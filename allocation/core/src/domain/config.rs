// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Allocation Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing one
// deployment of the allocation service:
// - HTTP listener
// - Storage backend (in-memory or PostgreSQL)
// - Workflow tuning (co-guide policy, confirmation window, sweep)
// - Identity (session and one-time code lifetimes)
// - Outbound mail and uploaded file storage
// - Logging and metrics

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::co_guide::CoGuidePolicy;
use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "btp.allocation/v1";
pub const KIND: &str = "AllocationConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfigManifest {
    /// API version (must be "btp.allocation/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "AllocationConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: AllocationConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Deployment name, e.g. the department running the allocation round
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Deployment settings (content under `spec:`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// PostgreSQL connection string, required for the postgres backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::InMemory,
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub co_guide_policy: CoGuidePolicy,

    /// How long a student's choice stays Temporarily Confirmed before the
    /// finalize sweep promotes it
    #[serde(default = "default_confirmation_window", with = "humantime_serde")]
    pub confirmation_window: Duration,

    /// Upper bound on one outbound mail attempt
    #[serde(default = "default_notification_timeout", with = "humantime_serde")]
    pub notification_timeout: Duration,

    /// Run the finalize sweep periodically inside `btp serve`
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub sweep_interval: Option<Duration>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            co_guide_policy: CoGuidePolicy::default(),
            confirmation_window: default_confirmation_window(),
            notification_timeout: default_notification_timeout(),
            sweep_interval: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,

    #[serde(default = "default_otp_ttl", with = "humantime_serde")]
    pub otp_ttl: Duration,

    /// Number of digits in a mailed one-time code
    #[serde(default = "default_otp_length")]
    pub otp_length: u8,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
            otp_ttl: default_otp_ttl(),
            otp_length: default_otp_length(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTransport {
    /// Write mails to the log only
    #[default]
    Log,
    /// POST mails as JSON to a relay
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub transport: MailTransport,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransport::Log,
            endpoint: None,
            from: default_mail_from(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory for uploaded files. Kept in memory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Prometheus listener port; metrics are disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_max_connections() -> u32 {
    5
}

fn default_confirmation_window() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_notification_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

fn default_otp_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_otp_length() -> u8 {
    6
}

fn default_mail_from() -> String {
    "btp-allocation@localhost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for AllocationConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "btp-allocation".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: AllocationConfigSpec::default(),
        }
    }
}

impl AllocationConfigManifest {
    /// Load configuration from YAML file
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
    /// 1. BTP_CONFIG_PATH environment variable
    /// 2. ./btp-config.yaml (working directory)
    /// 3. ~/.btp/config.yaml (user home)
    /// 4. /etc/btp/config.yaml (system, Unix) or C:\ProgramData\Btp\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("BTP_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./btp-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".btp").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/btp/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Btp\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
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

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override source is injectable so tests do not touch process env.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BTP_DATABASE_URL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: BTP_DATABASE_URL (storage backend -> postgres)");
            self.spec.storage.backend = StorageBackendKind::Postgres;
            self.spec.storage.database_url = Some(url);
        }

        if let Some(val) = lookup("BTP_CO_GUIDE_POLICY") {
            match CoGuidePolicy::parse(val.trim()) {
                Some(policy) => {
                    tracing::info!("Environment override: BTP_CO_GUIDE_POLICY={}", val);
                    self.spec.workflow.co_guide_policy = policy;
                }
                None => {
                    tracing::warn!(
                        "Invalid value for BTP_CO_GUIDE_POLICY: '{}'. Expected any_approve/all_must_approve. Ignoring.",
                        val
                    );
                }
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
        if storage.backend == StorageBackendKind::Postgres
            && storage.database_url.as_deref().is_none_or(str::is_empty)
        {
            anyhow::bail!("spec.storage.database_url is required for the postgres backend");
        }
        if storage.max_connections == 0 {
            anyhow::bail!("spec.storage.max_connections must be at least 1");
        }

        let mail = &self.spec.mail;
        if mail.transport == MailTransport::Webhook && mail.endpoint.as_deref().is_none_or(str::is_empty) {
            anyhow::bail!("spec.mail.endpoint is required for the webhook transport");
        }

        let otp_length = self.spec.identity.otp_length;
        if !(4..=10).contains(&otp_length) {
            anyhow::bail!("spec.identity.otp_length must be between 4 and 10, got {}", otp_length);
        }

        if self.spec.workflow.sweep_interval.is_some_and(|d| d.is_zero()) {
            anyhow::bail!("spec.workflow.sweep_interval cannot be zero");
        }

        Ok(())
    }

    /// Storage backend selected by `spec.storage`.
    pub fn storage_backend(&self) -> StorageBackend {
        let storage = &self.spec.storage;
        match (storage.backend, &storage.database_url) {
            (StorageBackendKind::Postgres, Some(url)) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: url.clone(),
                max_connections: storage.max_connections,
            }),
            _ => StorageBackend::InMemory,
        }
    }
}
