use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file looked up in the current directory before the XDG one.
pub const LOCAL_CONFIG_FILE: &str = "odup.toml";

/// Upload session chunks must be a multiple of this many bytes.
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

const MIB: u64 = 1024 * 1024;

/// Environment variables that override the credential keys of the config file.
const ENV_OVERRIDES: [(&str, CredentialKey); 4] = [
    ("ODUP_TENANT_ID", CredentialKey::TenantId),
    ("ODUP_CLIENT_ID", CredentialKey::ClientId),
    ("ODUP_CLIENT_SECRET", CredentialKey::ClientSecret),
    ("ODUP_USER_ID", CredentialKey::UserId),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialKey {
    TenantId,
    ClientId,
    ClientSecret,
    UserId,
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {} (set them in {} or via ODUP_* environment variables)", .0.join(", "), LOCAL_CONFIG_FILE)]
    MissingCredentials(Vec<&'static str>),
    #[error("upload.max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("upload.chunk_size must be greater than 0")]
    ZeroChunkSize,
    #[error("retry.delay_secs must be a finite, non-negative number")]
    InvalidRetryDelay,
}

/// Per-upload tuning (optional `[upload]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Number of files uploaded at the same time.
    pub max_concurrent: usize,
    /// Bytes sent per PUT of an upload session.
    pub chunk_size: u64,
    /// Directory inputs skip files smaller than this.
    pub min_file_size: u64,
    /// Directory inputs only pick files with these extensions (case-insensitive, no dot).
    pub extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            chunk_size: 5 * MIB,
            min_file_size: 10 * MIB,
            extensions: vec!["mp4".to_string(), "mkv".to_string()],
        }
    }
}

/// Retry parameters (optional `[retry]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed delay in seconds between a transient failure and the next attempt.
    pub delay_secs: f64,
    /// Maximum attempts per file (including the first). Absent = retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_secs: 3.0,
            max_attempts: None,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs)
    }
}

/// Service base URLs (optional `[endpoints]` section). Overridden by tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub graph_base_url: String,
    pub login_base_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            login_base_url: "https://login.microsoftonline.com".to_string(),
        }
    }
}

/// Global configuration loaded from `./odup.toml` or `~/.config/odup/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdupConfig {
    /// Azure AD tenant (directory) id.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Application (client) id of the app registration.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Client secret of the app registration.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Id or principal name of the user whose drive receives the files.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

/// The four validated credential strings.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl OdupConfig {
    fn slot(&mut self, key: CredentialKey) -> &mut Option<String> {
        match key {
            CredentialKey::TenantId => &mut self.tenant_id,
            CredentialKey::ClientId => &mut self.client_id,
            CredentialKey::ClientSecret => &mut self.client_secret,
            CredentialKey::UserId => &mut self.user_id,
        }
    }

    /// Overlay credential values from the environment (`ODUP_TENANT_ID`, ...).
    /// `lookup` is `std::env::var(..).ok()` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *self.slot(key) = Some(value);
            }
        }
    }

    /// Returns the credentials, or every missing key at once.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        fn present(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
        let tenant_id = present(&self.tenant_id);
        let client_id = present(&self.client_id);
        let client_secret = present(&self.client_secret);
        let user_id = present(&self.user_id);

        let mut missing = Vec::new();
        if tenant_id.is_none() {
            missing.push("tenant_id");
        }
        if client_id.is_none() {
            missing.push("client_id");
        }
        if client_secret.is_none() {
            missing.push("client_secret");
        }
        if user_id.is_none() {
            missing.push("user_id");
        }

        match (tenant_id, client_id, client_secret, user_id) {
            (Some(tenant_id), Some(client_id), Some(client_secret), Some(user_id)) => {
                Ok(Credentials {
                    tenant_id,
                    client_id,
                    client_secret,
                    user_id,
                })
            }
            _ => Err(ConfigError::MissingCredentials(missing)),
        }
    }

    /// Checks the non-credential settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.upload.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if !self.retry.delay_secs.is_finite() || self.retry.delay_secs < 0.0 {
            return Err(ConfigError::InvalidRetryDelay);
        }
        if self.upload.chunk_size % CHUNK_ALIGNMENT != 0 {
            tracing::warn!(
                chunk_size = self.upload.chunk_size,
                "chunk_size is not a multiple of 320 KiB; the service may reject chunks"
            );
        }
        Ok(())
    }
}

pub fn xdg_config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("odup")?;
    Ok(xdg_dirs.get_config_home().join("config.toml"))
}

/// Locate the config file: `./odup.toml` first, then the XDG config file.
/// Returns `None` when neither exists.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Ok(Some(local));
    }
    let xdg = xdg_config_path()?;
    Ok(xdg.is_file().then_some(xdg))
}

/// Parse a config file from disk.
pub fn load_from_path(path: &Path) -> Result<OdupConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let cfg: OdupConfig =
        toml::from_str(&data).with_context(|| format!("parse config file {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration: the explicit path if given, otherwise the first file found by
/// [`find_config_file`], otherwise defaults. Environment overrides are applied last.
pub fn load(explicit: Option<&Path>) -> Result<OdupConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file()?,
    };
    let mut cfg = match path {
        Some(ref p) => {
            tracing::debug!("loading config from {}", p.display());
            load_from_path(p)?
        }
        None => {
            tracing::debug!("no config file found, using defaults and environment");
            OdupConfig::default()
        }
    };
    cfg.apply_env(|var| std::env::var(var).ok());
    Ok(cfg)
}
