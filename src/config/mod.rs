use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign bearer tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Lifetime of an issued token in hours
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Cookie the login endpoint sets and the extractor reads
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Where revoked tokens are remembered
    #[serde(default)]
    pub revocation: RevocationBackend,
    /// Seconds between purges of expired revocation entries
    #[serde(default = "default_purge_interval")]
    pub revocation_purge_interval: u64,
    /// Bootstrap admin account, created at startup when missing
    #[serde(default = "default_admin_login")]
    pub admin_login: String,
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl_hours(),
            cookie_name: default_cookie_name(),
            revocation: RevocationBackend::default(),
            revocation_purge_interval: default_purge_interval(),
            admin_login: default_admin_login(),
            admin_password: None,
            admin_name: default_admin_name(),
        }
    }
}

fn default_jwt_secret() -> String {
    // Tokens issued with a generated secret do not survive a restart
    warn!("No auth.jwt_secret configured, generating a per-process secret");
    uuid::Uuid::new_v4().simple().to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_cookie_name() -> String {
    "access_token".to_string()
}

fn default_purge_interval() -> u64 {
    600
}

fn default_admin_login() -> String {
    "admin".to_string()
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RevocationBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Upper price bound applied when a listing omits `to`
    #[serde(default = "default_price_ceiling")]
    pub price_ceiling: i64,
    /// Insert the standard modelings into an empty catalog at startup
    #[serde(default = "default_seed")]
    pub seed: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            price_ceiling: default_price_ceiling(),
            seed: default_seed(),
        }
    }
}

fn default_price_ceiling() -> i64 {
    1_000_000_000
}

fn default_seed() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Directory for the local backend (served under `public_prefix`)
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local_dir: default_local_dir(),
            public_prefix: default_public_prefix(),
            s3: None,
        }
    }
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./data/images")
}

fn default_public_prefix() -> String {
    "/images".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3-compatible endpoint, e.g. http://localhost:9000 for MinIO
    pub endpoint: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Base URL objects are reachable under; defaults to `{endpoint}/{bucket}`
    pub public_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            catalog: CatalogConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        if config.storage.backend == StorageBackend::S3 && config.storage.s3.is_none() {
            anyhow::bail!("storage.backend = \"s3\" requires a [storage.s3] section");
        }
        if config.auth.token_ttl_hours <= 0 {
            anyhow::bail!("auth.token_ttl_hours must be positive");
        }
        Ok(config)
    }
}
