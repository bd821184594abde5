use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "MEDIT_CONFIG";

/// Flat configuration keys accepted from the environment and the nested keys
/// they override
const FLAT_KEYS: &[(&str, &str)] = &[
    ("BUCKET_NAME", "s3.bucket"),
    ("S3_BASE_PATH", "s3.base_path"),
    ("DYNAMO_MEDIT_TABLE", "dynamo.table"),
    ("MAX_BODY", "limits.max_body"),
    ("MAX_HEAD", "limits.max_head"),
    ("MAX_BY", "limits.max_by"),
    ("MAX_TYPE", "limits.max_type"),
    ("MAX_POST", "limits.max_post"),
    ("DATE_FORMAT", "medit.date_format"),
    ("CTXT", "medit.ctxt"),
    ("VERSION", "service.version"),
    ("LOG_FILENAME", "service.log_filename"),
    ("CREATE_LOG", "service.create_log"),
];

/// Errors that can occur while validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the medit service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// DynamoDB configuration
    #[serde(default)]
    pub dynamo: DynamoConfig,
    /// Field length limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Server-assigned field settings
    #[serde(default)]
    pub medit: MeditConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Which store implementations back the service
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// S3 for documents, DynamoDB for metadata
    #[default]
    Aws,
    /// Process-local maps, lost on exit
    Memory,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Version stamped on every stored medit
    #[serde(default = "default_version")]
    pub version: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional log file, written in addition to stdout
    pub log_filename: Option<String>,
    /// Create the log file's directory if it is missing
    #[serde(default)]
    pub create_log: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Store backend
    #[serde(default)]
    pub backend: StorageBackend,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket holding medit documents
    #[serde(default)]
    pub bucket: String,
    /// Key prefix; documents live at `{base_path}/{id}`
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// DynamoDB metadata table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DynamoConfig {
    /// Table name
    #[serde(default)]
    pub table: String,
    /// Secondary index over (ctxt, at)
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for DynamoDB Local, LocalStack, etc.)
    pub endpoint_url: Option<String>,
}

/// Maximum field lengths, in characters
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_body")]
    pub max_body: usize,
    #[serde(default = "default_max_head")]
    pub max_head: usize,
    #[serde(default = "default_max_by")]
    pub max_by: usize,
    #[serde(default = "default_max_type")]
    pub max_type: usize,
    /// Limit on the whole serialized submission
    #[serde(default = "default_max_post")]
    pub max_post: usize,
}

/// Settings for server-assigned medit fields
#[derive(Debug, Clone, Deserialize)]
pub struct MeditConfig {
    /// Context tag partitioning medits for range queries
    #[serde(default = "default_ctxt")]
    pub ctxt: String,
    /// strftime format for the `date` field
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Concurrent blob reads for a detail range query
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,
}

// Default value functions
fn default_service_name() -> String {
    "medit-service".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_base_path() -> String {
    "medits".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_index_name() -> String {
    "ctxt-at-index".to_string()
}

fn default_max_body() -> usize {
    1000
}

fn default_max_head() -> usize {
    100
}

fn default_max_by() -> usize {
    100
}

fn default_max_type() -> usize {
    32
}

fn default_max_post() -> usize {
    2000
}

fn default_ctxt() -> String {
    "medit".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_detail_concurrency() -> usize {
    8
}

impl Config {
    /// Load configuration from config files and the environment
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/medit").required(false))
            .add_source(config::File::with_name("/etc/medit/medit").required(false));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        // MEDIT__S3__BUCKET -> s3.bucket
        builder = builder.add_source(
            config::Environment::with_prefix("MEDIT")
                .separator("__")
                .try_parsing(true),
        );

        for (flat, nested) in FLAT_KEYS {
            builder = builder.set_override_option(*nested, std::env::var(flat).ok())?;
        }

        builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Check values that deserialization alone cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.backend == StorageBackend::Aws {
            if self.s3.bucket.is_empty() {
                return Err(ConfigError::MissingRequired("s3.bucket".to_string()));
            }
            if self.dynamo.table.is_empty() {
                return Err(ConfigError::MissingRequired("dynamo.table".to_string()));
            }
        }

        if self.medit.ctxt.is_empty() {
            return Err(ConfigError::MissingRequired("medit.ctxt".to_string()));
        }

        if StrftimeItems::new(&self.medit.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidValue {
                key: "medit.date_format".to_string(),
                message: format!("unparseable format {:?}", self.medit.date_format),
            });
        }

        let limits = [
            ("limits.max_body", self.limits.max_body),
            ("limits.max_head", self.limits.max_head),
            ("limits.max_by", self.limits.max_by),
            ("limits.max_type", self.limits.max_type),
            ("limits.max_post", self.limits.max_post),
        ];
        if let Some((key, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.api.detail_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.detail_concurrency".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_version(),
            log_level: default_log_level(),
            log_filename: None,
            create_log: false,
            metrics_port: default_metrics_port(),
            backend: StorageBackend::default(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            base_path: default_base_path(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table: String::new(),
            index_name: default_index_name(),
            region: default_region(),
            endpoint_url: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body: default_max_body(),
            max_head: default_max_head(),
            max_by: default_max_by(),
            max_type: default_max_type(),
            max_post: default_max_post(),
        }
    }
}

impl Default for MeditConfig {
    fn default() -> Self {
        Self {
            ctxt: default_ctxt(),
            date_format: default_date_format(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            detail_concurrency: default_detail_concurrency(),
        }
    }
}
