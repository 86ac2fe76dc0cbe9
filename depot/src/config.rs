//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `DEPOT_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `DEPOT_` override YAML values
//! 3. **Legacy variables** - `PORT`, `MAX_UPLOAD_SIZE` and `UPLOAD_DIR` are honored for
//!    compatibility with earlier deployments
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `DEPOT_UPLOADS__MAX_UPLOAD_SIZE=2097152` sets the `uploads.max_upload_size` field.
//!
//! The loaded [`Config`] is immutable for the lifetime of the process and is passed by
//! reference (via application state) into request handling; nothing reads ambient
//! environment variables per request.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DEPOT_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Cross-origin settings for the upload form
    pub cors: CorsConfig,
    /// Upload acceptance policy and storage location
    pub uploads: UploadsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4500,
            cors: CorsConfig::default(),
            uploads: UploadsConfig::default(),
        }
    }
}

/// CORS configuration for browser clients uploading from other origins.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any origin
    pub allowed_origins: Vec<String>,
    /// Optional Access-Control-Max-Age, in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            max_age: None,
        }
    }
}

/// Upload pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Directory where accepted files are stored; created at startup if absent
    pub dir: PathBuf,
    /// Maximum size of a single uploaded part, in bytes
    pub max_upload_size: u64,
    /// MIME types (as detected from magic bytes, never from client headers)
    /// that are accepted for storage
    pub allowed_types: Vec<String>,
    /// Initial capacity of the multipart scan buffer, in bytes. Memory use per
    /// request stays on the order of this value plus one body chunk,
    /// independent of upload size.
    pub read_buffer_size: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./uploads"),
            max_upload_size: 1024 * 1024,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "application/pdf".to_string(),
            ],
            read_buffer_size: 64 * 1024,
        }
    }
}

impl UploadsConfig {
    /// Whether a sniffed MIME type is accepted by policy.
    pub fn is_allowed(&self, detected: &str) -> bool {
        self.allowed_types.iter().any(|t| t == detected)
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        Self::figment(args).extract()
    }

    fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("DEPOT_").split("__"))
            // Compatibility with the PORT / MAX_UPLOAD_SIZE / UPLOAD_DIR
            // variables used by earlier deployments
            .merge(Env::raw().only(&["PORT"]))
            .merge(
                Env::raw()
                    .only(&["MAX_UPLOAD_SIZE"])
                    .map(|_| "uploads.max_upload_size".into())
                    .split("."),
            )
            .merge(Env::raw().only(&["UPLOAD_DIR"]).map(|_| "uploads.dir".into()).split("."))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
