//! Configuration loading and resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`FINPROC_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is never fatal: the service logs a warning and
//! starts on defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Default HTTP port for finproc-api
pub const DEFAULT_PORT: u16 = 5780;

/// Default bind address (loopback only)
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Default upper bound on a whole multipart request body
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Default number of diagnostic characters kept in failure messages
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 4000;

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Directory holding the computation scripts
    #[serde(default)]
    pub scripts_dir: Option<PathBuf>,
    /// Interpreter used to run the scripts (e.g. `python3`)
    #[serde(default)]
    pub interpreter: Option<String>,
    /// Parent directory for per-job workspaces
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Leave workspaces on disk after the job finishes
    #[serde(default)]
    pub keep_workspaces: Option<bool>,
    #[serde(default)]
    pub computation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
    #[serde(default)]
    pub diagnostic_limit: Option<usize>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
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

/// Values supplied on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub scripts_dir: Option<PathBuf>,
    pub interpreter: Option<String>,
    pub workspace_root: Option<PathBuf>,
    pub keep_workspaces: Option<bool>,
    pub computation_timeout_secs: Option<u64>,
    pub max_concurrent_jobs: Option<usize>,
}

/// Fully resolved service configuration
///
/// Passed explicitly down the job-handling call chain.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    pub scripts_dir: PathBuf,
    pub interpreter: String,
    pub workspace_root: PathBuf,
    pub keep_workspaces: bool,
    /// `None` waits for the computation indefinitely
    pub computation_timeout: Option<Duration>,
    /// `None` admits every job immediately
    pub max_concurrent_jobs: Option<usize>,
    pub max_upload_bytes: usize,
    pub diagnostic_limit: usize,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            scripts_dir: PathBuf::from("scripts"),
            interpreter: default_interpreter().to_string(),
            workspace_root: std::env::temp_dir(),
            keep_workspaces: false,
            computation_timeout: None,
            max_concurrent_jobs: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            diagnostic_limit: DEFAULT_DIAGNOSTIC_LIMIT,
            log_level: default_log_level(),
        }
    }
}

/// Interpreter name for the current platform
pub fn default_interpreter() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

impl ServiceConfig {
    /// Resolve every setting: CLI → ENV → TOML → default
    pub fn resolve(overrides: &ConfigOverrides, toml: Option<&TomlConfig>) -> Result<Self> {
        let defaults = Self::default();
        let toml = toml.cloned().unwrap_or_default();

        let max_concurrent_jobs = pick(
            overrides.max_concurrent_jobs,
            env_value("FINPROC_MAX_CONCURRENT_JOBS")?,
            toml.max_concurrent_jobs,
        );
        if max_concurrent_jobs == Some(0) {
            return Err(Error::Config(
                "max_concurrent_jobs must be at least 1 when set".to_string(),
            ));
        }

        let timeout_secs = pick(
            overrides.computation_timeout_secs,
            env_value("FINPROC_COMPUTATION_TIMEOUT_SECS")?,
            toml.computation_timeout_secs,
        );

        Ok(Self {
            bind_address: pick(
                overrides.bind_address.clone(),
                env_value("FINPROC_BIND")?,
                toml.bind_address,
            )
            .unwrap_or(defaults.bind_address),
            port: pick(overrides.port, env_value("FINPROC_PORT")?, toml.port)
                .unwrap_or(defaults.port),
            scripts_dir: pick(
                overrides.scripts_dir.clone(),
                env_value("FINPROC_SCRIPTS_DIR")?,
                toml.scripts_dir,
            )
            .unwrap_or(defaults.scripts_dir),
            interpreter: pick(
                overrides.interpreter.clone(),
                env_value("FINPROC_INTERPRETER")?,
                toml.interpreter,
            )
            .unwrap_or(defaults.interpreter),
            workspace_root: pick(
                overrides.workspace_root.clone(),
                env_value("FINPROC_WORKSPACE_ROOT")?,
                toml.workspace_root,
            )
            .unwrap_or(defaults.workspace_root),
            keep_workspaces: pick(
                overrides.keep_workspaces,
                env_value("FINPROC_KEEP_WORKSPACES")?,
                toml.keep_workspaces,
            )
            .unwrap_or(defaults.keep_workspaces),
            // Zero is treated as "no timeout"
            computation_timeout: timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
            max_concurrent_jobs,
            max_upload_bytes: toml.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            diagnostic_limit: toml.diagnostic_limit.unwrap_or(defaults.diagnostic_limit),
            log_level: toml.logging.level,
        })
    }
}

fn pick<T>(cli: Option<T>, env: Option<T>, toml: Option<T>) -> Option<T> {
    cli.or(env).or(toml)
}

/// Read and parse an environment variable; unset or blank is `None`
fn env_value<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {}: {:?}", name, raw))),
        _ => Ok(None),
    }
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("finproc").join("config.toml"))
}

/// Load the TOML configuration
///
/// An explicitly requested file must exist and parse. The default location
/// is optional: when absent the service runs on defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<Option<TomlConfig>> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            Some(path) => {
                warn!(
                    "No config file at {}; using built-in defaults",
                    path.display()
                );
                return Ok(None);
            }
            None => {
                warn!("Could not determine config directory; using built-in defaults");
                return Ok(None);
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(Some(config))
}
