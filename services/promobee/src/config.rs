//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! The API key is loaded from PROMOBEE_API_KEY or api_key_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "promobee.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ecobee: EcobeeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

/// ecobee account and API settings
#[derive(Debug, Deserialize)]
pub struct EcobeeConfig {
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    /// Path to a file containing the API key (alternative to PROMOBEE_API_KEY)
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
    /// Durable credential file written by `promobee register`
    #[serde(default)]
    pub token_store: Option<PathBuf>,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// File that every API request and response is appended to
    #[serde(default)]
    pub http_log: Option<PathBuf>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Poll loop settings
#[derive(Debug, Deserialize)]
pub struct PollConfig {
    /// ecobee asks clients not to poll more often than every three minutes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_api_host() -> String {
    ecobee_auth::ECOBEE_API_HOST.to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_connections() -> usize {
    1000
}

fn default_interval() -> u64 {
    180
}

impl Default for EcobeeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_file: None,
            token_store: None,
            api_host: default_api_host(),
            http_log: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay environment
    /// variables and validate.
    ///
    /// API key resolution order:
    /// 1. PROMOBEE_API_KEY env var
    /// 2. api_key_file path from config
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        let mut config: Config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Config::default(),
        };

        config.apply_env()?;

        if !config.ecobee.api_host.starts_with("http://")
            && !config.ecobee.api_host.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api_host must start with http:// or https://, got: {}",
                config.ecobee.api_host
            )));
        }

        if config.poll.interval_secs == 0 {
            return Err(common::Error::Config(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.ecobee.token_store.is_none() {
            return Err(common::Error::Config(
                "token_store is required (set PROMOBEE_TOKEN_STORE or [ecobee] token_store)"
                    .into(),
            ));
        }

        if let Ok(key) = std::env::var("PROMOBEE_API_KEY") {
            config.ecobee.api_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.ecobee.api_key_file {
            config.ecobee.api_key = Secret::from_key_file(key_file)?;
        }

        if config.ecobee.api_key.is_none() {
            return Err(common::Error::Config(
                "an API key is required (set PROMOBEE_API_KEY or [ecobee] api_key_file)".into(),
            ));
        }

        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(path) = std::env::var("PROMOBEE_TOKEN_STORE") {
            self.ecobee.token_store = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("PROMOBEE_HTTP_LOG") {
            self.ecobee.http_log = (!path.trim().is_empty()).then(|| PathBuf::from(path.trim()));
        }
        if let Some(ip) = env_parse::<IpAddr>("PROMOBEE_ADDRESS")? {
            self.server.listen_addr.set_ip(ip);
        }
        let port = match env_parse::<u16>("PROMOBEE_PORT")? {
            Some(port) => Some(port),
            None => env_parse::<u16>("PORT")?,
        };
        if let Some(port) = port {
            self.server.listen_addr.set_port(port);
        }
        if let Some(secs) = env_parse::<u64>("PROMOBEE_POLL_INTERVAL_SECS")? {
            self.poll.interval_secs = secs;
        }
        Ok(())
    }

    /// The API key. Present after a successful `load`.
    pub fn api_key(&self) -> common::Result<&Secret<String>> {
        self.ecobee
            .api_key
            .as_ref()
            .ok_or_else(|| common::Error::Config("API key not configured".into()))
    }

    /// The token store path. Present after a successful `load`.
    pub fn token_store(&self) -> common::Result<&Path> {
        self.ecobee
            .token_store
            .as_deref()
            .ok_or_else(|| common::Error::Config("token_store not configured".into()))
    }

    /// Resolve config file path from CLI arg, PROMOBEE_CONFIG env var, or
    /// `promobee.toml` in the working directory if it exists.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("PROMOBEE_CONFIG") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }
}

fn env_parse<T: FromStr>(key: &str) -> common::Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| common::Error::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
