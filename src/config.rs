//! Configuration loading.
//!
//! The config file is YAML. Passwords are stored as base64(bcrypt) and
//! decoded once at load time; `SIGHUP` re-reads the same file through
//! [`Config::load`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::security::decode_password;
use crate::state::SharedConfig;

lazy_static! {
    static ref HOSTNAME_RE: Regex = Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$"
    )
    .expect("hostname regex");
}

/// Configuration errors. All fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("server name missing")]
    NameMissing,
    #[error("server name must match the format of a hostname")]
    NameNotHostname,
    #[error("server listening addresses missing")]
    NoListeners,
    #[error("bad password for {0}: {1}")]
    BadPassword(String, String),
}

/// `network:` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NetworkConfig {
    /// Network name shown in the welcome numeric.
    pub name: String,
}

/// A `tlslisten` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain path.
    pub cert: String,
    /// PEM private key path.
    pub key: String,
}

/// `server:` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerConfig {
    /// Server name; must look like a hostname.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// MOTD file path.
    #[serde(default)]
    pub motd: Option<String>,
    /// Plain listener addresses (`host:port`).
    #[serde(default)]
    pub listen: Vec<String>,
    /// TLS listeners, address to cert/key.
    #[serde(default)]
    pub tlslisten: HashMap<String, TlsConfig>,
    /// Connection password, base64(bcrypt).
    #[serde(default)]
    pub password: Option<String>,
}

/// A password-bearing block (`operator:` / `account:` values).
#[derive(Debug, Clone, Deserialize)]
pub struct PassBlock {
    /// base64(bcrypt) password.
    pub password: String,
}

/// Whole config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Network identity.
    pub network: NetworkConfig,
    /// Server identity and listeners.
    pub server: ServerConfig,
    /// Operator credentials by name.
    #[serde(default)]
    pub operator: HashMap<String, PassBlock>,
    /// SASL account credentials by name.
    #[serde(default)]
    pub account: HashMap<String, PassBlock>,

    /// Path this config was loaded from, for REHASH.
    #[serde(skip)]
    pub filename: PathBuf,
}

impl Config {
    /// Load and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(&path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.filename = path.as_ref().to_path_buf();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.is_empty() {
            return Err(ConfigError::NameMissing);
        }
        if !HOSTNAME_RE.is_match(&self.server.name) {
            return Err(ConfigError::NameNotHostname);
        }
        if self.server.listen.is_empty() && self.server.tlslisten.is_empty() {
            return Err(ConfigError::NoListeners);
        }

        // decode every password up front so a typo fails at startup
        if let Some(p) = &self.server.password {
            decode_password(p)
                .map_err(|e| ConfigError::BadPassword("server".into(), e.to_string()))?;
        }
        for (name, block) in self.operator.iter().chain(self.account.iter()) {
            decode_password(&block.password)
                .map_err(|e| ConfigError::BadPassword(name.clone(), e.to_string()))?;
        }
        Ok(())
    }

    /// Extract the rehashable parts with passwords decoded.
    pub fn shared_config(&self) -> SharedConfig {
        let decode_table = |table: &HashMap<String, PassBlock>| {
            table
                .iter()
                .filter_map(|(name, block)| {
                    decode_password(&block.password)
                        .ok()
                        .map(|hash| (name.clone(), hash))
                })
                .collect()
        };
        SharedConfig {
            description: self.server.description.clone(),
            motd: self.server.motd.clone(),
            password: self
                .server
                .password
                .as_deref()
                .and_then(|p| decode_password(p).ok()),
            operators: decode_table(&self.operator),
            accounts: decode_table(&self.account),
        }
    }

    /// A minimal config for unit tests: no listeners bound, no password.
    #[doc(hidden)]
    pub fn for_tests() -> Config {
        Config {
            network: NetworkConfig {
                name: "TestNet".into(),
            },
            server: ServerConfig {
                name: "irc.test.example".into(),
                description: "test server".into(),
                ..ServerConfig::default()
            },
            ..Config::default()
        }
    }
}
