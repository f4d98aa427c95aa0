use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    10025
}

fn default_max_connections() -> usize {
    10
}

/// Learning windows default to 30 days, expressed in minutes, so that a
/// recipient who turns learning on effectively leaves it on until they
/// explicitly reply to an advisory mail.
fn default_learning_period() -> u64 {
    43_200
}

fn default_reject_message() -> String {
    "Message rejected by recipient's allow-list".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

/// `config.yml`: the daemon's startup configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// The user the daemon drops privileges to after binding. Out of scope
    /// for the core decision path; carried through so the CLI can honor it
    /// once process supervision is wired up by the caller.
    pub user: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_learning_period")]
    pub learning_period: u64,

    #[serde(default)]
    pub require_sasl: bool,

    #[serde(default = "default_reject_message")]
    pub reject_message: String,

    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// The literal `From:` line used on every outbound reply-mail.
    pub sender: String,

    pub pid_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,

    pub spool_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
