use crate::datalog::LogState;
use crate::socket::SocketConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

pub mod loader;

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 57_600;
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 10;
pub const DEFAULT_SOCKET_HOST: &str = "localhost";
pub const DEFAULT_SOCKET_PORT: u16 = 6332;
pub const DEFAULT_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_BATCH_NAME: &str = "My First Brew";
const CONFIG_DIR_NAME: &str = ".brewtty";
const CONFIG_FILE_NAME: &str = "config.toml";
const SOCKET_FILE_NAME: &str = "bridge.sock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketMode {
    #[default]
    Unix,
    Tcp,
}

impl SocketMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SocketMode::Unix => "unix",
            SocketMode::Tcp => "tcp",
        }
    }
}

impl std::str::FromStr for SocketMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unix" => Ok(SocketMode::Unix),
            "tcp" => Ok(SocketMode::Tcp),
            other => Err(Error::InvalidArgs(format!("unknown socket mode '{other}'"))),
        }
    }
}

/// Daemon settings, loaded from the config file and persisted back when a
/// client command changes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub device: String,
    pub baud: u32,
    pub serial_timeout_ms: u64,
    pub startup_delay_secs: u64,
    pub socket_mode: SocketMode,
    pub socket_path: PathBuf,
    pub socket_host: String,
    pub socket_port: u16,
    pub interval_secs: u64,
    pub batch_name: Option<String>,
    pub data_logging: LogState,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub settings_dir: PathBuf,
    pub profile_name: Option<String>,
    pub date_time_format: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let base = base_dir();
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud: DEFAULT_BAUD,
            serial_timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
            startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS,
            socket_mode: SocketMode::default(),
            socket_path: base.join(SOCKET_FILE_NAME),
            socket_host: DEFAULT_SOCKET_HOST.to_string(),
            socket_port: DEFAULT_SOCKET_PORT,
            interval_secs: DEFAULT_INTERVAL_SECS,
            batch_name: Some(DEFAULT_BATCH_NAME.to_string()),
            data_logging: LogState::Active,
            data_dir: base.join("data"),
            public_dir: base.join("public"),
            settings_dir: base.join("settings"),
            profile_name: None,
            date_time_format: None,
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        loader::load_or_default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        loader::load_from_path(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        loader::save_to_path(self, path)
    }

    pub fn socket_config(&self) -> SocketConfig {
        match self.socket_mode {
            SocketMode::Unix => SocketConfig::Unix {
                path: self.socket_path.clone(),
            },
            SocketMode::Tcp => SocketConfig::Tcp {
                host: self.socket_host.clone(),
                port: self.socket_port,
            },
        }
    }

    /// Marker file the supervisor checks before restarting the daemon.
    pub fn do_not_run_path(&self) -> PathBuf {
        self.public_dir.join("do_not_run_brewtty")
    }
}

pub fn default_config_path() -> PathBuf {
    base_dir().join(CONFIG_FILE_NAME)
}

fn base_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(CONFIG_DIR_NAME),
        None => PathBuf::from(CONFIG_DIR_NAME),
    }
}
