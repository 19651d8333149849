use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

use super::{default_config_path, Config, SocketMode};
use crate::datalog::LogState;

pub fn load_or_default() -> Result<Config> {
    let path = default_config_path();
    if !path.exists() {
        let cfg = Config::default();
        save_to_path(&cfg, &path)?;
        return Ok(cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    parse(&fs::read_to_string(path)?)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = format!(
        "# brewtty config\n\
device = \"{}\"\n\
baud = {}\n\
serial_timeout_ms = {}\n\
startup_delay_secs = {}\n\
socket_mode = \"{}\"\n\
socket_path = \"{}\"\n\
socket_host = \"{}\"\n\
socket_port = {}\n\
interval_secs = {}\n\
batch_name = {}\n\
data_logging = \"{}\"\n\
data_dir = \"{}\"\n\
public_dir = \"{}\"\n\
settings_dir = \"{}\"\n\
profile_name = {}\n\
date_time_format = {}\n",
        config.device,
        config.baud,
        config.serial_timeout_ms,
        config.startup_delay_secs,
        config.socket_mode.as_str(),
        config.socket_path.display(),
        config.socket_host,
        config.socket_port,
        config.interval_secs,
        format_optional(&config.batch_name),
        config.data_logging.as_str(),
        config.data_dir.display(),
        config.public_dir.display(),
        config.settings_dir.display(),
        format_optional(&config.profile_name),
        format_optional(&config.date_time_format),
    );
    fs::write(path, contents)?;
    Ok(())
}

pub fn parse(raw: &str) -> Result<Config> {
    let mut config = Config::default();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::InvalidArgs(format!("config line {} has no '='", line_no + 1))
        })?;
        let key = key.trim();
        let value = unquote(value.trim());

        match key {
            "device" => config.device = value.to_string(),
            "baud" => config.baud = parse_num(key, value)?,
            "serial_timeout_ms" => config.serial_timeout_ms = parse_num(key, value)?,
            "startup_delay_secs" => config.startup_delay_secs = parse_num(key, value)?,
            "socket_mode" => config.socket_mode = SocketMode::from_str(value)?,
            "socket_path" => config.socket_path = PathBuf::from(value),
            "socket_host" => config.socket_host = value.to_string(),
            "socket_port" => config.socket_port = parse_num(key, value)?,
            "interval_secs" => config.interval_secs = parse_num(key, value)?,
            "batch_name" => config.batch_name = parse_optional(value),
            "data_logging" => config.data_logging = LogState::from_str(value)?,
            "data_dir" => config.data_dir = PathBuf::from(value),
            "public_dir" => config.public_dir = PathBuf::from(value),
            "settings_dir" => config.settings_dir = PathBuf::from(value),
            "profile_name" => config.profile_name = parse_optional(value),
            "date_time_format" => config.date_time_format = parse_optional(value),
            // Unknown keys are kept non-fatal so a newer config survives a
            // downgrade; they are dropped on the next save.
            _ => {}
        }
    }
    Ok(config)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidArgs(format!("config key '{key}': bad number '{value}'")))
}

fn parse_optional(value: &str) -> Option<String> {
    if value == "null" || value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn format_optional(value: &Option<String>) -> String {
    match value {
        Some(value) => format!("\"{value}\""),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.device = "/dev/ttyACM0".to_string();
        config.interval_secs = 30;
        config.batch_name = None;
        config.data_logging = LogState::Paused;
        save_to_path(&config, &path).unwrap();

        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = parse("device = \"/dev/ttyS1\"\n").unwrap();
        assert_eq!(config.device, "/dev/ttyS1");
        assert_eq!(config.baud, super::super::DEFAULT_BAUD);
        assert_eq!(config.data_logging, LogState::Active);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = parse("future_key = 1\nbaud = 9600\n").unwrap();
        assert_eq!(config.baud, 9600);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse("baud = fast\n").is_err());
        assert!(parse("data_logging = \"sometimes\"\n").is_err());
        assert!(parse("just a line\n").is_err());
    }
}
