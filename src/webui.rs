use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "userSettings.json";

/// Mirror of the few settings the presentation layer needs to bootstrap
/// while the daemon is down: batch name, profile name, display formats.
/// The file is rewritten whole on every change.
pub struct UiSettings {
    path: PathBuf,
}

impl UiSettings {
    pub fn new(public_dir: &Path) -> Self {
        Self {
            path: public_dir.join(SETTINGS_FILE),
        }
    }

    /// Set `name` to a string value, or clear it with `None`.
    pub fn publish(&self, name: &str, value: Option<&str>) -> Result<()> {
        let mut settings = self.load_or_empty()?;
        let value = match value {
            Some(v) => Value::String(v.to_string()),
            None => Value::Null,
        };
        settings.insert(name.to_string(), value);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&settings).map_err(to_io)?)?;
        Ok(())
    }

    fn load_or_empty(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        // A corrupt file starts over empty rather than wedging every
        // subsequent publish.
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }
}

fn to_io(err: serde_json::Error) -> Error {
    Error::Io(std::io::Error::other(err))
}
