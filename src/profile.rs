use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Setpoint sent when a profile disables control; reads as INT_MIN on the
/// controller.
pub const CONTROL_DISABLED_SETPOINT: f64 = -99999.0;

/// File the active profile is staged into, under the settings directory.
pub const ACTIVE_PROFILE_FILE: &str = "tempProfile.csv";

const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// A fermentation temperature profile: timestamped target rows, linearly
/// interpolated. An empty temperature cell disables control for its
/// segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TempProfile {
    pub name: Option<String>,
    rows: Vec<(NaiveDateTime, Option<f64>)>,
}

impl TempProfile {
    /// Parse the staged profile file: a header row (with the profile name
    /// stamped into the last column) followed by `date,temperature` rows.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::PayloadDecode("profile file is empty".to_string()))?;
        let name = header
            .rsplit(',')
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty() && parse_date(n).is_none())
            .map(str::to_string);

        let mut rows = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (date, temp) = line
                .split_once(',')
                .ok_or_else(|| Error::PayloadDecode(format!("profile row '{line}' has no temperature column")))?;
            let date = parse_date(date.trim())
                .ok_or_else(|| Error::PayloadDecode(format!("bad profile date '{date}'")))?;
            let temp = temp.trim();
            let temp = if temp.is_empty() {
                None
            } else {
                Some(temp.parse::<f64>().map_err(|_| {
                    Error::PayloadDecode(format!("bad profile temperature '{temp}'"))
                })?)
            };
            rows.push((date, temp));
        }
        rows.sort_by_key(|(date, _)| *date);
        Ok(Self { name, rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Target temperature at `now`: holds the first row before the
    /// profile starts, interpolates between rows, holds the last row after
    /// the end. `None` disables control.
    pub fn current_target(&self, now: NaiveDateTime) -> Option<f64> {
        let rows = self.rows.as_slice();
        let (first, last) = (rows.first()?, rows.last()?);
        if now <= first.0 {
            return first.1;
        }
        if now >= last.0 {
            return last.1;
        }
        let next_idx = rows.partition_point(|(date, _)| *date <= now);
        let prev = &rows[next_idx - 1];
        let next = &rows[next_idx];
        let (prev_temp, next_temp) = (prev.1?, next.1?);

        let span = (next.0 - prev.0).num_seconds() as f64;
        let elapsed = (now - prev.0).num_seconds() as f64;
        let target = prev_temp + (next_temp - prev_temp) * (elapsed / span);
        // Two decimals, matching the setpoint precision sent to the device.
        Some((target * 100.0).round() / 100.0)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Stage `<public>/profiles/<name>.csv` as the active profile: back up the
/// previous one, copy the new file in, and stamp the profile name into the
/// header row so it survives without the config file.
pub fn activate(public_dir: &Path, settings_dir: &Path, name: &str) -> Result<PathBuf> {
    let source = public_dir.join("profiles").join(format!("{name}.csv"));
    let dest = settings_dir.join(ACTIVE_PROFILE_FILE);
    let backup = settings_dir.join(format!("{ACTIVE_PROFILE_FILE}.old"));

    fs::create_dir_all(settings_dir)?;
    if dest.exists() {
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(&dest, &backup)?;
    }
    fs::copy(&source, &dest)?;

    let raw = fs::read_to_string(&dest)?;
    let mut lines = raw.splitn(2, '\n');
    let header = lines.next().unwrap_or_default().trim_end_matches('\r');
    let rest = lines.next().unwrap_or_default();
    fs::write(&dest, format!("{header},{name}\n{rest}"))?;
    Ok(dest)
}

/// Profile name stamped into the staged file's header, if any.
pub fn active_name(settings_dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(settings_dir.join(ACTIVE_PROFILE_FILE)).ok()?;
    let header = raw.lines().next()?;
    header.rsplit(',').next().map(|n| n.trim().to_string())
}
