use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display text shown while the daemon waits for the first `L` frame.
pub const STARTUP_DISPLAY: [&str; 4] = ["Bridge starting up", " ", " ", " "];

/// Operating mode of the controller, one letter on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "o")]
    Off,
    #[serde(rename = "b")]
    BeerConstant,
    #[serde(rename = "f")]
    FridgeConstant,
    #[serde(rename = "p")]
    Profile,
}

impl Mode {
    pub fn as_char(self) -> char {
        match self {
            Mode::Off => 'o',
            Mode::BeerConstant => 'b',
            Mode::FridgeConstant => 'f',
            Mode::Profile => 'p',
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Active control settings: mode plus the setpoints currently in force.
/// Replaced wholesale by `S` snapshots; mutated locally by setpoint commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlSettings {
    pub mode: Mode,
    pub beer_set: f64,
    pub fridge_set: f64,
    pub heat_estimator: f64,
    pub cool_estimator: f64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            mode: Mode::BeerConstant,
            beer_set: 20.0,
            fridge_set: 20.0,
            heat_estimator: 0.2,
            cool_estimator: 5.0,
        }
    }
}

/// Tunable bounds and coefficients. The controller is the source of truth;
/// this copy is a cache seeded with the controller's own compile-time
/// defaults and replaced wholesale by `C` snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConstants {
    #[serde(rename = "tempFormat")]
    pub temp_format: String,
    #[serde(rename = "tempSetMin")]
    pub temp_set_min: f64,
    #[serde(rename = "tempSetMax")]
    pub temp_set_max: f64,
    #[serde(rename = "pidMax")]
    pub pid_max: f64,
    #[serde(rename = "Kp")]
    pub kp: f64,
    #[serde(rename = "Ki")]
    pub ki: f64,
    #[serde(rename = "Kd")]
    pub kd: f64,
    #[serde(rename = "iMaxErr")]
    pub i_max_err: f64,
    #[serde(rename = "idleRangeH")]
    pub idle_range_h: f64,
    #[serde(rename = "idleRangeL")]
    pub idle_range_l: f64,
    #[serde(rename = "heatTargetH")]
    pub heat_target_h: f64,
    #[serde(rename = "heatTargetL")]
    pub heat_target_l: f64,
    #[serde(rename = "coolTargetH")]
    pub cool_target_h: f64,
    #[serde(rename = "coolTargetL")]
    pub cool_target_l: f64,
    #[serde(rename = "maxHeatTimeForEst")]
    pub max_heat_time_for_est: String,
    #[serde(rename = "maxCoolTimeForEst")]
    pub max_cool_time_for_est: String,
    #[serde(rename = "fridgeFastFilt")]
    pub fridge_fast_filt: String,
    #[serde(rename = "fridgeSlowFilt")]
    pub fridge_slow_filt: String,
    #[serde(rename = "fridgeSlopeFilt")]
    pub fridge_slope_filt: String,
    #[serde(rename = "beerFastFilt")]
    pub beer_fast_filt: String,
    #[serde(rename = "beerSlowFilt")]
    pub beer_slow_filt: String,
    #[serde(rename = "beerSlopeFilt")]
    pub beer_slope_filt: String,
    pub lah: i64,
    pub hs: i64,
}

impl Default for ControlConstants {
    fn default() -> Self {
        Self {
            temp_format: "C".to_string(),
            temp_set_min: 1.0,
            temp_set_max: 30.0,
            pid_max: 10.0,
            kp: 20.0,
            ki: 0.6,
            kd: -3.0,
            i_max_err: 0.5,
            idle_range_h: 1.0,
            idle_range_l: -1.0,
            heat_target_h: 0.301,
            heat_target_l: -0.199,
            cool_target_h: 0.199,
            cool_target_l: -0.301,
            max_heat_time_for_est: "600".to_string(),
            max_cool_time_for_est: "1200".to_string(),
            fridge_fast_filt: "1".to_string(),
            fridge_slow_filt: "4".to_string(),
            fridge_slope_filt: "3".to_string(),
            beer_fast_filt: "3".to_string(),
            beer_slow_filt: "5".to_string(),
            beer_slope_filt: "4".to_string(),
            lah: 0,
            hs: 0,
        }
    }
}

/// Read-only telemetry (PID terms, peak estimates). Replaced wholesale by
/// `V` snapshots; clients may only request a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlVariables {
    pub beer_diff: f64,
    pub diff_integral: f64,
    pub beer_slope: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub est_peak: f64,
    pub neg_peak_est: f64,
    pub pos_peak_est: f64,
    pub neg_peak: f64,
    pub pos_peak: f64,
}

/// Unordered pair of freshness flags for the two device inventories.
/// Cleared whenever a refresh is requested or a device change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListFlags {
    installed: bool,
    available: bool,
}

impl ListFlags {
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn mark_installed(&mut self) {
        self.installed = true;
    }

    pub fn mark_available(&mut self) {
        self.available = true;
    }

    /// Both inventories refreshed since the last invalidation.
    pub fn is_current(self) -> bool {
        self.installed && self.available
    }

    /// Wire token in canonical order: `""`, `"d"`, `"h"`, `"dh"`.
    pub fn token(self) -> &'static str {
        match (self.installed, self.available) {
            (false, false) => "",
            (true, false) => "d",
            (false, true) => "h",
            (true, true) => "dh",
        }
    }
}

/// Device inventory mirror: entries are free-form objects from the
/// controller, kept opaque.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceList {
    pub installed: Vec<Value>,
    pub available: Vec<Value>,
    pub flags: ListFlags,
}

impl DeviceList {
    pub fn set_installed(&mut self, devices: Vec<Value>) {
        self.installed = devices;
        self.flags.mark_installed();
    }

    pub fn set_available(&mut self, devices: Vec<Value>) {
        self.available = devices;
        self.flags.mark_available();
    }

    pub fn invalidate(&mut self) {
        self.flags.invalidate();
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "listState": self.flags.token(),
            "installed": self.installed,
            "available": self.available,
        })
    }
}

/// Controller version banner, decoded from the `N` frame. All fields
/// optional: old firmware sends a bare version string.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct VersionInfo {
    #[serde(rename = "v")]
    pub version: Option<String>,
    #[serde(rename = "b")]
    pub board: Option<String>,
    #[serde(rename = "s")]
    pub shield: Option<Value>,
    #[serde(rename = "l")]
    pub log_version: Option<i64>,
    #[serde(skip)]
    pub raw: String,
}

impl VersionInfo {
    pub fn summary(&self) -> String {
        match &self.version {
            Some(v) => {
                let board = self.board.as_deref().unwrap_or("unknown board");
                format!("controller version {v} on {board}")
            }
            None => format!("unrecognized version banner: {}", self.raw),
        }
    }
}

/// The shared mutable mirror of the controller. Exclusively owned by the
/// bridge loop; the decoder and dispatcher borrow it per event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerState {
    pub settings: ControlSettings,
    pub constants: ControlConstants,
    pub variables: ControlVariables,
    pub devices: DeviceList,
    pub display: [String; 4],
    pub version: Option<VersionInfo>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self {
            display: STARTUP_DISPLAY.map(str::to_string),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_controller_firmware() {
        let state = ControllerState::new();
        assert_eq!(state.settings.mode, Mode::BeerConstant);
        assert_eq!(state.settings.beer_set, 20.0);
        assert_eq!(state.constants.temp_set_min, 1.0);
        assert_eq!(state.constants.temp_set_max, 30.0);
        assert_eq!(state.constants.kp, 20.0);
        assert_eq!(state.variables.beer_diff, 0.0);
        assert_eq!(state.display[0], "Bridge starting up");
        assert!(state.devices.installed.is_empty());
    }

    #[test]
    fn mode_round_trips_as_single_letter() {
        let json = serde_json::to_string(&Mode::Profile).unwrap();
        assert_eq!(json, "\"p\"");
        let back: Mode = serde_json::from_str("\"o\"").unwrap();
        assert_eq!(back, Mode::Off);
    }

    #[test]
    fn list_flags_transitions() {
        let mut flags = ListFlags::default();
        assert_eq!(flags.token(), "");
        assert!(!flags.is_current());

        flags.mark_available();
        assert_eq!(flags.token(), "h");
        flags.mark_available();
        assert_eq!(flags.token(), "h");

        flags.mark_installed();
        assert_eq!(flags.token(), "dh");
        assert!(flags.is_current());

        flags.invalidate();
        assert_eq!(flags.token(), "");
        assert!(!flags.is_current());
    }

    #[test]
    fn settings_snapshot_is_idempotent() {
        let raw = r#"{"mode":"f","beerSet":18.5,"fridgeSet":17.0,"heatEstimator":0.3,"coolEstimator":4.0}"#;
        let once: ControlSettings = serde_json::from_str(raw).unwrap();
        let twice: ControlSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.mode, Mode::FridgeConstant);
        assert_eq!(once.beer_set, 18.5);
    }

    #[test]
    fn constants_serialize_with_wire_names() {
        let cc = ControlConstants::default();
        let json = serde_json::to_value(&cc).unwrap();
        assert_eq!(json["tempSetMax"], 30.0);
        assert_eq!(json["Kp"], 20.0);
        assert_eq!(json["beerSlowFilt"], "5");
    }

    #[test]
    fn version_summary_prefers_parsed_fields() {
        let info: VersionInfo =
            serde_json::from_str(r#"{"v":"0.2.4","b":"leonardo","s":"revC","l":1}"#).unwrap();
        assert_eq!(info.summary(), "controller version 0.2.4 on leonardo");
    }
}
