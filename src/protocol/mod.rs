use crate::sample::TempDelta;
use crate::state::{ControlConstants, ControlSettings, ControlVariables, VersionInfo};
use serde_json::Value;

pub mod decoder;
pub mod messages;

pub use decoder::decode_line;

/// Request codes written to the controller (daemon -> device).
pub mod request {
    pub const SETTINGS: &str = "s";
    pub const CONSTANTS: &str = "c";
    pub const VARIABLES: &str = "v";
    pub const DISPLAY: &str = "l";
    pub const TEMPERATURES: &str = "t";
    pub const VERSION: &str = "n";
    pub const DEFAULT_SETTINGS: &str = "S";
    pub const DEFAULT_CONSTANTS: &str = "C";
    pub const INSTALLED_DEVICES: &str = "d{}";
    pub const INSTALLED_DEVICES_WITH_VALUES: &str = "d{r:1}";
    pub const AVAILABLE_DEVICES: &str = "h{u:-1}";
    pub const AVAILABLE_DEVICES_WITH_VALUES: &str = "h{u:-1,v:1}";
}

/// One decoded unit from the serial transport, identified by its leading
/// tag character.
#[derive(Debug, Clone, PartialEq)]
pub enum SerialFrame {
    /// `T` — sparse measurement merged into the sample record.
    Temperature(TempDelta),
    /// `D` — controller debug message, already expanded for the log.
    Debug(String),
    /// `L` — four display lines, replaced wholesale.
    Display([String; 4]),
    /// `C` — control constants snapshot.
    Constants(ControlConstants),
    /// `S` — control settings snapshot.
    Settings(ControlSettings),
    /// `V` — control variables snapshot.
    Variables(ControlVariables),
    /// `N` — version banner, informational.
    Version(VersionInfo),
    /// `h` — available (not installed) device inventory.
    AvailableDevices(Vec<Value>),
    /// `d` — installed device inventory.
    InstalledDevices(Vec<Value>),
    /// `U` — acknowledgement of a device configuration update.
    DeviceUpdateAck(String),
}
