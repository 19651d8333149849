use crate::{Error, Result};
use serde_json::Value;

/// One socket message, decoded at the boundary. Wire form is a bare `name`
/// or `name=value`; unknown names and undecodable values never make it
/// past parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // pure reads, answered from local state
    Ack,
    Lcd,
    GetMode,
    GetBeer,
    GetFridge,
    GetControlConstants,
    GetControlSettings,
    GetControlVariables,
    GetDeviceList,
    // forwarded instructions, answered asynchronously by later frames
    RefreshControlConstants,
    RefreshControlSettings,
    RefreshControlVariables,
    LoadDefaultControlConstants,
    LoadDefaultControlSettings,
    SetParameters(Value),
    RefreshDeviceList { read_values: bool },
    ApplyDevice(Value),
    ProgramController(Value),
    // local mutations with validation
    SetBeer(f64),
    SetFridge(f64),
    SetOff,
    Interval(i64),
    StartNewBrew(String),
    PauseLogging,
    StopLogging,
    ResumeLogging,
    DateTimeFormatDisplay(String),
    SetActiveProfile(String),
    EraseLogs,
    StopScript,
    Quit,
}

impl Command {
    pub fn parse(message: &str) -> Result<Self> {
        let message = message.trim();
        let (name, value) = match message.split_once('=') {
            Some((name, value)) => (name, value),
            None => (message, ""),
        };

        match name {
            "ack" => Ok(Command::Ack),
            "lcd" => Ok(Command::Lcd),
            "getMode" => Ok(Command::GetMode),
            "getBeer" => Ok(Command::GetBeer),
            "getFridge" => Ok(Command::GetFridge),
            "getControlConstants" => Ok(Command::GetControlConstants),
            "getControlSettings" => Ok(Command::GetControlSettings),
            "getControlVariables" => Ok(Command::GetControlVariables),
            "getDeviceList" => Ok(Command::GetDeviceList),
            "refreshControlConstants" => Ok(Command::RefreshControlConstants),
            "refreshControlSettings" => Ok(Command::RefreshControlSettings),
            "refreshControlVariables" => Ok(Command::RefreshControlVariables),
            "loadDefaultControlConstants" => Ok(Command::LoadDefaultControlConstants),
            "loadDefaultControlSettings" => Ok(Command::LoadDefaultControlSettings),
            "setParameters" => Ok(Command::SetParameters(parse_json(name, value)?)),
            "refreshDeviceList" => Ok(Command::RefreshDeviceList {
                read_values: value.contains("readValues"),
            }),
            "applyDevice" => Ok(Command::ApplyDevice(parse_json(name, value)?)),
            "programController" => Ok(Command::ProgramController(parse_json(name, value)?)),
            "setBeer" => Ok(Command::SetBeer(parse_temp(value)?)),
            "setFridge" => Ok(Command::SetFridge(parse_temp(value)?)),
            "setOff" => Ok(Command::SetOff),
            "interval" => Ok(Command::Interval(value.trim().parse().map_err(|_| {
                Error::Validation(format!("cannot convert interval '{value}' to a number"))
            })?)),
            "startNewBrew" => Ok(Command::StartNewBrew(value.to_string())),
            "pauseLogging" => Ok(Command::PauseLogging),
            "stopLogging" => Ok(Command::StopLogging),
            "resumeLogging" => Ok(Command::ResumeLogging),
            "dateTimeFormatDisplay" => Ok(Command::DateTimeFormatDisplay(value.to_string())),
            "setActiveProfile" => Ok(Command::SetActiveProfile(value.to_string())),
            "eraseLogs" => Ok(Command::EraseLogs),
            "stopScript" => Ok(Command::StopScript),
            "quit" => Ok(Command::Quit),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_temp(value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("cannot convert temperature '{value}' to a number")))
}

fn parse_json(name: &str, value: &str) -> Result<Value> {
    serde_json::from_str(value)
        .map_err(|_| Error::Validation(format!("invalid JSON received for {name}: {value}")))
}
