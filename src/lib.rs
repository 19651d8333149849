pub mod app;
pub mod cli;
pub mod command;
pub mod config;
pub mod datalog;
pub mod profile;
pub mod protocol;
pub mod sample;
pub mod serial;
pub mod socket;
pub mod state;
pub mod webui;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    InvalidArgs(String),
    Io(std::io::Error),
    /// Serial line with no recognizable tag/payload shape.
    MalformedFrame(String),
    /// Serial line whose leading tag is not in the protocol table.
    UnknownFrameTag(char),
    /// Tagged frame whose structured payload did not decode.
    PayloadDecode(String),
    /// Socket message whose name is not a known command.
    UnknownCommand(String),
    /// Command payload that failed local validation.
    Validation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::MalformedFrame(line) => write!(f, "malformed frame: {line}"),
            Error::UnknownFrameTag(tag) => write!(f, "unknown frame tag '{tag}'"),
            Error::PayloadDecode(msg) => write!(f, "payload decode error: {msg}"),
            Error::UnknownCommand(name) => write!(f, "unknown command '{name}'"),
            Error::Validation(msg) => write!(f, "validation error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}
