use crate::{Error, Result};

/// Options for the `run` command; values are `None` when not provided on
/// the command line and fall back to the config file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub config: Option<String>,
    pub device: Option<String>,
    pub baud: Option<u32>,
    pub interval: Option<u64>,
    pub socket_path: Option<String>,
    pub tcp: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

/// Parsed command-line intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    ShowHelp,
    ShowVersion,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        if args.is_empty() {
            return Ok(Command::Run(RunOptions::default()));
        }

        let mut iter = args.iter();
        match iter.next().map(|s| s.as_str()) {
            Some("run") => Ok(Command::Run(parse_run_options(&mut iter)?)),
            Some("--help") | Some("-h") => Ok(Command::ShowHelp),
            Some("--version") | Some("-V") => Ok(Command::ShowVersion),
            Some(flag) if flag.starts_with('-') => {
                // Allow omitting the explicit `run` subcommand: pass the
                // consumed flag plus the remaining args into the run parser.
                let mut flags: Vec<String> = Vec::with_capacity(args.len());
                flags.push(flag.to_string());
                flags.extend(iter.map(|s| s.to_string()));
                let mut iter = flags.iter();
                Ok(Command::Run(parse_run_options(&mut iter)?))
            }
            Some(cmd) => Err(Error::InvalidArgs(format!(
                "unknown command '{cmd}', try --help"
            ))),
            None => Ok(Command::Run(RunOptions::default())),
        }
    }

    pub fn help() -> &'static str {
        concat!(
            "brewtty - serial fermentation-controller bridge daemon\n",
            "\n",
            "USAGE:\n",
            "  brewtty run [OPTIONS]\n",
            "  brewtty --help\n",
            "  brewtty --version\n",
            "\n",
            "OPTIONS:\n",
            "  --config <path>      Config file (default: ~/.brewtty/config.toml)\n",
            "  --device <path>      Serial device path (default: /dev/ttyUSB0)\n",
            "  --baud <number>      Baud rate (default: 57600)\n",
            "  --interval <secs>    Data-logging interval in seconds (default: 120)\n",
            "  --socket <path>      Listen on a unix socket at <path>\n",
            "  --tcp                Listen on TCP instead of a unix socket\n",
            "  --host <host>        TCP listen host (default: localhost)\n",
            "  --port <number>      TCP listen port (default: 6332)\n",
            "  --log-level <level>  error, warn, info or debug (default: info)\n",
            "  --log-file <path>    Append operator log lines to <path>\n",
            "  -h, --help           Show this help\n",
            "  -V, --version        Show version\n",
        )
    }

    pub fn print_help() {
        println!("{}", Self::help());
    }
}

fn parse_run_options(iter: &mut std::slice::Iter<String>) -> Result<RunOptions> {
    let mut opts = RunOptions::default();

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--config" => {
                opts.config = Some(take_value(flag, iter)?);
            }
            "--device" => {
                opts.device = Some(take_value(flag, iter)?);
            }
            "--baud" => {
                let raw = take_value(flag, iter)?;
                opts.baud = Some(raw.parse().map_err(|_| {
                    Error::InvalidArgs("baud must be a positive integer".to_string())
                })?);
            }
            "--interval" => {
                let raw = take_value(flag, iter)?;
                opts.interval = Some(raw.parse().map_err(|_| {
                    Error::InvalidArgs("interval must be a positive integer".to_string())
                })?);
            }
            "--socket" => {
                opts.socket_path = Some(take_value(flag, iter)?);
            }
            "--tcp" => {
                opts.tcp = true;
            }
            "--host" => {
                opts.host = Some(take_value(flag, iter)?);
            }
            "--port" => {
                let raw = take_value(flag, iter)?;
                opts.port = Some(raw.parse().map_err(|_| {
                    Error::InvalidArgs("port must be a number between 1 and 65535".to_string())
                })?);
            }
            "--log-level" => {
                opts.log_level = Some(take_value(flag, iter)?);
            }
            "--log-file" => {
                opts.log_file = Some(take_value(flag, iter)?);
            }
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown flag '{other}', try --help"
                )));
            }
        }
    }

    Ok(opts)
}

fn take_value(flag: &str, iter: &mut std::slice::Iter<String>) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| Error::InvalidArgs(format!("expected a value after {flag}")))
}
