use crate::cli::RunOptions;
use crate::config::{default_config_path, Config, SocketMode};
use crate::serial::{SerialOptions, SerialPort};
use crate::socket::CommandSocket;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

pub mod bridge;
mod dispatch;
mod lifecycle;
pub mod logger;
pub mod scheduler;

pub use bridge::Bridge;
pub use logger::{LogLevel, Logger};
pub use scheduler::PollScheduler;

/// Daemon entry object: merged configuration plus logging options.
pub struct App {
    config: Config,
    config_path: PathBuf,
    log_level: LogLevel,
    log_file: Option<String>,
}

impl App {
    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let config_path = opts
            .config
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);
        let mut config = if opts.config.is_some() {
            Config::load_from_path(&config_path)?
        } else {
            Config::load_or_default()?
        };

        // CLI flags win over the config file for this invocation.
        if let Some(device) = opts.device {
            config.device = device;
        }
        if let Some(baud) = opts.baud {
            config.baud = baud;
        }
        if let Some(interval) = opts.interval {
            config.interval_secs = interval;
        }
        if let Some(path) = opts.socket_path {
            config.socket_mode = SocketMode::Unix;
            config.socket_path = PathBuf::from(path);
        }
        if opts.tcp {
            config.socket_mode = SocketMode::Tcp;
        }
        if let Some(host) = opts.host {
            config.socket_host = host;
        }
        if let Some(port) = opts.port {
            config.socket_port = port;
        }

        let log_level = opts
            .log_level
            .as_deref()
            .and_then(|s| LogLevel::from_str(s).ok())
            .unwrap_or_default();

        Ok(Self {
            config,
            config_path,
            log_level,
            log_file: opts.log_file,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entry point for the daemon: bind the socket, attach the serial
    /// port, hand everything to the bridge loop.
    pub fn run(self) -> Result<()> {
        let logger = Logger::new(self.log_level, self.log_file.clone());
        logger.info(format!(
            "daemon start (device={}, baud={}, interval={}s)",
            self.config.device, self.config.baud, self.config.interval_secs
        ));

        let socket = CommandSocket::bind(&self.config.socket_config())?;
        match self.config.socket_mode {
            SocketMode::Unix => logger.info(format!(
                "listening on socket {}",
                self.config.socket_path.display()
            )),
            SocketMode::Tcp => logger.info(format!(
                "listening on {}:{}",
                self.config.socket_host, self.config.socket_port
            )),
        }

        let serial_options = SerialOptions {
            baud: self.config.baud,
            timeout_ms: self.config.serial_timeout_ms,
        };
        let port = match SerialPort::connect(&self.config.device, serial_options) {
            Ok(mut port) => {
                if self.config.startup_delay_secs > 0 {
                    // Opening the port resets some boards; give the
                    // controller time to come back before talking to it.
                    logger.info(format!(
                        "waiting {}s for the controller to reboot",
                        self.config.startup_delay_secs
                    ));
                    thread::sleep(Duration::from_secs(self.config.startup_delay_secs));
                }
                if let Err(err) = port.flush_input() {
                    logger.warn(format!("failed to flush serial input: {err}"));
                }
                Some(port)
            }
            Err(err) => {
                logger.warn(format!(
                    "cannot open serial port {}: {err}; serving socket clients without serial",
                    self.config.device
                ));
                None
            }
        };

        if let Some(batch) = self.config.batch_name.as_deref() {
            logger.info(format!("bridge started for brew '{batch}'"));
        }

        let shutdown = lifecycle::create_shutdown_flag()?;
        let mut bridge = Bridge::new(self.config, self.config_path, logger, port)?;
        bridge.startup_handshake();
        bridge.run(&socket, &shutdown)
    }
}
