use crate::config::Config;
use crate::datalog::LogPipeline;
use crate::profile::{self, TempProfile, CONTROL_DISABLED_SETPOINT};
use crate::protocol::{decode_line, messages, request, SerialFrame};
use crate::sample::SampleRecord;
use crate::serial::LineIo;
use crate::socket::CommandSocket;
use crate::state::{ControllerState, Mode};
use crate::webui::UiSettings;
use crate::{Error, Result};
use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::logger::Logger;
use super::scheduler::PollScheduler;

/// Firmware version this bridge was written against; anything else gets a
/// warning at startup but is still served.
pub const COMPATIBLE_FIRMWARE_VERSION: &str = "0.2.4";

/// Client wait bound and routine poll cadence.
const SERIAL_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Empty reads the startup handshake tolerates before giving up on the
/// version banner; ~4s at the default serial timeout.
const VERSION_PROBE_EMPTY_READS: u32 = 40;

/// Outcome of one bounded serial read.
enum SerialRead {
    /// A complete line landed in the buffer.
    Line,
    /// The read timed out with nothing buffered.
    Timeout,
    /// The line was rejected (oversized, garbled); already drained.
    Skip,
    /// The transport failed and the port was dropped.
    Gone,
}

/// Display text shown when the controller never answered the version probe.
const UNPROGRAMMED_DISPLAY: [&str; 4] = [
    "Could not receive",
    "version from controller",
    "Please (re)program",
    "the controller",
];

/// The daemon's single run loop: owns the serial transport, the state
/// mirror, the sample record and the log pipeline; alternates between a
/// bounded client wait and a serial poll pass. Single-threaded by design —
/// every mutation happens inside one iteration, so readers never observe a
/// half-applied update.
pub struct Bridge<IO: LineIo> {
    pub(super) config: Config,
    pub(super) config_path: PathBuf,
    pub(super) logger: Logger,
    pub(super) state: ControllerState,
    pub(super) sample: SampleRecord,
    pub(super) scheduler: PollScheduler,
    pub(super) datalog: LogPipeline,
    pub(super) ui: UiSettings,
    pub(super) port: Option<IO>,
    pub(super) running: bool,
    /// Timeout to restore after a widened bulk-inventory read.
    pub(super) restore_timeout: Option<Duration>,
}

impl<IO: LineIo> Bridge<IO> {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        logger: Logger,
        port: Option<IO>,
    ) -> Result<Self> {
        let scheduler = PollScheduler::new(
            SERIAL_CHECK_INTERVAL,
            Duration::from_secs(config.interval_secs),
            Instant::now(),
        );
        let mut datalog = LogPipeline::new(
            config.data_dir.clone(),
            config.public_dir.join("data"),
            config.data_logging,
        );
        let ui = UiSettings::new(&config.public_dir);

        if let Some(batch) = config.batch_name.as_deref() {
            datalog.start_session(batch)?;
        }
        ui.publish("beerName", config.batch_name.as_deref())?;

        Ok(Self {
            config,
            config_path,
            logger,
            state: ControllerState::new(),
            sample: SampleRecord::zero(),
            scheduler,
            datalog,
            ui,
            port,
            running: true,
            restore_timeout: None,
        })
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn sample(&self) -> &SampleRecord {
        &self.sample
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn poll_pending(&self) -> bool {
        self.scheduler.poll_pending()
    }

    pub fn port_mut(&mut self) -> Option<&mut IO> {
        self.port.as_mut()
    }

    /// Probe the controller version, then request the initial settings and
    /// constants snapshots. A mute controller is warned about but not
    /// fatal: the staleness watchdog covers it from here.
    pub fn startup_handshake(&mut self) {
        if self.port.is_none() {
            self.logger.warn(
                "serial port unavailable; serving cached state until the daemon restarts",
            );
            return;
        }

        self.write_serial(request::VERSION);
        let mut buf = String::new();
        let mut empty_reads = 0;
        while self.state.version.is_none() && empty_reads < VERSION_PROBE_EMPTY_READS {
            match self.read_serial_line(&mut buf) {
                SerialRead::Timeout => empty_reads += 1,
                SerialRead::Line => {
                    let line = buf.trim().to_string();
                    if !line.is_empty() {
                        self.process_line(&line, Instant::now());
                    }
                }
                SerialRead::Skip => {}
                SerialRead::Gone => break,
            }
        }

        match self.state.version.clone() {
            Some(info) => {
                self.logger
                    .info(format!("{} on port {}", info.summary(), self.config.device));
                if let Some(version) = info.version.as_deref() {
                    if version != COMPATIBLE_FIRMWARE_VERSION {
                        self.logger.warn(format!(
                            "firmware version compatible with this bridge is \
                             {COMPATIBLE_FIRMWARE_VERSION} but version received is {version}"
                        ));
                    }
                }
                if let Some(log_version) = info.log_version {
                    if log_version != messages::TABLE_VERSION {
                        self.logger.warn(format!(
                            "controller log message table is version {log_version}, local copy \
                             is {}; debug messages may expand incorrectly",
                            messages::TABLE_VERSION
                        ));
                    }
                }
            }
            None => {
                self.logger.warn(
                    "cannot receive version number from controller; it may not be programmed \
                     or is running very old firmware",
                );
                self.state.display = UNPROGRAMMED_DISPLAY.map(str::to_string);
            }
        }

        // Seed the mirror; the replies arrive asynchronously in the first
        // poll pass.
        self.write_serial(request::SETTINGS);
        self.write_serial(request::CONSTANTS);
    }

    /// One full daemon run: wait for a client, dispatch, poll, repeat,
    /// until a stop command or the shutdown flag.
    pub fn run(&mut self, socket: &CommandSocket, shutdown: &AtomicBool) -> Result<()> {
        self.logger.info("bridge loop started");
        while self.running && shutdown.load(Ordering::SeqCst) {
            match socket.accept_within(self.scheduler.check_interval()) {
                Ok(Some(mut conn)) => {
                    match conn.receive() {
                        Ok(message) if !message.is_empty() => {
                            if let Some(reply) = self.handle_message(&message) {
                                if let Err(err) = conn.send(&reply) {
                                    self.logger.warn(format!("failed to send reply: {err}"));
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(err) => self.logger.warn(format!("socket receive failed: {err}")),
                    }
                    // Command effects land on the device in the same
                    // iteration; a routine poll also runs if one is due.
                    let now = Instant::now();
                    if self.scheduler.poll_pending() || self.scheduler.poll_due(now) {
                        self.poll_device(now);
                    }
                }
                Ok(None) => self.poll_device(Instant::now()),
                Err(err) => self.logger.warn(format!("socket accept failed: {err}")),
            }
        }
        self.logger.info("bridge loop stopped");
        Ok(())
    }

    /// Decode one socket message and dispatch it. Returns the reply to
    /// write back, if the command shape has one. Never raises: bad input
    /// is logged and dropped.
    pub fn handle_message(&mut self, message: &str) -> Option<String> {
        let command = match crate::command::Command::parse(message) {
            Ok(command) => command,
            Err(Error::UnknownCommand(_)) => {
                self.logger
                    .error(format!("received invalid message on socket: {message}"));
                return None;
            }
            Err(err) => {
                self.logger.warn(err.to_string());
                return None;
            }
        };
        match self.dispatch(command) {
            Ok(reply) => reply,
            Err(err) => {
                self.logger.warn(format!("command '{message}' failed: {err}"));
                None
            }
        }
    }

    /// One serial pass: request display and settings, request a fresh
    /// measurement when due, then drain and apply everything the
    /// controller sent.
    pub fn poll_device(&mut self, now: Instant) {
        self.scheduler.mark_polled(now);
        if self.port.is_none() {
            return;
        }

        self.write_serial(request::DISPLAY);
        self.write_serial(request::SETTINGS);
        if self.scheduler.sample_due(now) {
            self.write_serial(request::TEMPERATURES);
        }
        if self.scheduler.report_unresponsive(now) {
            let stale = Duration::from_secs(self.scheduler.staleness(now).as_secs());
            self.logger.warn(format!(
                "controller is not responding to data requests (no sample for {})",
                humantime::format_duration(stale)
            ));
        }

        self.drain_serial(now);

        if self.state.settings.mode == Mode::Profile {
            self.profile_step_at(Local::now().naive_local());
        }
    }

    /// Read and apply every buffered line. A transport error drops the
    /// port into the degraded serial-absent mode; a malformed line is
    /// discarded and the drain continues.
    fn drain_serial(&mut self, now: Instant) {
        let mut buf = String::new();
        loop {
            match self.read_serial_line(&mut buf) {
                SerialRead::Line => {
                    let line = buf.trim().to_string();
                    if !line.is_empty() {
                        self.process_line(&line, now);
                    }
                }
                SerialRead::Skip => {}
                SerialRead::Timeout | SerialRead::Gone => break,
            }
        }
    }

    fn read_serial_line(&mut self, buf: &mut String) -> SerialRead {
        let Some(port) = self.port.as_mut() else {
            return SerialRead::Gone;
        };
        match port.read_message_line(buf) {
            Ok(0) => SerialRead::Timeout,
            Ok(_) => SerialRead::Line,
            Err(Error::Io(err)) => {
                self.logger
                    .warn(format!("serial read failed: {err}; continuing without serial"));
                self.port = None;
                SerialRead::Gone
            }
            Err(err) => {
                self.logger.warn(err.to_string());
                SerialRead::Skip
            }
        }
    }

    pub fn process_line(&mut self, line: &str, now: Instant) {
        match decode_line(line) {
            Ok(frame) => self.apply_frame(frame, now),
            Err(err @ Error::UnknownFrameTag(_)) => {
                self.logger
                    .warn(format!("cannot process line from controller: '{line}' ({err})"));
            }
            Err(err) => {
                self.logger.warn(err.to_string());
                self.logger.warn(format!("line received was: '{line}'"));
            }
        }
    }

    fn apply_frame(&mut self, frame: SerialFrame, now: Instant) {
        match frame {
            SerialFrame::Temperature(delta) => {
                self.scheduler.mark_fresh_sample(now);
                self.sample.apply(&delta);
                self.logger
                    .info(format!("temperature sample: {}", self.sample.echo_line()));
                if let Err(err) = self.datalog.append(&self.sample) {
                    self.logger.warn(format!("failed to log sample: {err}"));
                }
            }
            SerialFrame::Debug(message) => {
                self.logger.info(format!("controller debug message: {message}"));
            }
            SerialFrame::Display(lines) => self.state.display = lines,
            SerialFrame::Constants(constants) => self.state.constants = constants,
            SerialFrame::Settings(settings) => self.state.settings = settings,
            SerialFrame::Variables(variables) => self.state.variables = variables,
            SerialFrame::Version(info) => {
                self.logger.debug(info.summary());
                self.state.version = Some(info);
            }
            SerialFrame::AvailableDevices(devices) => {
                self.logger
                    .info(format!("available devices received: {} entries", devices.len()));
                self.state.devices.set_available(devices);
                self.restore_serial_timeout();
            }
            SerialFrame::InstalledDevices(devices) => {
                self.logger
                    .info(format!("installed devices received: {} entries", devices.len()));
                self.state.devices.set_installed(devices);
            }
            SerialFrame::DeviceUpdateAck(ack) => {
                self.logger.info(format!("device updated to: {ack}"));
            }
        }
    }

    /// Evaluate the active profile and forward a changed setpoint. An
    /// empty cell in the governing segment disables control once.
    pub fn profile_step_at(&mut self, now: NaiveDateTime) {
        let path = self.config.settings_dir.join(profile::ACTIVE_PROFILE_FILE);
        let profile = match TempProfile::load(&path) {
            Ok(profile) => profile,
            Err(err) => {
                self.logger.warn(format!("cannot evaluate temperature profile: {err}"));
                return;
            }
        };

        match profile.current_target(now) {
            Some(target) => {
                if target != self.state.settings.beer_set {
                    self.state.settings.beer_set = target;
                    let constants = &self.state.constants;
                    if constants.temp_set_min < target && target < constants.temp_set_max {
                        self.write_serial(&format!("j{{beerSet:{target}}}"));
                    }
                }
            }
            None => {
                if self.state.settings.beer_set != CONTROL_DISABLED_SETPOINT {
                    self.state.settings.beer_set = CONTROL_DISABLED_SETPOINT;
                    self.logger
                        .info("temperature control disabled by empty cell in profile");
                    self.write_serial(&format!("j{{beerSet:{CONTROL_DISABLED_SETPOINT}}}"));
                }
            }
        }
    }

    pub(super) fn write_serial(&mut self, command: &str) {
        let Some(port) = self.port.as_mut() else {
            self.logger
                .debug(format!("serial absent, dropping write '{command}'"));
            return;
        };
        if let Err(err) = port.send_command_line(command) {
            self.logger.warn(format!("serial write '{command}' failed: {err}"));
        }
    }

    pub(super) fn restore_serial_timeout(&mut self) {
        let Some(timeout) = self.restore_timeout.take() else {
            return;
        };
        if let Some(port) = self.port.as_mut() {
            if let Err(err) = port.set_read_timeout(timeout) {
                self.logger.warn(format!("failed to restore serial timeout: {err}"));
            }
        }
    }

    pub(super) fn save_config(&mut self) {
        if let Err(err) = self.config.save_to_path(&self.config_path) {
            self.logger.warn(format!("failed to persist config: {err}"));
        }
    }
}
