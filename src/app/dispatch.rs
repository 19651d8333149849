use crate::command::Command;
use crate::datalog::LogState;
use crate::profile;
use crate::protocol::request;
use crate::serial::LineIo;
use crate::state::Mode;
use crate::Result;
use serde_json::{json, Value};
use std::fs;
use std::time::Duration;

use super::bridge::Bridge;

/// Widened serial timeout while the controller reads out sensor values
/// during an inventory refresh.
const INVENTORY_READ_TIMEOUT: Duration = Duration::from_secs(2);

const DEVICE_LIST_STALE_REPLY: &str = "device-list-not-up-to-date";

impl<IO: LineIo> Bridge<IO> {
    /// Execute one decoded command: reply from local state, forward an
    /// instruction to the controller, or mutate local state — or some
    /// combination. Forwarding requests an immediate poll so the write is
    /// answered before the next client wait.
    pub(super) fn dispatch(&mut self, command: Command) -> Result<Option<String>> {
        match command {
            // -- pure reads -------------------------------------------------
            Command::Ack => Ok(Some("ack".to_string())),
            Command::Lcd => Ok(Some(serde_json::to_string(&self.state.display).map_err(json_err)?)),
            Command::GetMode => Ok(Some(self.state.settings.mode.to_string())),
            Command::GetBeer => Ok(Some(self.state.settings.beer_set.to_string())),
            Command::GetFridge => Ok(Some(self.state.settings.fridge_set.to_string())),
            Command::GetControlConstants => {
                Ok(Some(serde_json::to_string(&self.state.constants).map_err(json_err)?))
            }
            Command::GetControlSettings => self.reply_control_settings().map(Some),
            Command::GetControlVariables => {
                Ok(Some(serde_json::to_string(&self.state.variables).map_err(json_err)?))
            }
            Command::GetDeviceList => Ok(Some(self.reply_device_list())),

            // -- forwarded instructions ------------------------------------
            Command::RefreshControlConstants => Ok(self.forward(request::CONSTANTS)),
            Command::RefreshControlSettings => Ok(self.forward(request::SETTINGS)),
            Command::RefreshControlVariables => Ok(self.forward(request::VARIABLES)),
            Command::LoadDefaultControlConstants => Ok(self.forward(request::DEFAULT_CONSTANTS)),
            Command::LoadDefaultControlSettings => Ok(self.forward(request::DEFAULT_SETTINGS)),
            Command::SetParameters(params) => Ok(self.set_parameters(&params)),
            Command::RefreshDeviceList { read_values } => Ok(self.refresh_device_list(read_values)),
            Command::ApplyDevice(config) => Ok(self.apply_device(&config)),
            Command::ProgramController(params) => Ok(self.program_controller(&params)),

            // -- local mutations -------------------------------------------
            Command::SetBeer(value) => Ok(self.set_beer(value)),
            Command::SetFridge(value) => Ok(self.set_fridge(value)),
            Command::SetOff => {
                self.state.settings.mode = Mode::Off;
                self.logger.info("temperature control disabled");
                Ok(self.forward("j{mode:o}"))
            }
            Command::Interval(secs) => Ok(self.set_interval(secs)),
            Command::StartNewBrew(name) => self.start_new_brew(name).map(Some),
            Command::PauseLogging => Ok(Some(self.pause_logging())),
            Command::StopLogging => self.stop_logging().map(Some),
            Command::ResumeLogging => Ok(Some(self.resume_logging())),
            Command::DateTimeFormatDisplay(format) => {
                self.config.date_time_format = Some(format.clone());
                self.save_config();
                self.ui.publish("dateTimeFormatDisplay", Some(&format))?;
                self.logger.info(format!("changed date format setting: {format}"));
                Ok(None)
            }
            Command::SetActiveProfile(name) => Ok(Some(self.set_active_profile(name))),
            Command::EraseLogs => {
                self.logger.erase()?;
                self.logger.info("fresh start! log files erased");
                Ok(None)
            }
            Command::StopScript => {
                self.logger.info(
                    "stop requested on socket; writing do-not-run marker to prevent automatic restart",
                );
                self.running = false;
                fs::write(self.config.do_not_run_path(), "1")?;
                Ok(None)
            }
            Command::Quit => {
                // No marker: this path exists so a replacement instance can
                // take over and be restarted by the supervisor.
                self.logger.info("quit requested on socket; stopping");
                self.running = false;
                Ok(None)
            }
        }
    }

    /// Forward one instruction and ask for an immediate poll; the answer
    /// arrives asynchronously as a later frame.
    fn forward(&mut self, command: &str) -> Option<String> {
        self.write_serial(command);
        self.scheduler.request_poll();
        None
    }

    fn reply_control_settings(&mut self) -> Result<String> {
        let mut reply =
            serde_json::to_value(&self.state.settings).map_err(json_err)?;
        if self.state.settings.mode == Mode::Profile {
            reply["profile"] = match profile::active_name(&self.config.settings_dir) {
                Some(name) => Value::String(name),
                None => Value::Null,
            };
        }
        reply["dataLogging"] = Value::String(self.datalog.state().as_str().to_string());
        serde_json::to_string(&reply).map_err(json_err)
    }

    /// Real data only once both inventories are fresh; a client must not
    /// trust the mirror between an invalidation and the controller's
    /// answers.
    fn reply_device_list(&self) -> String {
        if !self.state.devices.flags.is_current() {
            return DEVICE_LIST_STALE_REPLY.to_string();
        }
        let version = self.state.version.as_ref();
        json!({
            "board": version.and_then(|v| v.board.clone()),
            "shield": version.and_then(|v| v.shield.clone()),
            "deviceList": self.state.devices.to_json(),
        })
        .to_string()
    }

    fn set_parameters(&mut self, params: &Value) -> Option<String> {
        self.write_serial(&format!("j{params}"));
        if let Some(temp_format) = params.get("tempFormat").and_then(Value::as_str) {
            if let Err(err) = self.ui.publish("tempFormat", Some(temp_format)) {
                self.logger.warn(format!("failed to publish tempFormat: {err}"));
            }
        }
        self.scheduler.request_poll();
        None
    }

    fn refresh_device_list(&mut self, read_values: bool) -> Option<String> {
        self.state.devices.invalidate();
        if read_values {
            // Reading out sensor values takes the controller a while;
            // widen the serial timeout until the available-devices frame
            // lands.
            if let Some(port) = self.port.as_mut() {
                let previous = port.read_timeout();
                if let Err(err) = port.set_read_timeout(INVENTORY_READ_TIMEOUT) {
                    self.logger.warn(format!("failed to widen serial timeout: {err}"));
                } else {
                    self.restore_timeout = Some(previous);
                }
            }
            self.write_serial(request::INSTALLED_DEVICES_WITH_VALUES);
            self.write_serial(request::AVAILABLE_DEVICES_WITH_VALUES);
        } else {
            self.write_serial(request::INSTALLED_DEVICES);
            self.write_serial(request::AVAILABLE_DEVICES);
        }
        self.scheduler.request_poll();
        None
    }

    fn apply_device(&mut self, config: &Value) -> Option<String> {
        self.write_serial(&format!("U{config}"));
        self.state.devices.invalidate();
        self.scheduler.request_poll();
        None
    }

    /// Reprogramming is an external collaborator's job: validate the
    /// parameter shape, release the serial port, and exit so the
    /// supervisor restarts the bridge against the new firmware.
    fn program_controller(&mut self, params: &Value) -> Option<String> {
        let image = params.get("fileName").and_then(Value::as_str);
        let board = params.get("boardType").and_then(Value::as_str);
        let (Some(image), Some(board)) = (image, board) else {
            self.logger
                .error(format!("cannot decode programming parameters: {params}"));
            return None;
        };
        self.logger.info(format!(
            "handing off to the external flasher (image {image}, board {board}); \
             bridge will stop for restart"
        ));
        // The controller only resets when the port is fully released.
        self.port = None;
        self.running = false;
        None
    }

    fn set_beer(&mut self, value: f64) -> Option<String> {
        if !self.setpoint_in_range(value) {
            return None;
        }
        let rounded = round_setpoint(value);
        self.state.settings.mode = Mode::BeerConstant;
        self.state.settings.beer_set = rounded;
        self.logger
            .info(format!("beer temperature set to {rounded} degrees by client"));
        self.forward(&format!("j{{mode:b, beerSet:{rounded}}}"))
    }

    fn set_fridge(&mut self, value: f64) -> Option<String> {
        if !self.setpoint_in_range(value) {
            return None;
        }
        let rounded = round_setpoint(value);
        self.state.settings.mode = Mode::FridgeConstant;
        self.state.settings.fridge_set = rounded;
        self.logger
            .info(format!("fridge temperature set to {rounded} degrees by client"));
        self.forward(&format!("j{{mode:f, fridgeSet:{rounded}}}"))
    }

    fn setpoint_in_range(&self, value: f64) -> bool {
        let constants = &self.state.constants;
        if constants.temp_set_min <= value && value <= constants.temp_set_max {
            return true;
        }
        self.logger.warn(format!(
            "temperature setting {value} is outside of allowed range {} - {}; \
             these limits can be changed in advanced settings",
            constants.temp_set_min, constants.temp_set_max
        ));
        false
    }

    fn set_interval(&mut self, secs: i64) -> Option<String> {
        if !(5 < secs && secs < 5000) {
            self.logger
                .warn(format!("rejected data interval of {secs} seconds"));
            return None;
        }
        self.config.interval_secs = secs as u64;
        self.scheduler
            .set_data_interval(Duration::from_secs(secs as u64));
        self.save_config();
        self.logger.info(format!("interval changed to {secs} seconds"));
        None
    }

    fn start_new_brew(&mut self, name: String) -> Result<String> {
        if name.chars().count() < 2 {
            return Ok(status_reply(
                1,
                &format!("invalid new brew name '{name}', please enter a name with at least 2 characters"),
            ));
        }
        self.config.batch_name = Some(name.clone());
        self.config.data_logging = LogState::Active;
        self.save_config();
        self.datalog.set_state(LogState::Active);
        self.datalog.start_session(&name)?;
        self.ui.publish("beerName", Some(&name))?;
        self.logger.info(format!("restarted logging for brew '{name}'"));
        Ok(status_reply(
            0,
            &format!("successfully switched to new brew '{name}', please reload the page"),
        ))
    }

    fn pause_logging(&mut self) -> String {
        if self.datalog.state() == LogState::Active {
            self.logger.info(
                "paused logging data; temperatures are still controlled but not logged until resumed",
            );
            self.set_log_state(LogState::Paused);
            status_reply(0, "successfully paused logging")
        } else {
            status_reply(1, "logging already paused or stopped")
        }
    }

    fn stop_logging(&mut self) -> Result<String> {
        self.logger
            .info("stopped data logging; temperatures are still controlled but nothing is logged");
        self.config.batch_name = None;
        self.set_log_state(LogState::Stopped);
        self.datalog.end_session();
        self.ui.publish("beerName", None)?;
        Ok(status_reply(0, "successfully stopped logging"))
    }

    fn resume_logging(&mut self) -> String {
        if self.datalog.state() == LogState::Paused {
            self.logger.info("continued logging data");
            self.set_log_state(LogState::Active);
            status_reply(0, "successfully continued logging")
        } else {
            status_reply(1, "logging was not paused")
        }
    }

    fn set_log_state(&mut self, state: LogState) {
        self.config.data_logging = state;
        self.datalog.set_state(state);
        self.save_config();
    }

    fn set_active_profile(&mut self, name: String) -> String {
        self.logger.info(format!("setting profile '{name}' as active profile"));
        self.config.profile_name = Some(name.clone());
        self.save_config();
        if let Err(err) = self.ui.publish("profileName", Some(&name)) {
            self.logger.warn(format!("failed to publish profileName: {err}"));
        }
        if let Err(err) =
            profile::activate(&self.config.public_dir, &self.config.settings_dir, &name)
        {
            return format!("I/O error updating profile: {err}");
        }
        if self.state.settings.mode != Mode::Profile {
            self.state.settings.mode = Mode::Profile;
            self.logger.info("profile mode enabled");
            self.forward("j{mode:p}");
        }
        "Profile successfully updated".to_string()
    }
}

/// Two decimals, so repeated float formatting can't drift the value sent
/// to the controller.
fn round_setpoint(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn status_reply(status: i32, message: &str) -> String {
    json!({ "status": status, "statusMessage": message }).to_string()
}

fn json_err(err: serde_json::Error) -> crate::Error {
    crate::Error::Io(std::io::Error::other(err))
}
