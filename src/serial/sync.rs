use crate::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io;
use std::time::Duration;

use super::{LineIo, SerialOptions, MAX_FRAME_BYTES};

/// Blocking serial transport to the controller, 8N1 line discipline.
pub struct SerialPort {
    device: String,
    port: Box<dyn serialport::SerialPort>,
    timeout: Duration,
}

impl SerialPort {
    pub fn connect(device: &str, options: SerialOptions) -> Result<Self> {
        if device.is_empty() {
            return Err(Error::InvalidArgs(
                "serial device path cannot be empty".to_string(),
            ));
        }

        let timeout = Duration::from_millis(options.timeout_ms);
        let port = serialport::new(device, options.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(map_serial_error)?;

        Ok(Self {
            device: device.to_string(),
            port,
            timeout,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Discard anything buffered from before the daemon attached.
    pub fn flush_input(&mut self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(map_serial_error)
    }
}

impl LineIo for SerialPort {
    fn send_command_line(&mut self, line: &str) -> Result<()> {
        let mut buf = line.as_bytes().to_vec();
        buf.push(b'\n');
        self.port.write_all(&buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_message_line(&mut self, line_buffer: &mut String) -> Result<usize> {
        line_buffer.clear();
        let mut byte = [0u8; 1];
        let mut total = 0;
        // Read byte-by-byte until newline while enforcing the size guard.
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Ok(total),
                Ok(_) => {
                    total += 1;
                    if total > MAX_FRAME_BYTES {
                        // Drain until newline to avoid contaminating the next frame.
                        while self.port.read(&mut byte).is_ok() {
                            if byte[0] == b'\n' {
                                break;
                            }
                        }
                        return Err(Error::MalformedFrame(format!(
                            "line exceeds {MAX_FRAME_BYTES} bytes"
                        )));
                    }
                    let b = byte[0];
                    if b == b'\n' {
                        return Ok(total);
                    }
                    if b != b'\r' {
                        line_buffer.push(b as char);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(0),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn read_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout).map_err(map_serial_error)?;
        self.timeout = timeout;
        Ok(())
    }
}

fn map_serial_error(err: serialport::Error) -> Error {
    match err.kind {
        serialport::ErrorKind::NoDevice => Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            err.description,
        )),
        serialport::ErrorKind::InvalidInput => Error::InvalidArgs(err.description),
        _ => Error::Io(io::Error::other(err.description)),
    }
}
