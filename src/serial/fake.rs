use crate::Result;
use std::collections::VecDeque;
use std::time::Duration;

use super::LineIo;

/// Scripted serial port for tests: reads pop from a queue, writes are
/// recorded for assertions. An exhausted script reads as a timeout.
pub struct FakeSerialPort {
    script: VecDeque<Result<String>>,
    writes: Vec<String>,
    timeout: Duration,
}

impl Default for FakeSerialPort {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FakeSerialPort {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: script.into(),
            writes: Vec::new(),
            timeout: Duration::from_millis(100),
        }
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.script.push_back(Ok(line.into()));
    }

    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl LineIo for FakeSerialPort {
    fn send_command_line(&mut self, line: &str) -> Result<()> {
        self.writes.push(line.to_string());
        Ok(())
    }

    fn read_message_line(&mut self, line_buffer: &mut String) -> Result<usize> {
        line_buffer.clear();
        match self.script.pop_front() {
            Some(Ok(line)) => {
                line_buffer.push_str(&line);
                Ok(line_buffer.len())
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }

    fn read_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn scripts_reads_and_records_writes() {
        let mut fake = FakeSerialPort::new(vec![
            Ok("T bt:20.0".into()),
            Err(Error::MalformedFrame("boom".into())),
        ]);
        let mut buf = String::new();
        assert_eq!(fake.read_message_line(&mut buf).unwrap(), "T bt:20.0".len());
        assert_eq!(buf, "T bt:20.0");
        assert!(fake.read_message_line(&mut buf).is_err());
        // script exhausted reads as timeout
        assert_eq!(fake.read_message_line(&mut buf).unwrap(), 0);

        fake.send_command_line("s").unwrap();
        assert_eq!(fake.writes(), &["s".to_string()]);
    }
}
