//! Line sources feeding the acquisition loop.
//!
//! `SerialPortSource` reads the live sensor; `ScriptedSource` replays recorded
//! lines (or injected faults) without hardware.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::config::SerialConfig;
use crate::error::AcquisitionError;

/// Trait implemented by every byte stream the acquisition loop can read.
///
/// `read_line` blocks for at most one bounded read:
/// * `Ok(Some(line))` - one decoded record, line terminator stripped
/// * `Ok(None)` - nothing arrived within the read timeout
/// * `Err(_)` - stream-level fault; the run must end
pub trait SignalSource: Send {
    fn read_line(&mut self) -> Result<Option<String>, AcquisitionError>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}

/// Decode a complete raw line, stripping `\n` / `\r\n`.
fn decode_line(mut raw: Vec<u8>) -> Result<String, AcquisitionError> {
    while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|err| AcquisitionError::Stream {
        details: format!("undecodable bytes on serial line: {}", err),
    })
}

/// Live serial port reader
pub struct SerialPortSource {
    port_name: String,
    reader: BufReader<Box<dyn serialport::SerialPort>>,
    pending: Vec<u8>,
}

impl SerialPortSource {
    /// Open `port_name` at the configured baud rate
    ///
    /// # Errors
    /// `AcquisitionError::PortOpenFailed` if the device is missing or busy
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<Self, AcquisitionError> {
        let port = serialport::new(port_name, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|err| AcquisitionError::PortOpenFailed {
                port: port_name.to_string(),
                reason: err.to_string(),
            })?;

        log::info!(
            "[SerialPortSource] Opened {} at {} baud",
            port_name,
            config.baud_rate
        );

        Ok(Self {
            port_name: port_name.to_string(),
            reader: BufReader::new(port),
            pending: Vec::with_capacity(64),
        })
    }
}

impl SignalSource for SerialPortSource {
    fn read_line(&mut self) -> Result<Option<String>, AcquisitionError> {
        // Bytes read before a timeout stay in `pending` until the newline shows up
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(AcquisitionError::Stream {
                details: format!("{} disconnected (end of stream)", self.port_name),
            }),
            Ok(_) if self.pending.last() == Some(&b'\n') => {
                let raw = std::mem::take(&mut self.pending);
                decode_line(raw).map(Some)
            }
            Ok(_) => Err(AcquisitionError::Stream {
                details: format!("{} closed mid-record", self.port_name),
            }),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.port_name)
    }
}

/// One scripted step
#[derive(Debug, Clone)]
enum ScriptedRecord {
    Raw(Vec<u8>),
    Fault(String),
}

/// Replays recorded lines in order, then stays idle.
///
/// Used by tests and the CLI `replay` command.
pub struct ScriptedSource {
    name: String,
    records: VecDeque<ScriptedRecord>,
    idle_delay: Duration,
}

impl ScriptedSource {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "scripted".to_string(),
            records: lines
                .into_iter()
                .map(|line| ScriptedRecord::Raw(line.into().into_bytes()))
                .collect(),
            idle_delay: Duration::ZERO,
        }
    }

    /// Replay a captured serial log, one record per line
    pub fn from_file(path: &Path) -> Result<Self, AcquisitionError> {
        let bytes = fs::read(path).map_err(|err| AcquisitionError::Stream {
            details: format!("cannot read {}: {}", path.display(), err),
        })?;

        let mut records: VecDeque<ScriptedRecord> = bytes
            .split(|b| *b == b'\n')
            .map(|line| ScriptedRecord::Raw(line.to_vec()))
            .collect();
        if matches!(records.back(), Some(ScriptedRecord::Raw(last)) if last.is_empty()) {
            records.pop_back();
        }

        Ok(Self {
            name: format!("replay:{}", path.display()),
            records,
            idle_delay: Duration::ZERO,
        })
    }

    /// Append raw bytes delivered as one line
    pub fn then_raw(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.records.push_back(ScriptedRecord::Raw(bytes.into()));
        self
    }

    /// Append a stream fault (e.g. device unplugged)
    pub fn then_fault(mut self, details: impl Into<String>) -> Self {
        self.records.push_back(ScriptedRecord::Fault(details.into()));
        self
    }

    /// Sleep this long on each idle read once the script is exhausted
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }
}

impl SignalSource for ScriptedSource {
    fn read_line(&mut self) -> Result<Option<String>, AcquisitionError> {
        match self.records.pop_front() {
            Some(ScriptedRecord::Raw(raw)) => decode_line(raw).map(Some),
            Some(ScriptedRecord::Fault(details)) => Err(AcquisitionError::Stream { details }),
            None => {
                if !self.idle_delay.is_zero() {
                    thread::sleep(self.idle_delay);
                }
                Ok(None)
            }
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scripted_source_replays_then_idles() {
        let mut source = ScriptedSource::from_lines(["72,70,450", "74,71,455\r"]);

        assert_eq!(source.read_line().unwrap(), Some("72,70,450".to_string()));
        assert_eq!(source.read_line().unwrap(), Some("74,71,455".to_string()));
        assert_eq!(source.read_line().unwrap(), None);
        assert_eq!(source.read_line().unwrap(), None);
    }

    #[test]
    fn scripted_fault_is_stream_error() {
        let mut source = ScriptedSource::from_lines(["72,70,450"]).then_fault("unplugged");

        assert!(source.read_line().unwrap().is_some());
        match source.read_line() {
            Err(AcquisitionError::Stream { details }) => assert_eq!(details, "unplugged"),
            other => panic!("Expected Stream error, got {:?}", other),
        }
    }

    #[test]
    fn undecodable_bytes_are_stream_error() {
        let mut source = ScriptedSource::from_lines(Vec::<String>::new()).then_raw(vec![0xff, 0xfe, b'1']);

        match source.read_line() {
            Err(AcquisitionError::Stream { details }) => assert!(details.contains("undecodable")),
            other => panic!("Expected Stream error, got {:?}", other),
        }
    }

    #[test]
    fn file_replay_splits_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.txt");
        fs::write(&path, "72,70,450\r\nbad,row\n73,70.5,460\n").unwrap();

        let mut source = ScriptedSource::from_file(&path).unwrap();
        assert!(source.describe().starts_with("replay:"));
        assert_eq!(source.read_line().unwrap().as_deref(), Some("72,70,450"));
        assert_eq!(source.read_line().unwrap().as_deref(), Some("bad,row"));
        assert_eq!(source.read_line().unwrap().as_deref(), Some("73,70.5,460"));
        assert_eq!(source.read_line().unwrap(), None);
    }

    #[test]
    fn opening_missing_port_fails() {
        let result = SerialPortSource::open("/dev/definitely-not-a-sensor", &SerialConfig::default());
        assert!(matches!(
            result,
            Err(AcquisitionError::PortOpenFailed { .. })
        ));
    }
}
