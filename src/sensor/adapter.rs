//! Serial adapter for the urSense sensor board.
//!
//! The adapter is responsible for:
//! - Opening the serial port at the configured baud rate
//! - Draining buffered board output down to the most recent complete line
//! - Handing that line to the protocol parser
//!
//! Missing hardware is not an error for the owner. `Sensor::open` always
//! returns an adapter; without a board every read yields a timestamp-only log.

use std::io::Read;
use std::time::Duration;

use anyhow::Result;

use super::protocol::{parse_ursense, ParseOutcome};
use super::SensorLog;

/// Upper bound on an unterminated line carried between reads.
const MAX_PENDING_BYTES: usize = 4096;

/// Byte channel to the sensor board.
///
/// Implementations MUST NOT block: `read_available` returns whatever is
/// buffered right now, possibly nothing.
pub trait SensorChannel: Send {
    fn read_available(&mut self) -> Result<Vec<u8>>;
}

impl SensorChannel for Box<dyn serialport::SerialPort> {
    fn read_available(&mut self) -> Result<Vec<u8>> {
        let waiting = self.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; waiting];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Interface to the sensor board.
pub struct Sensor {
    channel: Option<Box<dyn SensorChannel>>,
    /// Unterminated tail of the last drain, kept undecoded.
    pending: Vec<u8>,
}

impl Sensor {
    /// Open the board on `port` (most likely `/dev/ttyUSB0`).
    ///
    /// If the port cannot be opened the failure is logged and the adapter
    /// degrades to timestamp-only logs.
    pub fn open(port: &str, baud: u32) -> Self {
        match serialport::new(port, baud)
            .timeout(Duration::from_millis(0))
            .open()
        {
            Ok(serial) => {
                log::info!("Sensor board opened on {}, baud {}", port, baud);
                Self::with_channel(Box::new(serial))
            }
            Err(e) => {
                log::warn!("Sensor board not found on {}, baud {}: {}", port, baud, e);
                Self::disconnected()
            }
        }
    }

    pub fn with_channel(channel: Box<dyn SensorChannel>) -> Self {
        Self {
            channel: Some(channel),
            pending: Vec::new(),
        }
    }

    /// An adapter with no board attached.
    pub fn disconnected() -> Self {
        Self {
            channel: None,
            pending: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Take a reading from the board.
    ///
    /// Returns a timestamp-only log when there is no board, no new line, or the
    /// line is not a usable report. Fails only on an unsupported report mode.
    ///
    /// A failed read from the channel disconnects the board for good; the port
    /// is not reopened and every later read is timestamp-only.
    pub fn read(&mut self) -> Result<SensorLog> {
        let Some(line) = self.latest_line() else {
            return Ok(SensorLog::empty_at(crate::unix_now()));
        };
        match parse_ursense(&line)? {
            ParseOutcome::Log(log) => Ok(log),
            ParseOutcome::NotReady | ParseOutcome::Malformed(_) => {
                Ok(SensorLog::empty_at(crate::unix_now()))
            }
        }
    }

    /// Drain everything buffered and keep only the newest complete line.
    fn latest_line(&mut self) -> Option<String> {
        let channel = self.channel.as_mut()?;
        let bytes = match channel.read_available() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Sensor board disconnected: {}", e);
                self.channel = None;
                self.pending.clear();
                return None;
            }
        };
        if bytes.is_empty() {
            return None;
        }

        self.pending.extend_from_slice(&bytes);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            if self.pending.len() > MAX_PENDING_BYTES {
                log::warn!("Discarding {} bytes of unterminated sensor output", self.pending.len());
                self.pending.clear();
            }
            return None;
        };

        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);
        let latest = String::from_utf8_lossy(&complete)
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .last()
            .map(str::to_string);
        latest
    }
}
