//! Outbound side: where encoded MIDI messages go.

use crate::config::MidiConfig;
use anyhow::{Context, Result};
use log::{info, warn};
use midir::{MidiOutput, MidiOutputConnection};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Minimum time between two reconnect attempts on the same output.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// A failed send. Always recoverable: the caller keeps going.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no MIDI output at index {0}")]
    NoSuchOutput(usize),
    #[error("failed to send to MIDI output {output}: {reason}")]
    Send { output: usize, reason: String },
    #[error("MIDI unavailable: {0}")]
    Unavailable(String),
}

pub trait MidiSink {
    fn send(&mut self, output: usize, message: [u8; 3]) -> Result<(), SinkError>;
}

impl<T: MidiSink + ?Sized> MidiSink for Box<T> {
    fn send(&mut self, output: usize, message: [u8; 3]) -> Result<(), SinkError> {
        (**self).send(output, message)
    }
}

/// Output index → port name, fixed when the sink first connects.
///
/// Ports that appear or vanish later never shift the numbering. Devices
/// sharing a name are told apart by their order among the same-named ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortPins {
    names: Vec<String>,
}

impl PortPins {
    pub fn pin(available: &[String], filter: Option<&str>) -> Self {
        Self {
            names: available
                .iter()
                .filter(|name| filter.map_or(true, |f| name.contains(f)))
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, output: usize) -> Option<&str> {
        self.names.get(output).map(String::as_str)
    }

    /// Position of the port pinned to `output` in a fresh enumeration.
    pub fn locate(&self, output: usize, available: &[String]) -> Option<usize> {
        let name = self.names.get(output)?;
        let occurrence = self.names[..output].iter().filter(|n| *n == name).count();
        available
            .iter()
            .enumerate()
            .filter(|(_, n)| *n == name)
            .nth(occurrence)
            .map(|(i, _)| i)
    }
}

struct Slot {
    conn: Option<MidiOutputConnection>,
    last_attempt: Option<Instant>,
}

/// Every matching system MIDI output, connected in enumeration order.
///
/// Output index N is the Nth matching port at startup and stays bound to that
/// port by name. When a send to it fails, only that output is reopened, so a
/// device that was unplugged and plugged back in is picked up without
/// restarting and without disturbing the others.
pub struct MidirSink {
    client_name: String,
    pins: PortPins,
    slots: Vec<Slot>,
}

impl MidirSink {
    pub fn connect(config: &MidiConfig) -> Result<Self> {
        let scanner = new_output(&config.client_name).context("Couldn't open MIDI outputs")?;
        let pins = PortPins::pin(&port_names_of(&scanner), config.port_filter.as_deref());
        drop(scanner);

        let mut sink = Self {
            client_name: config.client_name.clone(),
            slots: (0..pins.len())
                .map(|_| Slot {
                    conn: None,
                    last_attempt: None,
                })
                .collect(),
            pins,
        };
        if sink.pins.is_empty() {
            warn!("No MIDI output ports found");
        }
        for output in 0..sink.slots.len() {
            if let Err(e) = sink.reopen(output) {
                warn!("{}", e);
            }
        }
        Ok(sink)
    }

    pub fn port_names(&self) -> Vec<&str> {
        (0..self.pins.len()).filter_map(|i| self.pins.name(i)).collect()
    }

    fn reopen(&mut self, output: usize) -> Result<(), SinkError> {
        let name = self
            .pins
            .name(output)
            .ok_or(SinkError::NoSuchOutput(output))?
            .to_string();
        let slot = &mut self.slots[output];
        slot.last_attempt = Some(Instant::now());
        slot.conn = None;

        // midir consumes the client on connect, so each port needs its own.
        let client = new_output(&self.client_name)?;
        let ports = client.ports();
        let index = self
            .pins
            .locate(output, &port_names_of(&client))
            .ok_or_else(|| SinkError::Unavailable(format!("MIDI port {} is not present", name)))?;
        let port = ports
            .get(index)
            .ok_or_else(|| SinkError::Unavailable(format!("MIDI port {} disappeared", name)))?;
        let conn = client
            .connect(port, &format!("{}-{}", self.client_name, output))
            .map_err(|e| SinkError::Unavailable(format!("MIDI port {}: {}", name, e)))?;
        info!("Output {} -> MIDI port {}", output, name);
        self.slots[output].conn = Some(conn);
        Ok(())
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, output: usize, message: [u8; 3]) -> Result<(), SinkError> {
        // Indices never pinned at startup have no port to come back to.
        let slot = self
            .slots
            .get_mut(output)
            .ok_or(SinkError::NoSuchOutput(output))?;

        let failure = match slot.conn.as_mut() {
            Some(conn) => match conn.send(&message) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    slot.conn = None;
                    e.to_string()
                }
            },
            None => "not connected".to_string(),
        };

        let due = slot
            .last_attempt
            .map_or(true, |last| last.elapsed() >= RECONNECT_INTERVAL);
        if !due {
            return Err(SinkError::Send {
                output,
                reason: failure,
            });
        }

        warn!("MIDI output {}: {}, reconnecting", output, failure);
        self.reopen(output)?;
        match self.slots[output].conn.as_mut() {
            Some(conn) => conn.send(&message).map_err(|e| SinkError::Send {
                output,
                reason: e.to_string(),
            }),
            None => Err(SinkError::Send {
                output,
                reason: failure,
            }),
        }
    }
}

fn port_names_of(client: &MidiOutput) -> Vec<String> {
    client
        .ports()
        .iter()
        .map(|port| {
            client
                .port_name(port)
                .unwrap_or_else(|_| "<unknown>".to_string())
        })
        .collect()
}

fn new_output(client_name: &str) -> Result<MidiOutput, SinkError> {
    MidiOutput::new(client_name).map_err(|e| SinkError::Unavailable(e.to_string()))
}

/// Names of the system MIDI outputs, in the order `MidirSink` numbers them.
pub fn list_ports(client_name: &str, port_filter: Option<&str>) -> Result<Vec<String>> {
    let output = MidiOutput::new(client_name).context("Couldn't create MIDI client")?;
    let names = output
        .ports()
        .iter()
        .filter_map(|port| output.port_name(port).ok())
        .filter(|name| port_filter.map_or(true, |f| name.contains(f)))
        .collect();
    Ok(names)
}

/// Dry-run sink: logs each message instead of sending it.
#[derive(Debug, Default)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn send(&mut self, output: usize, message: [u8; 3]) -> Result<(), SinkError> {
        info!("MIDI out {}: {:02X?}", output, message);
        Ok(())
    }
}

/// Keeps every message in memory. Outputs can be marked as failing to
/// simulate a disconnected device.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Vec<(usize, [u8; 3])>,
    failing: HashSet<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_output(&mut self, output: usize) {
        self.failing.insert(output);
    }

    pub fn restore_output(&mut self, output: usize) {
        self.failing.remove(&output);
    }

    pub fn sent(&self) -> &[(usize, [u8; 3])] {
        &self.sent
    }

    pub fn take(&mut self) -> Vec<(usize, [u8; 3])> {
        std::mem::take(&mut self.sent)
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, output: usize, message: [u8; 3]) -> Result<(), SinkError> {
        if self.failing.contains(&output) {
            return Err(SinkError::Send {
                output,
                reason: "device disconnected".to_string(),
            });
        }
        self.sent.push((output, message));
        Ok(())
    }
}
