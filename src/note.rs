use serde::{Deserialize, Serialize};

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

/// How output indices are mapped onto MIDI devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Routing {
    /// One device per index, every message on MIDI channel 1.
    #[default]
    Ports,
    /// A single device, index folded into the status nibble.
    Channels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { output: usize, pitch: u8, velocity: u8 },
    NoteOff { output: usize, pitch: u8, velocity: u8 },
    // Sent as a note-on with the control value in the velocity byte.
    ControlValue { output: usize, pitch: u8, value: u8 },
}

impl MidiEvent {
    pub fn output(&self) -> usize {
        match *self {
            Self::NoteOn { output, .. }
            | Self::NoteOff { output, .. }
            | Self::ControlValue { output, .. } => output,
        }
    }

    pub fn encode(&self, routing: Routing) -> [u8; 3] {
        let (status, data1, data2) = match *self {
            Self::NoteOn { pitch, velocity, .. } => (NOTE_ON, pitch, velocity),
            Self::NoteOff { pitch, velocity, .. } => (NOTE_OFF, pitch, velocity),
            Self::ControlValue { pitch, value, .. } => (NOTE_ON, pitch, value),
        };
        debug_assert!(data1 < 0x80 && data2 < 0x80, "data bytes must be 7-bit");
        let status = match routing {
            Routing::Ports => status,
            Routing::Channels => {
                debug_assert!(self.output() <= 0x0F, "channel {} beyond 16", self.output());
                // Keep a bad index from turning into a different status byte.
                status | (self.output() as u8 & 0x0F)
            }
        };
        [status, data1, data2]
    }

    /// Device the encoded message should be written to.
    pub fn destination(&self, routing: Routing) -> usize {
        match routing {
            Routing::Ports => self.output(),
            Routing::Channels => 0,
        }
    }
}
