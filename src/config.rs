use crate::frame::Handedness;
use crate::note::Routing;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Channel reserved for silence.
pub const IDLE_CHANNEL: usize = 0;

/// Gesture category → channel table. Unknown categories resolve to [`IDLE_CHANNEL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureChannelMap {
    channels: BTreeMap<String, usize>,
}

impl GestureChannelMap {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            channels: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Open_Palm on 1, then one channel per gesture.
    pub fn sequential() -> Self {
        Self::new([
            ("Closed_Fist", IDLE_CHANNEL),
            ("Open_Palm", 1),
            ("Pointing_Up", 2),
            ("Thumb_Down", 3),
            ("Thumb_Up", 4),
            ("Victory", 5),
            ("ILoveYou", 6),
        ])
    }

    /// Same order as [`sequential`](Self::sequential) but skipping channel 2.
    pub fn shifted() -> Self {
        Self::new([
            ("Closed_Fist", IDLE_CHANNEL),
            ("Open_Palm", 1),
            ("Pointing_Up", 3),
            ("Thumb_Down", 4),
            ("Thumb_Up", 5),
            ("Victory", 6),
            ("ILoveYou", 7),
        ])
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "sequential" => Some(Self::sequential()),
            "shifted" => Some(Self::shifted()),
            _ => None,
        }
    }

    pub fn channel_for(&self, category: &str) -> usize {
        self.channels.get(category).copied().unwrap_or(IDLE_CHANNEL)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for GestureChannelMap {
    fn default() -> Self {
        Self::sequential()
    }
}

/// Either a preset name or an explicit table in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ChannelMapSetting {
    Preset(String),
    Table(GestureChannelMap),
}

fn deserialize_channel_map<'de, D>(deserializer: D) -> Result<GestureChannelMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match ChannelMapSetting::deserialize(deserializer)? {
        ChannelMapSetting::Table(map) => Ok(map),
        ChannelMapSetting::Preset(name) => GestureChannelMap::preset(&name).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown channel map preset '{}' (expected 'sequential' or 'shifted')",
                name
            ))
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    pub client_name: String,
    /// Only ports whose name contains this are connected.
    pub port_filter: Option<String>,
    pub routing: Routing,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: "gesture-midi".to_string(),
            port_filter: None,
            routing: Routing::Ports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Udp {
        bind: String,
    },
    Lines {
        /// `-` reads stdin.
        path: PathBuf,
        #[serde(default)]
        assume_ready: bool,
    },
    /// Classifier started as a child process writing JSON lines to stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Udp {
            bind: "127.0.0.1:10000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control_hand: Handedness,
    #[serde(deserialize_with = "deserialize_channel_map")]
    pub channel_map: GestureChannelMap,
    pub pitch: u8,
    pub velocity: u8,
    /// Output index carrying the continuous hand-height value.
    pub control_output: usize,
    pub midi: MidiConfig,
    pub source: SourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_hand: Handedness::Right,
            channel_map: GestureChannelMap::default(),
            pitch: 50,
            velocity: 100,
            control_output: 7,
            midi: MidiConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json).context("Invalid config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pitch > 127 {
            bail!("pitch {} out of MIDI range 0..=127", self.pitch);
        }
        if self.velocity > 127 {
            bail!("velocity {} out of MIDI range 0..=127", self.velocity);
        }
        for (gesture, channel) in self.channel_map.channels() {
            if channel != IDLE_CHANNEL && channel == self.control_output {
                bail!(
                    "gesture '{}' uses channel {}, which is reserved for the control value",
                    gesture,
                    channel
                );
            }
            if self.midi.routing == Routing::Channels && channel > 15 {
                bail!("gesture '{}' uses channel {}, beyond MIDI channel 16", gesture, channel);
            }
        }
        if self.midi.routing == Routing::Channels && self.control_output > 15 {
            bail!("control output {} beyond MIDI channel 16", self.control_output);
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    Config::from_json(&content).with_context(|| format!("Invalid config in {:?}", path))
}
