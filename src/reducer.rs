//! Gesture-to-MIDI state machine.
//!
//! The reducer turns the selected hand of each frame into an ordered list of
//! [`MidiEvent`]s. It keeps exactly one piece of state, the channel currently
//! sounding, and never performs I/O: callers forward the events to a sink.
//!
//! Per frame the output is, in order:
//!
//! 1. a note-off for the outgoing channel, if the channel changes and one is sounding
//! 2. a note-on for the incoming channel, unless it is the idle channel
//! 3. the hand-height control value, whenever a hand is selected
//!
//! A frame without a selected hand only ever produces the note-off.

use crate::config::{Config, GestureChannelMap, IDLE_CHANNEL};
use crate::frame::HandObservation;
use crate::note::MidiEvent;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReducerState {
    #[default]
    Idle,
    Sounding(usize),
}

impl ReducerState {
    pub fn active_channel(&self) -> usize {
        match *self {
            Self::Idle => IDLE_CHANNEL,
            Self::Sounding(channel) => channel,
        }
    }

    fn for_channel(channel: usize) -> Self {
        if channel == IDLE_CHANNEL {
            Self::Idle
        } else {
            Self::Sounding(channel)
        }
    }
}

/// Maps the vertical extremum of a hand to 0..=127, higher hand → higher value.
pub fn control_value(y_max: f32) -> u8 {
    let scaled = ((1.0 - y_max) * 127.0).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, 127.0) as u8
}

#[derive(Debug, Clone)]
pub struct Reducer {
    state: ReducerState,
    channel_map: GestureChannelMap,
    pitch: u8,
    velocity: u8,
    control_output: usize,
}

impl Reducer {
    pub fn new(config: &Config) -> Self {
        Self {
            state: ReducerState::Idle,
            channel_map: config.channel_map.clone(),
            pitch: config.pitch,
            velocity: config.velocity,
            control_output: config.control_output,
        }
    }

    pub fn state(&self) -> ReducerState {
        self.state
    }

    pub fn step(&mut self, selection: Option<&HandObservation>) -> Vec<MidiEvent> {
        let mut events = Vec::with_capacity(3);

        let Some(hand) = selection else {
            self.transition_to(IDLE_CHANNEL, &mut events);
            return events;
        };

        let target = self.channel_map.channel_for(&hand.gesture.category);
        debug!(
            "{} hand: {} ({:.2}) -> channel {}",
            hand.side.as_str(),
            hand.gesture.category,
            hand.gesture.confidence,
            target
        );
        self.transition_to(target, &mut events);

        // A hand without landmarks counts as sitting at the bottom edge.
        // No landmarks: the extremum is -inf, which saturates to 127.
        let value = control_value(hand.y_max().unwrap_or(f32::NEG_INFINITY));
        events.push(MidiEvent::ControlValue {
            output: self.control_output,
            pitch: self.pitch,
            value,
        });

        events
    }

    /// Silences the sounding channel, if any. Used when the session stops.
    pub fn flush(&mut self) -> Vec<MidiEvent> {
        let mut events = Vec::with_capacity(1);
        self.transition_to(IDLE_CHANNEL, &mut events);
        events
    }

    fn transition_to(&mut self, target: usize, events: &mut Vec<MidiEvent>) {
        let current = self.state.active_channel();
        if target == current {
            return;
        }

        if let ReducerState::Sounding(channel) = self.state {
            events.push(MidiEvent::NoteOff {
                output: channel,
                pitch: self.pitch,
                velocity: self.velocity,
            });
        }
        if target != IDLE_CHANNEL {
            events.push(MidiEvent::NoteOn {
                output: target,
                pitch: self.pitch,
                velocity: self.velocity,
            });
        }

        debug!("channel {} -> {}", current, target);
        self.state = ReducerState::for_channel(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Handedness, Landmark};

    fn hand(gesture: &str, y: f32) -> HandObservation {
        HandObservation::new(Handedness::Right, gesture, 0.9, vec![Landmark { x: 0.5, y }])
    }

    fn on(output: usize) -> MidiEvent {
        MidiEvent::NoteOn { output, pitch: 50, velocity: 100 }
    }

    fn off(output: usize) -> MidiEvent {
        MidiEvent::NoteOff { output, pitch: 50, velocity: 100 }
    }

    fn cv(value: u8) -> MidiEvent {
        MidiEvent::ControlValue { output: 7, pitch: 50, value }
    }

    #[test]
    fn control_value_scaling() {
        assert_eq!(control_value(0.0), 127);
        assert_eq!(control_value(1.0), 0);
        assert_eq!(control_value(0.5), 64);
        assert_eq!(control_value(-0.3), 127);
        assert_eq!(control_value(1.7), 0);
        assert_eq!(control_value(f32::NAN), 0);
    }

    #[test]
    fn starts_idle() {
        let reducer = Reducer::new(&Config::default());
        assert_eq!(reducer.state(), ReducerState::Idle);
        assert_eq!(reducer.state().active_channel(), IDLE_CHANNEL);
    }

    #[test]
    fn idle_without_hand_emits_nothing() {
        let mut reducer = Reducer::new(&Config::default());
        assert!(reducer.step(None).is_empty());
        assert!(reducer.flush().is_empty());
    }

    #[test]
    fn first_gesture_turns_note_on_then_sends_value() {
        let mut reducer = Reducer::new(&Config::default());
        let events = reducer.step(Some(&hand("Open_Palm", 0.0)));
        assert_eq!(events, vec![on(1), cv(127)]);
        assert_eq!(reducer.state(), ReducerState::Sounding(1));
    }

    #[test]
    fn switch_orders_off_before_on() {
        let mut reducer = Reducer::new(&Config::default());
        reducer.step(Some(&hand("Open_Palm", 0.5)));
        let events = reducer.step(Some(&hand("Victory", 0.5)));
        assert_eq!(events, vec![off(1), on(5), cv(64)]);
    }

    #[test]
    fn fist_silences_but_keeps_value_stream() {
        let mut reducer = Reducer::new(&Config::default());
        reducer.step(Some(&hand("Thumb_Down", 0.5)));
        let events = reducer.step(Some(&hand("Closed_Fist", 1.0)));
        assert_eq!(events, vec![off(3), cv(0)]);
        assert_eq!(reducer.state(), ReducerState::Idle);

        // Idle -> idle through another unmapped gesture.
        let events = reducer.step(Some(&hand("Unknown_Gesture", 1.0)));
        assert_eq!(events, vec![cv(0)]);
    }

    #[test]
    fn flush_silences_sounding_channel() {
        let mut reducer = Reducer::new(&Config::default());
        reducer.step(Some(&hand("ILoveYou", 0.2)));
        assert_eq!(reducer.flush(), vec![off(6)]);
        assert_eq!(reducer.state(), ReducerState::Idle);
        assert!(reducer.flush().is_empty());
    }

    #[test]
    fn hand_without_landmarks_sends_full_value() {
        let mut reducer = Reducer::new(&Config::default());
        let bare = HandObservation::new(Handedness::Right, "Open_Palm", 0.9, Vec::new());
        assert_eq!(reducer.step(Some(&bare)), vec![on(1), cv(127)]);
    }

    #[test]
    fn low_confidence_is_still_trusted() {
        let mut reducer = Reducer::new(&Config::default());
        let shaky = HandObservation::new(
            Handedness::Right,
            "Pointing_Up",
            0.01,
            vec![Landmark { x: 0.5, y: 0.5 }],
        );
        assert_eq!(reducer.step(Some(&shaky)), vec![on(2), cv(64)]);
    }
}
