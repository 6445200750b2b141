//! Hand gestures in, MIDI out.
//!
//! An external classifier reports, for every video frame, which hands it sees
//! and the gesture each one makes. This crate picks the controlling hand,
//! keeps exactly one gesture channel sounding at a time and streams the hand
//! height as a 7-bit control value.
//!
//! Frames flow through [`sampler`] → [`selector`] → [`reducer`], driven by the
//! loop in [`session`]. The classifier and MIDI device sit behind
//! [`source::FrameSource`] and [`sink::MidiSink`].

pub mod config;
pub mod frame;
pub mod note;
pub mod reducer;
pub mod sampler;
pub mod selector;
pub mod session;
pub mod sink;
pub mod source;
