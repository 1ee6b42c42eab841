//! `voxgate`: loudness-based voice activity detection.
//!
//! This crate provides:
//! - A tick-driven detector that smooths microphone loudness and raises speech start/stop events
//! - A hysteresis re-check timer so short pauses don't end an utterance
//! - Capture devices (scripted, WAV replay, and live microphone behind the `microphone` feature)
//! - Event sinks, including a relay that addresses speaking-state messages to session peers
//!
//! The detector never blocks on its tick and owns no global state: the capture device and the
//! event sink are handed to it at construction, so hosts (game loops, CLIs, tests) decide how
//! and when it runs.

// High-level API (most consumers should start here).
pub mod config;
pub mod detector;

// Detector building blocks.
pub mod smoothing;
pub mod timer;

// Audio capture.
pub mod device;
pub mod devices;
pub mod ring;

// Output.
pub mod events;
pub mod relay;
pub mod roster;

// Driving the detector from a plain thread.
pub mod pacer;

mod error;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use config::{CaptureSettings, DetectorConfig, ReadyWait};
pub use detector::{SpeechState, VoiceActivityDetector};
pub use device::{CaptureDevice, CaptureHandle};
pub use error::{Error, Result};
pub use events::{ChannelSink, EventLog, EventSink, JsonLinesSink, SpeechEvent};
pub use relay::{RelayMessage, SessionRelay};
pub use roster::{SendPolicy, VoiceRoster};

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
