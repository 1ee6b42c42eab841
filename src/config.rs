//! Detector configuration.
//!
//! This struct represents *library-level configuration*, not CLI flags directly.
//! The CLI maps its flags onto a `DetectorConfig` (optionally loaded from JSON first) so the
//! library stays usable from hosts that never touch a command line.
//!
//! Values are validated by [`DetectorConfig::validate`], which the detector calls on every
//! `initialize()`. Out-of-range values are rejected, never clamped.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest smoothing weight the detector accepts.
///
/// A weight of 1.0 would freeze the smoothed value forever.
pub const MAX_SMOOTHING_WEIGHT: f32 = 0.95;

/// Default number of samples read per tick.
pub const DEFAULT_WINDOW_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Scale applied to the mean rectified amplitude. Also the loudness ceiling for full-scale
    /// input.
    pub sensitivity: f32,

    /// Influence of the previous tick's loudness, in `[0, 0.95]`.
    ///
    /// Higher values suppress short spikes at the cost of responsiveness.
    pub smoothing_weight: f32,

    /// Loudness strictly above this value counts as speech.
    pub trigger_threshold: f32,

    /// Ticks between "is the speaker still talking?" re-checks.
    pub recheck_interval_ticks: u32,

    /// Samples read from the capture device per tick.
    pub window_size: usize,

    pub capture: CaptureSettings,

    pub ready_wait: ReadyWait,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity: 100.0,
            smoothing_weight: 0.0,
            trigger_threshold: 10.0,
            // 2 seconds at 60 ticks per second.
            recheck_interval_ticks: 120,
            window_size: DEFAULT_WINDOW_SIZE,
            capture: CaptureSettings::default(),
            ready_wait: ReadyWait::default(),
        }
    }
}

impl DetectorConfig {
    /// Parse a config from JSON. Missing fields fall back to their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject values the smoothing math or the capture layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let w = self.smoothing_weight;
        if !w.is_finite() || !(0.0..=MAX_SMOOTHING_WEIGHT).contains(&w) {
            return Err(Error::config(format!(
                "smoothing_weight must be within [0, {MAX_SMOOTHING_WEIGHT}], got {w}"
            )));
        }

        if !self.trigger_threshold.is_finite() || self.trigger_threshold < 0.0 {
            return Err(Error::config(format!(
                "trigger_threshold must be a non-negative number, got {}",
                self.trigger_threshold
            )));
        }

        if !self.sensitivity.is_finite() || self.sensitivity < 0.0 {
            return Err(Error::config(format!(
                "sensitivity must be a non-negative number, got {}",
                self.sensitivity
            )));
        }

        if self.recheck_interval_ticks == 0 {
            return Err(Error::config("recheck_interval_ticks must be at least 1"));
        }

        if self.window_size == 0 {
            return Err(Error::config("window_size must be at least 1"));
        }

        self.capture.validate(self.window_size)?;
        self.ready_wait.validate()
    }
}

/// Parameters passed to the capture device when recording starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Input device name. `None` picks the host default.
    pub device: Option<String>,

    /// Keep recording into the buffer circularly instead of stopping once it is full.
    pub looping: bool,

    /// Length of the circular capture buffer.
    pub buffer_seconds: u32,

    /// Requested capture sample rate (Hz).
    pub sample_rate: u32,

    /// How long a live input may go without delivering samples before reads fail.
    /// `0` disables the check.
    pub stall_timeout_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: None,
            looping: true,
            buffer_seconds: 10,
            sample_rate: 44_100,
            stall_timeout_ms: 1_000,
        }
    }
}

impl CaptureSettings {
    /// Capacity, in samples, of a buffer holding `buffer_seconds` of mono audio.
    pub fn buffer_len(&self) -> usize {
        self.buffer_seconds as usize * self.sample_rate as usize
    }

    /// Stall bound for live inputs, or `None` when disabled.
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_ms > 0).then(|| Duration::from_millis(self.stall_timeout_ms))
    }

    fn validate(&self, window_size: usize) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::config("capture.sample_rate must be non-zero"));
        }
        if self.buffer_seconds == 0 {
            return Err(Error::config("capture.buffer_seconds must be non-zero"));
        }
        if self.buffer_len() < window_size {
            return Err(Error::config(format!(
                "capture buffer ({} samples) is smaller than window_size ({window_size})",
                self.buffer_len()
            )));
        }
        Ok(())
    }
}

/// Bounded wait for a freshly started device to report data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadyWait {
    /// Number of position checks before giving up.
    pub max_attempts: u32,

    /// Pause between checks, in milliseconds. `0` yields the thread instead of sleeping.
    pub poll_interval_ms: u64,
}

impl Default for ReadyWait {
    fn default() -> Self {
        Self {
            max_attempts: 200,
            poll_interval_ms: 5,
        }
    }
}

impl ReadyWait {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on how long a readiness wait can take.
    pub fn timeout(&self) -> Duration {
        self.poll_interval() * self.max_attempts
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("ready_wait.max_attempts must be at least 1"));
        }
        Ok(())
    }
}
