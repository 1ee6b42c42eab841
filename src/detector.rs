//! The voice activity detector.
//!
//! Each `tick()` reads the latest amplitude window from the capture device, smooths it into a
//! loudness value, and runs a two-state hysteresis machine:
//!
//! - **Idle → Speaking** on the first tick loudness exceeds the trigger threshold. Emits
//!   `on_speech_start` and arms the re-check timer.
//! - **Speaking → Speaking** when the timer expires and loudness is still above threshold.
//!   The timer is re-armed; nothing is emitted.
//! - **Speaking → Idle** when the timer expires and loudness has dropped to or below
//!   threshold. Emits `on_speech_stop`, then restarts the capture device so the next utterance
//!   starts from a fresh buffer.
//!
//! While Speaking, loudness dipping below threshold between re-checks does not end the
//! utterance. That is what keeps the detector from flapping.

use tracing::{debug, error, info, warn};

use crate::config::DetectorConfig;
use crate::device::{CaptureDevice, CaptureHandle, wait_until_ready};
use crate::error::{Error, Result};
use crate::events::{EventSink, SpeechEvent};
use crate::smoothing::LoudnessFilter;
use crate::timer::DebounceTimer;

/// Whether the detector currently considers the speaker to be talking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeechState {
    #[default]
    Idle,
    Speaking,
}

/// Loudness-gated voice activity detector.
///
/// The capture device and the event sink are injected, so the detector owns no global state
/// and can run against a scripted device in tests. It is driven by exactly one caller, once per
/// host tick.
pub struct VoiceActivityDetector<D, S> {
    config: DetectorConfig,
    device: D,
    sink: S,
    handle: Option<CaptureHandle>,
    filter: LoudnessFilter,
    state: SpeechState,
    timer: DebounceTimer,
    window: Vec<f32>,
    ticks: u64,
}

impl<D: CaptureDevice, S: EventSink> VoiceActivityDetector<D, S> {
    /// Build a detector. Nothing touches the device until [`Self::initialize`].
    pub fn new(config: DetectorConfig, device: D, sink: S) -> Self {
        let filter = LoudnessFilter::new(config.sensitivity, config.smoothing_weight);
        let window = vec![0.0; config.window_size];

        Self {
            config,
            device,
            sink,
            handle: None,
            filter,
            state: SpeechState::Idle,
            timer: DebounceTimer::new(),
            window,
            ticks: 0,
        }
    }

    /// Validate the config and (re)start capture.
    ///
    /// Any pending re-check is cancelled, the state returns to Idle, and the loudness history
    /// is cleared. Blocks for at most `ready_wait.timeout()` while the device comes up.
    pub fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;

        self.timer.cancel();
        self.state = SpeechState::Idle;
        self.filter.reset();
        self.ticks = 0;

        self.restart_capture()
    }

    /// Process one host tick.
    ///
    /// Returns the transition that fired on this tick, if any. Device failures are returned as
    /// [`Error::DeviceUnavailable`] after the sink has been consulted.
    pub fn tick(&mut self) -> Result<Option<SpeechEvent>> {
        let Some(handle) = self.handle else {
            return Err(Error::device("detector is not initialized"));
        };

        if let Err(err) = self.device.read_latest(handle, &mut self.window) {
            self.report_device_error(&err);
            return Err(err);
        }

        self.ticks += 1;
        let loudness = self.filter.update(&self.window);

        match self.state {
            SpeechState::Idle => {
                if self.is_loud(loudness) {
                    self.state = SpeechState::Speaking;
                    self.timer.arm(self.config.recheck_interval_ticks);
                    debug!(tick = self.ticks, loudness, "speech started");
                    self.sink.on_speech_start();
                    return Ok(Some(SpeechEvent::SpeechStart));
                }
                Ok(None)
            }
            SpeechState::Speaking => {
                if !self.timer.advance() {
                    return Ok(None);
                }

                if self.is_loud(loudness) {
                    self.timer.arm(self.config.recheck_interval_ticks);
                    return Ok(None);
                }

                self.state = SpeechState::Idle;
                self.timer.cancel();
                debug!(tick = self.ticks, loudness, "speech stopped");
                self.sink.on_speech_stop();

                self.rearm_after_stop()?;
                Ok(Some(SpeechEvent::SpeechStop))
            }
        }
    }

    /// Latest smoothed loudness.
    pub fn current_loudness(&self) -> f32 {
        self.filter.current()
    }

    /// Smoothed loudness from the tick before the latest one.
    pub fn previous_loudness(&self) -> f32 {
        self.filter.previous()
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == SpeechState::Speaking
    }

    /// Whether a re-check is scheduled.
    pub fn recheck_pending(&self) -> bool {
        self.timer.is_armed()
    }

    /// Ticks processed since the last `initialize()`.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether a capture session is live.
    pub fn is_capturing(&self) -> bool {
        self.handle.is_some()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Stop capturing. The detector refuses to tick until initialized again.
    pub fn shutdown(&mut self) {
        self.timer.cancel();
        self.state = SpeechState::Idle;
        self.stop_capture();
    }

    /// Tear the detector apart, handing back the device and sink.
    pub fn into_parts(mut self) -> (D, S) {
        self.stop_capture();
        (self.device, self.sink)
    }

    fn is_loud(&self, loudness: f32) -> bool {
        loudness > self.config.trigger_threshold
    }

    fn stop_capture(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.device.stop_capture(handle);
            info!(generation = handle.generation(), "capture stopped");
        }
    }

    fn restart_capture(&mut self) -> Result<()> {
        self.stop_capture();

        let handle = self.device.start_capture(&self.config.capture)?;
        if let Err(err) = wait_until_ready(&self.device, handle, &self.config.ready_wait) {
            self.device.stop_capture(handle);
            return Err(err);
        }

        self.handle = Some(handle);
        info!(generation = handle.generation(), "capture started");
        Ok(())
    }

    fn rearm_after_stop(&mut self) -> Result<()> {
        match self.restart_capture() {
            Ok(()) => {
                warn!(tick = self.ticks, "capture device restarted after speech stop");
                self.sink.on_device_restart();
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "capture device failed to restart");
                // No session is live here, so a stop request has nothing to act on.
                let _stop_requested = self.sink.on_device_error(&err);
                Err(err)
            }
        }
    }

    fn report_device_error(&mut self, err: &Error) {
        error!(tick = self.ticks, error = %err, "capture device read failed");
        if self.sink.on_device_error(err) {
            self.stop_capture();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureSettings, ReadyWait};
    use crate::devices::ScriptedDevice;
    use crate::events::EventLog;

    fn config(weight: f32, interval: u32) -> DetectorConfig {
        DetectorConfig {
            sensitivity: 100.0,
            smoothing_weight: weight,
            trigger_threshold: 10.0,
            recheck_interval_ticks: interval,
            window_size: 256,
            capture: CaptureSettings {
                buffer_seconds: 1,
                sample_rate: 8_000,
                ..CaptureSettings::default()
            },
            ready_wait: ReadyWait {
                max_attempts: 4,
                poll_interval_ms: 0,
            },
        }
    }

    fn detector(weight: f32, interval: u32) -> VoiceActivityDetector<ScriptedDevice, EventLog> {
        VoiceActivityDetector::new(config(weight, interval), ScriptedDevice::new(), EventLog::new())
    }

    #[test]
    fn quiet_window_stays_idle_and_loud_window_starts_speech() -> anyhow::Result<()> {
        let mut vad = detector(0.0, 10);
        vad.device_mut().push_constant(0.05, 256);
        vad.device_mut().push_constant(0.2, 256);
        vad.initialize()?;

        assert_eq!(vad.tick()?, None);
        assert!((vad.current_loudness() - 5.0).abs() < 1e-3);
        assert_eq!(vad.state(), SpeechState::Idle);

        assert_eq!(vad.tick()?, Some(SpeechEvent::SpeechStart));
        assert!((vad.current_loudness() - 20.0).abs() < 1e-3);
        assert!(vad.is_speaking());
        assert_eq!(vad.sink().events(), &[SpeechEvent::SpeechStart]);
        Ok(())
    }

    #[test]
    fn tick_before_initialize_is_an_error() {
        let mut vad = detector(0.0, 10);
        let err = vad.tick().unwrap_err();
        assert!(err.is_device_unavailable());
    }

    #[test]
    fn invalid_config_is_rejected_at_initialize() {
        let mut vad = VoiceActivityDetector::new(
            config(1.0, 10),
            ScriptedDevice::new(),
            EventLog::new(),
        );
        let err = vad.initialize().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(vad.device().start_count(), 0);
    }

    #[test]
    fn missing_device_fails_initialize() {
        let mut vad =
            VoiceActivityDetector::new(config(0.0, 10), ScriptedDevice::absent(), EventLog::new());
        let err = vad.initialize().unwrap_err();
        assert!(err.is_device_unavailable());
        assert!(!vad.is_capturing());
    }

    #[test]
    fn device_that_never_produces_data_times_out() {
        let device = ScriptedDevice::new().with_startup_delay(100);
        let mut vad = VoiceActivityDetector::new(config(0.0, 10), device, EventLog::new());
        vad.device_mut().push_constant(0.1, 256);

        let err = vad.initialize().unwrap_err();
        assert!(err.is_device_unavailable());
        assert!(!vad.device().is_capturing());
    }

    #[test]
    fn speech_continues_while_loud_at_each_recheck() -> anyhow::Result<()> {
        let mut vad = detector(0.0, 3);
        vad.device_mut().push_constant_frames(0.2, 256, 10);
        vad.initialize()?;

        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(vad.tick()?);
        }

        assert_eq!(events, vec![SpeechEvent::SpeechStart]);
        assert!(vad.is_speaking());
        assert!(vad.recheck_pending());
        assert_eq!(vad.device().start_count(), 1);
        Ok(())
    }

    #[test]
    fn speech_stops_at_recheck_and_rearms_capture() -> anyhow::Result<()> {
        let mut vad = detector(0.0, 3);
        vad.device_mut().push_constant(0.2, 256);
        vad.device_mut().push_constant_frames(0.0, 256, 5);
        vad.initialize()?;

        // tick 1: start, timer armed for 3 ticks.
        assert_eq!(vad.tick()?, Some(SpeechEvent::SpeechStart));
        assert_eq!(vad.tick()?, None);
        assert_eq!(vad.tick()?, None);
        // tick 4: timer expires while quiet.
        assert_eq!(vad.tick()?, Some(SpeechEvent::SpeechStop));

        assert_eq!(vad.state(), SpeechState::Idle);
        assert!(!vad.recheck_pending());
        assert_eq!(vad.device().start_count(), 2);
        assert_eq!(vad.sink().restarts(), 1);
        assert!(vad.is_capturing());
        Ok(())
    }

    #[test]
    fn rearm_keeps_loudness_history() -> anyhow::Result<()> {
        let mut vad = detector(0.5, 1);
        vad.device_mut().push_constant(0.5, 256);
        vad.device_mut().push_constant_frames(0.0, 256, 4);
        vad.initialize()?;

        // 50 * 0.5 + 0 * 0.5
        assert_eq!(vad.tick()?, Some(SpeechEvent::SpeechStart));
        // 12.5 is still above threshold at the re-check.
        assert_eq!(vad.tick()?, None);
        assert_eq!(vad.tick()?, Some(SpeechEvent::SpeechStop));
        assert_eq!(vad.device().start_count(), 2);
        assert_eq!(vad.current_loudness(), 6.25);

        vad.tick()?;
        assert_eq!(vad.current_loudness(), 3.125);
        assert_eq!(vad.previous_loudness(), 6.25);
        Ok(())
    }

    #[test]
    fn initialize_twice_resets_state_and_timer() -> anyhow::Result<()> {
        let mut vad = detector(0.0, 50);
        vad.device_mut().push_constant(0.3, 256);
        vad.initialize()?;
        vad.tick()?;
        assert!(vad.is_speaking());
        assert!(vad.recheck_pending());

        vad.initialize()?;
        vad.initialize()?;

        assert_eq!(vad.state(), SpeechState::Idle);
        assert!(!vad.recheck_pending());
        assert_eq!(vad.current_loudness(), 0.0);
        assert_eq!(vad.ticks(), 0);
        assert_eq!(vad.device().stop_count(), 2);
        Ok(())
    }

    #[test]
    fn disconnect_surfaces_from_next_tick() -> anyhow::Result<()> {
        let mut vad = detector(0.0, 10);
        vad.device_mut().push_constant(0.1, 256);
        vad.initialize()?;
        vad.tick()?;

        vad.device_mut().disconnect();
        let err = vad.tick().unwrap_err();
        assert!(err.is_device_unavailable());
        assert_eq!(vad.sink().device_errors().len(), 1);
        // The default sink policy stops capture.
        assert!(!vad.is_capturing());
        assert!(vad.tick().unwrap_err().is_device_unavailable());
        Ok(())
    }

    #[derive(Default)]
    struct KeepCapturing {
        errors: usize,
    }

    impl EventSink for KeepCapturing {
        fn on_speech_start(&mut self) {}

        fn on_speech_stop(&mut self) {}

        fn on_device_error(&mut self, _err: &Error) -> bool {
            self.errors += 1;
            false
        }
    }

    #[test]
    fn sink_can_keep_capture_running_after_read_error() -> anyhow::Result<()> {
        let mut vad = VoiceActivityDetector::new(
            config(0.0, 10),
            ScriptedDevice::new(),
            KeepCapturing::default(),
        );
        vad.device_mut().push_constant(0.1, 256);
        vad.initialize()?;
        vad.tick()?;

        vad.device_mut().disconnect();
        let loudness = vad.current_loudness();

        let err = vad.tick().unwrap_err();
        assert!(err.is_device_unavailable());
        assert!(vad.is_capturing());
        assert!(vad.device().is_capturing());
        assert_eq!(vad.current_loudness(), loudness);

        // The session is still held, so the next tick reports the failure again.
        assert!(vad.tick().unwrap_err().is_device_unavailable());
        assert_eq!(vad.sink().errors, 2);
        assert_eq!(vad.ticks(), 1);
        Ok(())
    }

    #[test]
    fn failed_rearm_still_reports_stop() -> anyhow::Result<()> {
        let mut vad = detector(0.0, 1);
        vad.device_mut().push_constant(0.2, 256);
        vad.device_mut().push_constant(0.0, 256);
        vad.initialize()?;

        assert_eq!(vad.tick()?, Some(SpeechEvent::SpeechStart));
        vad.device_mut().set_present(false);

        let err = vad.tick().unwrap_err();
        assert!(err.is_device_unavailable());
        assert_eq!(
            vad.sink().events(),
            &[SpeechEvent::SpeechStart, SpeechEvent::SpeechStop]
        );
        assert_eq!(vad.state(), SpeechState::Idle);
        assert!(!vad.is_capturing());
        Ok(())
    }

    #[test]
    fn shutdown_stops_capture() -> anyhow::Result<()> {
        let mut vad = detector(0.0, 10);
        vad.device_mut().push_constant(0.1, 256);
        vad.initialize()?;
        vad.shutdown();

        assert!(!vad.device().is_capturing());
        assert!(vad.tick().is_err());

        let (device, _sink) = vad.into_parts();
        assert_eq!(device.stop_count(), 1);
        Ok(())
    }
}
