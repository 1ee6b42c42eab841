use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{CaptureSettings, ReadyWait};
use crate::error::{Error, Result};

/// Identifies one recording session on a [`CaptureDevice`].
///
/// Every `start_capture` call hands out a fresh handle; handles from an earlier session are
/// stale and rejected by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(u64);

impl CaptureHandle {
    pub fn new(generation: u64) -> Self {
        Self(generation)
    }

    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Audio input source the detector samples from.
///
/// Implementations record continuously into a circular buffer; the detector only ever reads
/// the most recent window. Any failure to reach the underlying device must surface as
/// [`Error::DeviceUnavailable`] rather than as silent zeros.
pub trait CaptureDevice {
    /// Start (or restart) recording and return a handle for the new session.
    ///
    /// Starting again implicitly ends the previous session.
    fn start_capture(&mut self, settings: &CaptureSettings) -> Result<CaptureHandle>;

    /// Current write offset into the capture buffer. `0` means no data has arrived yet.
    fn capture_position(&self, handle: CaptureHandle) -> Result<usize>;

    /// Fill `window` with the most recent samples, oldest first.
    fn read_latest(&mut self, handle: CaptureHandle, window: &mut [f32]) -> Result<()>;

    /// Stop recording. Stopping a stale handle is a no-op.
    fn stop_capture(&mut self, handle: CaptureHandle);
}

/// Poll `capture_position` until it reports data, giving up after `wait.max_attempts` checks.
///
/// Between checks we sleep for the poll interval (or yield when it is zero) so the host thread
/// is never spun hot.
pub fn wait_until_ready<D>(device: &D, handle: CaptureHandle, wait: &ReadyWait) -> Result<()>
where
    D: CaptureDevice + ?Sized,
{
    let interval = wait.poll_interval();

    for attempt in 1..=wait.max_attempts {
        if device.capture_position(handle)? > 0 {
            debug!(attempt, "capture device ready");
            return Ok(());
        }

        if attempt == wait.max_attempts {
            break;
        }

        if interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(interval);
        }
    }

    Err(Error::device(format!(
        "no samples after {} checks ({:?})",
        wait.max_attempts,
        wait.timeout()
    )))
}

/// Notices a live input that stops delivering samples without ever reporting an error.
///
/// Fed the device's running sample count on every read; fails once that count has not moved
/// for longer than the limit.
#[derive(Debug, Clone)]
pub struct StallWatch {
    limit: Option<Duration>,
    seen: u64,
    since: Instant,
}

impl StallWatch {
    /// `None` disables the check.
    pub fn new(limit: Option<Duration>, now: Instant) -> Self {
        Self {
            limit,
            seen: 0,
            since: now,
        }
    }

    pub fn check(&mut self, written: u64, now: Instant) -> Result<()> {
        if written != self.seen {
            self.seen = written;
            self.since = now;
            return Ok(());
        }

        let Some(limit) = self.limit else {
            return Ok(());
        };
        let idle = now.saturating_duration_since(self.since);
        if idle > limit {
            return Err(Error::device(format!(
                "input stalled: no samples for {idle:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::ScriptedDevice;

    fn quick_wait(max_attempts: u32) -> ReadyWait {
        ReadyWait {
            max_attempts,
            poll_interval_ms: 0,
        }
    }

    #[test]
    fn ready_wait_succeeds_once_position_moves() -> anyhow::Result<()> {
        let mut device = ScriptedDevice::new().with_startup_delay(3);
        device.push_constant(0.1, 16);
        let handle = device.start_capture(&CaptureSettings::default())?;

        wait_until_ready(&device, handle, &quick_wait(10))?;
        Ok(())
    }

    #[test]
    fn ready_wait_gives_up_after_bound() -> anyhow::Result<()> {
        let mut device = ScriptedDevice::new().with_startup_delay(50);
        let handle = device.start_capture(&CaptureSettings::default())?;

        let err = wait_until_ready(&device, handle, &quick_wait(5)).unwrap_err();
        assert!(err.is_device_unavailable());
        assert!(err.to_string().contains("5 checks"));
        Ok(())
    }

    #[test]
    fn ready_wait_propagates_device_errors() -> anyhow::Result<()> {
        let mut device = ScriptedDevice::new();
        let handle = device.start_capture(&CaptureSettings::default())?;
        device.disconnect();

        let err = wait_until_ready(&device, handle, &quick_wait(5)).unwrap_err();
        assert!(err.is_device_unavailable());
        Ok(())
    }

    #[test]
    fn stall_watch_fails_once_samples_stop_arriving() {
        let t0 = Instant::now();
        let limit = Duration::from_millis(500);
        let mut watch = StallWatch::new(Some(limit), t0);

        assert!(watch.check(256, t0 + Duration::from_millis(10)).is_ok());
        assert!(watch.check(512, t0 + Duration::from_millis(20)).is_ok());
        // Same count, but still inside the limit.
        assert!(watch.check(512, t0 + Duration::from_millis(400)).is_ok());

        let err = watch
            .check(512, t0 + Duration::from_millis(600))
            .unwrap_err();
        assert!(err.is_device_unavailable());
        assert!(err.to_string().contains("stalled"));

        // Samples flowing again clears the stall.
        assert!(watch.check(768, t0 + Duration::from_millis(700)).is_ok());
    }

    #[test]
    fn disabled_stall_watch_never_fails() {
        let t0 = Instant::now();
        let mut watch = StallWatch::new(None, t0);
        assert!(watch.check(0, t0 + Duration::from_secs(3_600)).is_ok());
    }
}
