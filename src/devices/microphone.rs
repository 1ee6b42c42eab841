//! Live capture from a system input device via cpal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::config::CaptureSettings;
use crate::device::{CaptureDevice, CaptureHandle, StallWatch};
use crate::error::{Error, Result};
use crate::ring::RingBuffer;

/// List the names of the host's input devices.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::device(format!("failed to enumerate input devices: {e}")))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Microphone capture device.
///
/// The cpal callback downmixes each buffer to mono and writes it into a ring shared with the
/// detector's thread. A stream error flips the device into the unavailable state; the next
/// position query or read reports it. A stream that silently stops calling back is caught by a
/// [`StallWatch`] on reads, bounded by `CaptureSettings::stall_timeout_ms`.
///
/// `cpal::Stream` is not `Send`, so this device must stay on the thread that created it.
pub struct MicrophoneDevice {
    stream: Option<Stream>,
    ring: Arc<Mutex<RingBuffer>>,
    failed: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
    stall: StallWatch,
    sample_rate: u32,
    generation: u64,
    active: Option<CaptureHandle>,
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self {
            stream: None,
            ring: Arc::new(Mutex::new(RingBuffer::new(1, true))),
            failed: Arc::new(AtomicBool::new(false)),
            written: Arc::new(AtomicU64::new(0)),
            stall: StallWatch::new(None, Instant::now()),
            sample_rate: 0,
            generation: 0,
            active: None,
        }
    }

    /// Sample rate the running stream actually captures at (Hz). `0` before the first start.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn check_handle(&self, handle: CaptureHandle) -> Result<()> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(Error::device("input stream reported an error"));
        }
        match self.active {
            Some(active) if active == handle => Ok(()),
            Some(_) => Err(Error::device("stale microphone capture handle")),
            None => Err(Error::device("microphone capture is not running")),
        }
    }

    fn lock_ring(&self) -> Result<MutexGuard<'_, RingBuffer>> {
        self.ring
            .lock()
            .map_err(|_| Error::device("microphone buffer mutex poisoned"))
    }
}

impl CaptureDevice for MicrophoneDevice {
    fn start_capture(&mut self, settings: &CaptureSettings) -> Result<CaptureHandle> {
        // Drop the previous stream before opening a new one on the same device.
        self.stream = None;
        self.active = None;

        let host = cpal::default_host();
        let device = match settings.device.as_deref() {
            None | Some("default") => host
                .default_input_device()
                .ok_or_else(|| Error::device("no default input device"))?,
            Some(name) => find_device_by_name(&host, name)?,
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let requested = SampleRate(settings.sample_rate);

        let supported = match device.supported_input_configs() {
            Ok(mut ranges) => ranges
                .find(|r| r.min_sample_rate() <= requested && r.max_sample_rate() >= requested)
                .map(|r| r.with_sample_rate(requested)),
            Err(_) => None,
        };
        let supported = match supported {
            Some(s) => s,
            None => {
                let fallback = device
                    .default_input_config()
                    .map_err(|e| Error::device(format!("no usable input config: {e}")))?;
                warn!(
                    requested = settings.sample_rate,
                    actual = fallback.sample_rate().0,
                    "requested sample rate unsupported; using device default"
                );
                fallback
            }
        };

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        self.sample_rate = config.sample_rate.0;

        let capacity = settings.buffer_seconds as usize * self.sample_rate as usize;
        self.ring = Arc::new(Mutex::new(RingBuffer::new(capacity, settings.looping)));
        self.failed = Arc::new(AtomicBool::new(false));
        self.written = Arc::new(AtomicU64::new(0));

        let shared = Shared {
            ring: Arc::clone(&self.ring),
            failed: Arc::clone(&self.failed),
            written: Arc::clone(&self.written),
        };
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, shared),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, shared),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, shared),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, shared),
            other => {
                return Err(Error::device(format!(
                    "unsupported input sample format: {other:?}"
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| Error::device(format!("failed to start input stream: {e}")))?;

        self.generation += 1;
        let handle = CaptureHandle::new(self.generation);
        self.stream = Some(stream);
        self.active = Some(handle);
        self.stall = StallWatch::new(settings.stall_timeout(), Instant::now());

        info!(
            device = %device_name,
            sample_rate = self.sample_rate,
            channels = config.channels,
            "microphone capture started"
        );
        Ok(handle)
    }

    fn capture_position(&self, handle: CaptureHandle) -> Result<usize> {
        self.check_handle(handle)?;
        Ok(self.lock_ring()?.position())
    }

    fn read_latest(&mut self, handle: CaptureHandle, window: &mut [f32]) -> Result<()> {
        self.check_handle(handle)?;
        self.stall
            .check(self.written.load(Ordering::Relaxed), Instant::now())?;
        self.lock_ring()?.latest(window);
        Ok(())
    }

    fn stop_capture(&mut self, handle: CaptureHandle) {
        if self.active == Some(handle) {
            self.active = None;
            self.stream = None;
            debug!(generation = handle.generation(), "microphone capture stopped");
        }
    }
}

fn find_device_by_name(host: &cpal::Host, name: &str) -> Result<Device> {
    let devices = host
        .input_devices()
        .map_err(|e| Error::device(format!("failed to enumerate input devices: {e}")))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name.contains(name) || name.contains(&device_name) {
                return Ok(device);
            }
        }
    }

    Err(Error::device(format!("no input device matching '{name}'")))
}

// State the audio callback shares with the device.
struct Shared {
    ring: Arc<Mutex<RingBuffer>>,
    failed: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
}

fn build_stream<T>(device: &Device, config: &StreamConfig, shared: Shared) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let Shared {
        ring,
        failed,
        written,
    } = shared;
    let mut mono = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / frame.len() as f32
                }));
                if let Ok(mut ring) = ring.lock() {
                    ring.write(&mono);
                }
                written.fetch_add(mono.len() as u64, Ordering::Relaxed);
            },
            move |err| {
                error!(error = %err, "input stream error");
                failed.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::device(format!("failed to build input stream: {e}")))
}
