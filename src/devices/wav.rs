use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::{info, warn};

use crate::config::CaptureSettings;
use crate::device::{CaptureDevice, CaptureHandle};
use crate::error::{Error, Result};
use crate::ring::RingBuffer;

/// Replays a recorded WAV file as if it were a live microphone.
///
/// Each `read_latest` call advances the recording by one tick's worth of audio
/// (`sample_rate / tick_rate` samples), so driving the detector at `tick_rate` reproduces
/// what it would have seen live. Restarting capture keeps the playback cursor where it is;
/// only the capture buffer is cleared, the same way a real device loses its buffer on restart.
///
/// Once the recording is exhausted the device keeps feeding silence and
/// [`WavReplayDevice::is_finished`] turns true.
#[derive(Debug)]
pub struct WavReplayDevice {
    samples: Vec<f32>,
    sample_rate: u32,
    samples_per_tick: usize,
    cursor: usize,
    ring: RingBuffer,
    generation: u64,
    active: Option<CaptureHandle>,
}

impl WavReplayDevice {
    /// Open a WAV file and replay it at `tick_rate` ticks per second.
    pub fn open(path: impl AsRef<Path>, tick_rate: u32) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file), tick_rate)
    }

    /// Decode WAV data from any reader.
    pub fn from_reader<R: Read>(reader: R, tick_rate: u32) -> Result<Self> {
        if tick_rate == 0 {
            return Err(Error::config("tick_rate must be non-zero"));
        }

        let (samples, sample_rate) = read_mono_samples(reader)?;
        Ok(Self::from_samples(samples, sample_rate, tick_rate))
    }

    /// Replay already-decoded mono samples.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, tick_rate: u32) -> Self {
        let samples_per_tick = (sample_rate as f32 / tick_rate.max(1) as f32).round() as usize;

        Self {
            samples,
            sample_rate,
            samples_per_tick: samples_per_tick.max(1),
            cursor: 0,
            ring: RingBuffer::new(1, true),
            generation: 0,
            active: None,
        }
    }

    /// Sample rate of the recording (Hz).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples_per_tick(&self) -> usize {
        self.samples_per_tick
    }

    /// Whether the whole recording has been fed into the capture buffer.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    /// Number of ticks needed to replay the whole recording.
    pub fn total_ticks(&self) -> usize {
        self.samples.len().div_ceil(self.samples_per_tick)
    }

    fn check_handle(&self, handle: CaptureHandle) -> Result<()> {
        match self.active {
            Some(active) if active == handle => Ok(()),
            Some(_) => Err(Error::device("stale capture handle for WAV replay")),
            None => Err(Error::device("WAV replay capture is not running")),
        }
    }

    // Feed the next tick of audio (or silence past the end) into the ring.
    fn advance(&mut self) {
        let end = (self.cursor + self.samples_per_tick).min(self.samples.len());
        if self.cursor < end {
            self.ring.write(&self.samples[self.cursor..end]);
        }

        let fed = end - self.cursor;
        if fed < self.samples_per_tick {
            let silence = vec![0.0; self.samples_per_tick - fed];
            self.ring.write(&silence);
        }
        self.cursor = end;
    }
}

impl CaptureDevice for WavReplayDevice {
    fn start_capture(&mut self, settings: &CaptureSettings) -> Result<CaptureHandle> {
        if settings.sample_rate != self.sample_rate {
            warn!(
                requested = settings.sample_rate,
                recording = self.sample_rate,
                "replaying WAV at its own sample rate"
            );
        }

        let capacity = settings.buffer_seconds as usize * self.sample_rate as usize;
        self.ring = RingBuffer::new(capacity, settings.looping);
        self.generation += 1;

        let handle = CaptureHandle::new(self.generation);
        self.active = Some(handle);

        // Prime the buffer so the device reports data right away, like a running microphone.
        self.advance();

        info!(
            generation = self.generation,
            cursor = self.cursor,
            "WAV replay capture started"
        );
        Ok(handle)
    }

    fn capture_position(&self, handle: CaptureHandle) -> Result<usize> {
        self.check_handle(handle)?;
        Ok(self.ring.position())
    }

    fn read_latest(&mut self, handle: CaptureHandle, window: &mut [f32]) -> Result<()> {
        self.check_handle(handle)?;
        self.advance();
        self.ring.latest(window);
        Ok(())
    }

    fn stop_capture(&mut self, handle: CaptureHandle) {
        if self.active == Some(handle) {
            self.active = None;
        }
    }
}

/// Decode a WAV stream into mono `f32` samples in `[-1.0, 1.0]`.
///
/// Multi-channel audio is downmixed by averaging each frame. Integer PCM of any bit depth and
/// 32-bit float are supported.
pub fn read_mono_samples<R: Read>(reader: R) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::new(reader)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(Error::Message("WAV header declares zero channels".into()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    Ok((downmix_to_mono(&interleaved, spec.channels as usize), spec.sample_rate))
}

fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
