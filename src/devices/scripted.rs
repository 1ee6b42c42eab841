use std::cell::Cell;
use std::collections::VecDeque;

use crate::config::CaptureSettings;
use crate::device::{CaptureDevice, CaptureHandle};
use crate::error::{Error, Result};
use crate::ring::RingBuffer;

/// Deterministic in-memory capture device.
///
/// Each `read_latest` call feeds the next queued frame into the capture ring, so one queued
/// frame corresponds to one detector tick. When the queue runs dry the last frame keeps
/// repeating, which models a steady input level.
///
/// The device can also simulate a missing microphone, a mid-session disconnect, and a slow
/// start (position stays at zero for a number of checks).
#[derive(Debug)]
pub struct ScriptedDevice {
    frames: VecDeque<Vec<f32>>,
    last_frame: Option<Vec<f32>>,
    ring: RingBuffer,
    present: bool,
    connected: bool,
    startup_delay: u32,
    startup_remaining: Cell<u32>,
    generation: u64,
    active: Option<CaptureHandle>,
    starts: usize,
    stops: usize,
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            last_frame: None,
            ring: RingBuffer::new(1, true),
            present: true,
            connected: true,
            startup_delay: 0,
            startup_remaining: Cell::new(0),
            generation: 0,
            active: None,
            starts: 0,
            stops: 0,
        }
    }

    /// Report a zero position for the first `checks` position queries after every start.
    pub fn with_startup_delay(mut self, checks: u32) -> Self {
        self.startup_delay = checks;
        self
    }

    /// A device with no microphone behind it: every start fails.
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new()
        }
    }

    /// Queue one frame of raw samples.
    pub fn push_frame(&mut self, frame: impl Into<Vec<f32>>) {
        self.frames.push_back(frame.into());
    }

    /// Queue one frame of `len` identical samples.
    pub fn push_constant(&mut self, amplitude: f32, len: usize) {
        self.push_frame(vec![amplitude; len]);
    }

    /// Queue `count` frames of `len` identical samples.
    pub fn push_constant_frames(&mut self, amplitude: f32, len: usize, count: usize) {
        for _ in 0..count {
            self.push_constant(amplitude, len);
        }
    }

    /// Frames still waiting to be read.
    pub fn queued(&self) -> usize {
        self.frames.len()
    }

    /// Simulate the device being unplugged. Every call on an existing session fails afterwards.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.present = false;
    }

    /// Plug the device back in. Existing sessions stay dead; a new start is required.
    pub fn reconnect(&mut self) {
        self.present = true;
    }

    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    /// Number of successful `start_capture` calls.
    pub fn start_count(&self) -> usize {
        self.starts
    }

    /// Number of `stop_capture` calls that ended a live session.
    pub fn stop_count(&self) -> usize {
        self.stops
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    fn check_handle(&self, handle: CaptureHandle) -> Result<()> {
        if !self.connected {
            return Err(Error::device("scripted device disconnected"));
        }
        match self.active {
            Some(active) if active == handle => Ok(()),
            Some(_) => Err(Error::device(format!(
                "stale capture handle (generation {})",
                handle.generation()
            ))),
            None => Err(Error::device("capture is not running")),
        }
    }

    fn pending_len(&self) -> usize {
        self.frames
            .front()
            .or(self.last_frame.as_ref())
            .map_or(0, Vec::len)
    }
}

impl CaptureDevice for ScriptedDevice {
    fn start_capture(&mut self, settings: &CaptureSettings) -> Result<CaptureHandle> {
        if !self.present {
            return Err(Error::device("no scripted capture device present"));
        }

        self.connected = true;
        self.generation += 1;
        self.starts += 1;
        self.ring = RingBuffer::new(settings.buffer_len(), settings.looping);
        self.startup_remaining.set(self.startup_delay);

        let handle = CaptureHandle::new(self.generation);
        self.active = Some(handle);
        Ok(handle)
    }

    fn capture_position(&self, handle: CaptureHandle) -> Result<usize> {
        self.check_handle(handle)?;

        let remaining = self.startup_remaining.get();
        if remaining > 0 {
            self.startup_remaining.set(remaining - 1);
            return Ok(0);
        }

        if self.ring.has_data() {
            return Ok(self.ring.position());
        }
        Ok(self.pending_len())
    }

    fn read_latest(&mut self, handle: CaptureHandle, window: &mut [f32]) -> Result<()> {
        self.check_handle(handle)?;

        if let Some(frame) = self.frames.pop_front() {
            self.ring.write(&frame);
            self.last_frame = Some(frame);
        } else if let Some(frame) = &self.last_frame {
            self.ring.write(frame);
        }

        self.ring.latest(window);
        Ok(())
    }

    fn stop_capture(&mut self, handle: CaptureHandle) {
        if self.active == Some(handle) {
            self.active = None;
            self.stops += 1;
        }
    }
}
