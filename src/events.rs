//! Detector output: the event sink trait and a few ready-made sinks.
//!
//! Sinks are called synchronously from `tick()`, so they must return quickly. The channel and
//! log sinks never block; the JSON-lines sink writes through a `BufWriter` and is meant for
//! CLI output.

use std::io::{BufWriter, Write};
use std::sync::mpsc;

use serde::Serialize;

use crate::error::Error;

/// Receives speech transitions (and device trouble) from a detector.
pub trait EventSink {
    fn on_speech_start(&mut self);

    fn on_speech_stop(&mut self);

    /// Called when the capture device fails during `tick()` or during the automatic re-arm.
    ///
    /// Returning `true` tells the detector to stop capturing; it will then refuse to tick until
    /// re-initialized. Returning `false` leaves the capture session as is.
    fn on_device_error(&mut self, _err: &Error) -> bool {
        true
    }

    /// Called after the detector restarted capture at the end of an utterance.
    fn on_device_restart(&mut self) {}
}

/// Discrete transitions reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechEvent {
    SpeechStart,
    SpeechStop,
}

/// Sink that records every event in order.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<SpeechEvent>,
    device_errors: Vec<String>,
    restarts: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SpeechEvent] {
        &self.events
    }

    pub fn count(&self, event: SpeechEvent) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }

    pub fn device_errors(&self) -> &[String] {
        &self.device_errors
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.device_errors.clear();
        self.restarts = 0;
    }
}

impl EventSink for EventLog {
    fn on_speech_start(&mut self) {
        self.events.push(SpeechEvent::SpeechStart);
    }

    fn on_speech_stop(&mut self) {
        self.events.push(SpeechEvent::SpeechStop);
    }

    fn on_device_error(&mut self, err: &Error) -> bool {
        self.device_errors.push(err.to_string());
        true
    }

    fn on_device_restart(&mut self) {
        self.restarts += 1;
    }
}

/// Forwards events over an unbounded `std::sync::mpsc` channel.
///
/// Sending never blocks. Events are dropped once the receiver hangs up.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SpeechEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<SpeechEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_speech_start(&mut self) {
        let _ = self.tx.send(SpeechEvent::SpeechStart);
    }

    fn on_speech_stop(&mut self) {
        let _ = self.tx.send(SpeechEvent::SpeechStop);
    }
}

/// One JSON-lines record.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub tick: u64,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loudness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Writes one JSON object per line.
///
/// The sink does not know the detector's clock; owners call [`JsonLinesSink::set_tick`] before
/// each tick so records carry it. Write failures are remembered and surfaced by
/// [`JsonLinesSink::finish`] rather than interrupting detection.
pub struct JsonLinesSink<W: Write> {
    w: BufWriter<W>,
    tick: u64,
    write_error: Option<std::io::Error>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(w: W) -> Self {
        Self {
            w: BufWriter::new(w),
            tick: 0,
            write_error: None,
        }
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Write a loudness sample for the current tick.
    pub fn record_loudness(&mut self, loudness: f32) {
        self.emit("loudness", Some(loudness), None);
    }

    /// Flush buffered output and report the first write error, if any.
    pub fn finish(mut self) -> crate::Result<W> {
        if let Some(err) = self.write_error.take() {
            return Err(err.into());
        }
        self.w
            .into_inner()
            .map_err(|e| Error::from(e.into_error()))
    }

    fn emit(&mut self, event: &'static str, loudness: Option<f32>, error: Option<String>) {
        if self.write_error.is_some() {
            return;
        }

        let record = EventRecord {
            tick: self.tick,
            event,
            loudness,
            error,
        };

        let res = serde_json::to_writer(&mut self.w, &record)
            .map_err(std::io::Error::from)
            .and_then(|()| self.w.write_all(b"\n"));
        if let Err(err) = res {
            self.write_error = Some(err);
        }
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn on_speech_start(&mut self) {
        self.emit("speech_start", None, None);
    }

    fn on_speech_stop(&mut self) {
        self.emit("speech_stop", None, None);
    }

    fn on_device_error(&mut self, err: &Error) -> bool {
        self.emit("device_error", None, Some(err.to_string()));
        true
    }

    fn on_device_restart(&mut self) {
        self.emit("device_restart", None, None);
    }
}
