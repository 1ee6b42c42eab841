/// Live microphone capture (cpal).
#[cfg(feature = "microphone")]
pub mod microphone;

/// Deterministic in-memory device for tests and simulations.
pub mod scripted;

/// Offline replay of recorded WAV files.
pub mod wav;

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneDevice;
pub use scripted::ScriptedDevice;
pub use wav::WavReplayDevice;
