use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use voxgate::devices::WavReplayDevice;
use voxgate::{CaptureDevice, DetectorConfig, JsonLinesSink, VoiceActivityDetector};

fn main() -> Result<()> {
    voxgate::init_logging();
    let params = Params::parse();

    if params.list_devices {
        return list_devices();
    }

    let config = build_config(&params)?;

    let stdout = io::stdout();
    let sink = JsonLinesSink::new(stdout.lock());

    if let Some(path) = &params.wav_path {
        let device = WavReplayDevice::open(path, params.tick_rate)
            .with_context(|| format!("failed to open WAV file '{}'", path.display()))?;
        let total = device.total_ticks() as u64;
        info!(ticks = total, "replaying WAV");

        let out = run(config, device, sink, &params, |vad| {
            vad.device().is_finished() || vad.ticks() >= total
        })?;
        return finish(out);
    }

    if params.mic {
        return run_microphone(config, sink, &params);
    }

    bail!("nothing to listen to: pass --wav <path> or --mic");
}

#[derive(Parser, Debug)]
#[command(name = "voxgate")]
#[command(about = "Detect speech start/stop from loudness and print events as JSON lines")]
struct Params {
    /// Replay a WAV file through the detector (as fast as possible).
    #[arg(short = 'w', long = "wav", conflicts_with = "mic")]
    wav_path: Option<PathBuf>,

    /// Listen on the default (or configured) input device in real time.
    #[arg(long = "mic", default_value_t = false)]
    mic: bool,

    /// Input device name for --mic (default: the host's default input).
    #[arg(short = 'd', long = "device")]
    device: Option<String>,

    /// Print the available input devices and exit.
    #[arg(long = "list-devices", default_value_t = false)]
    list_devices: bool,

    /// JSON config file; flags below override its values.
    #[arg(short = 'c', long = "config")]
    config_path: Option<PathBuf>,

    #[arg(long = "sensitivity")]
    sensitivity: Option<f32>,

    /// Smoothing weight of the previous tick, in [0, 0.95].
    #[arg(long = "weight")]
    smoothing_weight: Option<f32>,

    #[arg(short = 't', long = "threshold")]
    trigger_threshold: Option<f32>,

    /// Ticks between "still speaking?" re-checks.
    #[arg(short = 'i', long = "interval-ticks")]
    recheck_interval_ticks: Option<u32>,

    /// Samples read per tick.
    #[arg(long = "window")]
    window_size: Option<usize>,

    /// Ticks per second.
    #[arg(long = "tick-rate", default_value_t = 60)]
    tick_rate: u32,

    /// Stop live capture after this many seconds.
    #[arg(long = "seconds")]
    #[cfg_attr(not(feature = "microphone"), allow(dead_code))]
    seconds: Option<u64>,

    /// Emit a `loudness` record after every tick.
    #[arg(long = "trace", default_value_t = false)]
    trace: bool,
}

fn build_config(params: &Params) -> Result<DetectorConfig> {
    let mut config = match &params.config_path {
        Some(path) => DetectorConfig::from_json_file(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => DetectorConfig::default(),
    };

    if let Some(v) = params.sensitivity {
        config.sensitivity = v;
    }
    if let Some(v) = params.smoothing_weight {
        config.smoothing_weight = v;
    }
    if let Some(v) = params.trigger_threshold {
        config.trigger_threshold = v;
    }
    if let Some(v) = params.recheck_interval_ticks {
        config.recheck_interval_ticks = v;
    }
    if let Some(v) = params.window_size {
        config.window_size = v;
    }
    if let Some(name) = &params.device {
        config.capture.device = Some(name.clone());
    }

    config.validate().context("invalid detector configuration")?;
    Ok(config)
}

type Detector<D, W> = VoiceActivityDetector<D, JsonLinesSink<W>>;

fn run<D, W>(
    config: DetectorConfig,
    device: D,
    sink: JsonLinesSink<W>,
    params: &Params,
    mut done: impl FnMut(&Detector<D, W>) -> bool,
) -> Result<JsonLinesSink<W>>
where
    D: CaptureDevice,
    W: Write,
{
    let mut vad = VoiceActivityDetector::new(config, device, sink);
    vad.initialize().context("failed to start capture")?;

    while !done(&vad) {
        let tick = vad.ticks() + 1;
        vad.sink_mut().set_tick(tick);

        vad.tick().with_context(|| format!("detector failed on tick {tick}"))?;

        if params.trace {
            let loudness = vad.current_loudness();
            vad.sink_mut().record_loudness(loudness);
        }
    }

    let (_, sink) = vad.into_parts();
    Ok(sink)
}

#[cfg(feature = "microphone")]
fn run_microphone<W: Write>(
    config: DetectorConfig,
    sink: JsonLinesSink<W>,
    params: &Params,
) -> Result<()> {
    use std::time::{Duration, Instant};
    use voxgate::devices::MicrophoneDevice;
    use voxgate::pacer::TickPacer;

    let deadline = params
        .seconds
        .map(|s| Instant::now() + Duration::from_secs(s));
    let mut pacer = TickPacer::new(params.tick_rate);

    let out = run(config, MicrophoneDevice::new(), sink, params, |_| {
        pacer.wait();
        deadline.is_some_and(|d| Instant::now() >= d)
    })?;
    finish(out)
}

#[cfg(feature = "microphone")]
fn list_devices() -> Result<()> {
    for name in voxgate::devices::microphone::list_input_devices()? {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "microphone"))]
fn list_devices() -> Result<()> {
    bail!("this build has no microphone support; rebuild with `--features microphone`");
}

#[cfg(not(feature = "microphone"))]
fn run_microphone<W: Write>(
    _config: DetectorConfig,
    _sink: JsonLinesSink<W>,
    _params: &Params,
) -> Result<()> {
    bail!("this build has no microphone support; rebuild with `--features microphone`");
}

fn finish<W: Write>(sink: JsonLinesSink<W>) -> Result<()> {
    sink.finish().context("failed to write events")?;
    Ok(())
}
