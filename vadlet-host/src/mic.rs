//! Live microphone host via cpal.
//!
//! # Threading
//!
//! `cpal::Stream` is `!Send` on most platforms, so the stream is created and
//! dropped inside one `spawn_blocking` thread. That thread reports each real
//! bring-up step as a `HostSignal`:
//!
//! | Signal | Completed when |
//! |--------|----------------|
//! | `ContextCreated` | input device and config selected |
//! | `ThreadStarted` | input stream built |
//! | `ProcessorRegistered` | stream playing |
//! | `NodeCreated` | first buffer reached the callback |
//!
//! Once `Ready`, the engine itself moves into the callback through a bounded
//! crossbeam channel. The callback polls it with `try_recv`, so it never
//! blocks. On shutdown the callback hands the engine back the same way.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, Stream, StreamConfig,
};
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use vadlet_core::{
    AudioQuantum, ContextHandle, HostSignal, NodeHandle, VadletEngine, RENDER_QUANTUM_FRAMES,
};

use crate::settings::HostSettings;

/// How long to wait for the first buffer before failing node creation.
const FIRST_BUFFER_TIMEOUT: Duration = Duration::from_secs(2);

/// Re-blocks interleaved device buffers into planar render quanta.
struct QuantumAssembler {
    channels: usize,
    fill: usize,
    /// `channels * RENDER_QUANTUM_FRAMES`, planar.
    planar: Vec<f32>,
    engine: Option<VadletEngine>,
    engine_rx: Receiver<VadletEngine>,
    return_tx: Sender<VadletEngine>,
    stop: Arc<AtomicBool>,
    seen_audio: Arc<AtomicBool>,
}

impl QuantumAssembler {
    fn feed<T: Copy>(&mut self, data: &[T], to_f32: impl Fn(T) -> f32) {
        self.seen_audio.store(true, Ordering::Relaxed);

        if self.stop.load(Ordering::Relaxed) {
            if let Some(engine) = self.engine.take() {
                let _ = self.return_tx.try_send(engine);
            }
            return;
        }
        if self.engine.is_none() {
            self.engine = self.engine_rx.try_recv().ok();
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        for frame in data.chunks_exact(self.channels) {
            for (ch, sample) in frame.iter().enumerate() {
                self.planar[ch * RENDER_QUANTUM_FRAMES + self.fill] = to_f32(*sample);
            }
            self.fill += 1;
            if self.fill == RENDER_QUANTUM_FRAMES {
                let quantum = AudioQuantum::planar(&self.planar, self.channels);
                engine.process(Some(&quantum), None);
                self.fill = 0;
            }
        }
    }
}

struct Capture {
    _stream: Stream,
}

fn select_device(preferred: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) =
                    devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))
                {
                    return Ok(device);
                }
                warn!("preferred input device '{name}' not found, falling back");
            }
            Err(e) => warn!("failed to list input devices: {e}"),
        }
    }
    host.default_input_device()
        .ok_or_else(|| anyhow!("no default input device"))
}

/// Blocking-thread body. Returns the engine once the callback hands it back.
fn capture_thread(
    preferred: Option<String>,
    rate_tx: oneshot::Sender<std::result::Result<u32, String>>,
    signals: mpsc::Sender<HostSignal>,
    engine_rx: Receiver<VadletEngine>,
    stop: Arc<AtomicBool>,
) -> Option<VadletEngine> {
    let send = |signal: HostSignal| {
        if signals.blocking_send(signal).is_err() {
            warn!("engine stopped listening for host signals");
        }
    };

    let selected = select_device(preferred.as_deref()).and_then(|device| {
        let supported = device
            .default_input_config()
            .context("querying input config")?;
        Ok((device, supported))
    });
    let (device, supported) = match selected {
        Ok(found) => found,
        Err(e) => {
            let _ = rate_tx.send(Err(e.to_string()));
            send(HostSignal::ContextCreated(Err(e.to_string())));
            return None;
        }
    };

    let sample_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels().max(1));
    info!(
        device = device.name().unwrap_or_default().as_str(),
        sample_rate, channels, "input device selected"
    );
    let _ = rate_tx.send(Ok(sample_rate));
    let ctx = ContextHandle::new(1)?;
    send(HostSignal::ContextCreated(Ok(ctx)));

    let (return_tx, return_rx) = crossbeam_channel::bounded(1);
    let seen_audio = Arc::new(AtomicBool::new(false));
    let mut assembler = QuantumAssembler {
        channels,
        fill: 0,
        planar: vec![0f32; channels * RENDER_QUANTUM_FRAMES],
        engine: None,
        engine_rx,
        return_tx,
        stop: Arc::clone(&stop),
        seen_audio: Arc::clone(&seen_audio),
    };

    let config: StreamConfig = supported.config();
    let on_error = |err: cpal::StreamError| error!("audio stream error: {err}");
    let built = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _info| assembler.feed(data, |s| s),
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _info| assembler.feed(data, |s| s as f32 / 32_768.0),
            on_error,
            None,
        ),
        fmt => {
            send(HostSignal::ThreadStarted(Err(format!(
                "unsupported sample format: {fmt:?}"
            ))));
            return None;
        }
    };
    let stream = match built {
        Ok(stream) => stream,
        Err(e) => {
            send(HostSignal::ThreadStarted(Err(e.to_string())));
            return None;
        }
    };
    send(HostSignal::ThreadStarted(Ok(())));

    if let Err(e) = stream.play() {
        send(HostSignal::ProcessorRegistered(Err(e.to_string())));
        return None;
    }
    let capture = Capture { _stream: stream };
    send(HostSignal::ProcessorRegistered(Ok(())));

    let started = Instant::now();
    while !seen_audio.load(Ordering::Relaxed) {
        if started.elapsed() > FIRST_BUFFER_TIMEOUT || stop.load(Ordering::Relaxed) {
            send(HostSignal::NodeCreated(Err("no audio delivered".into())));
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if let Some(node) = NodeHandle::new(1) {
        send(HostSignal::NodeCreated(Ok(node)));
    }

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(20));
    }
    let engine = return_rx.recv_timeout(Duration::from_secs(1)).ok();
    drop(capture);
    engine
}

/// `vadlet mic --seconds <n>`.
pub async fn run_mic(settings: &HostSettings, seconds: u64) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let (rate_tx, rate_rx) = oneshot::channel();
    let (signal_tx, mut signals) = mpsc::channel(4);
    let (engine_tx, engine_rx) = crossbeam_channel::bounded(1);

    let thread_stop = Arc::clone(&stop);
    let preferred = settings.preferred_input_device.clone();
    let capture = tokio::task::spawn_blocking(move || {
        capture_thread(preferred, rate_tx, signal_tx, engine_rx, thread_stop)
    });

    let sample_rate = rate_rx
        .await
        .context("capture thread exited early")?
        .map_err(|e| anyhow!("opening input: {e}"))?;

    let mut config = settings.engine_config();
    config.input_sample_rate = sample_rate;
    let (mut engine, events) = VadletEngine::new(config)?;
    let listener = events.spawn_listener(|event| match serde_json::to_string(&event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("event not serialisable: {e}"),
    })?;

    let bring_up = async {
        engine.warm_up()?;
        engine.run_lifecycle(&mut signals).await
    };
    if let Err(e) = bring_up.await {
        stop.store(true, Ordering::Relaxed);
        let _ = capture.await;
        return Err(e.into());
    }
    info!(status = ?engine.status(), "listening for {seconds}s");

    engine_tx
        .send(engine)
        .map_err(|_| anyhow!("audio callback is gone"))?;
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    stop.store(true, Ordering::Relaxed);

    match capture.await.context("capture thread")? {
        Some(mut engine) => {
            engine.cleanup();
            info!(diagnostics = ?engine.diagnostics(), "session finished");
        }
        None => warn!("engine was not returned by the audio callback"),
    }
    listener
        .join()
        .map_err(|_| anyhow!("event listener panicked"))?;
    Ok(())
}
