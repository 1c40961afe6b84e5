//! Simulated host: asynchronous bring-up followed by offline rendering.
//!
//! A tokio task plays the host's role in the bootstrap, completing each stage
//! after a short delay. Once the engine is `Ready` the clip is cut into render
//! quanta and processed on a blocking thread, the way an audio thread would
//! call the processor.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vadlet_core::engine::pipeline::DiagnosticsSnapshot;
use vadlet_core::{
    AudioContextControl, AudioQuantum, AudioQuantumMut, ContextHandle, HostSignal, NodeHandle,
    VadletEngine, WorkletEvent,
};

use crate::settings::HostSettings;
use crate::wav;

/// Audio context stand-in. Starts suspended, like a context created without
/// a user gesture.
#[derive(Debug, Default)]
pub struct SimulatedContext {
    running: bool,
    resumes: usize,
}

impl SimulatedContext {
    pub fn resumes(&self) -> usize {
        self.resumes
    }
}

impl AudioContextControl for SimulatedContext {
    fn is_running(&self, _ctx: ContextHandle) -> bool {
        self.running
    }

    fn resume(&mut self, ctx: ContextHandle) -> vadlet_core::error::Result<()> {
        self.running = true;
        self.resumes += 1;
        info!(context = ctx.get(), "simulated context resumed");
        Ok(())
    }
}

/// Complete the four host stages, one every `delay`.
pub fn spawn_host(tx: mpsc::Sender<HostSignal>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (Some(ctx), Some(node)) = (ContextHandle::new(1), NodeHandle::new(1)) else {
            return;
        };
        let signals = [
            HostSignal::ContextCreated(Ok(ctx)),
            HostSignal::ThreadStarted(Ok(())),
            HostSignal::ProcessorRegistered(Ok(())),
            HostSignal::NodeCreated(Ok(node)),
        ];
        for signal in signals {
            tokio::time::sleep(delay).await;
            if tx.send(signal).await.is_err() {
                warn!("engine stopped listening for host signals");
                return;
            }
        }
    })
}

/// Drive `engine` to `Ready`, honouring the configured init timeout.
pub async fn bring_up(engine: &mut VadletEngine, settings: &HostSettings) -> Result<()> {
    engine.warm_up()?;

    let (tx, mut rx) = mpsc::channel(4);
    let host = spawn_host(tx, Duration::from_millis(settings.stage_delay_ms));

    let lifecycle = engine.run_lifecycle(&mut rx);
    if settings.init_timeout_ms > 0 {
        let timeout = Duration::from_millis(settings.init_timeout_ms);
        tokio::time::timeout(timeout, lifecycle)
            .await
            .map_err(|_| anyhow!("engine not ready after {timeout:?}"))??;
    } else {
        lifecycle.await?;
    }

    host.await.context("host task")?;
    Ok(())
}

/// Feed `samples` (mono, context rate) through `engine` one quantum at a time.
pub fn render(engine: &mut VadletEngine, samples: &[f32], quantum_frames: usize) {
    let mut output = vec![0f32; quantum_frames];
    for chunk in samples.chunks(quantum_frames.max(1)) {
        let input = AudioQuantum::planar(chunk, 1);
        let mut out = AudioQuantumMut::planar(&mut output[..chunk.len()], 1);
        engine.process(Some(&input), Some(&mut out));
    }
}

/// Run a complete session over `samples` and return the final counters.
///
/// Every event is handed to `on_event` on the listener thread.
pub async fn run_samples<F>(
    settings: &HostSettings,
    samples: Vec<f32>,
    on_event: F,
) -> Result<DiagnosticsSnapshot>
where
    F: FnMut(WorkletEvent) + Send + 'static,
{
    let config = settings.engine_config();
    let quantum_frames = config.render_quantum_frames;
    let (mut engine, events) = VadletEngine::new(config)?;
    let listener = events.spawn_listener(on_event)?;

    bring_up(&mut engine, settings).await?;

    let mut context = SimulatedContext::default();
    engine.resume(&mut context)?;
    info!(status = ?engine.status(), resumes = context.resumes(), "engine ready");

    let mut engine = tokio::task::spawn_blocking(move || {
        render(&mut engine, &samples, quantum_frames);
        engine
    })
    .await
    .context("render thread")?;

    engine.cleanup();
    let diagnostics = engine.diagnostics();
    drop(engine);
    listener
        .join()
        .map_err(|_| anyhow!("event listener panicked"))?;
    Ok(diagnostics)
}

/// `vadlet wav <path>`: print every event as a JSON line.
pub async fn run_wav(settings: &HostSettings, path: &Path) -> Result<()> {
    let clip = wav::load_mono(path)?;
    let samples = wav::convert_clip(&clip, settings.context_sample_rate)?;

    let diagnostics = run_samples(settings, samples, |event| {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("event not serialisable: {e}"),
        }
    })
    .await?;

    info!(
        diagnostics = %serde_json::to_string(&diagnostics)?,
        "session finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    fn fast_settings() -> HostSettings {
        let mut settings = HostSettings {
            backend: "energy".into(),
            stage_delay_ms: 1,
            ..HostSettings::default()
        };
        settings.normalize();
        settings
    }

    #[tokio::test]
    async fn tone_then_silence_produces_ordered_decisions() {
        let settings = fast_settings();
        // 0.2 s of loud tone then 0.2 s of silence at 48 kHz.
        let mut samples: Vec<f32> = (0..9_600)
            .map(|i| 0.5 * (i as f32 * 2.0 * std::f32::consts::PI * 220.0 / 48_000.0).sin())
            .collect();
        samples.extend(std::iter::repeat(0.0).take(9_600));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let diagnostics = run_samples(&settings, samples, move |event| {
            if let WorkletEvent::Decision(d) = event {
                sink.lock().push(d);
            }
        })
        .await
        .expect("session");

        let decisions = seen.lock();
        assert!(!decisions.is_empty());
        assert!(decisions.windows(2).all(|w| w[1].seq == w[0].seq + 1));
        assert!(decisions.first().is_some_and(|d| d.is_voice()));
        assert!(decisions.last().is_some_and(|d| !d.is_voice()));
        assert_eq!(diagnostics.decisions_posted, decisions.len());
        assert_eq!(diagnostics.decisions_dropped, 0);
    }

    #[tokio::test]
    async fn bring_up_times_out_without_host_completions() {
        let settings = HostSettings {
            backend: "energy".into(),
            init_timeout_ms: 20,
            stage_delay_ms: 1_000,
            ..HostSettings::default()
        };
        let (mut engine, _events) =
            VadletEngine::new(settings.engine_config()).expect("engine");
        let err = bring_up(&mut engine, &settings)
            .await
            .expect_err("timeout");
        assert!(err.to_string().contains("not ready"));
    }

    #[test]
    fn simulated_context_counts_resumes() {
        let mut ctx = SimulatedContext::default();
        let handle = ContextHandle::new(1).expect("ctx");
        assert!(!ctx.is_running(handle));
        ctx.resume(handle).expect("resume");
        assert!(ctx.is_running(handle));
        assert_eq!(ctx.resumes(), 1);
    }
}
