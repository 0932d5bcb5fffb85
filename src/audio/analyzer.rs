//! Amplitude analysis and voice activity detection over a live source.
//!
//! Attaching a source starts a sampling worker thread that drains the
//! source's blocks. Each block yields an [`AmplitudeSample`]: raw RMS, an
//! attack/release smoothed level for lip-sync, three spectral bands, and the
//! VAD state. Speech start/end notifications are edge-triggered.
//!
//! The render loop reads results through an [`AmplitudeProbe`], a lock-free
//! handle that never blocks on the audio side.

use super::spectrum::{SpectrumAnalyzer, SpectrumBands};
use super::{AudioSource, SampleBlock, SourceKind};
use crate::config::AnalyzerConfig;
use crate::error::{Result, VisageError};
use crate::vad::{VadEdge, VoiceActivityDetector, compute_rms_energy};
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Analysis result for one block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmplitudeSample {
    /// Root mean square of the block, 0..1 for samples in \[-1, 1\].
    pub rms: f32,
    /// Smoothed RMS used to drive the mouth.
    pub level: f32,
    pub bands: SpectrumBands,
    /// VAD state after this block.
    pub speech_active: bool,
}

type Notify = Box<dyn Fn() + Send + Sync>;
type SampleListener = Box<dyn Fn(&AmplitudeSample) + Send + Sync>;

/// Callbacks fired from the sampling worker.
#[derive(Default)]
pub struct VadEvents {
    on_speech_start: Option<Notify>,
    on_speech_end: Option<Notify>,
    on_sample: Option<SampleListener>,
}

impl VadEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired once per silence→speech crossing.
    pub fn on_speech_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_speech_start = Some(Box::new(f));
        self
    }

    /// Fired once per speech→silence crossing, and on detach mid-speech.
    pub fn on_speech_end(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_speech_end = Some(Box::new(f));
        self
    }

    /// Fired for every analysed block.
    pub fn on_sample(mut self, f: impl Fn(&AmplitudeSample) + Send + Sync + 'static) -> Self {
        self.on_sample = Some(Box::new(f));
        self
    }

    fn fire(&self, edge: VadEdge) {
        let callback = match edge {
            VadEdge::SpeechStart => &self.on_speech_start,
            VadEdge::SpeechEnd => &self.on_speech_end,
        };
        if let Some(f) = callback {
            f();
        }
    }
}

#[derive(Default)]
struct ProbeInner {
    level: AtomicU32,
    rms: AtomicU32,
    low: AtomicU32,
    mid: AtomicU32,
    high: AtomicU32,
    active: AtomicBool,
    speech: AtomicBool,
}

/// Cheap, cloneable read side of an analyzer.
#[derive(Clone, Default)]
pub struct AmplitudeProbe {
    inner: Arc<ProbeInner>,
}

impl AmplitudeProbe {
    /// Smoothed level, or `None` while no source is attached.
    pub fn level(&self) -> Option<f32> {
        self.is_active()
            .then(|| f32::from_bits(self.inner.level.load(Ordering::Acquire)))
    }

    pub fn rms(&self) -> f32 {
        f32::from_bits(self.inner.rms.load(Ordering::Acquire))
    }

    /// Spectral bands of the latest block, or `None` while detached.
    pub fn bands(&self) -> Option<SpectrumBands> {
        let load = |bits: &AtomicU32| f32::from_bits(bits.load(Ordering::Acquire));
        self.is_active().then(|| SpectrumBands {
            low: load(&self.inner.low),
            mid: load(&self.inner.mid),
            high: load(&self.inner.high),
        })
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn is_speech_active(&self) -> bool {
        self.inner.speech.load(Ordering::Acquire)
    }

    fn publish(&self, sample: &AmplitudeSample) {
        self.inner.level.store(sample.level.to_bits(), Ordering::Release);
        self.inner.rms.store(sample.rms.to_bits(), Ordering::Release);
        self.inner.low.store(sample.bands.low.to_bits(), Ordering::Release);
        self.inner.mid.store(sample.bands.mid.to_bits(), Ordering::Release);
        self.inner.high.store(sample.bands.high.to_bits(), Ordering::Release);
        self.inner.speech.store(sample.speech_active, Ordering::Release);
    }

    fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::Release);
    }

    fn clear(&self) {
        self.publish(&AmplitudeSample::default());
        self.set_active(false);
    }
}

struct Analysis {
    vad: VoiceActivityDetector,
    spectrum: SpectrumAnalyzer,
    smoothed: f32,
    latest: AmplitudeSample,
}

struct Shared {
    config: AnalyzerConfig,
    analysis: Mutex<Analysis>,
    probe: AmplitudeProbe,
    events: VadEvents,
}

impl Shared {
    fn process(&self, samples: &[f32]) -> Option<AmplitudeSample> {
        let rms = compute_rms_energy(samples);
        if !rms.is_finite() {
            debug!("non-finite block dropped");
            return None;
        }

        // Edges fire under the analysis lock so concurrent callers observe
        // start and end in the order the detector produced them.
        let sample = {
            let Ok(mut analysis) = self.analysis.lock() else {
                warn!("analysis state lock poisoned, block dropped");
                return None;
            };
            let alpha = if rms > analysis.smoothed {
                self.config.attack
            } else {
                self.config.release
            }
            .clamp(0.0, 1.0);
            analysis.smoothed = alpha * rms + (1.0 - alpha) * analysis.smoothed;

            let edge = analysis.vad.update(rms);
            let sample = AmplitudeSample {
                rms,
                level: analysis.smoothed.min(1.0),
                bands: analysis.spectrum.bands(samples),
                speech_active: analysis.vad.is_active(),
            };
            analysis.latest = sample;
            self.probe.publish(&sample);
            if let Some(edge) = edge {
                debug!(?edge, rms, "voice activity edge");
                self.events.fire(edge);
            }
            sample
        };

        if let Some(f) = &self.events.on_sample {
            f(&sample);
        }
        Some(sample)
    }

    /// Return to the detached state, closing an open speech segment.
    fn finish(&self) {
        let Ok(mut analysis) = self.analysis.lock() else {
            self.probe.clear();
            return;
        };
        analysis.smoothed = 0.0;
        analysis.latest = AmplitudeSample::default();
        let was_speaking = analysis.vad.reset();
        self.probe.clear();
        if was_speaking {
            self.events.fire(VadEdge::SpeechEnd);
        }
    }
}

struct Binding {
    source: Box<dyn AudioSource>,
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

/// Samples one live audio source at a time.
pub struct AmplitudeAnalyzer {
    queue_depth: usize,
    shared: Arc<Shared>,
    binding: Option<Binding>,
}

impl AmplitudeAnalyzer {
    pub fn new(config: AnalyzerConfig, queue_depth: usize, events: VadEvents) -> Self {
        let analysis = Analysis {
            vad: VoiceActivityDetector::new(config.threshold),
            spectrum: SpectrumAnalyzer::new(config.fft_size),
            smoothed: 0.0,
            latest: AmplitudeSample::default(),
        };
        Self {
            queue_depth: queue_depth.max(1),
            shared: Arc::new(Shared {
                config,
                analysis: Mutex::new(analysis),
                probe: AmplitudeProbe::default(),
                events,
            }),
            binding: None,
        }
    }

    /// Bind to `source` and start sampling.
    ///
    /// Any previous source is detached first. On failure the analyzer stays
    /// detached and the error is returned for the caller to surface.
    ///
    /// # Errors
    ///
    /// Returns [`VisageError::Audio`] if the source cannot be opened or the
    /// sampling worker cannot be spawned.
    pub fn attach(&mut self, mut source: Box<dyn AudioSource>) -> Result<()> {
        self.detach();

        let label = source.describe();
        let (block_tx, block_rx) = bounded::<SampleBlock>(self.queue_depth);
        if let Err(e) = source.open(block_tx) {
            warn!(source = %label, error = %e, "audio source unavailable");
            return Err(e);
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("visage-analyzer".to_owned())
            .spawn(move || sampling_loop(&shared, &block_rx, &stop_rx));

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                source.close();
                return Err(VisageError::Audio(format!(
                    "failed to spawn sampling thread: {e}"
                )));
            }
        };

        self.shared.probe.set_active(true);
        info!(source = %label, "amplitude analyzer attached");
        self.binding = Some(Binding {
            source,
            stop_tx,
            worker: Some(worker),
        });
        Ok(())
    }

    /// Stop sampling and release the source. No-op when detached.
    pub fn detach(&mut self) {
        let Some(mut binding) = self.binding.take() else {
            return;
        };
        let _ = binding.stop_tx.send(());
        binding.source.close();
        if let Some(worker) = binding.worker.take()
            && worker.join().is_err()
        {
            warn!("sampling thread panicked");
        }
        self.shared.finish();
        info!(source = %binding.source.describe(), "amplitude analyzer detached");
    }

    pub fn is_active(&self) -> bool {
        self.binding.is_some()
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.binding.as_ref().map(|b| b.source.kind())
    }

    /// Result of the most recent block.
    pub fn latest(&self) -> AmplitudeSample {
        self.shared
            .analysis
            .lock()
            .map(|a| a.latest)
            .unwrap_or_default()
    }

    pub fn probe(&self) -> AmplitudeProbe {
        self.shared.probe.clone()
    }

    pub fn threshold(&self) -> f32 {
        self.shared.config.threshold
    }

    /// Analyse one block synchronously, as the sampling worker does.
    ///
    /// Safe to call alongside the worker. Speech callbacks run while the
    /// analysis state is locked and must not call back into the analyzer.
    pub fn process_block(&self, samples: &[f32]) -> Option<AmplitudeSample> {
        self.shared.process(samples)
    }
}

impl Drop for AmplitudeAnalyzer {
    fn drop(&mut self) {
        self.detach();
    }
}

fn sampling_loop(shared: &Shared, blocks: &Receiver<SampleBlock>, stop: &Receiver<()>) {
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(blocks) -> msg => match msg {
                Ok(block) => {
                    shared.process(&block);
                }
                Err(_) => {
                    debug!("audio source disconnected");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::audio::tap::PlaybackTap;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn block(amplitude: f32) -> Vec<f32> {
        (0..256)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    struct DeniedMic;

    impl AudioSource for DeniedMic {
        fn kind(&self) -> SourceKind {
            SourceKind::Microphone
        }
        fn describe(&self) -> String {
            "denied mic".to_owned()
        }
        fn open(&mut self, _tx: Sender<SampleBlock>) -> Result<()> {
            Err(VisageError::Audio("permission denied".into()))
        }
        fn close(&mut self) {}
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn rms_and_level_track_block_energy() {
        let analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, VadEvents::new());
        let sample = analyzer.process_block(&block(0.5)).unwrap();
        assert!((sample.rms - 0.5).abs() < 1e-6);
        assert!(sample.level > 0.0 && sample.level <= 0.5);
        assert!(sample.speech_active);
        assert_eq!(analyzer.latest(), sample);
    }

    #[test]
    fn level_rises_fast_and_falls_slow() {
        let config = AnalyzerConfig {
            attack: 0.8,
            release: 0.1,
            ..AnalyzerConfig::default()
        };
        let analyzer = AmplitudeAnalyzer::new(config, 8, VadEvents::new());
        let up = analyzer.process_block(&block(1.0)).unwrap();
        assert!((up.level - 0.8).abs() < 1e-6);
        let down = analyzer.process_block(&block(0.0)).unwrap();
        assert!((down.level - 0.72).abs() < 1e-6);
    }

    #[test]
    fn speech_edges_fire_once_per_crossing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (start_log, end_log) = (Arc::clone(&log), Arc::clone(&log));
        let events = VadEvents::new()
            .on_speech_start(move || start_log.lock().unwrap().push("start"))
            .on_speech_end(move || end_log.lock().unwrap().push("end"));
        let analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, events);

        for amplitude in [0.0, 0.3, 0.4, 0.5, 0.01, 0.0, 0.005, 0.2, 0.3] {
            analyzer.process_block(&block(amplitude));
        }
        assert_eq!(*log.lock().unwrap(), vec!["start", "end", "start"]);
    }

    #[test]
    fn non_finite_block_is_dropped() {
        let analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, VadEvents::new());
        assert!(analyzer.process_block(&[f32::NAN, 0.1]).is_none());
        assert_eq!(analyzer.latest(), AmplitudeSample::default());
    }

    #[test]
    fn denied_attach_leaves_analyzer_inactive() {
        let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, VadEvents::new());
        let err = analyzer.attach(Box::new(DeniedMic)).unwrap_err();
        assert!(matches!(err, VisageError::Audio(_)));
        assert!(!analyzer.is_active());
        assert!(analyzer.probe().level().is_none());
    }

    #[test]
    fn detach_when_detached_is_noop() {
        let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, VadEvents::new());
        analyzer.detach();
        analyzer.detach();
        assert!(!analyzer.is_active());
    }

    #[test]
    fn tap_blocks_reach_the_probe() {
        let samples = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&samples);
        let events = VadEvents::new().on_sample(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, events);
        let player = PlaybackTap::new();
        analyzer.attach(Box::new(player.clone())).unwrap();
        assert!(analyzer.is_active());
        assert_eq!(analyzer.source_kind(), Some(SourceKind::Playback));

        let probe = analyzer.probe();
        assert!(player.push(&block(0.4)));
        assert!(wait_until(|| samples.load(Ordering::SeqCst) == 1));
        assert!(probe.level().unwrap() > 0.0);
        assert!(probe.is_speech_active());

        analyzer.detach();
        assert!(!player.is_open());
        assert!(probe.level().is_none());
        assert!(!probe.is_speech_active());
    }

    #[test]
    fn detach_mid_speech_closes_the_segment() {
        let ends = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ends);
        let events = VadEvents::new().on_speech_end(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, events);
        analyzer.attach(Box::new(PlaybackTap::new())).unwrap();
        analyzer.process_block(&block(0.5));

        analyzer.detach();
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        analyzer.detach();
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reattach_replaces_previous_source() {
        let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, VadEvents::new());
        let first = PlaybackTap::new();
        let second = PlaybackTap::new();
        analyzer.attach(Box::new(first.clone())).unwrap();
        analyzer.attach(Box::new(second.clone())).unwrap();
        assert!(!first.is_open());
        assert!(second.is_open());
    }

    #[test]
    fn mid_band_tone_is_published_through_the_probe() {
        let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 8, VadEvents::new());
        let probe = analyzer.probe();
        assert!(probe.bands().is_none());
        analyzer.attach(Box::new(PlaybackTap::new())).unwrap();

        // Bin 25 of a 256-point FFT sits inside the mid band.
        let tone: Vec<f32> = (0..256)
            .map(|n| (2.0 * std::f32::consts::PI * 25.0 * n as f32 / 256.0).sin())
            .collect();
        let sample = analyzer.process_block(&tone).unwrap();
        assert!(sample.bands.mid > sample.bands.low);
        assert!(sample.bands.mid > sample.bands.high);
        assert_eq!(probe.bands(), Some(sample.bands));

        analyzer.detach();
        assert!(probe.bands().is_none());
    }

    #[test]
    fn edges_stay_ordered_with_worker_and_direct_callers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (start_log, end_log) = (Arc::clone(&log), Arc::clone(&log));
        let events = VadEvents::new()
            .on_speech_start(move || start_log.lock().unwrap().push("start"))
            .on_speech_end(move || end_log.lock().unwrap().push("end"));
        let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 64, events);
        let player = PlaybackTap::new();
        analyzer.attach(Box::new(player.clone())).unwrap();

        let feeder = std::thread::spawn(move || {
            for i in 0..200 {
                player.push(&block(if i % 2 == 0 { 0.5 } else { 0.0 }));
            }
        });
        for i in 0..200 {
            analyzer.process_block(&block(if i % 3 == 0 { 0.0 } else { 0.4 }));
        }
        feeder.join().unwrap();
        analyzer.detach();

        let log = log.lock().unwrap();
        assert!(!log.is_empty());
        for (i, edge) in log.iter().enumerate() {
            let expected = if i % 2 == 0 { "start" } else { "end" };
            assert_eq!(*edge, expected, "edge {i} out of order: {log:?}");
        }
        assert_eq!(log.last(), Some(&"end"));
    }
}
