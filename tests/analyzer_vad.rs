//! Integration tests: amplitude analyzer, voice activity edges and lip-sync.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Sender;
use visage::audio::SampleBlock;
use visage::audio::tap::PlaybackTap;
use visage::config::AnalyzerConfig;
use visage::math::Transform;
use visage::rig::{Geometry, MorphSet, Part};
use visage::scene::HeadlessBackend;
use visage::{
    AmplitudeAnalyzer, AudioSource, AvatarSceneController, AvatarSignals, Channel, FrameLoop,
    MorphTargetController, RigBuilder, SourceKind, VadEvents, VisageConfig, VisageError,
};

struct DeniedMicrophone;

impl AudioSource for DeniedMicrophone {
    fn kind(&self) -> SourceKind {
        SourceKind::Microphone
    }

    fn describe(&self) -> String {
        "denied microphone".to_owned()
    }

    fn open(&mut self, _tx: Sender<SampleBlock>) -> visage::Result<()> {
        Err(VisageError::Audio("permission denied".into()))
    }

    fn close(&mut self) {}
}

fn tone(amplitude: f32) -> Vec<f32> {
    (0..512)
        .map(|n| amplitude * (n as f32 * 0.3).sin())
        .collect()
}

#[test]
fn crossings_fire_start_end_start() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (starts, ends) = (Arc::clone(&log), Arc::clone(&log));
    let analyzer = AmplitudeAnalyzer::new(
        AnalyzerConfig::default(),
        16,
        VadEvents::new()
            .on_speech_start(move || starts.lock().expect("log").push("start"))
            .on_speech_end(move || ends.lock().expect("log").push("end")),
    );

    let levels = [0.0, 0.0, 0.4, 0.5, 0.6, 0.3, 0.0, 0.001, 0.0, 0.0, 0.2, 0.4];
    for level in levels {
        analyzer.process_block(&tone(level));
    }
    assert_eq!(*log.lock().expect("log"), vec!["start", "end", "start"]);
}

#[tokio::test]
async fn denied_microphone_leaves_frames_running() {
    let backend = HeadlessBackend::new();
    let stats = backend.stats();
    let mut scene = AvatarSceneController::new(&VisageConfig::default(), AvatarSignals::new());
    scene
        .initialize(Box::new(backend), 640, 360)
        .expect("initialize scene");
    let scene = Arc::new(Mutex::new(scene));
    let mut frames = FrameLoop::start(Arc::clone(&scene), 60);

    let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 16, VadEvents::new());
    let err = analyzer
        .attach(Box::new(DeniedMicrophone))
        .expect_err("attach should fail");
    assert!(matches!(err, VisageError::Audio(_)));
    assert!(!analyzer.is_active());
    assert!(analyzer.probe().level().is_none());

    let before = stats.lock().expect("stats").frames;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(frames.is_running());
    assert!(stats.lock().expect("stats").frames > before);
    frames.stop();
}

#[test]
fn playback_level_drives_the_mouth() {
    let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 16, VadEvents::new());
    let player = PlaybackTap::new();
    analyzer
        .attach(Box::new(player.clone()))
        .expect("attach playback tap");

    let signals = AvatarSignals::new();
    let mut scene = AvatarSceneController::with_seed(&VisageConfig::default(), signals.clone(), 11);
    scene
        .initialize(Box::new(HeadlessBackend::new()), 640, 360)
        .expect("initialize scene");
    let mut b = RigBuilder::new("rpm");
    let root = b.root();
    b.add(
        root,
        "Head",
        Transform::default(),
        Part::BlendShapeMesh {
            geometry: Geometry::new(10, 5),
            morphs: MorphSet::new(["mouthOpen", "jawOpen"]),
        },
    );
    scene.show_loaded(b.build()).expect("show model");
    scene.attach_amplitude(analyzer.probe());

    let sample = analyzer
        .process_block(&[0.1, -0.1, 0.1, -0.1])
        .expect("finite block");
    let level = analyzer.probe().level().expect("attached probe");
    assert_eq!(level, sample.level);

    signals.set_speaking(true);
    let state = scene.frame(1.0);
    let expected = (level * 2.0).min(1.0);
    assert!((state.speaking_amplitude - expected).abs() < 1e-6);

    let rig = scene.rig().expect("loaded rig");
    let controller = MorphTargetController::discover(rig);
    assert!((controller.get_channel(rig, Channel::MouthOpen) - expected).abs() < 1e-6);

    analyzer.detach();
    assert!(!player.is_open());
    let state = scene.frame(1.05);
    let synthetic = ((1.05_f64 * 10.0).sin().abs() * 0.7) as f32;
    assert!((state.speaking_amplitude - synthetic).abs() < 1e-5);
}

#[test]
fn voiced_mid_band_raises_the_smile_while_speaking() {
    let mut analyzer = AmplitudeAnalyzer::new(AnalyzerConfig::default(), 16, VadEvents::new());
    analyzer
        .attach(Box::new(PlaybackTap::new()))
        .expect("attach playback tap");

    let signals = AvatarSignals::new();
    let mut scene = AvatarSceneController::with_seed(&VisageConfig::default(), signals.clone(), 3);
    scene
        .initialize(Box::new(HeadlessBackend::new()), 640, 360)
        .expect("initialize scene");
    let mut b = RigBuilder::new("smiler");
    let root = b.root();
    b.add(
        root,
        "Head",
        Transform::default(),
        Part::BlendShapeMesh {
            geometry: Geometry::new(10, 5),
            morphs: MorphSet::new(["mouthOpen", "jawOpen", "mouthSmile"]),
        },
    );
    scene.show_loaded(b.build()).expect("show model");
    scene.attach_amplitude(analyzer.probe());

    let mut voiced = vec![0.0_f32; 256];
    for bin in (10..50).step_by(2) {
        for (n, s) in voiced.iter_mut().enumerate() {
            *s += 0.05 * (2.0 * std::f32::consts::PI * bin as f32 * n as f32 / 256.0).sin();
        }
    }
    let sample = analyzer.process_block(&voiced).expect("finite block");
    assert!(sample.bands.mid > 0.3, "mid band {}", sample.bands.mid);

    signals.set_speaking(true);
    scene.frame(1.0);
    scene.frame(1.02);
    let rig = scene.rig().expect("loaded rig");
    let controller = MorphTargetController::discover(rig);
    let smile = controller.get_channel(rig, Channel::MouthSmile);
    assert!((smile - sample.bands.mid * 0.3).abs() < 1e-6, "smile {smile}");

    signals.set_speaking(false);
    scene.frame(1.04);
    let rig = scene.rig().expect("loaded rig");
    assert_eq!(controller.get_channel(rig, Channel::MouthSmile), 0.0);
}

#[test]
fn analyzer_counts_every_pushed_block() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let mut analyzer = AmplitudeAnalyzer::new(
        AnalyzerConfig::default(),
        64,
        VadEvents::new().on_sample(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let player = PlaybackTap::new();
    analyzer
        .attach(Box::new(player.clone()))
        .expect("attach playback tap");

    for _ in 0..10 {
        assert!(player.push(&tone(0.3)));
    }
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while seen.load(Ordering::SeqCst) < 10 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(seen.load(Ordering::SeqCst), 10);
    assert!(analyzer.probe().is_speech_active());
}
