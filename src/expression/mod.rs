//! Time-driven facial expression procedures.
//!
//! The [`ExpressionAnimator`] runs once per rendered frame against a loaded
//! rig. It combines three kinds of behaviour, each on its own channel
//! subset:
//!
//! - **blink**: a one-shot timer, retriggered at a random 3–5 s interval;
//! - **speaking / listening**: level-triggered overlays that follow the
//!   latest external flags;
//! - **poses** ([`pose`]): stateless setters applied on demand.
//!
//! Within one frame the blink is evaluated first, then the speaking overlay,
//! then the listening overlay.
//!
//! Shared channels:
//! - `mouthOpen` / `jawOpen` belong to the speaking overlay while speaking.
//!   When not speaking they are only written on the speaking→silent edge, so
//!   a [`Pose::Surprised`] applied while idle stays in place.
//! - `mouthSmile` / `eyeWide*` belong to the listening overlay while
//!   listening, and are zeroed once on the listening→idle edge.
//! - While speaking with spectral bands available, a strong mid band also
//!   raises `mouthSmile`. The listening overlay runs later in the frame, so
//!   it wins when both are on.

pub mod pose;

pub use pose::{Pose, apply_pose};

use crate::audio::spectrum::SpectrumBands;
use crate::config::AnimationConfig;
use crate::morph::{Channel, RigHandle, clamp_weight};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Latest external signals, sampled once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInput {
    /// Seconds since the frame clock started.
    pub time: f64,
    pub speaking: bool,
    pub listening: bool,
    /// Analyzer level in 0..1 when an audio source is attached.
    pub amplitude: Option<f32>,
    /// Spectral bands of the latest block, alongside `amplitude`.
    pub bands: Option<SpectrumBands>,
}

/// Per-frame animation values exposed to the UI. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnimationState {
    /// Progress of the running blink in 0..1, `None` when the eyes are open.
    pub blink_progress: Option<f32>,
    /// mouthOpen weight written this frame.
    pub speaking_amplitude: f32,
    /// Last gaze target, both axes in -1..1.
    pub gaze: (f32, f32),
    pub speaking: bool,
    pub listening: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlinkPhase {
    Idle { next_at: f64 },
    Blinking { started_at: f64 },
}

/// Shortest blink the timer will run, in seconds.
const MIN_BLINK_DURATION: f64 = 0.01;

/// Longest pause between blinks, in seconds.
const MAX_BLINK_INTERVAL: f64 = 86_400.0;

/// Blink curve: `sin(progress * π)`, exactly 0 outside (0, 1).
pub fn blink_weight(progress: f64) -> f32 {
    if progress <= 0.0 || progress >= 1.0 {
        return 0.0;
    }
    clamp_weight((progress * std::f64::consts::PI).sin() as f32)
}

/// Drives blink, speaking and listening channels for one avatar instance.
pub struct ExpressionAnimator {
    config: AnimationConfig,
    rng: StdRng,
    blink: BlinkPhase,
    /// `None` right after a reset, which forces one clearing write.
    was_speaking: Option<bool>,
    was_listening: Option<bool>,
    /// Whether the mid band currently holds `mouthSmile`.
    band_smile: bool,
    gaze: (f32, f32),
}

impl ExpressionAnimator {
    pub fn new(config: AnimationConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic blink intervals, for tests and replays.
    pub fn with_seed(config: AnimationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: AnimationConfig, rng: StdRng) -> Self {
        let mut animator = Self {
            config,
            rng,
            blink: BlinkPhase::Idle { next_at: 0.0 },
            was_speaking: None,
            was_listening: None,
            band_smile: false,
            gaze: (0.0, 0.0),
        };
        animator.reset(0.0);
        animator
    }

    /// Start over for a new avatar instance whose clock reads `now`.
    pub fn reset(&mut self, now: f64) {
        let interval = self.next_interval();
        self.blink = BlinkPhase::Idle {
            next_at: now + interval,
        };
        self.was_speaking = None;
        self.was_listening = None;
        self.band_smile = false;
        self.gaze = (0.0, 0.0);
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    pub fn is_blinking(&self) -> bool {
        matches!(self.blink, BlinkPhase::Blinking { .. })
    }

    /// Start a blink at `now`.
    ///
    /// Returns `false` and leaves the running blink untouched if one is
    /// already in progress.
    pub fn trigger_blink(&mut self, now: f64) -> bool {
        if self.is_blinking() {
            trace!("blink requested while blinking, ignored");
            return false;
        }
        self.blink = BlinkPhase::Blinking { started_at: now };
        true
    }

    /// The synthetic mouth curve used when no audio level is available.
    pub fn synthetic_mouth(&self, time: f64) -> f32 {
        let wave = (time * self.config.speech_rate).sin().abs() as f32;
        clamp_weight(wave * self.config.speech_intensity)
    }

    /// Point the eyes; see [`Pose::Gaze`].
    pub fn look_at(&mut self, rig: &mut RigHandle<'_>, x: f32, y: f32) {
        apply_pose(rig, Pose::Gaze { x, y });
        self.gaze = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
    }

    /// Advance all timed behaviour to `input.time` and write the channels.
    pub fn update(&mut self, rig: &mut RigHandle<'_>, input: &FrameInput) -> AnimationState {
        let blink_progress = self.update_blink(rig, input.time);
        let speaking_amplitude = self.update_speaking(rig, input);
        self.update_listening(rig, input.listening);

        AnimationState {
            blink_progress,
            speaking_amplitude,
            gaze: self.gaze,
            speaking: input.speaking,
            listening: input.listening,
        }
    }

    fn update_blink(&mut self, rig: &mut RigHandle<'_>, now: f64) -> Option<f32> {
        if let BlinkPhase::Idle { next_at } = self.blink
            && now >= next_at
        {
            self.blink = BlinkPhase::Blinking { started_at: now };
        }

        let BlinkPhase::Blinking { started_at } = self.blink else {
            return None;
        };

        let progress = ((now - started_at) / self.blink_duration()).max(0.0);
        if progress >= 1.0 {
            rig.set(Channel::EyeBlinkLeft, 0.0);
            rig.set(Channel::EyeBlinkRight, 0.0);
            let interval = self.next_interval();
            self.blink = BlinkPhase::Idle {
                next_at: now + interval,
            };
            return None;
        }

        let weight = blink_weight(progress);
        rig.set(Channel::EyeBlinkLeft, weight);
        rig.set(Channel::EyeBlinkRight, weight);
        Some(progress as f32)
    }

    fn update_speaking(&mut self, rig: &mut RigHandle<'_>, input: &FrameInput) -> f32 {
        let previous = self.was_speaking.replace(input.speaking);

        if !input.speaking {
            if previous != Some(false) {
                rig.set(Channel::MouthOpen, 0.0);
                rig.set(Channel::JawOpen, 0.0);
            }
            self.release_band_smile(rig);
            return 0.0;
        }

        let mouth = match input.amplitude {
            Some(level) => clamp_weight(level * self.config.amplitude_gain),
            None => self.synthetic_mouth(input.time),
        };
        rig.set(Channel::MouthOpen, mouth);
        rig.set(Channel::JawOpen, mouth * self.config.jaw_coupling);

        match input.bands {
            Some(bands) if bands.mid > self.config.band_smile_threshold => {
                rig.set(Channel::MouthSmile, bands.mid * self.config.band_smile_gain);
                self.band_smile = true;
            }
            _ => self.release_band_smile(rig),
        }
        mouth
    }

    fn release_band_smile(&mut self, rig: &mut RigHandle<'_>) {
        if std::mem::take(&mut self.band_smile) {
            rig.set(Channel::MouthSmile, 0.0);
        }
    }

    fn update_listening(&mut self, rig: &mut RigHandle<'_>, listening: bool) {
        let previous = self.was_listening.replace(listening);

        if listening {
            rig.set(Channel::MouthSmile, self.config.listening_smile);
            rig.set(Channel::EyeWideLeft, self.config.listening_eye_wide);
            rig.set(Channel::EyeWideRight, self.config.listening_eye_wide);
        } else if previous != Some(false) {
            rig.set(Channel::MouthSmile, 0.0);
            rig.set(Channel::EyeWideLeft, 0.0);
            rig.set(Channel::EyeWideRight, 0.0);
        }
    }

    /// Configured blink length; non-finite values fall back to the default.
    fn blink_duration(&self) -> f64 {
        let duration = self.config.blink_duration;
        if duration.is_finite() {
            duration.max(MIN_BLINK_DURATION)
        } else {
            AnimationConfig::default().blink_duration
        }
    }

    fn next_interval(&mut self) -> f64 {
        let defaults = AnimationConfig::default();
        let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
        let lo = finite_or(self.config.blink_min_interval, defaults.blink_min_interval)
            .clamp(0.0, MAX_BLINK_INTERVAL);
        let hi = finite_or(self.config.blink_max_interval, defaults.blink_max_interval)
            .clamp(lo, MAX_BLINK_INTERVAL);
        if hi > lo {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }
}
