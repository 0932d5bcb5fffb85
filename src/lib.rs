//! Visage: avatar animation and audio-driven expression engine.
//!
//! This crate animates the on-screen character of a voice assistant:
//! Rig → Morph bindings → Expressions → Scene → Render backend
//!
//! # Architecture
//!
//! - **Rig**: arena-indexed scene graph of a loaded model, supplied by an
//!   external loader
//! - **Morph**: one-time discovery of facial blend-shape channels and
//!   clamped, broadcast weight writes
//! - **Expression**: blink timer, speaking and listening overlays, poses
//! - **Audio**: microphone capture via `cpal` or a playback tap, amplitude
//!   analysis and edge-triggered voice activity detection
//! - **Scene**: camera, lights, the active avatar instance and the frame loop

pub mod audio;
pub mod config;
pub mod error;
pub mod expression;
pub mod math;
pub mod morph;
pub mod rig;
pub mod scene;
pub mod signals;
pub mod vad;

pub use audio::analyzer::{AmplitudeAnalyzer, AmplitudeProbe, AmplitudeSample, VadEvents};
pub use audio::{AudioSource, SourceKind};
pub use config::VisageConfig;
pub use error::{Result, VisageError};
pub use expression::{AnimationState, ExpressionAnimator, FrameInput, Pose};
pub use morph::{Channel, MorphTargetController};
pub use rig::{Rig, RigBuilder};
pub use scene::{AvatarSceneController, FrameLoop, LoadTicket, SceneState};
pub use signals::AvatarSignals;
