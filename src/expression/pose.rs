//! Discrete one-shot facial poses.
//!
//! Each pose writes a small fixed set of channels immediately and keeps no
//! timer. Poses compose with the animator overlays because they touch
//! mostly disjoint channels; see [`super`] for the shared-channel rules.

use crate::morph::{Channel, RigHandle};

/// A facial pose applied at a caller-supplied intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pose {
    /// mouthSmile at the given intensity.
    Smile(f32),
    /// mouthFrown plus half-strength brow down.
    Frown(f32),
    /// Wide eyes, raised brows, mouth open at 0.6x.
    Surprised(f32),
    /// Eye direction, both axes in -1..1. Negative x looks left, positive y up.
    Gaze { x: f32, y: f32 },
}

impl Pose {
    pub const DEFAULT_SMILE: Pose = Pose::Smile(0.7);
    pub const DEFAULT_FROWN: Pose = Pose::Frown(0.7);
    pub const DEFAULT_SURPRISED: Pose = Pose::Surprised(0.8);
}

/// Write `pose` onto the rig.
pub fn apply_pose(rig: &mut RigHandle<'_>, pose: Pose) {
    match pose {
        Pose::Smile(intensity) => {
            rig.set(Channel::MouthSmile, intensity);
        }
        Pose::Frown(intensity) => {
            rig.set(Channel::MouthFrown, intensity);
            rig.set(Channel::BrowDownLeft, intensity * 0.5);
            rig.set(Channel::BrowDownRight, intensity * 0.5);
        }
        Pose::Surprised(intensity) => {
            rig.set(Channel::EyeWideLeft, intensity);
            rig.set(Channel::EyeWideRight, intensity);
            rig.set(Channel::MouthOpen, intensity * 0.6);
            rig.set(Channel::BrowInnerUp, intensity);
            rig.set(Channel::BrowOuterUpLeft, intensity);
            rig.set(Channel::BrowOuterUpRight, intensity);
        }
        Pose::Gaze { x, y } => apply_gaze(rig, x, y),
    }
}

/// Split the gaze axes across the in/out and up/down channel pairs.
///
/// The opposite direction's channels are zeroed in the same call so a
/// previous gaze never leaves residual weight behind.
fn apply_gaze(rig: &mut RigHandle<'_>, x: f32, y: f32) {
    let x = if x.is_nan() { 0.0 } else { x.clamp(-1.0, 1.0) };
    let y = if y.is_nan() { 0.0 } else { y.clamp(-1.0, 1.0) };

    if x < 0.0 {
        rig.set(Channel::EyeLookInLeft, -x);
        rig.set(Channel::EyeLookOutRight, -x);
        rig.set(Channel::EyeLookInRight, 0.0);
        rig.set(Channel::EyeLookOutLeft, 0.0);
    } else {
        rig.set(Channel::EyeLookOutLeft, x);
        rig.set(Channel::EyeLookInRight, x);
        rig.set(Channel::EyeLookInLeft, 0.0);
        rig.set(Channel::EyeLookOutRight, 0.0);
    }

    if y > 0.0 {
        rig.set(Channel::EyeLookUpLeft, y);
        rig.set(Channel::EyeLookUpRight, y);
        rig.set(Channel::EyeLookDownLeft, 0.0);
        rig.set(Channel::EyeLookDownRight, 0.0);
    } else {
        rig.set(Channel::EyeLookDownLeft, -y);
        rig.set(Channel::EyeLookDownRight, -y);
        rig.set(Channel::EyeLookUpLeft, 0.0);
        rig.set(Channel::EyeLookUpRight, 0.0);
    }
}
