//! Built-in avatars assembled from primitive shapes, and the simple
//! transform-based animation used when no morph targets are available.

use crate::math::{Color, Transform, lerp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resting height of every built-in head.
pub const HEAD_HEIGHT: f32 = 1.0;
/// Height the mouth group of a grouped mouth bobs around.
const MOUTH_GROUP_HEIGHT: f32 = 0.7;
/// Closed mouth height of a box mouth, the reference for its open scale.
const MOUTH_REST: f32 = 0.08;
/// Extra mouth height at full opening.
const MOUTH_TRAVEL: f32 = 0.18;
const LISTENING_GLOW: u32 = 0xff66cc;
/// Chance per frame that the eyes squash shut.
const EYE_BLINK_CHANCE: f64 = 0.005;
/// How long a squash lasts, in seconds.
const EYE_BLINK_HOLD: f64 = 0.1;
const EYE_SQUASH: f32 = 0.1;

/// Which built-in avatar to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProceduralStyle {
    #[default]
    Default,
    Robot,
    Cat,
    Cute,
    Professional,
}

impl ProceduralStyle {
    pub const ALL: [ProceduralStyle; 5] = [
        ProceduralStyle::Default,
        ProceduralStyle::Robot,
        ProceduralStyle::Cat,
        ProceduralStyle::Cute,
        ProceduralStyle::Professional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProceduralStyle::Default => "default",
            ProceduralStyle::Robot => "robot",
            ProceduralStyle::Cat => "cat",
            ProceduralStyle::Cute => "cute",
            ProceduralStyle::Professional => "professional",
        }
    }
}

impl fmt::Display for ProceduralStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProceduralStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown avatar style '{s}'"))
    }
}

/// Primitive geometry, dimensions in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    HalfSphere { radius: f32 },
    Box { width: f32, height: f32, depth: f32 },
    Cylinder { radius: f32, height: f32 },
    Cone { radius: f32, height: f32 },
    Torus { radius: f32, tube: f32 },
    /// Lower half of an ellipse drawn as a line.
    Arc { radius_x: f32, radius_y: f32 },
    Plane { width: f32, depth: f32 },
}

/// One coloured shape of a built-in avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub name: &'static str,
    pub shape: Shape,
    pub color: Color,
    pub emissive: Color,
    pub transform: Transform,
}

impl Primitive {
    fn new(name: &'static str, shape: Shape, color: u32, transform: Transform) -> Self {
        Self {
            name,
            shape,
            color: Color::from_hex(color),
            emissive: Color::BLACK,
            transform,
        }
    }

    fn glowing(mut self, emissive: u32, intensity: f32) -> Self {
        self.emissive = Color::from_hex(emissive).scaled(intensity);
        self
    }
}

/// How the mouth reacts to speech in the transform-based animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouthKind {
    /// A solid mesh stretched vertically.
    Mesh,
    /// A group moved up and down.
    Group,
    /// A line drawing that stays still.
    Line,
}

/// A built-in avatar: head, mouth, eyes and decorative extras under one
/// movable group.
#[derive(Debug, Clone, PartialEq)]
pub struct ProceduralAvatar {
    pub style: ProceduralStyle,
    /// Transform of the whole avatar; keyboard movement writes here.
    pub group: Transform,
    pub head: Primitive,
    pub mouth: Primitive,
    pub mouth_kind: MouthKind,
    pub eyes: Vec<Primitive>,
    /// Vertical scale applied to all eyes together.
    pub eye_scale_y: f32,
    pub extras: Vec<Primitive>,
}

impl ProceduralAvatar {
    pub fn build(style: ProceduralStyle) -> Self {
        match style {
            ProceduralStyle::Default => default_avatar(),
            ProceduralStyle::Robot => robot_avatar(),
            ProceduralStyle::Cat => cat_avatar(),
            ProceduralStyle::Cute => cute_avatar(),
            ProceduralStyle::Professional => professional_avatar(),
        }
    }

    /// Every primitive, head first.
    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        std::iter::once(&self.head)
            .chain(std::iter::once(&self.mouth))
            .chain(self.eyes.iter())
            .chain(self.extras.iter())
    }

    pub fn part_count(&self) -> usize {
        2 + self.eyes.len() + self.extras.len()
    }
}

fn default_avatar() -> ProceduralAvatar {
    ProceduralAvatar {
        style: ProceduralStyle::Default,
        group: Transform::default(),
        head: Primitive::new(
            "head",
            Shape::Sphere { radius: 0.8 },
            0xf3e5ab,
            Transform::at(0.0, HEAD_HEIGHT, 0.0),
        ),
        mouth: Primitive::new(
            "mouth",
            Shape::Box {
                width: 0.3,
                height: MOUTH_REST,
                depth: 0.1,
            },
            0x222222,
            Transform::at(0.0, 0.75, 0.78),
        ),
        mouth_kind: MouthKind::Mesh,
        eyes: vec![
            Primitive::new(
                "left_eye",
                Shape::Sphere { radius: 0.1 },
                0x222222,
                Transform::at(-0.25, 1.15, 0.7),
            ),
            Primitive::new(
                "right_eye",
                Shape::Sphere { radius: 0.1 },
                0x222222,
                Transform::at(0.25, 1.15, 0.7),
            ),
        ],
        eye_scale_y: 1.0,
        extras: Vec::new(),
    }
}

fn robot_avatar() -> ProceduralAvatar {
    let eye = Shape::Box {
        width: 0.25,
        height: 0.15,
        depth: 0.1,
    };
    ProceduralAvatar {
        style: ProceduralStyle::Robot,
        group: Transform::default(),
        head: Primitive::new(
            "head",
            Shape::Box {
                width: 1.2,
                height: 1.2,
                depth: 1.2,
            },
            0x4a90e2,
            Transform::at(0.0, HEAD_HEIGHT, 0.0),
        ),
        mouth: Primitive::new(
            "mouth",
            Shape::Box {
                width: 0.6,
                height: 0.12,
                depth: 0.1,
            },
            0x111111,
            Transform::at(0.0, 0.7, 0.61),
        ),
        mouth_kind: MouthKind::Mesh,
        eyes: vec![
            Primitive::new("left_eye", eye, 0x00ff88, Transform::at(-0.35, 1.15, 0.61))
                .glowing(0x00ff88, 0.8),
            Primitive::new("right_eye", eye, 0x00ff88, Transform::at(0.35, 1.15, 0.61))
                .glowing(0x00ff88, 0.8),
        ],
        eye_scale_y: 1.0,
        extras: vec![Primitive::new(
            "antenna",
            Shape::Cylinder {
                radius: 0.05,
                height: 0.5,
            },
            0xff6b6b,
            Transform::at(0.0, 1.85, 0.0),
        )],
    }
}

fn cat_avatar() -> ProceduralAvatar {
    let ear = Shape::Cone {
        radius: 0.25,
        height: 0.5,
    };
    let eye = Shape::Sphere { radius: 0.12 };
    ProceduralAvatar {
        style: ProceduralStyle::Cat,
        group: Transform::default(),
        head: Primitive::new(
            "head",
            Shape::Sphere { radius: 0.7 },
            0xffa94d,
            Transform::at(0.0, HEAD_HEIGHT, 0.0).with_scale(1.0, 0.95, 1.1),
        ),
        mouth: Primitive::new(
            "mouth",
            Shape::HalfSphere { radius: 0.15 },
            0xff69b4,
            Transform::at(0.0, MOUTH_GROUP_HEIGHT, 0.68)
                .with_rotation(std::f32::consts::FRAC_PI_2, 0.0, 0.0),
        ),
        mouth_kind: MouthKind::Group,
        eyes: vec![
            Primitive::new(
                "left_eye",
                eye,
                0x90ee90,
                Transform::at(-0.22, 1.1, 0.65).with_scale(1.0, 1.3, 0.8),
            )
            .glowing(0x228b22, 0.3),
            Primitive::new(
                "right_eye",
                eye,
                0x90ee90,
                Transform::at(0.22, 1.1, 0.65).with_scale(1.0, 1.3, 0.8),
            )
            .glowing(0x228b22, 0.3),
        ],
        eye_scale_y: 1.0,
        extras: vec![
            Primitive::new("left_ear", ear, 0xffa94d, Transform::at(-0.45, 1.6, 0.0)),
            Primitive::new("right_ear", ear, 0xffa94d, Transform::at(0.45, 1.6, 0.0)),
            Primitive::new(
                "nose",
                Shape::Sphere { radius: 0.08 },
                0xff1493,
                Transform::at(0.0, 0.85, 0.7),
            ),
        ],
    }
}

fn cute_avatar() -> ProceduralAvatar {
    let white = Shape::Sphere { radius: 0.2 };
    let pupil = Shape::Sphere { radius: 0.1 };
    let blush = Shape::Sphere { radius: 0.15 };
    ProceduralAvatar {
        style: ProceduralStyle::Cute,
        group: Transform::default(),
        head: Primitive::new(
            "head",
            Shape::Sphere { radius: 0.85 },
            0xffb6c1,
            Transform::at(0.0, HEAD_HEIGHT, 0.0),
        ),
        mouth: Primitive::new(
            "mouth",
            Shape::Arc {
                radius_x: 0.3,
                radius_y: 0.2,
            },
            0xff69b4,
            Transform::at(0.0, 0.65, 0.82),
        ),
        mouth_kind: MouthKind::Line,
        eyes: vec![
            Primitive::new("left_eye_white", white, 0xffffff, Transform::at(-0.3, 1.15, 0.75)),
            Primitive::new("right_eye_white", white, 0xffffff, Transform::at(0.3, 1.15, 0.75)),
            Primitive::new("left_pupil", pupil, 0x1a1a1a, Transform::at(-0.3, 1.15, 0.92)),
            Primitive::new("right_pupil", pupil, 0x1a1a1a, Transform::at(0.3, 1.15, 0.92)),
        ],
        eye_scale_y: 1.0,
        extras: vec![
            Primitive::new(
                "left_blush",
                blush,
                0xff6b9d,
                Transform::at(-0.6, 0.9, 0.5).with_scale(1.0, 0.6, 0.5),
            ),
            Primitive::new(
                "right_blush",
                blush,
                0xff6b9d,
                Transform::at(0.6, 0.9, 0.5).with_scale(1.0, 0.6, 0.5),
            ),
        ],
    }
}

fn professional_avatar() -> ProceduralAvatar {
    let lens = Shape::Torus {
        radius: 0.15,
        tube: 0.02,
    };
    ProceduralAvatar {
        style: ProceduralStyle::Professional,
        group: Transform::default(),
        head: Primitive::new(
            "head",
            Shape::Sphere { radius: 0.75 },
            0xd4a574,
            Transform::at(0.0, HEAD_HEIGHT, 0.0),
        ),
        mouth: Primitive::new(
            "mouth",
            Shape::Box {
                width: 0.25,
                height: 0.05,
                depth: 0.1,
            },
            0x8b4513,
            Transform::at(0.0, 0.72, 0.73),
        ),
        mouth_kind: MouthKind::Mesh,
        eyes: vec![
            Primitive::new("left_glass", lens, 0x333333, Transform::at(-0.28, 1.1, 0.7)),
            Primitive::new("right_glass", lens, 0x333333, Transform::at(0.28, 1.1, 0.7)),
        ],
        eye_scale_y: 1.0,
        extras: vec![
            Primitive::new(
                "bridge",
                Shape::Cylinder {
                    radius: 0.02,
                    height: 0.15,
                },
                0x333333,
                Transform::at(0.0, 1.1, 0.72).with_rotation(0.0, 0.0, std::f32::consts::FRAC_PI_2),
            ),
            Primitive::new(
                "tie",
                Shape::Cone {
                    radius: 0.15,
                    height: 0.4,
                },
                0x1e3a8a,
                Transform::at(0.0, 0.15, 0.3).with_rotation(std::f32::consts::PI, 0.0, 0.0),
            ),
        ],
    }
}

/// The floor plane under every avatar.
pub fn floor() -> Primitive {
    Primitive::new(
        "floor",
        Shape::Plane {
            width: 8.0,
            depth: 8.0,
        },
        0xf8f8f8,
        Transform::at(0.0, 0.0, 0.0).with_rotation(-std::f32::consts::FRAC_PI_2, 0.0, 0.0),
    )
}

/// Head yaw of the idle sway.
pub fn head_sway(time: f64) -> f32 {
    ((time * 0.5).sin() * 0.1) as f32
}

/// Vertical offset of the breathing motion.
pub fn breathing_offset(time: f64) -> f32 {
    ((time * 1.2).sin() * 0.02) as f32
}

/// Target vertical scale of a stretched mouth.
pub fn mouth_target_scale(time: f64, speaking: bool) -> f32 {
    if !speaking {
        return 1.0;
    }
    let open = MOUTH_REST + (time * 10.0).sin().abs() as f32 * MOUTH_TRAVEL;
    open / MOUTH_REST
}

/// Head glow while listening.
pub fn listening_glow(time: f64, listening: bool) -> Color {
    if !listening {
        return Color::BLACK;
    }
    let pulse = 0.9 + (time * 6.0).sin() as f32 * 0.1;
    Color::from_hex(LISTENING_GLOW).scaled(0.2 * pulse)
}

/// Result of one transform-based animation step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LegacyFrame {
    /// Mouth opening in 0..1 relative to full travel.
    pub mouth_open: f32,
    pub eyes_closed: bool,
}

/// Transform-based animation for avatars without morph targets.
pub struct LegacyAnimator {
    rng: StdRng,
    eyes_open_at: Option<f64>,
}

impl LegacyAnimator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            eyes_open_at: None,
        }
    }

    /// Forget any squash in progress.
    pub fn reset(&mut self) {
        self.eyes_open_at = None;
    }

    /// Roll the per-frame blink dice. Returns whether the eyes are shut.
    pub fn eyes_closed(&mut self, time: f64) -> bool {
        if let Some(open_at) = self.eyes_open_at {
            if time < open_at {
                return true;
            }
            self.eyes_open_at = None;
        }
        if self.rng.gen_bool(EYE_BLINK_CHANCE) {
            self.eyes_open_at = Some(time + EYE_BLINK_HOLD);
            return true;
        }
        false
    }

    /// Animate a built-in avatar for one frame.
    pub fn animate(
        &mut self,
        avatar: &mut ProceduralAvatar,
        time: f64,
        speaking: bool,
        listening: bool,
        controls_enabled: bool,
    ) -> LegacyFrame {
        if !controls_enabled {
            avatar.head.transform.rotation.y = head_sway(time);
        }
        avatar.head.transform.position.y = HEAD_HEIGHT + breathing_offset(time);

        let mouth = &mut avatar.mouth.transform;
        match avatar.mouth_kind {
            MouthKind::Mesh => {
                let target = mouth_target_scale(time, speaking);
                mouth.scale.y = lerp(mouth.scale.y, target, 0.2);
            }
            MouthKind::Group if speaking => {
                mouth.position.y = MOUTH_GROUP_HEIGHT + (time * 10.0).sin().abs() as f32 * 0.05;
            }
            MouthKind::Group | MouthKind::Line => {}
        }

        avatar.head.emissive = listening_glow(time, listening);

        let eyes_closed = self.eyes_closed(time);
        avatar.eye_scale_y = if eyes_closed { EYE_SQUASH } else { 1.0 };

        let mouth_open = if speaking {
            (time * 10.0).sin().abs() as f32
        } else {
            0.0
        };
        LegacyFrame {
            mouth_open,
            eyes_closed,
        }
    }
}

impl Default for LegacyAnimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn style_parses_case_insensitively() {
        assert_eq!("Robot".parse::<ProceduralStyle>(), Ok(ProceduralStyle::Robot));
        assert_eq!(
            "professional".parse::<ProceduralStyle>(),
            Ok(ProceduralStyle::Professional)
        );
        assert!("dragon".parse::<ProceduralStyle>().is_err());
    }

    #[test]
    fn every_style_has_head_mouth_and_eyes() {
        for style in ProceduralStyle::ALL {
            let avatar = ProceduralAvatar::build(style);
            assert_eq!(avatar.style, style);
            assert!(!avatar.eyes.is_empty());
            assert_eq!(avatar.primitives().count(), avatar.part_count());
            assert_eq!(avatar.head.transform.position.y, HEAD_HEIGHT);
        }
    }

    #[test]
    fn mouth_kinds_follow_style() {
        assert_eq!(
            ProceduralAvatar::build(ProceduralStyle::Cat).mouth_kind,
            MouthKind::Group
        );
        assert_eq!(
            ProceduralAvatar::build(ProceduralStyle::Cute).mouth_kind,
            MouthKind::Line
        );
        assert_eq!(
            ProceduralAvatar::build(ProceduralStyle::Robot).mouth_kind,
            MouthKind::Mesh
        );
    }

    #[test]
    fn sway_only_without_controls() {
        let mut legacy = LegacyAnimator::with_seed(1);
        let mut avatar = ProceduralAvatar::build(ProceduralStyle::Default);
        legacy.animate(&mut avatar, 3.0, false, false, true);
        assert_eq!(avatar.head.transform.rotation.y, 0.0);

        legacy.animate(&mut avatar, 3.0, false, false, false);
        assert!((avatar.head.transform.rotation.y - head_sway(3.0)).abs() < 1e-6);
    }

    #[test]
    fn breathing_moves_head_around_rest_height() {
        let mut legacy = LegacyAnimator::with_seed(1);
        let mut avatar = ProceduralAvatar::build(ProceduralStyle::Default);
        for i in 0..100 {
            legacy.animate(&mut avatar, f64::from(i) * 0.1, false, false, false);
            let y = avatar.head.transform.position.y;
            assert!((y - HEAD_HEIGHT).abs() <= 0.02 + 1e-6);
        }
    }

    #[test]
    fn mouth_mesh_eases_toward_target() {
        let mut legacy = LegacyAnimator::with_seed(1);
        let mut avatar = ProceduralAvatar::build(ProceduralStyle::Default);
        let t = std::f64::consts::FRAC_PI_2 / 10.0;
        legacy.animate(&mut avatar, t, true, false, false);
        let target = mouth_target_scale(t, true);
        let expected = lerp(1.0, target, 0.2);
        assert!((avatar.mouth.transform.scale.y - expected).abs() < 1e-5);

        for _ in 0..100 {
            legacy.animate(&mut avatar, t, false, false, false);
        }
        assert!((avatar.mouth.transform.scale.y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn mouth_group_bobs_while_speaking() {
        let mut legacy = LegacyAnimator::with_seed(1);
        let mut avatar = ProceduralAvatar::build(ProceduralStyle::Cat);
        let t = std::f64::consts::FRAC_PI_2 / 10.0;
        legacy.animate(&mut avatar, t, true, false, false);
        assert!((avatar.mouth.transform.position.y - 0.75).abs() < 1e-5);
    }

    #[test]
    fn listening_glow_pulses_and_clears() {
        assert_eq!(listening_glow(1.0, false), Color::BLACK);
        let glow = listening_glow(0.0, true);
        let expected = Color::from_hex(0xff66cc).scaled(0.18);
        assert!((glow.r - expected.r).abs() < 1e-6);
        assert!((glow.b - expected.b).abs() < 1e-6);
    }

    #[test]
    fn eye_squash_holds_for_its_duration() {
        let mut legacy = LegacyAnimator::with_seed(7);
        let mut time = 0.0;
        while !legacy.eyes_closed(time) {
            time += 1.0 / 60.0;
            assert!(time < 600.0, "eyes never closed");
        }
        assert!(legacy.eyes_closed(time + EYE_BLINK_HOLD * 0.5));
    }
}
