//! Keyboard state for free avatar movement.

use crate::math::Vec3;
use std::str::FromStr;

/// Keys that move the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    KeyQ,
    KeyE,
    PageUp,
    PageDown,
}

impl Key {
    pub const ALL: [Key; 8] = [
        Key::ArrowUp,
        Key::ArrowDown,
        Key::ArrowLeft,
        Key::ArrowRight,
        Key::KeyQ,
        Key::KeyE,
        Key::PageUp,
        Key::PageDown,
    ];

    /// The DOM-style key code name.
    pub fn code(self) -> &'static str {
        match self {
            Key::ArrowUp => "ArrowUp",
            Key::ArrowDown => "ArrowDown",
            Key::ArrowLeft => "ArrowLeft",
            Key::ArrowRight => "ArrowRight",
            Key::KeyQ => "KeyQ",
            Key::KeyE => "KeyE",
            Key::PageUp => "PageUp",
            Key::PageDown => "PageDown",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl FromStr for Key {
    type Err = ();

    /// Accepts key codes (`"KeyQ"`) and bare letters (`"q"`, `"E"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "q" | "Q" => return Ok(Key::KeyQ),
            "e" | "E" => return Ok(Key::KeyE),
            _ => {}
        }
        Key::ALL.into_iter().find(|k| k.code() == s).ok_or(())
    }
}

/// Which movement keys are currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyState {
    pressed: u8,
}

impl KeyState {
    pub fn press(&mut self, key: Key) {
        self.pressed |= key.bit();
    }

    pub fn release(&mut self, key: Key) {
        self.pressed &= !key.bit();
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed & key.bit() != 0
    }

    pub fn any(&self) -> bool {
        self.pressed != 0
    }

    pub fn clear(&mut self) {
        self.pressed = 0;
    }

    /// Displacement for one frame at `step` units per key. Arrows move in
    /// the floor plane (up is away from the camera), Q/PageUp raise and
    /// E/PageDown lower.
    pub fn movement(&self, step: f32) -> Vec3 {
        let axis = |plus: bool, minus: bool| match (plus, minus) {
            (true, false) => step,
            (false, true) => -step,
            _ => 0.0,
        };
        Vec3::new(
            axis(self.is_pressed(Key::ArrowRight), self.is_pressed(Key::ArrowLeft)),
            axis(
                self.is_pressed(Key::KeyQ) || self.is_pressed(Key::PageUp),
                self.is_pressed(Key::KeyE) || self.is_pressed(Key::PageDown),
            ),
            axis(self.is_pressed(Key::ArrowDown), self.is_pressed(Key::ArrowUp)),
        )
    }
}
