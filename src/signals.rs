//! Speaking and listening flags shared with the chat/voice layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Flags {
    speaking: AtomicBool,
    listening: AtomicBool,
}

/// Latest conversation state as seen by the avatar.
///
/// Writers update the flags whenever their state changes; the frame loop
/// samples both once per frame. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct AvatarSignals {
    flags: Arc<Flags>,
}

impl AvatarSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.flags.speaking.store(speaking, Ordering::Release);
    }

    pub fn set_listening(&self, listening: bool) {
        self.flags.listening.store(listening, Ordering::Release);
    }

    pub fn speaking(&self) -> bool {
        self.flags.speaking.load(Ordering::Acquire)
    }

    pub fn listening(&self) -> bool {
        self.flags.listening.load(Ordering::Acquire)
    }

    /// Both flags as `(speaking, listening)`.
    pub fn snapshot(&self) -> (bool, bool) {
        (self.speaking(), self.listening())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_same_flags() {
        let chat = AvatarSignals::new();
        let frame = chat.clone();
        assert_eq!(frame.snapshot(), (false, false));

        chat.set_speaking(true);
        assert_eq!(frame.snapshot(), (true, false));

        chat.set_listening(true);
        chat.set_speaking(false);
        assert_eq!(frame.snapshot(), (false, true));
    }

    #[test]
    fn writes_from_another_thread_are_visible() {
        let signals = AvatarSignals::new();
        let writer = signals.clone();
        std::thread::spawn(move || writer.set_listening(true))
            .join()
            .unwrap_or_default();
        assert!(signals.listening());
    }
}
