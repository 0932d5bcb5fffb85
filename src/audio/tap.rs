//! Tap on the assistant's own audio playback.
//!
//! The playback layer keeps one clone of a [`PlaybackTap`] and calls
//! [`PlaybackTap::push`] with every block it renders. Another clone is handed
//! to the analyzer as an [`AudioSource`]. While the tap is closed, pushes
//! are dropped.

use super::{AudioSource, SampleBlock, SourceKind};
use crate::error::Result;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Shared forwarding point between playback and the analyzer.
#[derive(Clone, Default)]
pub struct PlaybackTap {
    sink: Arc<Mutex<Option<Sender<SampleBlock>>>>,
}

impl PlaybackTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward a rendered block. Returns `false` when nothing is listening
    /// or the analyzer queue is full.
    pub fn push(&self, samples: &[f32]) -> bool {
        let Ok(mut guard) = self.sink.lock() else {
            warn!("playback tap lock poisoned");
            return false;
        };
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(samples.to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("analyzer queue full, dropping playback block");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                *guard = None;
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl AudioSource for PlaybackTap {
    fn kind(&self) -> SourceKind {
        SourceKind::Playback
    }

    fn describe(&self) -> String {
        "playback tap".to_owned()
    }

    fn open(&mut self, tx: Sender<SampleBlock>) -> Result<()> {
        let mut guard = self
            .sink
            .lock()
            .map_err(|e| crate::error::VisageError::Audio(format!("playback tap lock poisoned: {e}")))?;
        *guard = Some(tx);
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut guard) = self.sink.lock() {
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn push_is_dropped_while_closed() {
        let tap = PlaybackTap::new();
        assert!(!tap.push(&[0.1, 0.2]));
        assert!(!tap.is_open());
    }

    #[test]
    fn clones_share_one_sink() {
        let player = PlaybackTap::new();
        let mut source = player.clone();
        let (tx, rx) = bounded(4);
        source.open(tx).unwrap();

        assert!(player.is_open());
        assert!(player.push(&[0.5, -0.5]));
        assert_eq!(rx.try_recv().unwrap(), vec![0.5, -0.5]);

        source.close();
        assert!(!player.push(&[0.5]));
        source.close();
    }

    #[test]
    fn full_queue_drops_block() {
        let player = PlaybackTap::new();
        let mut source = player.clone();
        let (tx, _rx) = bounded(1);
        source.open(tx).unwrap();
        assert!(player.push(&[0.1]));
        assert!(!player.push(&[0.2]));
        assert!(player.is_open());
    }
}
