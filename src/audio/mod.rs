//! Live audio sources and amplitude analysis.
//!
//! An [`AudioSource`] pushes mono `f32` blocks into a channel once opened.
//! The [`analyzer::AmplitudeAnalyzer`] owns at most one source at a time and
//! turns its blocks into a smoothed level and speech start/end events.

pub mod analyzer;
pub mod capture;
pub mod spectrum;
pub mod tap;

use crate::error::Result;
use crossbeam_channel::Sender;

/// A block of mono samples in \[-1, 1\].
pub type SampleBlock = Vec<f32>;

/// What kind of signal a source delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A capture device (the user's voice).
    Microphone,
    /// Audio the assistant is playing back (its own voice).
    Playback,
}

/// A live audio signal the analyzer can bind to.
pub trait AudioSource: Send {
    fn kind(&self) -> SourceKind;

    /// Human-readable name for logs.
    fn describe(&self) -> String;

    /// Acquire the underlying device or graph and start sending blocks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VisageError::Audio`] on permission denial, a missing
    /// device, or a stream that cannot be started.
    fn open(&mut self, tx: Sender<SampleBlock>) -> Result<()>;

    /// Stop sending and release the device. Safe to call repeatedly.
    fn close(&mut self);
}
