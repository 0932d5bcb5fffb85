//! Voice Activity Detection using energy-based analysis.
//!
//! Uses RMS energy thresholding and reports speech boundaries as edges:
//! one [`VadEdge::SpeechStart`] per upward crossing, one
//! [`VadEdge::SpeechEnd`] per downward crossing, nothing in between.

/// A speech boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEdge {
    SpeechStart,
    SpeechEnd,
}

/// Edge-triggered voice activity detector over per-block RMS values.
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    /// RMS level above which a block counts as speech.
    threshold: f32,
    /// Whether we are currently in a speech segment.
    in_speech: bool,
}

impl VoiceActivityDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            in_speech: false,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_active(&self) -> bool {
        self.in_speech
    }

    /// Classify one block's RMS and report a boundary if the state flipped.
    pub fn update(&mut self, rms: f32) -> Option<VadEdge> {
        let is_speech = rms > self.threshold;
        match (self.in_speech, is_speech) {
            (false, true) => {
                self.in_speech = true;
                Some(VadEdge::SpeechStart)
            }
            (true, false) => {
                self.in_speech = false;
                Some(VadEdge::SpeechEnd)
            }
            _ => None,
        }
    }

    /// Reset the VAD state. Returns whether a speech segment was open.
    pub fn reset(&mut self) -> bool {
        std::mem::replace(&mut self.in_speech, false)
    }
}

/// Compute RMS energy of audio samples.
pub fn compute_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
