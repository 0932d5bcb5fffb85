//! Coarse spectral band split for mouth shaping.
//!
//! The band edges follow a 256-point analyser: bins `[0, 10)`, `[10, 50)` and
//! `[50, 100)` of 128, scaled proportionally for other FFT sizes. Each bin is
//! put on a decibel scale, with -100 dB mapped to 0 and -30 dB to 1, before
//! the band average.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Bin level mapped to 0.
const MIN_DB: f32 = -100.0;
/// Bin level mapped to 1.
const MAX_DB: f32 = -30.0;

/// Average normalized bin level of three frequency regions, each in 0..1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectrumBands {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

/// Reusable FFT plan and buffers for band analysis.
pub struct SpectrumAnalyzer {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    /// Plan an FFT of `size` points. Sizes below 16 are raised to 16.
    pub fn new(size: usize) -> Self {
        let size = size.max(16);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        let window = (0..size)
            .map(|n| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / (size - 1) as f32).cos())
            })
            .collect();
        Self {
            size,
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Analyse the most recent `size` samples of `samples` (zero padded).
    pub fn bands(&mut self, samples: &[f32]) -> SpectrumBands {
        let tail = &samples[samples.len().saturating_sub(self.size)..];
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = tail.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.size as f32;
        let bins = self.size / 2;
        let magnitude = |k: usize| {
            let db = 20.0 * (self.buffer[k].norm() * scale).log10();
            ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0)
        };
        let edge = |n: usize| (bins * n / 128).max(1);

        let average = |start: usize, end: usize| {
            let end = end.min(bins);
            if end <= start {
                return 0.0;
            }
            (start..end).map(&magnitude).sum::<f32>() / (end - start) as f32
        };

        SpectrumBands {
            low: average(0, edge(10)),
            mid: average(edge(10), edge(50)),
            high: average(edge(50), edge(100)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(bin: usize, size: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|n| {
                amplitude
                    * (2.0 * std::f32::consts::PI * bin as f32 * n as f32 / size as f32).sin()
            })
            .collect()
    }

    #[test]
    fn silence_has_no_energy() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        assert_eq!(analyzer.bands(&[0.0; 256]), SpectrumBands::default());
        assert_eq!(analyzer.bands(&[]), SpectrumBands::default());
    }

    #[test]
    fn tone_lands_in_its_band() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let low = analyzer.bands(&sine(4, 256, 0.8));
        assert!(low.low > low.mid && low.low > low.high);

        let mid = analyzer.bands(&sine(30, 256, 0.8));
        assert!(mid.mid > mid.low && mid.mid > mid.high);

        let high = analyzer.bands(&sine(75, 256, 0.8));
        assert!(high.high > high.low && high.high > high.mid);
    }

    #[test]
    fn voiced_mid_band_reads_high() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mut voiced = vec![0.0; 256];
        for bin in (10..50).step_by(2) {
            for (n, s) in sine(bin, 256, 0.05).into_iter().enumerate() {
                voiced[n] += s;
            }
        }
        let bands = analyzer.bands(&voiced);
        assert!(bands.mid > 0.4, "mid {}", bands.mid);
        assert!(bands.low < bands.mid && bands.high < bands.mid);
    }

    #[test]
    fn bands_stay_normalized() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let loud: Vec<f32> = (0..1024).map(|n| if n % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let bands = analyzer.bands(&loud);
        for v in [bands.low, bands.mid, bands.high] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
