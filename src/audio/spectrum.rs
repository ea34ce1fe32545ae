use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// FFT window length
pub const FFT_SIZE: usize = 256;

/// Number of frequency bins in a snapshot
pub const BIN_COUNT: usize = FFT_SIZE / 2;

// Byte scaling window, in dBFS. Magnitudes at or below the floor map to 0,
// at or above the ceiling to 255.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Produces byte-scaled frequency snapshots of the most recent capture audio
///
/// One FFT plan is built up front and reused every tick.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrumAnalyzer {
    /// Plan the forward FFT
    #[must_use]
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
        }
    }

    /// Frequency snapshot of the trailing [`FFT_SIZE`] samples
    ///
    /// Returns all-zero bins for empty input; shorter input is zero-padded.
    /// Each bin is the windowed magnitude mapped onto 0..=255 over a fixed
    /// dB range, so a silent microphone reads 0 and full-scale input
    /// saturates.
    #[must_use]
    pub fn bins(&self, samples: &[f32]) -> [u8; BIN_COUNT] {
        let mut out = [0_u8; BIN_COUNT];
        if samples.is_empty() {
            return out;
        }

        let tail = &samples[samples.len().saturating_sub(FFT_SIZE)..];
        let mut buffer = [Complex { re: 0.0_f32, im: 0.0_f32 }; FFT_SIZE];
        for (i, &sample) in tail.iter().enumerate() {
            buffer[i] = Complex {
                re: sample * hann(i, tail.len()),
                im: 0.0,
            };
        }

        self.fft.process(&mut buffer);

        #[allow(clippy::cast_precision_loss)]
        let norm = 2.0 / FFT_SIZE as f32;
        for (bin, value) in out.iter_mut().zip(buffer.iter()) {
            *bin = byte_scale(value.norm() * norm);
        }
        out
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn hann(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }
    let phase = (index as f32) / ((len - 1) as f32);
    0.5 * (1.0 - (2.0 * std::f32::consts::PI * phase).cos())
}

/// Map a linear magnitude onto the 0..=255 dB window
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn byte_scale(magnitude: f32) -> u8 {
    let db = 20.0 * magnitude.max(1e-10).log10();
    let scaled = (db - MIN_DB) / (MAX_DB - MIN_DB) * 255.0;
    scaled.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_zero_bins() {
        let analyzer = SpectrumAnalyzer::new();
        assert_eq!(analyzer.bins(&[]), [0_u8; BIN_COUNT]);
    }

    #[test]
    fn test_silence_yields_zero_bins() {
        let analyzer = SpectrumAnalyzer::new();
        let silence = vec![0.0_f32; 1024];
        assert_eq!(analyzer.bins(&silence), [0_u8; BIN_COUNT]);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_tone_concentrates_energy() {
        let analyzer = SpectrumAnalyzer::new();
        // Bin 8 at FFT_SIZE samples: 8 full cycles across the window.
        let tone: Vec<f32> = (0..FFT_SIZE)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * (i as f32) / (FFT_SIZE as f32)).sin())
            .collect();

        let bins = analyzer.bins(&tone);
        let peak = bins.iter().copied().max().unwrap();
        assert!(peak > 200, "expected near-saturated peak, got {peak}");

        let peak_bin = bins.iter().position(|&b| b == peak).unwrap();
        assert!(
            (7..=9).contains(&peak_bin),
            "peak at bin {peak_bin}, expected near 8"
        );
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let analyzer = SpectrumAnalyzer::new();
        let bins = analyzer.bins(&[0.5; 32]);
        assert_eq!(bins.len(), BIN_COUNT);
    }

    #[test]
    fn test_byte_scale_window() {
        assert_eq!(byte_scale(0.0), 0);
        assert_eq!(byte_scale(1.0), 255);
    }
}
