//! Continuous-phase AFSK modulator.

use std::f64::consts::PI;

use aflink_core::SampleBlock;

use crate::config::ModemConfig;

/// Maps a byte stream to a continuous-phase AFSK waveform.
///
/// Phase is carried across bit boundaries so no discontinuity spikes appear
/// at symbol transitions. Bits within a byte are emitted LSB-first.
#[derive(Debug, Clone)]
pub struct Modulator {
    config: ModemConfig,
    phase: f64,
}

impl Modulator {
    pub fn new(config: ModemConfig) -> Self {
        Self { config, phase: 0.0 }
    }

    /// Return the running phase to zero.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    pub fn config(&self) -> ModemConfig {
        self.config
    }

    /// Modulate a byte stream into a sample block at the configured rate.
    pub fn modulate(&mut self, bytes: &[u8]) -> SampleBlock {
        let spb = self.config.samples_per_bit().round() as usize;
        let mut samples = Vec::with_capacity(bytes.len() * 8 * spb);

        for &byte in bytes {
            for bit_index in 0..8 {
                let bit = (byte >> bit_index) & 1;
                self.emit_bit(bit == 1, spb, &mut samples);
            }
        }

        SampleBlock::new(samples, self.config.sample_rate)
    }

    fn emit_bit(&mut self, mark: bool, spb: usize, out: &mut Vec<f32>) {
        let freq = if mark { self.config.mark_freq } else { self.config.space_freq };
        let sr = self.config.sample_rate as f64;
        let omega = 2.0 * PI * freq / sr;

        for n in 0..spb {
            let sample = (self.phase + omega * n as f64).sin();
            out.push((sample * self.config.amplitude as f64) as f32);
        }

        self.phase = (self.phase + omega * spb as f64).rem_euclid(2.0 * PI);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulation_of_0xaa_produces_expected_length() {
        let mut modulator = Modulator::new(ModemConfig::default());
        let block = modulator.modulate(&[0xAA]);
        assert_eq!(block.len(), 8 * 160);
    }

    #[test]
    fn peak_amplitude_does_not_exceed_configured_amplitude() {
        let mut modulator = Modulator::new(ModemConfig::default());
        let block = modulator.modulate(&[0xAA, 0x55, 0x00, 0xFF]);
        let peak = block.samples.iter().fold(0.0_f32, |m, &s| m.max(s.abs()));
        assert!(peak <= 0.1 + 1e-6);
    }

    #[test]
    fn phase_is_continuous_across_bit_boundaries() {
        let mut modulator = Modulator::new(ModemConfig::default().with_amplitude(1.0));
        let block = modulator.modulate(&[0xAA]);
        // Bound instantaneous phase-rate change between consecutive samples:
        // with amplitude 1.0, |s[n+1] - s[n]| approximates the maximum slope
        // of the higher of the two tones, which caps at ~2*pi*space/sr per
        // sample for pure tones; confirm no boundary produces a bigger jump
        // than the interior of a bit period.
        let space_step = 2.0 * std::f64::consts::PI * 2200.0 / 48_000.0;
        let mut max_jump = 0.0_f64;
        for w in block.samples.windows(2) {
            let d = (w[1] as f64 - w[0] as f64).abs();
            if d > max_jump {
                max_jump = d;
            }
        }
        // consecutive-sample amplitude delta of a unit sinusoid is bounded by
        // its angular step; no transition should exceed this by more than a
        // small margin, ruling out a discontinuity spike.
        assert!(max_jump <= space_step + 0.05);
    }

    #[test]
    fn reset_returns_phase_to_zero() {
        let mut modulator = Modulator::new(ModemConfig::default());
        modulator.modulate(&[0xFF]);
        modulator.reset();
        let block = modulator.modulate(&[0x00]);
        // first sample of a fresh space tone emitted from phase 0 is sin(0) == 0
        assert!(block.samples[0].abs() < 1e-5);
    }

    #[test]
    fn bits_are_emitted_lsb_first() {
        // 0x01 has its least-significant bit set: first bit is mark (1200Hz),
        // remaining seven bits are space (2200Hz). Check the first bit period
        // has lower zero-crossing frequency than the second.
        let mut modulator = Modulator::new(ModemConfig::default().with_amplitude(1.0));
        let block = modulator.modulate(&[0x01]);
        let spb = 160;
        let count_crossings = |s: &[f32]| -> usize {
            s.windows(2).filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0)).count()
        };
        let first_bit = &block.samples[0..spb];
        let second_bit = &block.samples[spb..spb * 2];
        assert!(count_crossings(first_bit) < count_crossings(second_bit));
    }
}
