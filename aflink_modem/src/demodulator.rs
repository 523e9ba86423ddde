//! Envelope + DFT-correlation AFSK demodulator with preamble-based
//! alignment search and closed-loop bit-clock recovery.

use crate::config::ModemConfig;
use crate::filter::Biquad;

/// Ratio of peak amplitude used to locate the onset of a transmission.
const ONSET_THRESHOLD_RATIO: f64 = 0.3;
/// Lower, sustained threshold used to confirm the onset candidate.
const ONSET_SUSTAIN_RATIO: f64 = 0.15;
/// Score at or above which the coarse alignment scan exits early.
const EARLY_EXIT_SCORE: u32 = 18;
/// Number of bytes examined by the alignment scoring function.
const SCORE_WINDOW_BYTES: usize = 24;

/// Recovers a byte stream from noisy, drifting AFSK samples.
#[derive(Debug, Clone, Copy)]
pub struct Demodulator {
    config: ModemConfig,
}

impl Demodulator {
    pub fn new(config: ModemConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ModemConfig {
        self.config
    }

    /// Demodulate `samples` into a best-effort byte stream. Returns an empty
    /// vector if the buffer is too short or no signal onset is found.
    pub fn demodulate(&self, samples: &[f32]) -> Vec<u8> {
        let spb = self.config.samples_per_bit();
        let spb_usize = spb.round().max(1.0) as usize;

        if samples.len() < spb_usize * 8 {
            return Vec::new();
        }

        let mark_env = self.envelope(samples, self.config.mark_freq);
        let space_env = self.envelope(samples, self.config.space_freq);

        let onset = match signal_onset(samples, spb_usize) {
            Some(o) => o,
            None => return Vec::new(),
        };

        let (chosen_offset, _score) = self.alignment_search(&mark_env, &space_env, onset, spb);

        let remaining_bits = ((samples.len() as f64 - chosen_offset) / spb).floor();
        if remaining_bits < 1.0 {
            return Vec::new();
        }
        let n_bits = remaining_bits as usize;

        let positions = recover_bit_positions(&mark_env, &space_env, chosen_offset, spb, n_bits);
        let bytes_envelope = decode_at_positions_envelope(&mark_env, &space_env, &positions, spb);
        let bytes_dft = decode_at_positions_dft(samples, &self.config, &positions, spb_usize);

        if score_alignment(&bytes_dft) > score_alignment(&bytes_envelope) {
            bytes_dft
        } else {
            bytes_envelope
        }
    }

    /// RMS-normalized envelope of `samples` in the band around `center_freq`.
    fn envelope(&self, samples: &[f32], center_freq: f64) -> Vec<f64> {
        let sr = self.config.sample_rate as f64;
        let mut bandpass = Biquad::bandpass(sr, center_freq, 800.0);
        let filtered = bandpass.process_buffer(samples);
        let rectified: Vec<f32> = filtered.iter().map(|&v| v.abs() as f32).collect();

        let mut lowpass = Biquad::lowpass(sr, 2.0 * self.config.baud_rate as f64);
        let mut env = lowpass.process_buffer(&rectified);
        normalize_rms(&mut env);
        env
    }

    /// Two-pass (coarse then fine) scan for the best bit-phase offset,
    /// scored by preamble/sync likeness. Returns the winning offset and its
    /// score; if every candidate scores zero, the first candidate (the
    /// onset itself) is returned, matching the documented best-effort
    /// fallback.
    fn alignment_search(&self, mark_env: &[f64], space_env: &[f64], onset: usize, spb: f64) -> (f64, u32) {
        let byte_period = spb * 8.0;
        let coarse_step = spb / 4.0;
        let coarse_span = 16.0 * byte_period;

        let mut best_offset = onset as f64;
        let mut best_score = 0u32;

        let mut offset = onset as f64;
        let coarse_max = onset as f64 + coarse_span;
        while offset <= coarse_max {
            let bytes = decode_fixed(mark_env, space_env, offset, spb, SCORE_WINDOW_BYTES);
            let score = score_alignment(&bytes);
            if score > best_score {
                best_score = score;
                best_offset = offset;
            }
            if best_score >= EARLY_EXIT_SCORE {
                break;
            }
            offset += coarse_step;
        }

        let fine_step = spb / 16.0;
        let mut offset = (best_offset - coarse_step).max(onset as f64);
        let fine_max = best_offset + coarse_step;
        while offset <= fine_max {
            let bytes = decode_fixed(mark_env, space_env, offset, spb, SCORE_WINDOW_BYTES);
            let score = score_alignment(&bytes);
            if score > best_score {
                best_score = score;
                best_offset = offset;
            }
            offset += fine_step;
        }

        (best_offset, best_score)
    }
}

fn normalize_rms(env: &mut [f64]) {
    let sum_sq: f64 = env.iter().map(|v| v * v).sum();
    if env.is_empty() {
        return;
    }
    let rms = (sum_sq / env.len() as f64).sqrt();
    if rms > 1e-12 {
        for v in env.iter_mut() {
            *v /= rms;
        }
    }
}

/// Locate the first sliding `spb`-wide RMS window that exceeds
/// `ONSET_THRESHOLD_RATIO` of the buffer's peak amplitude, confirmed by a
/// sustained window above the lower ratio.
fn signal_onset(samples: &[f32], spb: usize) -> Option<usize> {
    let peak = samples.iter().fold(0.0_f32, |m, &s| m.max(s.abs())) as f64;
    if peak <= 1e-9 {
        return None;
    }
    let hi_threshold = ONSET_THRESHOLD_RATIO * peak;
    let lo_threshold = ONSET_SUSTAIN_RATIO * peak;

    if samples.len() < spb {
        return None;
    }

    let window_rms = |start: usize| -> f64 {
        let end = (start + spb).min(samples.len());
        let sum_sq: f64 = samples[start..end].iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / (end - start) as f64).sqrt()
    };

    let last_start = samples.len() - spb;
    for start in 0..=last_start {
        if window_rms(start) > hi_threshold {
            let sustain_end = (start + spb * 3).min(samples.len().saturating_sub(spb));
            let mut sustained = true;
            let mut check = start;
            while check <= sustain_end {
                if window_rms(check) < lo_threshold {
                    sustained = false;
                    break;
                }
                check += spb;
            }
            if sustained {
                return Some(start);
            }
        }
    }
    None
}

fn window_mean(env: &[f64], start: f64, end: f64) -> f64 {
    let s = start.max(0.0).round() as usize;
    let e = (end.round() as isize).max(0) as usize;
    let e = e.min(env.len());
    if s >= e || s >= env.len() {
        return 0.0;
    }
    let slice = &env[s..e];
    slice.iter().sum::<f64>() / slice.len() as f64
}

fn decide_bit(mark_env: &[f64], space_env: &[f64], pos: f64, spb: f64) -> bool {
    let mark_mean = window_mean(mark_env, pos + 0.25 * spb, pos + 0.75 * spb);
    let space_mean = window_mean(space_env, pos + 0.25 * spb, pos + 0.75 * spb);
    mark_mean > space_mean
}

fn pack_bits_lsb(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    byte |= 1 << i;
                }
            }
            byte
        })
        .collect()
}

/// Decode a fixed number of bytes from a fixed bit-phase offset with no
/// clock recovery; used only to score alignment candidates.
fn decode_fixed(mark_env: &[f64], space_env: &[f64], offset: f64, spb: f64, n_bytes: usize) -> Vec<u8> {
    let n_bits = n_bytes * 8;
    let bits: Vec<bool> = (0..n_bits)
        .map(|i| decide_bit(mark_env, space_env, offset + i as f64 * spb, spb))
        .collect();
    pack_bits_lsb(&bits)
}

/// Search for a zero crossing of `mark_env - space_env` within ±0.4 bit
/// periods of `center`, returning the fractional sample index of the
/// crossing.
fn find_zero_crossing(mark_env: &[f64], space_env: &[f64], center: f64, spb: f64) -> Option<f64> {
    let len = mark_env.len().min(space_env.len());
    if len == 0 {
        return None;
    }
    let lo = (center - 0.4 * spb).max(0.0) as usize;
    let hi = ((center + 0.4 * spb).round() as usize).min(len.saturating_sub(1));
    if lo >= hi {
        return None;
    }

    let diff_at = |i: usize| mark_env[i] - space_env[i];
    let mut prev = diff_at(lo);
    for i in (lo + 1)..=hi {
        let cur = diff_at(i);
        if (prev <= 0.0 && cur > 0.0) || (prev >= 0.0 && cur < 0.0) {
            let denom = cur - prev;
            let frac = if denom.abs() > 1e-12 { -prev / denom } else { 0.0 };
            return Some((i - 1) as f64 + frac);
        }
        prev = cur;
    }
    None
}

/// Step a floating-point position accumulator by `spb` per bit, correcting
/// on every bit transition via a first-order PLL (`Kp = 0.3`, saturation at
/// ±15% of a bit period).
fn recover_bit_positions(mark_env: &[f64], space_env: &[f64], start_offset: f64, spb: f64, n_bits: usize) -> Vec<f64> {
    const KP: f64 = 0.3;
    let max_correction = 0.15 * spb;

    let mut positions = Vec::with_capacity(n_bits);
    let mut pos = start_offset;
    let mut prev_bit: Option<bool> = None;

    for _ in 0..n_bits {
        positions.push(pos);
        let bit = decide_bit(mark_env, space_env, pos, spb);
        let mut next_pos = pos + spb;

        if let Some(prev) = prev_bit {
            if prev != bit {
                if let Some(zc) = find_zero_crossing(mark_env, space_env, pos, spb) {
                    let err = zc - pos;
                    let correction = (KP * err).clamp(-max_correction, max_correction);
                    next_pos = pos + spb + correction;
                }
            }
        }

        prev_bit = Some(bit);
        pos = next_pos;
    }

    positions
}

fn decode_at_positions_envelope(mark_env: &[f64], space_env: &[f64], positions: &[f64], spb: f64) -> Vec<u8> {
    let bits: Vec<bool> = positions.iter().map(|&pos| decide_bit(mark_env, space_env, pos, spb)).collect();
    pack_bits_lsb(&bits)
}

/// Stateless DFT-correlation decoder: at each recovered position, compute
/// mark/space magnitude via inner products against cosine/sine references,
/// normalize each series by its own mean, and decide by comparison.
fn decode_at_positions_dft(samples: &[f32], config: &ModemConfig, positions: &[f64], spb: usize) -> Vec<u8> {
    use std::f64::consts::PI;

    let sr = config.sample_rate as f64;
    let mark_omega = 2.0 * PI * config.mark_freq / sr;
    let space_omega = 2.0 * PI * config.space_freq / sr;

    let mut mark_mags = Vec::with_capacity(positions.len());
    let mut space_mags = Vec::with_capacity(positions.len());

    for &pos in positions {
        let start = pos.max(0.0).round() as usize;
        let end = (start + spb).min(samples.len());
        if start >= end {
            mark_mags.push(0.0);
            space_mags.push(0.0);
            continue;
        }

        let (mut mi, mut mq, mut si, mut sq) = (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);
        for (n, &s) in samples[start..end].iter().enumerate() {
            let sample = s as f64;
            mi += sample * (mark_omega * n as f64).cos();
            mq += sample * (mark_omega * n as f64).sin();
            si += sample * (space_omega * n as f64).cos();
            sq += sample * (space_omega * n as f64).sin();
        }
        mark_mags.push(mi * mi + mq * mq);
        space_mags.push(si * si + sq * sq);
    }

    let mean = |v: &[f64]| -> f64 {
        if v.is_empty() {
            0.0
        } else {
            v.iter().sum::<f64>() / v.len() as f64
        }
    };
    let mark_mean = mean(&mark_mags).max(1e-12);
    let space_mean = mean(&space_mags).max(1e-12);

    let bits: Vec<bool> = mark_mags
        .iter()
        .zip(space_mags.iter())
        .map(|(&m, &s)| (m / mark_mean) > (s / space_mean))
        .collect();
    pack_bits_lsb(&bits)
}

/// Score a decoded byte sequence by preamble/sync likeness.
fn score_alignment(bytes: &[u8]) -> u32 {
    let first_20 = &bytes[..bytes.len().min(20)];
    let mut score = first_20.iter().filter(|&&b| b == 0xAA).count() as u32;

    let scan_end = SCORE_WINDOW_BYTES.min(bytes.len().saturating_sub(1));
    for i in 4..scan_end {
        if bytes[i] == 0x7E && bytes[i + 1] == 0x7E {
            score += 6;
            break;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulator::Modulator;

    #[test]
    fn buffer_shorter_than_eight_bit_periods_is_empty() {
        let demod = Demodulator::new(ModemConfig::default());
        let samples = vec![0.0_f32; 10];
        assert!(demod.demodulate(&samples).is_empty());
    }

    #[test]
    fn silence_yields_no_onset_and_empty_output() {
        let demod = Demodulator::new(ModemConfig::default());
        let samples = vec![0.0_f32; 4000];
        assert!(demod.demodulate(&samples).is_empty());
    }

    #[test]
    fn score_alignment_rewards_preamble_and_sync() {
        let mut bytes = vec![0xAA; 20];
        bytes.extend_from_slice(&[0x00; 4]);
        bytes[4] = 0x7E;
        bytes[5] = 0x7E;
        let score = score_alignment(&bytes);
        assert_eq!(score, 20 + 6);
    }

    #[test]
    fn score_alignment_checks_sync_pair_at_tail_of_window_for_longer_inputs() {
        // 30 bytes total: sync pair sits at indices (23, 24), which only a
        // scan reaching all the way to `min(24, len - 1)` will ever see.
        let mut bytes = vec![0x00_u8; 30];
        bytes[23] = 0x7E;
        bytes[24] = 0x7E;
        let score = score_alignment(&bytes);
        assert_eq!(score, 6);
    }

    #[test]
    fn clean_loopback_round_trip_recovers_most_of_the_stream() {
        let config = ModemConfig::default().with_amplitude(0.5);
        let mut modulator = Modulator::new(config);

        let mut message = vec![0xAA_u8; 16];
        message.extend_from_slice(&[0x7E, 0x7E]);
        message.extend_from_slice(b"hello world this is a test payload of some length");

        let block = modulator.modulate(&message);
        let demod = Demodulator::new(config);
        let decoded = demod.demodulate(&block.samples);

        assert!(!decoded.is_empty());
        // the preamble and sync should reliably reappear near the front
        assert!(decoded.iter().take(16).filter(|&&b| b == 0xAA).count() >= 10);
    }
}
