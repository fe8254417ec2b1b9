//! Pitch-preserving time stretch (WSOLA).
//!
//! Used by the buffered playback resource so speed changes do not shift
//! pitch. Frames of the input are overlap-added at a fixed output hop while
//! the input hop scales with the rate; each frame position is nudged within
//! a small window to the offset that best continues the previous frame.

use crate::defaults::{MAX_SPEED, MIN_SPEED};

/// Analysis frame length in samples (~43ms at 24kHz).
const FRAME_LEN: usize = 1024;

/// Output hop: 50% overlap.
const HOP_OUT: usize = FRAME_LEN / 2;

/// Maximum distance searched around the nominal input position.
const SEARCH_RADIUS: usize = 256;

/// Stride of the offset search; correlation is also subsampled by this.
const SEARCH_STEP: usize = 2;

/// Samples compared when scoring a candidate offset.
const OVERLAP: usize = HOP_OUT;

/// Stretch `input` so that it plays `rate` times faster at unchanged pitch.
///
/// `rate` is clamped to the supported speed range. Inputs shorter than two
/// frames are returned unchanged.
pub fn time_stretch(input: &[f32], rate: f32) -> Vec<f32> {
    let rate = rate.clamp(MIN_SPEED, MAX_SPEED);
    if (rate - 1.0).abs() < 1e-3 || input.len() < FRAME_LEN * 2 {
        return input.to_vec();
    }

    let hop_in = HOP_OUT as f32 * rate;
    let out_len = (input.len() as f32 / rate).ceil() as usize;
    let window = hann(FRAME_LEN);

    let mut output = vec![0.0f32; out_len + FRAME_LEN];
    let mut norm = vec![0.0f32; out_len + FRAME_LEN];
    let mut prev_pos: Option<usize> = None;

    for k in 0.. {
        let out_pos = k * HOP_OUT;
        if out_pos >= out_len {
            break;
        }
        let nominal = (k as f32 * hop_in).round() as usize;
        if nominal >= input.len() {
            break;
        }

        let pos = match prev_pos {
            Some(prev) => best_offset(input, prev + HOP_OUT, nominal),
            None => nominal,
        };

        for (i, w) in window.iter().enumerate() {
            let Some(&sample) = input.get(pos + i) else {
                break;
            };
            output[out_pos + i] += sample * w;
            norm[out_pos + i] += w;
        }
        prev_pos = Some(pos);
    }

    output.truncate(out_len);
    for (sample, weight) in output.iter_mut().zip(&norm) {
        if *weight > 1e-3 {
            *sample /= *weight;
        }
    }
    output
}

/// Input offset near `nominal` whose start best matches `target`.
fn best_offset(input: &[f32], target: usize, nominal: usize) -> usize {
    if target + OVERLAP >= input.len() {
        return nominal;
    }

    let lo = nominal.saturating_sub(SEARCH_RADIUS);
    let hi = (nominal + SEARCH_RADIUS).min(input.len().saturating_sub(1));

    let mut best = nominal;
    let mut best_score = f32::MIN;
    let mut candidate = lo;
    while candidate <= hi {
        let score = correlation(input, target, candidate);
        if score > best_score {
            best_score = score;
            best = candidate;
        }
        candidate += SEARCH_STEP;
    }
    best
}

fn correlation(input: &[f32], a: usize, b: usize) -> f32 {
    (0..OVERLAP)
        .step_by(SEARCH_STEP)
        .map_while(|i| Some(input.get(a + i)? * input.get(b + i)?))
        .sum()
}

fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / len as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}
