//! WAV encoding and decoding.
//!
//! Export format is the canonical 44-byte RIFF/WAVE header followed by
//! mono 16-bit little-endian PCM. Decoding accepts any PCM or float WAV
//! and converts it to mono f32 at the requested rate.

use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VoxError};
use std::io::{Cursor, Read};

/// Size of the canonical PCM WAV header in bytes.
pub const WAV_HEADER_LEN: usize = 44;

/// Quantize one float sample to 16-bit PCM.
///
/// Clamps to [-1, 1], scales negatives by 32768 and positives by 32767,
/// truncating toward zero. The error is under one step of the sample's sign,
/// so positives can be off by up to just below 1/32767.
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Inverse of [`quantize`].
pub fn dequantize(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

/// Encode mono float samples as a self-contained WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for &s in samples {
        writer.write_sample(quantize(s))?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

/// Concatenate chunk sample buffers in order.
pub fn concat<'a>(chunks: impl IntoIterator<Item = &'a [f32]>) -> Vec<f32> {
    let chunks: Vec<&[f32]> = chunks.into_iter().collect();
    let total = chunks.iter().map(|c| c.len()).sum();
    let mut combined = Vec::with_capacity(total);
    for chunk in chunks {
        combined.extend_from_slice(chunk);
    }
    combined
}

/// Decoded audio: mono f32 samples and their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a WAV stream to mono f32 at its native rate.
pub fn decode_wav(reader: impl Read) -> Result<DecodedAudio> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| VoxError::AudioEncode {
        message: format!("Failed to parse WAV data: {}", e),
    })?;

    let spec = wav_reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int if spec.bits_per_sample == 16 => wav_reader
            .samples::<i16>()
            .map(|s| s.map(dequantize))
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| VoxError::AudioEncode {
        message: format!("Failed to read WAV samples: {}", e),
    })?;

    let samples = if channels > 1 {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        interleaved
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode WAV bytes and resample to the model rate (24kHz mono).
pub fn decode_wav_at_model_rate(bytes: &[u8]) -> Result<Vec<f32>> {
    let decoded = decode_wav(Cursor::new(bytes))?;
    Ok(resample(&decoded.samples, decoded.sample_rate, SAMPLE_RATE))
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx.min(samples.len() - 1)]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}

/// Duration of `len` samples at the model rate.
pub fn duration_secs(len: usize) -> f64 {
    len as f64 / SAMPLE_RATE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[test]
    fn quantize_matches_asymmetric_scaling() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(-1.0), -32768);
        assert_eq!(quantize(0.5), 16383);
        assert_eq!(quantize(-0.5), -16384);
        assert_eq!(quantize(2.0), 32767);
        assert_eq!(quantize(-7.5), -32768);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn encode_writes_canonical_44_byte_header() {
        let samples = vec![0.0f32, 0.25, -0.25, 1.0, -1.0];
        let bytes = encode_wav(&samples, 24000).unwrap();

        assert_eq!(bytes.len(), WAV_HEADER_LEN + samples.len() * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), 36 + samples.len() as u32 * 2);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1); // PCM
        assert_eq!(u16_at(&bytes, 22), 1); // mono
        assert_eq!(u32_at(&bytes, 24), 24000);
        assert_eq!(u32_at(&bytes, 28), 48000);
        assert_eq!(u16_at(&bytes, 32), 2);
        assert_eq!(u16_at(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), samples.len() as u32 * 2);
    }

    #[test]
    fn encode_writes_little_endian_quantized_samples() {
        let bytes = encode_wav(&[1.0, -1.0, 0.5], 24000).unwrap();
        let data = &bytes[WAV_HEADER_LEN..];
        assert_eq!(i16::from_le_bytes([data[0], data[1]]), 32767);
        assert_eq!(i16::from_le_bytes([data[2], data[3]]), -32768);
        assert_eq!(i16::from_le_bytes([data[4], data[5]]), 16383);
    }

    #[test]
    fn round_trip_stays_within_quantization_error() {
        let samples: Vec<f32> = (0..2400)
            .map(|i| (i as f32 * 0.013).sin() * 0.9)
            .collect();
        let bytes = encode_wav(&samples, 24000).unwrap();
        let decoded = decode_wav(Cursor::new(bytes)).unwrap();

        assert_eq!(decoded.sample_rate, 24000);
        assert_eq!(decoded.samples.len(), samples.len());
        for (original, restored) in samples.iter().zip(&decoded.samples) {
            let scale = if *original < 0.0 { 32768.0 } else { 32767.0 };
            let exact = *original as f64 * scale;
            let level = (*restored as f64 * scale).round();
            assert!(
                (exact - level).abs() < 1.0,
                "{} came back as {}, more than one step away",
                original,
                restored
            );
        }
    }

    #[test]
    fn empty_input_encodes_header_only() {
        let bytes = encode_wav(&[], 24000).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_LEN);
        let decoded = decode_wav(Cursor::new(bytes)).unwrap();
        assert!(decoded.samples.is_empty());
    }

    #[test]
    fn decode_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in [16384i16, 0, -16384, 0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_wav(Cursor::new(cursor.into_inner())).unwrap();
        assert_eq!(decoded.samples.len(), 2);
        assert!((decoded.samples[0] - 0.25).abs() < 1e-3);
        assert!((decoded.samples[1] + 0.25).abs() < 1e-3);
    }

    #[test]
    fn decode_at_model_rate_resamples() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..22050 {
            writer.write_sample(0.5f32).unwrap();
        }
        writer.finalize().unwrap();

        let samples = decode_wav_at_model_rate(&cursor.into_inner()).unwrap();
        assert!((23900..=24100).contains(&samples.len()));
        assert!(samples.iter().all(|&s| (s - 0.5).abs() < 1e-4));
    }

    #[test]
    fn invalid_wav_data_returns_error() {
        let result = decode_wav(Cursor::new(vec![0u8, 1, 2, 3, 4, 5]));
        match result {
            Err(VoxError::AudioEncode { message }) => {
                assert!(message.contains("Failed to parse WAV data"));
            }
            other => panic!("Expected AudioEncode error, got {:?}", other),
        }
    }

    #[test]
    fn concat_preserves_order_and_length() {
        let a = [0.1f32, 0.2];
        let b = [0.3f32];
        let c: [f32; 0] = [];
        let combined = concat([&a[..], &b[..], &c[..]]);
        assert_eq!(combined, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample(&samples, 24000, 24000), samples);
    }

    #[test]
    fn resample_upsample_interpolates() {
        let resampled = resample(&[0.0, 1.0, 0.0], 12000, 24000);
        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0.0);
        assert!((resampled[1] - 0.5).abs() < 1e-6);
        assert_eq!(resampled[2], 1.0);
    }

    #[test]
    fn resample_handles_edge_cases() {
        assert!(resample(&[], 16000, 24000).is_empty());
        assert_eq!(resample(&[0.7], 48000, 24000), vec![0.7]);
    }

    #[test]
    fn duration_uses_model_rate() {
        assert!((duration_secs(24000) - 1.0).abs() < f64::EPSILON);
        assert!((duration_secs(12000) - 0.5).abs() < f64::EPSILON);
    }
}
