//! Sample format conversion and channel mixing:
//! interleaved integer PCM <-> interleaved F32, and ITU-R BS.775 downmix
//! matrices between common channel counts.

use sona_core::{Sample, SampleFormat};

const S16_SCALE: f32 = 32768.0;
const S24_SCALE: f32 = 8_388_608.0;
const S32_SCALE: f32 = 2_147_483_648.0;

/// Decode one interleaved PCM block of `format` into F32 samples, appending
/// to `out`. `bytes` must be a whole number of frames.
pub fn decode_to_f32(bytes: &[u8], format: SampleFormat, out: &mut Vec<Sample>) {
    match format {
        SampleFormat::U8 => {
            out.extend(bytes.iter().map(|&b| (b as f32 - 128.0) / 128.0));
        }
        SampleFormat::S16 => {
            for chunk in bytes.chunks_exact(2) {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                out.push(v as f32 / S16_SCALE);
            }
        }
        SampleFormat::S24 => {
            for chunk in bytes.chunks_exact(3) {
                let raw = [chunk[0], chunk[1], chunk[2], if chunk[2] & 0x80 != 0 { 0xFF } else { 0 }];
                let v = i32::from_le_bytes(raw);
                out.push(v as f32 / S24_SCALE);
            }
        }
        SampleFormat::S32 => {
            for chunk in bytes.chunks_exact(4) {
                let v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                out.push(v as f32 / S32_SCALE);
            }
        }
        SampleFormat::F32 => {
            for chunk in bytes.chunks_exact(4) {
                out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
    }
}

/// Encode F32 samples into interleaved PCM of `format`, appending bytes to
/// `out`. Encoding to an integer format rounds to nearest, ties to even,
/// and clamps to the format's representable range.
pub fn encode_from_f32(samples: &[Sample], format: SampleFormat, out: &mut Vec<u8>) {
    match format {
        SampleFormat::U8 => {
            out.extend(samples.iter().map(|&s| {
                        let scaled = round_ties_even((s.clamp(-1.0, 1.0) * 128.0) as f64) + 128.0;
                        scaled.clamp(0.0, 255.0) as u8
            }));
        }
        SampleFormat::S16 => {
            for &s in samples {
                let v = quantize(s, S16_SCALE, i16::MIN as f64, i16::MAX as f64) as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleFormat::S24 => {
            for &s in samples {
                let v = quantize(s, S24_SCALE, -8_388_608.0, 8_388_607.0) as i32;
                let bytes = v.to_le_bytes();
                out.extend_from_slice(&bytes[0..3]);
            }
        }
        SampleFormat::S32 => {
            for &s in samples {
                let v = quantize(s, S32_SCALE, i32::MIN as f64, i32::MAX as f64) as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            for &s in samples {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
}

#[inline]
fn quantize(sample: Sample, scale: f32, min: f64, max: f64) -> f64 {
    let scaled = round_ties_even((sample.clamp(-1.0, 1.0) * scale) as f64);
    scaled.clamp(min, max)
}

#[inline]
fn round_ties_even(value: f64) -> f64 {
    let floor = value.floor();
    let diff = value - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

/// ITU-R BS.775-derived downmix coefficients, `[output_channel][input_channel]`.
pub fn downmix_matrix(input_channels: u16, output_channels: u16) -> Vec<Vec<f32>> {
    match (input_channels, output_channels) {
        (n, m) if n == m => identity_matrix(n as usize),
        (2, 1) => vec![vec![0.5, 0.5]],
        (1, 2) => vec![vec![1.0], vec![1.0]],
        (6, 2) => {
            // L, R, C, LFE, Ls, Rs -> L, R (ITU-R BS.775 downmix)
            const CLEV: f32 = 0.7071;
            const SLEV: f32 = 0.7071;
            vec![
                vec![1.0, 0.0, CLEV, 0.0, SLEV, 0.0],
                vec![0.0, 1.0, CLEV, 0.0, 0.0, SLEV],
            ]
        }
        (6, 1) => {
            const CLEV: f32 = 0.7071;
            const SLEV: f32 = 0.7071;
            vec![vec![0.5, 0.5, CLEV * 0.5, 0.0, SLEV * 0.5, SLEV * 0.5]]
        }
        (n, 1) => vec![vec![1.0 / n as f32; n as usize]],
        (n, m) => {
            // no canonical matrix defined for this pairing: fall back to an
            // even spread that at least conserves total energy roughly.
            let scale = 1.0 / n as f32;
            vec![vec![scale; n as usize]; m as usize]
        }
    }
}

fn identity_matrix(n: usize) -> Vec<Vec<f32>> {
    (0..n)
    .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
    .collect()
}

/// Mix `input` (interleaved, `input_channels` wide) into `output`
/// (interleaved, `output_channels` wide) using `downmix_matrix`.
pub fn mix_channels(input: &[Sample], input_channels: u16, output_channels: u16, output: &mut Vec<Sample>) {
    let matrix = downmix_matrix(input_channels, output_channels);
    let frames = input.len() / input_channels as usize;
    output.clear();
    output.reserve(frames * output_channels as usize);
    for frame in 0..frames {
        let base = frame * input_channels as usize;
        for row in &matrix {
            let mut acc = 0.0;
            for (ch, coeff) in row.iter().enumerate() {
                acc += input[base + ch] * coeff;
            }
            output.push(acc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s16_round_trip_is_lossless_at_full_scale() {
        let samples = [1.0_f32, -1.0, 0.0, 0.5, -0.5];
        let mut bytes = Vec::new();
        encode_from_f32(&samples, SampleFormat::S16, &mut bytes);
        let mut decoded = Vec::new();
        decode_to_f32(&bytes, SampleFormat::S16, &mut decoded);
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn f32_round_trip_is_exact() {
        let samples = [0.123456_f32, -0.987654, 0.0];
        let mut bytes = Vec::new();
        encode_from_f32(&samples, SampleFormat::F32, &mut bytes);
        let mut decoded = Vec::new();
        decode_to_f32(&bytes, SampleFormat::F32, &mut decoded);
        assert_eq!(samples.to_vec(), decoded);
    }

    #[test]
    fn s24_round_trip_preserves_sign() {
        let samples = [-0.75_f32, 0.75];
        let mut bytes = Vec::new();
        encode_from_f32(&samples, SampleFormat::S24, &mut bytes);
        assert_eq!(bytes.len(), 6);
        let mut decoded = Vec::new();
        decode_to_f32(&bytes, SampleFormat::S24, &mut decoded);
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn stereo_to_mono_averages_channels() {
        let stereo = [1.0_f32, -1.0, 0.5, 0.5];
        let mut mono = Vec::new();
        mix_channels(&stereo, 2, 1, &mut mono);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn mono_to_stereo_duplicates_channel() {
        let mono = [0.25_f32];
        let mut stereo = Vec::new();
        mix_channels(&mono, 1, 2, &mut stereo);
        assert_eq!(stereo, vec![0.25, 0.25]);
    }

    #[test]
    fn identity_matrix_passes_samples_through() {
        let input = [0.1_f32, 0.2, 0.3, 0.4];
        let mut output = Vec::new();
        mix_channels(&input, 2, 2, &mut output);
        assert_eq!(input.to_vec(), output);
    }
}
