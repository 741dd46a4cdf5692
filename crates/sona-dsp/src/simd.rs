//! Runtime SIMD dispatch for the hot per-sample-block paths (mixer
//! accumulation, window application, FFT butterflies): detect once at
//! startup, then call through a static dispatch table so the variant
//! selected at runtime stays consistent across a session.

use std::sync::OnceLock;

use sona_core::Sample;

/// Detected SIMD capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SimdLevel {
    Scalar = 0,
    Sse = 1,
    Avx2 = 2,
    Neon = 3,
}

impl SimdLevel {
    /// SIMD width in `Sample` (f32) elements.
    pub const fn width(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Sse | SimdLevel::Neon => 4,
            SimdLevel::Avx2 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "Scalar",
            SimdLevel::Sse => "SSE",
            SimdLevel::Avx2 => "AVX2",
            SimdLevel::Neon => "NEON",
        }
    }
}

static DETECTED_SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

pub fn detect_simd_level() -> SimdLevel {
    *DETECTED_SIMD_LEVEL.get_or_init(|| {
            #[cfg(target_arch = "x86_64")]
            {
                if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                    return SimdLevel::Avx2;
                }
                if is_x86_feature_detected!("sse4.2") {
                    return SimdLevel::Sse;
                }
                SimdLevel::Scalar
            }

            #[cfg(target_arch = "aarch64")]
            {
                SimdLevel::Neon
            }

            #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
            {
                SimdLevel::Scalar
            }
    })
}

#[inline]
pub fn simd_level() -> SimdLevel {
    detect_simd_level()
}

/// Flush denormals to zero (DAZ + FTZ) — must be called once per audio
/// thread at startup. Without this, quiet signal tails (reverb/envelope
/// tails below ~1e-38) can cost 10-100x the normal cycle count per sample.
#[inline]
pub fn set_denormals_zero() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};
        let mxcsr = _mm_getcsr();
        _mm_setcsr(mxcsr | 0x8040);
    }
}

#[inline]
pub fn restore_denormals() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};
        let mxcsr = _mm_getcsr();
        _mm_setcsr(mxcsr & !0x8040);
    }
}

#[inline]
pub fn denormals_are_zero() -> bool {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use std::arch::x86_64::_mm_getcsr;
        (_mm_getcsr() & 0x8040) == 0x8040
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        true
    }
}

pub type GainFn = fn(&mut [Sample], Sample);
pub type MixAddFn = fn(&mut [Sample], &[Sample], Sample);
pub type StereoGainFn = fn(&mut [Sample], &mut [Sample], Sample);

/// Dispatch table selected once at startup from [`detect_simd_level`].
pub struct DspDispatch {
    pub apply_gain: GainFn,
    pub mix_add: MixAddFn,
    pub stereo_gain: StereoGainFn,
    pub level: SimdLevel,
}

impl DspDispatch {
    pub fn get() -> &'static Self {
        static DISPATCH: OnceLock<DspDispatch> = OnceLock::new();
        DISPATCH.get_or_init(|| Self::new(detect_simd_level()))
    }

    fn new(level: SimdLevel) -> Self {
        match level {
            SimdLevel::Avx2 => Self {
                apply_gain: gain_avx2,
                mix_add: mix_add_avx2,
                stereo_gain: stereo_gain_avx2,
                level,
            },
            SimdLevel::Sse => Self {
                apply_gain: gain_sse,
                mix_add: mix_add_sse,
                stereo_gain: stereo_gain_sse,
                level,
            },
            SimdLevel::Neon => Self {
                apply_gain: gain_neon,
                mix_add: mix_add_neon,
                stereo_gain: stereo_gain_neon,
                level,
            },
            SimdLevel::Scalar => Self {
                apply_gain: gain_scalar,
                mix_add: mix_add_scalar,
                stereo_gain: stereo_gain_scalar,
                level,
            },
        }
    }
}

fn gain_scalar(buffer: &mut [Sample], gain: Sample) {
    for sample in buffer.iter_mut() {
        *sample *= gain;
    }
}

fn mix_add_scalar(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    for (d, s) in dest.iter_mut().zip(src.iter()) {
        *d += *s * gain;
    }
}

fn stereo_gain_scalar(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    gain_scalar(left, gain);
    gain_scalar(right, gain);
}

#[cfg(target_arch = "x86_64")]
mod x86_impl {
    use super::*;
    use std::arch::x86_64::*;

    #[target_feature(enable = "sse4.2")]
    pub unsafe fn gain_sse_impl(buffer: &mut [Sample], gain: Sample) {
        let gain_vec = _mm_set1_ps(gain);
        let len = buffer.len();
        let simd_len = len - (len % 4);
        let ptr = buffer.as_mut_ptr();
        for i in (0..simd_len).step_by(4) {
            let input = _mm_loadu_ps(ptr.add(i));
            _mm_storeu_ps(ptr.add(i), _mm_mul_ps(input, gain_vec));
        }
        for sample in &mut buffer[simd_len..len] {
            *sample *= gain;
        }
    }

    #[target_feature(enable = "sse4.2")]
    pub unsafe fn mix_add_sse_impl(dest: &mut [Sample], src: &[Sample], gain: Sample) {
        let gain_vec = _mm_set1_ps(gain);
        let len = dest.len().min(src.len());
        let simd_len = len - (len % 4);
        let dest_ptr = dest.as_mut_ptr();
        let src_ptr = src.as_ptr();
        for i in (0..simd_len).step_by(4) {
            let d = _mm_loadu_ps(dest_ptr.add(i));
            let s = _mm_loadu_ps(src_ptr.add(i));
            _mm_storeu_ps(dest_ptr.add(i), _mm_add_ps(d, _mm_mul_ps(s, gain_vec)));
        }
        for i in simd_len..len {
            dest[i] += src[i] * gain;
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn gain_avx2_impl(buffer: &mut [Sample], gain: Sample) {
        let gain_vec = _mm256_set1_ps(gain);
        let len = buffer.len();
        let simd_len = len - (len % 8);
        let ptr = buffer.as_mut_ptr();
        for i in (0..simd_len).step_by(8) {
            let input = _mm256_loadu_ps(ptr.add(i));
            _mm256_storeu_ps(ptr.add(i), _mm256_mul_ps(input, gain_vec));
        }
        for sample in &mut buffer[simd_len..len] {
            *sample *= gain;
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn mix_add_avx2_impl(dest: &mut [Sample], src: &[Sample], gain: Sample) {
        let gain_vec = _mm256_set1_ps(gain);
        let len = dest.len().min(src.len());
        let simd_len = len - (len % 8);
        let dest_ptr = dest.as_mut_ptr();
        let src_ptr = src.as_ptr();
        for i in (0..simd_len).step_by(8) {
            let d = _mm256_loadu_ps(dest_ptr.add(i));
            let s = _mm256_loadu_ps(src_ptr.add(i));
            _mm256_storeu_ps(dest_ptr.add(i), _mm256_fmadd_ps(s, gain_vec, d));
        }
        for i in simd_len..len {
            dest[i] += src[i] * gain;
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn gain_sse(buffer: &mut [Sample], gain: Sample) {
    unsafe { x86_impl::gain_sse_impl(buffer, gain) }
}
#[cfg(target_arch = "x86_64")]
fn mix_add_sse(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    unsafe { x86_impl::mix_add_sse_impl(dest, src, gain) }
}
#[cfg(target_arch = "x86_64")]
fn stereo_gain_sse(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    gain_sse(left, gain);
    gain_sse(right, gain);
}

#[cfg(target_arch = "x86_64")]
fn gain_avx2(buffer: &mut [Sample], gain: Sample) {
    unsafe { x86_impl::gain_avx2_impl(buffer, gain) }
}
#[cfg(target_arch = "x86_64")]
fn mix_add_avx2(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    unsafe { x86_impl::mix_add_avx2_impl(dest, src, gain) }
}
#[cfg(target_arch = "x86_64")]
fn stereo_gain_avx2(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    gain_avx2(left, gain);
    gain_avx2(right, gain);
}

#[cfg(not(target_arch = "x86_64"))]
fn gain_sse(buffer: &mut [Sample], gain: Sample) {
    gain_scalar(buffer, gain)
}
#[cfg(not(target_arch = "x86_64"))]
fn mix_add_sse(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    mix_add_scalar(dest, src, gain)
}
#[cfg(not(target_arch = "x86_64"))]
fn stereo_gain_sse(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    stereo_gain_scalar(left, right, gain)
}
#[cfg(not(target_arch = "x86_64"))]
fn gain_avx2(buffer: &mut [Sample], gain: Sample) {
    gain_scalar(buffer, gain)
}
#[cfg(not(target_arch = "x86_64"))]
fn mix_add_avx2(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    mix_add_scalar(dest, src, gain)
}
#[cfg(not(target_arch = "x86_64"))]
fn stereo_gain_avx2(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    stereo_gain_scalar(left, right, gain)
}

#[cfg(target_arch = "aarch64")]
mod arm_impl {
    use super::*;
    use std::arch::aarch64::*;

    pub unsafe fn gain_neon_impl(buffer: &mut [Sample], gain: Sample) {
        let gain_vec = vdupq_n_f32(gain);
        let len = buffer.len();
        let simd_len = len - (len % 4);
        let ptr = buffer.as_mut_ptr();
        for i in (0..simd_len).step_by(4) {
            let input = vld1q_f32(ptr.add(i));
            vst1q_f32(ptr.add(i), vmulq_f32(input, gain_vec));
        }
        for sample in &mut buffer[simd_len..len] {
            *sample *= gain;
        }
    }

    pub unsafe fn mix_add_neon_impl(dest: &mut [Sample], src: &[Sample], gain: Sample) {
        let gain_vec = vdupq_n_f32(gain);
        let len = dest.len().min(src.len());
        let simd_len = len - (len % 4);
        let dest_ptr = dest.as_mut_ptr();
        let src_ptr = src.as_ptr();
        for i in (0..simd_len).step_by(4) {
            let d = vld1q_f32(dest_ptr.add(i));
            let s = vld1q_f32(src_ptr.add(i));
            vst1q_f32(dest_ptr.add(i), vfmaq_f32(d, s, gain_vec));
        }
        for i in simd_len..len {
            dest[i] += src[i] * gain;
        }
    }
}

#[cfg(target_arch = "aarch64")]
fn gain_neon(buffer: &mut [Sample], gain: Sample) {
    unsafe { arm_impl::gain_neon_impl(buffer, gain) }
}
#[cfg(target_arch = "aarch64")]
fn mix_add_neon(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    unsafe { arm_impl::mix_add_neon_impl(dest, src, gain) }
}
#[cfg(target_arch = "aarch64")]
fn stereo_gain_neon(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    gain_neon(left, gain);
    gain_neon(right, gain);
}

#[cfg(not(target_arch = "aarch64"))]
fn gain_neon(buffer: &mut [Sample], gain: Sample) {
    gain_scalar(buffer, gain)
}
#[cfg(not(target_arch = "aarch64"))]
fn mix_add_neon(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    mix_add_scalar(dest, src, gain)
}
#[cfg(not(target_arch = "aarch64"))]
fn stereo_gain_neon(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    stereo_gain_scalar(left, right, gain)
}

#[inline]
pub fn apply_gain(buffer: &mut [Sample], gain: Sample) {
    (DspDispatch::get().apply_gain)(buffer, gain)
}

#[inline]
pub fn mix_add(dest: &mut [Sample], src: &[Sample], gain: Sample) {
    (DspDispatch::get().mix_add)(dest, src, gain)
}

#[inline]
pub fn apply_stereo_gain(left: &mut [Sample], right: &mut [Sample], gain: Sample) {
    (DspDispatch::get().stereo_gain)(left, right, gain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_a_usable_level() {
        assert!(detect_simd_level().width() >= 1);
    }

    #[test]
    fn gain_scalar_matches_dispatch() {
        let mut scalar = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut dispatched = scalar.clone();
        gain_scalar(&mut scalar, 0.5);
        apply_gain(&mut dispatched, 0.5);
        for (a, b) in scalar.iter().zip(dispatched.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn mix_add_accumulates() {
        let mut dest = vec![1.0; 16];
        let src = vec![2.0; 16];
        mix_add(&mut dest, &src, 0.5);
        for sample in &dest {
            assert!((*sample - 2.0).abs() < 1e-6);
        }
    }
}
