//! In-place FFT/IFFT: iterative Cooley-Tukey with bit-reversal
//! permutation and precomputed twiddle factors. On AVX2 hosts the butterfly
//! stage packs two adjacent `k` lanes into one `__m256d` complex multiply;
//! every other target falls back to the scalar butterfly. Both must agree
//! to within 1e-9 per bin, which the kernel's round-trip tests exercise
//! on whatever host they run on.

use std::f64::consts::PI;
use std::sync::OnceLock;

use num_complex::Complex64;

use crate::simd::{detect_simd_level, SimdLevel};

/// True iff `n > 0` and `n` is a power of two.
#[inline]
pub const fn is_power_of_two(n: usize) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

/// Precomputed twiddle factors and the bit-reversal permutation for one FFT
/// size, built once and reused across calls (an FFT "plan").
pub struct FftPlan {
    size: usize,
    log2_size: u32,
    bit_reversal: Vec<usize>,
    /// `twiddles[stage][k]` = `e^{-2*pi*i*k / (2^(stage+1))}` for stage `0..log2_size`.
    twiddles: Vec<Vec<Complex64>>,
    level: SimdLevel,
}

impl FftPlan {
    pub fn new(size: usize) -> Self {
        assert!(is_power_of_two(size), "FFT size must be a power of two, got {size}");
        let log2_size = size.trailing_zeros();
        let bit_reversal = build_bit_reversal(size, log2_size);
        let twiddles = build_twiddles(size, log2_size);
        Self {
            size,
            log2_size,
            bit_reversal,
            twiddles,
            level: detect_simd_level(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward FFT, in place. `data.len()` must equal `self.size()`.
    pub fn forward(&self, data: &mut [Complex64]) {
        self.transform(data, false);
    }

    /// Inverse FFT, in place, dividing by `N` at the end.
    pub fn inverse(&self, data: &mut [Complex64]) {
        self.transform(data, true);
        let norm = 1.0 / self.size as f64;
        for sample in data.iter_mut() {
            *sample *= norm;
        }
    }

    fn transform(&self, data: &mut [Complex64], inverse: bool) {
        assert_eq!(data.len(), self.size);

        for i in 0..self.size {
            let j = self.bit_reversal[i];
            if i < j {
                data.swap(i, j);
            }
        }

        let mut half = 1usize;
        for stage in 0..self.log2_size as usize {
            let step = half * 2;
            let stage_twiddles = &self.twiddles[stage];
            butterfly_stage_dispatch(data, half, step, stage_twiddles, inverse, self.level);
            half = step;
        }
    }
}

/// Global plan cache, keyed by size via a small OnceLock-guarded vector of
/// plans — sizes used by the kernel are few and fixed (STFT frame sizes),
/// so a linear scan is both simple and fast enough.
static PLAN_CACHE: OnceLock<std::sync::Mutex<Vec<std::sync::Arc<FftPlan>>>> = OnceLock::new();

/// Fetch (building and caching if necessary) the shared plan for `size`.
pub fn plan_for(size: usize) -> std::sync::Arc<FftPlan> {
    let cache = PLAN_CACHE.get_or_init(|| std::sync::Mutex::new(Vec::new()));
    let mut guard = cache.lock().expect("fft plan cache poisoned");
    if let Some(existing) = guard.iter().find(|p| p.size() == size) {
        return existing.clone();
    }
    let plan = std::sync::Arc::new(FftPlan::new(size));
    guard.push(plan.clone());
    plan
}

fn build_bit_reversal(size: usize, log2_size: u32) -> Vec<usize> {
    (0..size)
    .map(|i| (i as u32).reverse_bits().rotate_left(log2_size) as usize)
    .collect()
}

fn build_twiddles(size: usize, log2_size: u32) -> Vec<Vec<Complex64>> {
    let mut stages = Vec::with_capacity(log2_size as usize);
    let mut half = 1usize;
    for _ in 0..log2_size {
        let step = half * 2;
        let stage: Vec<Complex64> = (0..half)
        .map(|k| {
                let angle = -2.0 * PI * k as f64 / step as f64;
                Complex64::new(angle.cos(), angle.sin())
        })
        .collect();
        stages.push(stage);
        half = step;
        let _ = size;
    }
    stages
}

/// One Cooley-Tukey stage, scalar: `half` butterflies per group of `step`
/// elements, `size / step` groups.
fn butterfly_stage_scalar(
    data: &mut [Complex64],
    half: usize,
    step: usize,
    twiddles: &[Complex64],
    inverse: bool,
) {
    let mut start = 0;
    while start < data.len() {
        for k in 0..half {
            let w = if inverse {
                twiddles[k].conj()
            } else {
                twiddles[k]
            };
            let even = data[start + k];
            let odd = data[start + k + half] * w;
            data[start + k] = even + odd;
            data[start + k + half] = even - odd;
        }
        start += step;
    }
}

/// Route to the AVX2 butterfly when the plan detected it and there are at
/// least two `k` lanes to pack per group; every other level runs scalar.
fn butterfly_stage_dispatch(
    data: &mut [Complex64],
    half: usize,
    step: usize,
    twiddles: &[Complex64],
    inverse: bool,
    level: SimdLevel,
) {
    #[cfg(target_arch = "x86_64")]
    {
        if level == SimdLevel::Avx2 && half >= 2 {
            unsafe { x86_impl::butterfly_stage_avx2(data, half, step, twiddles, inverse) };
            return;
        }
    }
    let _ = level;
    butterfly_stage_scalar(data, half, step, twiddles, inverse);
}

#[cfg(target_arch = "x86_64")]
mod x86_impl {
    use std::arch::x86_64::*;

    use num_complex::Complex64;

    /// Packed double-complex multiply: `a`/`b`/the result all hold two
    /// adjacent `(re, im)` pairs as `[re0, im0, re1, im1]`.
    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn complex_mul(a: __m256d, b: __m256d) -> __m256d {
        let a_re = _mm256_movedup_pd(a);
        let a_im = _mm256_permute_pd(a, 0b1111);
        let b_swapped = _mm256_permute_pd(b, 0b0101);
        let t = _mm256_mul_pd(a_im, b_swapped);
        _mm256_fmaddsub_pd(a_re, b, t)
    }

    /// One Cooley-Tukey stage, two `k` lanes per vector instruction via
    /// AVX2: `half`/`step`/`twiddles` mean the same thing as in
    /// [`super::butterfly_stage_scalar`]; any trailing odd `k` runs scalar.
    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn butterfly_stage_avx2(
        data: &mut [Complex64],
        half: usize,
        step: usize,
        twiddles: &[Complex64],
        inverse: bool,
    ) {
        let mut start = 0;
        while start < data.len() {
            let mut k = 0;
            while k + 2 <= half {
                let w0 = if inverse { twiddles[k].conj() } else { twiddles[k] };
                let w1 = if inverse { twiddles[k + 1].conj() } else { twiddles[k + 1] };

                let even_ptr = data.as_mut_ptr().add(start + k) as *mut f64;
                let odd_ptr = data.as_mut_ptr().add(start + k + half) as *mut f64;

                let even = _mm256_loadu_pd(even_ptr);
                let odd_raw = _mm256_loadu_pd(odd_ptr);
                let w = _mm256_set_pd(w1.im, w1.re, w0.im, w0.re);
                let odd = complex_mul(odd_raw, w);

                _mm256_storeu_pd(even_ptr, _mm256_add_pd(even, odd));
                _mm256_storeu_pd(odd_ptr, _mm256_sub_pd(even, odd));

                k += 2;
            }
            while k < half {
                let w = if inverse { twiddles[k].conj() } else { twiddles[k] };
                let e = data[start + k];
                let o = data[start + k + half] * w;
                data[start + k] = e + o;
                data[start + k + half] = e - o;
                k += 1;
            }
            start += step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn round_trip(size: usize) {
        let plan = FftPlan::new(size);
        let input: Vec<Complex64> = (0..size)
        .map(|i| Complex64::new((i as f64 * 0.3).sin(), 0.0))
        .collect();
        let mut data = input.clone();
        plan.forward(&mut data);
        plan.inverse(&mut data);
        for (a, b) in input.iter().zip(data.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn round_trips_across_power_of_two_sizes() {
        for &size in &[2, 4, 8, 16, 64, 256, 1024, 4096] {
            round_trip(size);
        }
    }

    #[test]
    fn is_power_of_two_matches_definition() {
        assert!(!is_power_of_two(0));
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(!is_power_of_two(3));
        assert!(is_power_of_two(4096));
        assert!(!is_power_of_two(4095));
    }

    #[test]
    fn dc_signal_has_energy_only_in_bin_zero() {
        let plan = FftPlan::new(8);
        let mut data: Vec<Complex64> = vec![Complex64::new(1.0, 0.0); 8];
        plan.forward(&mut data);
        assert_relative_eq!(data[0].re, 8.0, epsilon = 1e-9);
        for bin in &data[1..] {
            assert_relative_eq!(bin.norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn plan_cache_returns_same_size() {
        let a = plan_for(512);
        let b = plan_for(512);
        assert_eq!(a.size(), b.size());
    }
}
