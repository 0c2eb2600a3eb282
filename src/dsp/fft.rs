//! In-place radix-2 FFT over interleaved (re, im) float pairs.
//!
//! The engine precomputes one twiddle table for the largest transform it will
//! ever be asked to run; smaller power-of-two transforms stride through the
//! same table. The forward transform is decimation-in-frequency: it takes
//! natural-order input and leaves the output bit-reversed, so callers must
//! run `bit_reverse` before reading bins in increasing frequency order.

use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FftError {
    #[error("transform length {0} is not a power of two")]
    NotPowerOfTwo(usize),
    #[error("transform length {requested} exceeds table size {max}")]
    TooLarge { requested: usize, max: usize },
    #[error("buffer holds {got} floats but {need} are required for {pairs} complex pairs")]
    BufferTooSmall { got: usize, need: usize, pairs: usize },
}

#[derive(Debug, PartialEq)]
pub struct FftEngine {
    /// `max_size / 2` factors `e^(-2*pi*i*k / max_size)` as (re, im).
    twiddles: Vec<(f32, f32)>,
    max_size: usize,
}

impl FftEngine {
    /// Builds the twiddle table for the largest supported transform.
    ///
    /// Startup-time only; a failure here means no transform can ever run.
    pub fn new(max_size: usize) -> Result<Self, FftError> {
        if max_size < 2 || !max_size.is_power_of_two() {
            return Err(FftError::NotPowerOfTwo(max_size));
        }
        let twiddles = (0..max_size / 2)
            .map(|k| {
                let phi = -2.0 * PI * k as f64 / max_size as f64;
                (phi.cos() as f32, phi.sin() as f32)
            })
            .collect();
        Ok(Self { twiddles, max_size })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// In-place forward FFT over `n` complex pairs; output is bit-reversed.
    pub fn transform(&self, buf: &mut [f32], n: usize) -> Result<(), FftError> {
        self.check(buf, n)?;
        let mut len = n;
        while len > 1 {
            let half = len / 2;
            let stride = self.max_size / len;
            for base in (0..n).step_by(len) {
                for k in 0..half {
                    let i = 2 * (base + k);
                    let j = 2 * (base + k + half);
                    let (a_re, a_im) = (buf[i], buf[i + 1]);
                    let (b_re, b_im) = (buf[j], buf[j + 1]);
                    let t_re = a_re - b_re;
                    let t_im = a_im - b_im;
                    buf[i] = a_re + b_re;
                    buf[i + 1] = a_im + b_im;
                    let (w_re, w_im) = self.twiddles[k * stride];
                    buf[j] = t_re * w_re - t_im * w_im;
                    buf[j + 1] = t_re * w_im + t_im * w_re;
                }
            }
            len = half;
        }
        Ok(())
    }

    /// Permutes `n` complex pairs from bit-reversed to natural order.
    pub fn bit_reverse(&self, buf: &mut [f32], n: usize) -> Result<(), FftError> {
        self.check(buf, n)?;
        let mut j = 0usize;
        for i in 0..n.saturating_sub(1) {
            if i < j {
                buf.swap(2 * i, 2 * j);
                buf.swap(2 * i + 1, 2 * j + 1);
            }
            let mut k = n >> 1;
            while k <= j {
                j -= k;
                k >>= 1;
            }
            j += k;
        }
        Ok(())
    }

    /// Unpacks the spectrum of two real sequences that were interleaved into
    /// one complex input (x1 in the real slots, x2 in the imaginary slots).
    ///
    /// After the call, slot k (k in 1..n/2) holds X1[k] and slot n-k holds
    /// X2[k]; slot 0 already carries X1[0] in its real half and X2[0] in its
    /// imaginary half. Relies on the conjugate symmetry of real-signal
    /// spectra: X1[k] = (Z[k] + conj(Z[n-k])) / 2 and
    /// X2[k] = (Z[k] - conj(Z[n-k])) / 2j.
    pub fn split_complex_to_two_real(&self, buf: &mut [f32], n: usize) -> Result<(), FftError> {
        self.check(buf, n)?;
        for k in 1..n / 2 {
            let i = 2 * k;
            let j = 2 * (n - k);
            let (a_re, a_im) = (buf[i], buf[i + 1]);
            let (b_re, b_im) = (buf[j], buf[j + 1]);
            buf[i] = 0.5 * (a_re + b_re);
            buf[i + 1] = 0.5 * (a_im - b_im);
            buf[j] = 0.5 * (a_im + b_im);
            buf[j + 1] = 0.5 * (b_re - a_re);
        }
        Ok(())
    }

    fn check(&self, buf: &[f32], n: usize) -> Result<(), FftError> {
        if n == 0 || !n.is_power_of_two() {
            return Err(FftError::NotPowerOfTwo(n));
        }
        if n > self.max_size {
            return Err(FftError::TooLarge {
                requested: n,
                max: self.max_size,
            });
        }
        if buf.len() < 2 * n {
            return Err(FftError::BufferTooSmall {
                got: buf.len(),
                need: 2 * n,
                pairs: n,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::{num_complex::Complex, FftPlanner};

    const TOL: f32 = 1e-3;
    // Spectra of full-length signals reach magnitudes of ~1e2, so oracle
    // comparisons carry proportionally larger absolute rounding error.
    const ORACLE_TOL: f32 = 5e-2;

    /// Deterministic test signal; no RNG so failures reproduce exactly.
    fn chirp(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                (2.0 * std::f32::consts::PI * (3.0 + 20.0 * t) * t).sin()
            })
            .collect()
    }

    fn forward(engine: &FftEngine, signal: &[f32]) -> Vec<f32> {
        let n = signal.len();
        let mut buf = vec![0.0f32; 2 * n];
        for (i, &x) in signal.iter().enumerate() {
            buf[2 * i] = x;
        }
        engine.transform(&mut buf, n).unwrap();
        engine.bit_reverse(&mut buf, n).unwrap();
        buf
    }

    fn oracle(signal: &[f32]) -> Vec<Complex<f32>> {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(signal.len());
        let mut buf: Vec<Complex<f32>> =
            signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
        fft.process(&mut buf);
        buf
    }

    #[test]
    fn rejects_bad_sizes() {
        assert_eq!(FftEngine::new(0), Err(FftError::NotPowerOfTwo(0)));
        assert_eq!(FftEngine::new(1), Err(FftError::NotPowerOfTwo(1)));
        assert_eq!(FftEngine::new(3000), Err(FftError::NotPowerOfTwo(3000)));

        let engine = FftEngine::new(64).unwrap();
        let mut buf = vec![0.0f32; 256];
        assert_eq!(
            engine.transform(&mut buf, 48),
            Err(FftError::NotPowerOfTwo(48))
        );
        assert_eq!(
            engine.transform(&mut buf, 128),
            Err(FftError::TooLarge {
                requested: 128,
                max: 64
            })
        );
        assert_eq!(
            engine.transform(&mut buf[..32], 64),
            Err(FftError::BufferTooSmall {
                got: 32,
                need: 128,
                pairs: 64
            })
        );
    }

    #[test]
    fn impulse_gives_flat_spectrum() {
        let n = 256;
        let engine = FftEngine::new(n).unwrap();
        let mut signal = vec![0.0f32; n];
        signal[0] = 1.0;
        let buf = forward(&engine, &signal);
        for k in 0..n {
            let mag = (buf[2 * k].powi(2) + buf[2 * k + 1].powi(2)).sqrt();
            assert!((mag - 1.0).abs() < TOL, "bin {} magnitude {}", k, mag);
        }
    }

    #[test]
    fn dc_concentrates_in_bin_zero() {
        let n = 128;
        let engine = FftEngine::new(n).unwrap();
        let buf = forward(&engine, &vec![0.75f32; n]);
        assert!((buf[0] - 0.75 * n as f32).abs() < TOL);
        for k in 1..n {
            let mag = (buf[2 * k].powi(2) + buf[2 * k + 1].powi(2)).sqrt();
            assert!(mag < TOL, "bin {} leaked {}", k, mag);
        }
    }

    #[test]
    fn parseval_holds() {
        let n = 512;
        let engine = FftEngine::new(n).unwrap();
        let signal = chirp(n);
        let time_energy: f32 = signal.iter().map(|x| x * x).sum();
        let buf = forward(&engine, &signal);
        let freq_energy: f32 = (0..n)
            .map(|k| buf[2 * k].powi(2) + buf[2 * k + 1].powi(2))
            .sum();
        let ratio = freq_energy / (n as f32 * time_energy);
        assert!((ratio - 1.0).abs() < 2e-3, "ratio {}", ratio);
    }

    #[test]
    fn matches_rustfft() {
        let n = 1024;
        let engine = FftEngine::new(n).unwrap();
        let signal = chirp(n);
        let buf = forward(&engine, &signal);
        let reference = oracle(&signal);
        for k in 0..n {
            assert!(
                (buf[2 * k] - reference[k].re).abs() < ORACLE_TOL
                    && (buf[2 * k + 1] - reference[k].im).abs() < ORACLE_TOL,
                "bin {} mismatch",
                k
            );
        }
    }

    #[test]
    fn smaller_transform_strides_shared_table() {
        // A 64-point transform through a 256-point table must equal a
        // 64-point transform through an exactly-sized table.
        let signal = chirp(64);
        let big = FftEngine::new(256).unwrap();
        let buf = forward(&big, &signal);
        let reference = oracle(&signal);
        for k in 0..64 {
            assert!(
                (buf[2 * k] - reference[k].re).abs() < ORACLE_TOL
                    && (buf[2 * k + 1] - reference[k].im).abs() < ORACLE_TOL,
                "bin {} mismatch",
                k
            );
        }
    }

    #[test]
    fn bit_reverse_matches_known_permutation() {
        let n = 8;
        let engine = FftEngine::new(n).unwrap();
        let mut buf = vec![0.0f32; 2 * n];
        for i in 0..n {
            buf[2 * i] = i as f32;
        }
        engine.bit_reverse(&mut buf, n).unwrap();
        let order: Vec<f32> = (0..n).map(|i| buf[2 * i]).collect();
        assert_eq!(order, vec![0.0, 4.0, 2.0, 6.0, 1.0, 5.0, 3.0, 7.0]);
    }

    #[test]
    fn split_recovers_both_packed_spectra() {
        let n = 256;
        let engine = FftEngine::new(n).unwrap();
        let x1 = chirp(n);
        let x2: Vec<f32> = (0..n).map(|i| if i == 3 { 1.0 } else { 0.0 }).collect();

        let mut buf = vec![0.0f32; 2 * n];
        for i in 0..n {
            buf[2 * i] = x1[i];
            buf[2 * i + 1] = x2[i];
        }
        engine.transform(&mut buf, n).unwrap();
        engine.bit_reverse(&mut buf, n).unwrap();
        engine.split_complex_to_two_real(&mut buf, n).unwrap();

        let ref1 = oracle(&x1);
        let ref2 = oracle(&x2);
        assert!((buf[0] - ref1[0].re).abs() < ORACLE_TOL);
        assert!((buf[1] - ref2[0].re).abs() < ORACLE_TOL);
        for k in 1..n / 2 {
            assert!(
                (buf[2 * k] - ref1[k].re).abs() < ORACLE_TOL
                    && (buf[2 * k + 1] - ref1[k].im).abs() < ORACLE_TOL,
                "first spectrum bin {} mismatch",
                k
            );
            let j = 2 * (n - k);
            assert!(
                (buf[j] - ref2[k].re).abs() < ORACLE_TOL
                    && (buf[j + 1] - ref2[k].im).abs() < ORACLE_TOL,
                "second spectrum bin {} mismatch",
                k
            );
        }
    }

    #[test]
    fn split_leaves_real_spectrum_in_lower_half() {
        // Single-channel path: imaginary input is zero, so the lower half
        // must come out unchanged and the packed second spectrum empty.
        let n = 128;
        let engine = FftEngine::new(n).unwrap();
        let signal = chirp(n);
        let before = forward(&engine, &signal);
        let mut buf = before.clone();
        engine.split_complex_to_two_real(&mut buf, n).unwrap();
        for k in 0..n / 2 {
            assert!((buf[2 * k] - before[2 * k]).abs() < ORACLE_TOL);
            assert!((buf[2 * k + 1] - before[2 * k + 1]).abs() < ORACLE_TOL);
        }
        for k in 1..n / 2 {
            let j = 2 * (n - k);
            let mag = (buf[j].powi(2) + buf[j + 1].powi(2)).sqrt();
            assert!(mag < ORACLE_TOL, "phantom second spectrum at bin {}", k);
        }
    }
}
