// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mdct` module implements the Inverse Modified Discrete Cosine Transform (IMDCT).
//!
//! The IMDCT is computed with a quarter-length (N/2-point) complex forward FFT surrounded by
//! pre- and post-twiddling.

use std::f64::consts;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// The Inverse Modified Discrete Transform (IMDCT).
///
/// For N spectral samples, `X`, the transform produces 2N time-domain samples, `y`, where:
///
/// ```text
/// y[i] = scale * sum(k = 0..N) X[k] * cos(pi / N * (i + 1/2 + N/2) * (k + 1/2))
/// ```
pub struct Imdct {
    fft: Arc<dyn Fft<f32>>,
    fft_scratch: Box<[Complex<f32>]>,
    buf: Box<[Complex<f32>]>,
    twiddle: Box<[Complex<f32>]>,
}

impl Imdct {
    /// Instantiate a N-point IMDCT with no scaling.
    ///
    /// The value of `n` is the number of spectral samples and must be a power-of-2.
    pub fn new(n: usize) -> Self {
        Imdct::new_scaled(n, 1.0)
    }

    /// Instantiate a N-point IMDCT where each output sample is multiplied by `scale`.
    ///
    /// The value of `n` is the number of spectral samples and must be a power-of-2.
    pub fn new_scaled(n: usize, scale: f64) -> Self {
        assert!(n.is_power_of_two() && n >= 4, "n must be a power of two, and at least 4");

        let n2 = n >> 1;

        // The scale is split evenly between the pre- and post-twiddle.
        let sqrt_scale = scale.sqrt();
        let pi_n = consts::PI / n as f64;

        let twiddle = (0..n2)
            .map(|k| {
                let theta = pi_n * (0.125 + k as f64);
                Complex::new((sqrt_scale * theta.cos()) as f32, (sqrt_scale * theta.sin()) as f32)
            })
            .collect();

        let fft = FftPlanner::<f32>::new().plan_fft_forward(n2);

        let scratch_len = fft.get_inplace_scratch_len();
        let fft_scratch = vec![Complex::default(); scratch_len].into_boxed_slice();
        let buf = vec![Complex::default(); n2].into_boxed_slice();

        Imdct { fft, fft_scratch, buf, twiddle }
    }

    /// The number of spectral samples, N, the transform accepts.
    pub fn spectral_len(&self) -> usize {
        self.buf.len() << 1
    }

    /// Performs the N-point IMDCT of `spec` into `out`.
    ///
    /// `spec` must contain exactly N samples, and `out` exactly 2N samples.
    pub fn imdct(&mut self, spec: &[f32], out: &mut [f32]) {
        let n = self.spectral_len();
        let n2 = n >> 1;
        let n4 = n >> 2;

        assert_eq!(spec.len(), n);
        assert_eq!(out.len(), n << 1);

        // Pack the even spectral samples (forward order) and odd samples (reverse order) into
        // complex values, and pre-twiddle.
        for (i, (z, &w)) in self.buf.iter_mut().zip(self.twiddle.iter()).enumerate() {
            let even = spec[i << 1];
            let odd = -spec[n - 1 - (i << 1)];

            *z = Complex::new(odd * w.im - even * w.re, odd * w.re + even * w.im);
        }

        self.fft.process_with_scratch(&mut self.buf, &mut self.fft_scratch);

        // The output is built from four quarters. Quarters 0 and 3 mirror quarters 1 and 2.
        let (q0, rest) = out.split_at_mut(n2);
        let (q1, rest) = rest.split_at_mut(n2);
        let (q2, q3) = rest.split_at_mut(n2);

        let (lo, hi) = self.buf.split_at(n4);
        let (w_lo, w_hi) = self.twiddle.split_at(n4);

        for i in 0..n4 {
            // Post-twiddle one value from each half of the FFT output.
            let a = w_lo[i] * lo[i].conj();
            let b = w_hi[i] * hi[i].conj();

            let fi = i << 1;
            let ri = n2 - 1 - fi;

            q0[ri] = -a.im;
            q0[fi] = -b.re;

            q1[fi] = a.im;
            q1[ri] = b.re;

            q2[ri] = a.re;
            q2[fi] = b.im;

            q3[fi] = a.re;
            q3[ri] = b.im;
        }
    }
}
