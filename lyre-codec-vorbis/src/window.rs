// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f64::consts;

/// Generates the rising slope of a window that overlaps `len` samples.
fn generate_win_curve(len: usize) -> Vec<f32> {
    let denom = len as f64;

    (0..len)
        .map(|i| {
            let frac = consts::FRAC_PI_2 * ((i as f64 + 0.5) / denom);
            (consts::FRAC_PI_2 * frac.sin().powi(2)).sin() as f32
        })
        .collect()
}

/// Generates a window for a block of `n` samples that overlaps `left_n` samples of the previous
/// block and `right_n` samples of the next block, as defined in section 4.3.1 of the Vorbis I
/// specification.
fn generate_window(n: usize, left_n: usize, right_n: usize) -> Box<[f32]> {
    let mut window = vec![0.0; n];

    let left_begin = n / 4 - left_n / 2;
    let right_begin = 3 * n / 4 - right_n / 2;

    let left_end = left_begin + left_n;

    window[left_begin..left_end].copy_from_slice(&generate_win_curve(left_n));
    window[left_end..right_begin].fill(1.0);

    for (w, &s) in window[right_begin..right_begin + right_n]
        .iter_mut()
        .zip(generate_win_curve(right_n).iter().rev())
    {
        *w = s;
    }

    window.into_boxed_slice()
}

/// All window shapes of a stream.
pub struct Windows {
    /// Short block window.
    short: Box<[f32]>,
    /// Long block windows, indexed by the previous and next window flags.
    long: [Box<[f32]>; 4],
}

impl Windows {
    pub fn new(blocksize0: usize, blocksize1: usize) -> Self {
        let short = generate_window(blocksize0, blocksize0 / 2, blocksize0 / 2);

        let long = [(false, false), (true, false), (false, true), (true, true)].map(
            |(prev_long, next_long)| {
                let left_n = if prev_long { blocksize1 / 2 } else { blocksize0 / 2 };
                let right_n = if next_long { blocksize1 / 2 } else { blocksize0 / 2 };
                generate_window(blocksize1, left_n, right_n)
            },
        );

        Windows { short, long }
    }

    /// Gets the window for a block. The previous and next window flags only apply to long blocks.
    pub fn get(&self, block_flag: bool, prev_long: bool, next_long: bool) -> &[f32] {
        if block_flag {
            &self.long[usize::from(prev_long) | (usize::from(next_long) << 1)]
        }
        else {
            &self.short
        }
    }
}
