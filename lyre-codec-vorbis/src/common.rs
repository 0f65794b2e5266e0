// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Returns the 1-based position of the highest set bit of `x`, or 0 if no bit is set. Section
/// 9.2.1 of Vorbis I.
#[inline(always)]
pub fn ilog(x: u32) -> u32 {
    32 - x.leading_zeros()
}

/// Unpacks a codebook float: a sign bit, a 10-bit biased exponent, and a 21-bit mantissa.
#[inline(always)]
pub fn float32_unpack(x: u32) -> f32 {
    let mantissa = x & 0x1fffff;
    let exponent = (x & 0x7fe00000) >> 21;
    let value = (mantissa as f32) * 2.0f32.powi(exponent as i32 - 788);

    if x & 0x80000000 == 0 {
        value
    }
    else {
        -value
    }
}

/// A set of up-to 256 channel indices.
#[derive(Clone, Copy, Default)]
pub struct ChannelSet {
    words: [u64; 4],
}

impl ChannelSet {
    #[inline(always)]
    pub fn insert(&mut self, ch: usize) {
        self.words[ch >> 6] |= 1 << (ch & 0x3f);
    }

    #[inline(always)]
    pub fn contains(&self, ch: usize) -> bool {
        self.words[ch >> 6] & (1 << (ch & 0x3f)) != 0
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterates over the channels in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rem = word;

            std::iter::from_fn(move || {
                if rem == 0 {
                    return None;
                }

                let bit = rem.trailing_zeros() as usize;
                rem &= rem - 1;

                Some((i << 6) + bit)
            })
        })
    }
}
