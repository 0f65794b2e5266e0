// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lyre_core::dsp::mdct::Imdct;

use super::floor::FloorData;

pub struct DspChannel {
    /// The channel floor state.
    pub floor: FloorData,
    /// The channel residue buffer, half a long block.
    pub residue: Vec<f32>,
    /// Do not decode!
    pub do_not_decode: bool,
    /// The windowed output of the IMDCT, one long block.
    pub block: Vec<f32>,
}

impl DspChannel {
    pub fn new(blocksize1: usize) -> Self {
        DspChannel {
            floor: Default::default(),
            residue: vec![0.0; blocksize1 >> 1],
            do_not_decode: false,
            block: vec![0.0; blocksize1],
        }
    }

    /// Transforms the first `n / 2` spectral coefficients into `n` windowed time-domain samples.
    pub fn synth(&mut self, n: usize, window: &[f32], imdct: &mut Imdct) {
        imdct.imdct(&self.residue[..n >> 1], &mut self.block[..n]);

        for (s, &w) in self.block[..n].iter_mut().zip(window) {
            *s *= w;
        }
    }
}

/// Where a block lands in the output, as defined in section 4.3.8 of the Vorbis I specification.
///
/// All positions are offsets into the block. Samples `left..center` overlap the previous block
/// and are added. Samples `center..right` are written, and will be overlapped by the next block.
/// Samples outside `left..right` are zero after windowing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Position of the first sample of the block relative to the end of the previous block.
    pub begin: isize,
    pub left: usize,
    pub center: usize,
    pub right: usize,
    /// The number of samples at the end of the written region that are not yet final.
    pub end: usize,
}

impl BlockGeometry {
    pub fn new(
        n: usize,
        blocksize0: usize,
        block_flag: bool,
        prev_long: bool,
        next_long: bool,
    ) -> Self {
        let mut geom = BlockGeometry { begin: 0, left: 0, center: n / 2, right: n, end: n / 2 };

        if block_flag {
            // A long block next to a short block only overlaps the short block's half.
            if !prev_long {
                geom.left = n / 4 - blocksize0 / 4;
                geom.center = geom.left + blocksize0 / 2;
            }

            if !next_long {
                geom.right -= n / 4 - blocksize0 / 4;
                geom.end = n / 4 + blocksize0 / 4;
            }
        }

        geom.begin = -(geom.center as isize);
        geom
    }
}

/// An interleaved buffer of decoded frames that blocks are overlap-added into.
///
/// The first `prepared` frames are final and can be read. The frames after them are still to be
/// overlapped by the next block.
pub struct OverlapBuffer {
    buf: Vec<f32>,
    channels: usize,
    /// The first live frame in `buf`.
    start: usize,
    /// The number of live frames.
    frames: usize,
    /// The number of live frames that are final.
    prepared: usize,
    /// `false` until the first block after a reset was added.
    primed: bool,
}

impl OverlapBuffer {
    pub fn new(channels: usize, capacity: usize) -> Self {
        let buf = vec![0.0; channels * capacity];
        OverlapBuffer { buf, channels, start: 0, frames: 0, prepared: 0, primed: false }
    }

    /// Gets the number of frames that can be read.
    pub fn prepared(&self) -> usize {
        self.prepared
    }

    /// Overlap-adds one windowed block per channel. Returns the number of frames that became
    /// final.
    pub fn overlap_add<'a, I>(&mut self, blocks: I, geom: &BlockGeometry) -> usize
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let index = self.frames as isize + geom.begin;

        let frames = (index + geom.right as isize).max(self.prepared as isize) as usize;

        self.reserve(frames);

        // Frames not written before start as silence.
        if frames > self.frames {
            let begin = (self.start + self.frames) * self.channels;
            let end = (self.start + frames) * self.channels;
            self.buf[begin..end].fill(0.0);
        }

        // Block samples that would land before the buffer are dropped. This only happens for the
        // first block after a reset.
        let first = geom.left.max(index.min(0).unsigned_abs());

        for (c, block) in blocks.into_iter().enumerate() {
            for j in first..geom.right {
                let pos = (index + j as isize) as usize;
                let s = &mut self.buf[(self.start + pos) * self.channels + c];

                if j < geom.center {
                    *s += block[j];
                }
                else {
                    *s = block[j];
                }
            }
        }

        self.frames = frames;

        let prepared = frames.saturating_sub(geom.end).max(self.prepared);
        let finalized = prepared - self.prepared;

        self.prepared = prepared;

        // The first block after a reset has nothing to overlap with, it only primes the overlap.
        if !self.primed {
            self.primed = true;
            self.consume(finalized);
            return 0;
        }

        finalized
    }

    /// Reads prepared frames into `out`. Only whole frames are read. Returns the number of
    /// samples read.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let count = (out.len() / self.channels).min(self.prepared);
        let len = count * self.channels;

        let begin = self.start * self.channels;
        out[..len].copy_from_slice(&self.buf[begin..begin + len]);

        self.consume(count);

        len
    }

    /// Moves all prepared frames to the end of `out`.
    pub fn drain_prepared(&mut self, out: &mut Vec<f32>) {
        let begin = self.start * self.channels;
        out.extend_from_slice(&self.buf[begin..begin + self.prepared * self.channels]);

        self.consume(self.prepared);
    }

    /// Discards up-to `count` prepared frames from the end of the prepared frames.
    pub fn trim_prepared(&mut self, count: usize) {
        self.prepared -= count.min(self.prepared);
    }

    /// Discards every frame.
    pub fn clear(&mut self) {
        self.start = 0;
        self.frames = 0;
        self.prepared = 0;
        self.primed = false;
    }

    fn consume(&mut self, count: usize) {
        self.start += count;
        self.frames -= count;
        self.prepared -= count;

        if self.frames == 0 {
            self.start = 0;
        }
    }

    /// Ensures there is space for `frames` live frames.
    fn reserve(&mut self, frames: usize) {
        if (self.start + frames) * self.channels <= self.buf.len() {
            return;
        }

        // Move the live frames to the front of the buffer first.
        if self.start > 0 {
            let begin = self.start * self.channels;
            let end = (self.start + self.frames) * self.channels;
            self.buf.copy_within(begin..end, 0);
            self.start = 0;
        }

        if frames * self.channels > self.buf.len() {
            self.buf.resize(frames * self.channels, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_block_geometry() {
        // Short blocks and long blocks between long blocks overlap by half.
        let geom = BlockGeometry::new(256, 256, false, false, false);
        assert_eq!(geom, BlockGeometry { begin: -128, left: 0, center: 128, right: 256, end: 128 });

        let geom = BlockGeometry::new(2048, 256, true, true, true);
        assert_eq!((geom.begin, geom.left, geom.center), (-1024, 0, 1024));
        assert_eq!((geom.right, geom.end), (2048, 1024));

        // Long blocks next to short blocks.
        let geom = BlockGeometry::new(2048, 256, true, false, false);
        assert_eq!((geom.begin, geom.left, geom.center), (-576, 448, 576));
        assert_eq!((geom.right, geom.end), (1600, 576));
    }

    #[test]
    fn verify_overlap_add_short_blocks() {
        let mut buf = OverlapBuffer::new(2, 8);
        let geom = BlockGeometry::new(8, 8, false, false, false);

        let left = [1.0f32; 8];
        let right = [2.0f32; 8];

        // The first block only primes the overlap.
        assert_eq!(buf.overlap_add([&left[..], &right[..]], &geom), 0);
        assert_eq!(buf.prepared(), 0);

        assert_eq!(buf.overlap_add([&left[..], &right[..]], &geom), 4);
        assert_eq!(buf.prepared(), 4);

        let mut out = [0.0; 16];
        assert_eq!(buf.read(&mut out), 8);
        assert_eq!(&out[..8], &[2.0, 4.0, 2.0, 4.0, 2.0, 4.0, 2.0, 4.0]);

        // Nothing more is ready until the next block.
        assert_eq!(buf.read(&mut out), 0);

        assert_eq!(buf.overlap_add([&left[..], &right[..]], &geom), 4);

        // Only whole frames are read.
        assert_eq!(buf.read(&mut out[..3]), 2);
        assert_eq!(buf.prepared(), 3);
    }

    #[test]
    fn verify_overlap_add_mixed_blocks() {
        let mut buf = OverlapBuffer::new(1, 4);

        let short = BlockGeometry::new(8, 8, false, false, false);
        let long = BlockGeometry::new(32, 8, true, false, false);

        let block = [1.0f32; 32];

        // Each block finalizes a quarter of its own and the previous block's size.
        assert_eq!(buf.overlap_add([&block[..8]], &short), 0);
        assert_eq!(buf.overlap_add([&block[..]], &long), 10);
        assert_eq!(buf.overlap_add([&block[..8]], &short), 10);
        assert_eq!(buf.overlap_add([&block[..8]], &short), 4);

        let mut out = vec![0.0; 64];
        assert_eq!(buf.read(&mut out), 24);

        // Overlapped regions hold two blocks. The flat middle of the long block holds one.
        assert!(out[..4].iter().all(|&s| s == 2.0));
        assert!(out[4..16].iter().all(|&s| s == 1.0));
        assert!(out[16..24].iter().all(|&s| s == 2.0));
    }

    #[test]
    fn verify_first_block_primes() {
        let mut buf = OverlapBuffer::new(1, 4);

        // A long block between short blocks has samples no other block overlaps.
        let long = BlockGeometry::new(32, 8, true, false, false);
        let short = BlockGeometry::new(8, 8, false, false, false);

        let block: Vec<f32> = (0..32).map(|i| i as f32).collect();

        assert_eq!(buf.overlap_add([&block[..]], &long), 0);
        assert_eq!(buf.prepared(), 0);

        // The next block finalizes the frames after the first block's center.
        assert_eq!(buf.overlap_add([&block[..8]], &short), 10);

        let mut out = [0.0; 10];
        assert_eq!(buf.read(&mut out), 10);
        assert_eq!(out[..6], block[16..22]);
        assert_eq!(out[6..], [22.0, 24.0, 26.0, 28.0]);
    }

    #[test]
    fn verify_trim_and_drain() {
        let mut buf = OverlapBuffer::new(1, 8);
        let geom = BlockGeometry::new(8, 8, false, false, false);
        let block = [1.0f32; 8];

        buf.overlap_add([&block[..]], &geom);
        buf.overlap_add([&block[..]], &geom);
        buf.overlap_add([&block[..]], &geom);

        assert_eq!(buf.prepared(), 8);

        buf.trim_prepared(3);
        assert_eq!(buf.prepared(), 5);

        let mut saved = Vec::new();
        buf.drain_prepared(&mut saved);
        assert_eq!(saved, vec![2.0; 5]);
        assert_eq!(buf.prepared(), 0);

        buf.clear();
        assert_eq!(buf.overlap_add([&block[..]], &geom), 0);
    }
}
