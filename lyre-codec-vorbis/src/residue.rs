// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lyre_core::errors::{decode_error, Result};
use lyre_core::io::{BitReader, ReadBits};

use log::trace;

use super::codebook::Codebook;
use super::common::*;
use super::dsp::DspChannel;

#[derive(Default)]
struct ResidueVqClass {
    /// The codebook used in each pass, if any.
    books: [Option<u8>; 8],
}

/// `ResidueScratch` is a working-area shared by every `Residue` of a stream.
#[derive(Default)]
pub struct ResidueScratch {
    /// Classification of each partition of each vector.
    part_classes: Vec<u8>,
    /// Entries of one format 0 partition.
    entries: Vec<u32>,
    /// Interleaved format 2 vector.
    interleaved: Vec<f32>,
}

pub struct Residue {
    /// The residue format.
    residue_type: u16,
    /// The residue's starting offset.
    begin: usize,
    /// The residue's ending offset.
    end: usize,
    /// Residue partition size (max. value 2^24).
    partition_size: usize,
    /// Residue classifications (max. value 64).
    classifications: u8,
    /// Codebook for reading partition classifications.
    classbook: u8,
    /// The number of valid classwords, `classifications ^ classbook dimensions`.
    partvals: u32,
    /// Codebooks for each partition classification.
    classes: Vec<ResidueVqClass>,
    /// The number of passes, one more than the last pass with a codebook.
    passes: usize,
}

impl Residue {
    pub fn try_read(
        bs: &mut BitReader<'_>,
        residue_type: u16,
        codebooks: &[Codebook],
    ) -> Result<Self> {
        let begin = bs.read_bits_leq32(24) as usize;
        let end = bs.read_bits_leq32(24) as usize;
        let partition_size = bs.read_bits_leq32(24) as usize + 1;
        let classifications = bs.read_bits_leq32(6) as u8 + 1;
        let classbook = bs.read_bits_leq32(8) as u8;

        if end < begin {
            return decode_error("vorbis: invalid residue begin and end");
        }

        let class_codebook = match codebooks.get(usize::from(classbook)) {
            Some(codebook) if codebook.dimensions() > 0 => codebook,
            _ => return decode_error("vorbis: invalid residue classbook"),
        };

        // Every combination of classifications in a classword must be encodable by the classbook.
        let mut partvals = 1u32;

        for _ in 0..class_codebook.dimensions() {
            partvals *= u32::from(classifications);

            if partvals > class_codebook.entries() {
                return decode_error("vorbis: residue classbook has too few entries");
            }
        }

        let cascades: Vec<u8> = (0..classifications)
            .map(|_| {
                let low_bits = bs.read_bits_leq32(3) as u8;
                let high_bits = if bs.read_bool() { bs.read_bits_leq32(5) as u8 } else { 0 };
                (high_bits << 3) | low_bits
            })
            .collect();

        let mut classes = Vec::with_capacity(cascades.len());

        for &cascade in &cascades {
            let mut class = ResidueVqClass::default();

            for (pass, book) in class.books.iter_mut().enumerate() {
                if cascade & (1 << pass) == 0 {
                    continue;
                }

                let idx = bs.read_bits_leq32(8) as u8;

                match codebooks.get(usize::from(idx)) {
                    Some(codebook) if codebook.has_lookup() => *book = Some(idx),
                    Some(_) => return decode_error("vorbis: residue codebook has no vq lookup"),
                    None => return decode_error("vorbis: invalid codebook for residue"),
                }
            }

            classes.push(class);
        }

        let passes = cascades.iter().map(|&c| 8 - c.leading_zeros() as usize).max().unwrap_or(0);

        Ok(Residue {
            residue_type,
            begin,
            end,
            partition_size,
            classifications,
            classbook,
            partvals,
            classes,
            passes,
        })
    }

    /// Decodes the residue of the channels in `residue_channels`, adding it into each channel's
    /// residue vector. `n` is half the block size.
    ///
    /// Channels flagged do-not-decode are skipped, except by format 2 which decodes every
    /// channel as long as one of them must be decoded. Decoding stops at the first invalid
    /// codeword or at the end of the packet. Whatever was decoded up-to that point is kept.
    pub fn decode(
        &self,
        bs: &mut BitReader<'_>,
        n: usize,
        codebooks: &[Codebook],
        residue_channels: &ChannelSet,
        scratch: &mut ResidueScratch,
        channels: &mut [DspChannel],
    ) {
        let has_channel_to_decode =
            residue_channels.iter().any(|ch| !channels[ch].do_not_decode);

        if !has_channel_to_decode {
            return;
        }

        if self.residue_type == 2 {
            // The residue vectors of all channels are interleaved together into one large
            // vector.
            let stride = residue_channels.len();
            let size = n * stride;

            if scratch.interleaved.len() < size {
                scratch.interleaved.resize(size, 0.0);
            }

            let interleaved = &mut scratch.interleaved[..size];
            interleaved.fill(0.0);

            let decoded = self.decode_vectors(
                bs,
                codebooks,
                &mut [&mut *interleaved],
                size,
                &mut scratch.part_classes,
                &mut scratch.entries,
            );

            if decoded.is_none() {
                trace!("vorbis: residue truncated");
            }

            for (i, ch) in residue_channels.iter().enumerate() {
                let samples = interleaved.iter().skip(i).step_by(stride);

                for (o, &s) in channels[ch].residue[..n].iter_mut().zip(samples) {
                    *o += s;
                }
            }
        }
        else {
            let mut vectors: Vec<&mut [f32]> = channels
                .iter_mut()
                .enumerate()
                .filter(|(i, ch)| residue_channels.contains(*i) && !ch.do_not_decode)
                .map(|(_, ch)| &mut ch.residue[..n])
                .collect();

            let decoded = self.decode_vectors(
                bs,
                codebooks,
                &mut vectors,
                n,
                &mut scratch.part_classes,
                &mut scratch.entries,
            );

            if decoded.is_none() {
                trace!("vorbis: residue truncated");
            }
        }
    }

    /// Decodes partitions into each vector, pass by pass. Returns `None` if decoding was cut
    /// short.
    fn decode_vectors(
        &self,
        bs: &mut BitReader<'_>,
        codebooks: &[Codebook],
        vectors: &mut [&mut [f32]],
        actual_size: usize,
        part_classes: &mut Vec<u8>,
        entries: &mut Vec<u32>,
    ) -> Option<()> {
        let class_book = &codebooks[usize::from(self.classbook)];

        // The range of the residue vector being encoded.
        let limit_begin = self.begin.min(actual_size);
        let limit_end = self.end.min(actual_size);

        let parts_to_read = (limit_end - limit_begin) / self.partition_size;

        // Partitions per classword.
        let parts_per_classword = class_book.dimensions();

        part_classes.clear();
        part_classes.resize(parts_to_read * vectors.len(), 0);

        for pass in 0..self.passes {
            let mut p_start = 0;

            while p_start < parts_to_read {
                let p_end = parts_to_read.min(p_start + parts_per_classword);

                // The classifications are only coded in the first pass.
                if pass == 0 {
                    for v in 0..vectors.len() {
                        let classword = class_book.decode_scalar(bs)?;

                        if classword >= self.partvals || bs.is_short() {
                            return None;
                        }

                        let base = v * parts_to_read;

                        decode_classes(
                            classword,
                            parts_per_classword,
                            u32::from(self.classifications),
                            &mut part_classes[base + p_start..base + p_end],
                        );
                    }
                }

                for p in p_start..p_end {
                    let offset = limit_begin + p * self.partition_size;

                    for (v, vector) in vectors.iter_mut().enumerate() {
                        let class = &self.classes[usize::from(part_classes[v * parts_to_read + p])];

                        let book = match class.books[pass] {
                            Some(book) => &codebooks[usize::from(book)],
                            None => continue,
                        };

                        let out = &mut vector[offset..offset + self.partition_size];

                        if self.residue_type == 0 {
                            decode_partition_format0(bs, book, out, entries)?;
                        }
                        else {
                            decode_partition_format1(bs, book, out)?;
                        }
                    }
                }

                p_start = p_end;
            }
        }

        Some(())
    }
}

/// Splits a classword into one classification per partition, most-significant first. `out` may
/// be shorter than `class_words` for the last classword of a vector.
fn decode_classes(mut val: u32, class_words: usize, classifications: u32, out: &mut [u8]) {
    for i in (0..class_words).rev() {
        let class = (val % classifications) as u8;
        val /= classifications;

        if let Some(out) = out.get_mut(i) {
            *out = class;
        }
    }
}

/// Decodes a format 0 partition. The vectors are interleaved with a stride of the partition size
/// divided by the codebook dimensions.
fn decode_partition_format0(
    bs: &mut BitReader<'_>,
    codebook: &Codebook,
    out: &mut [f32],
    entries: &mut Vec<u32>,
) -> Option<()> {
    let step = out.len() / codebook.dimensions();

    entries.clear();

    // Decode every entry of the partition before writing any of them.
    for _ in 0..step {
        let entry = codebook.decode_scalar(bs)?;

        if bs.is_short() {
            return None;
        }

        entries.push(entry);
    }

    for (j, &entry) in entries.iter().enumerate() {
        for (o, &v) in out[j..].iter_mut().step_by(step).zip(codebook.vector(entry)) {
            *o += v;
        }
    }

    Some(())
}

/// Decodes a format 1 partition. The vectors are consecutive.
fn decode_partition_format1(
    bs: &mut BitReader<'_>,
    codebook: &Codebook,
    out: &mut [f32],
) -> Option<()> {
    for out in out.chunks_mut(codebook.dimensions()) {
        let entry = codebook.decode_scalar(bs)?;

        if bs.is_short() {
            return None;
        }

        for (o, &v) in out.iter_mut().zip(codebook.vector(entry)) {
            *o += v;
        }
    }

    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_codebook;

    use lyre_core::io::BitWriter;

    /// A classbook with a single classification, and a 2 dimensional VQ codebook with the
    /// vectors (-1, -1), (1, -1), (-1, 1), (1, 1) for the codewords 00, 01, 10, 11.
    fn codebooks() -> Vec<Codebook> {
        let mut w = BitWriter::new();
        write_codebook(&mut w, 1, &[1], None);
        write_codebook(&mut w, 2, &[2, 2, 2, 2], Some((1, &[0, 4])));
        let buf = w.into_bytes();

        let mut bs = BitReader::new(&buf);
        vec![Codebook::read(&mut bs).unwrap(), Codebook::read(&mut bs).unwrap()]
    }

    /// A residue coding `[0, 8)` as 2 partitions of 4, with 1 pass using codebook 1.
    fn residue(residue_type: u16, codebooks: &[Codebook]) -> Residue {
        let mut w = BitWriter::new();
        w.write(0, 24);
        w.write(8, 24);
        w.write(3, 24);
        w.write(0, 6);
        w.write(0, 8);
        // Class 0 cascade.
        w.write(1, 3);
        w.write(0, 1);
        w.write(1, 8);
        let buf = w.into_bytes();

        Residue::try_read(&mut BitReader::new(&buf), residue_type, codebooks).unwrap()
    }

    fn write_code(w: &mut BitWriter, code: &str) {
        for c in code.chars() {
            w.write_bool(c == '1');
        }
    }

    /// Each partition is a classword followed by two VQ codewords.
    fn packet(partitions: &[(&str, &str)]) -> Vec<u8> {
        let mut w = BitWriter::new();

        for &(a, b) in partitions {
            write_code(&mut w, "0");
            write_code(&mut w, a);
            write_code(&mut w, b);
        }

        w.into_bytes()
    }

    fn decode(
        residue: &Residue,
        codebooks: &[Codebook],
        buf: &[u8],
        n: usize,
        dnd: &[bool],
    ) -> Vec<DspChannel> {
        let mut channels: Vec<DspChannel> = dnd
            .iter()
            .map(|&do_not_decode| {
                let mut ch = DspChannel::new(16);
                ch.do_not_decode = do_not_decode;
                ch
            })
            .collect();

        let mut set = ChannelSet::default();

        for ch in 0..dnd.len() {
            set.insert(ch);
        }

        let mut scratch = ResidueScratch::default();

        residue.decode(&mut BitReader::new(buf), n, codebooks, &set, &mut scratch, &mut channels);

        channels
    }

    #[test]
    fn verify_decode_classes() {
        // 21 is 210 in base 3.
        let mut out = [0; 3];
        decode_classes(21, 3, 3, &mut out);
        assert_eq!(out, [2, 1, 0]);

        // A truncated classword keeps the most-significant classifications.
        let mut out = [0; 2];
        decode_classes(21, 3, 3, &mut out);
        assert_eq!(out, [2, 1]);
    }

    #[test]
    fn verify_residue_format0() {
        let codebooks = codebooks();
        let residue = residue(0, &codebooks);

        let buf = packet(&[("01", "11"), ("11", "00")]);
        let channels = decode(&residue, &codebooks, &buf, 8, &[false]);

        assert_eq!(&channels[0].residue[..8], &[1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn verify_residue_format1() {
        let codebooks = codebooks();
        let residue = residue(1, &codebooks);

        let buf = packet(&[("01", "11"), ("11", "00")]);
        let channels = decode(&residue, &codebooks, &buf, 8, &[false]);

        assert_eq!(&channels[0].residue[..8], &[1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn verify_residue_format2() {
        let codebooks = codebooks();
        let residue = residue(2, &codebooks);

        // The interleaved vector is 1, -1, 1, 1, 1, 1, -1, -1.
        let buf = packet(&[("01", "11"), ("11", "00")]);
        let channels = decode(&residue, &codebooks, &buf, 4, &[false, true]);

        assert_eq!(&channels[0].residue[..4], &[1.0, 1.0, 1.0, -1.0]);
        assert_eq!(&channels[1].residue[..4], &[-1.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn verify_residue_format2_all_do_not_decode() {
        let codebooks = codebooks();
        let residue = residue(2, &codebooks);

        let buf = packet(&[("01", "11"), ("11", "00")]);
        let channels = decode(&residue, &codebooks, &buf, 4, &[true, true]);

        assert!(channels.iter().all(|ch| ch.residue.iter().all(|&r| r == 0.0)));
    }

    #[test]
    fn verify_residue_skips_do_not_decode() {
        let codebooks = codebooks();
        let residue = residue(1, &codebooks);

        // Only the classwords and vectors of channel 1 are coded.
        let buf = packet(&[("01", "11"), ("11", "00")]);
        let channels = decode(&residue, &codebooks, &buf, 8, &[true, false]);

        assert!(channels[0].residue.iter().all(|&r| r == 0.0));
        assert_eq!(&channels[1].residue[..8], &[1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn verify_residue_truncated() {
        let codebooks = codebooks();
        let residue = residue(1, &codebooks);

        // Only the first partition, and the classword of the second.
        let mut w = BitWriter::new();
        write_code(&mut w, "0011110");
        let buf = w.into_bytes();

        let channels = decode(&residue, &codebooks, &buf, 8, &[false]);

        assert_eq!(&channels[0].residue[..8], &[1.0, -1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn verify_residue_format2_truncated() {
        let codebooks = codebooks();
        let residue = residue(2, &codebooks);

        // The interleaved vector is cut short after 1, -1, 1, 1.
        let mut w = BitWriter::new();
        write_code(&mut w, "0011110");
        let buf = w.into_bytes();

        let channels = decode(&residue, &codebooks, &buf, 4, &[false, false]);

        assert_eq!(&channels[0].residue[..4], &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(&channels[1].residue[..4], &[-1.0, 1.0, 0.0, 0.0]);
    }
}
