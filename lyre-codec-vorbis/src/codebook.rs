// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lyre_core::errors::{decode_error, limit_error, Result};
use lyre_core::io::{FiniteBitStream, ReadBits};

use super::common::*;

/// Codewords up-to this length are decoded with a single prefix table lookup.
const MAX_TABLE_BITS: u32 = 10;

/// The maximum number of scalars in an unpacked VQ lookup table.
const MAX_LOOKUP_SCALARS: u64 = 1 << 22;

/// As defined in section 9.2.3 of the Vorbis I specification.
///
/// The return value for this function is defined to be ’the greatest integer value for which the
/// return value to the power of `dimensions` is less than or equal to `entries`.
fn lookup1_values(entries: u32, dimensions: u16) -> u32 {
    let fits = |value: u32| {
        u64::from(value)
            .checked_pow(u32::from(dimensions))
            .map_or(false, |pow| pow <= u64::from(entries))
    };

    // Estimate with floating point, then correct any rounding error.
    let mut value = (entries as f64).powf(1.0 / f64::from(dimensions)).floor() as u32;

    while value > 0 && !fits(value) {
        value -= 1;
    }

    while fits(value + 1) {
        value += 1;
    }

    value
}

/// Assigns canonical codewords to each entry given the codeword lengths.
///
/// Each entry, in order, takes the lowest-valued codeword of its length that is still available.
/// The returned codewords are bit-reversed such that the first bit of the codeword on the wire is
/// the least-significant bit.
fn synthesize_codewords(code_lens: &[u8]) -> Result<Vec<u32>> {
    let mut codewords = vec![0; code_lens.len()];

    // The next available codeword for each length, left-justified in 32 bits. A value of 0 means
    // there is no codeword of that length available.
    let mut available = [0u32; 33];

    let first = match code_lens.iter().position(|&len| len > 0) {
        Some(first) => first,
        // All entries are unused.
        None => return Ok(codewords),
    };

    // The first used entry always takes the all-zeros codeword, leaving the right sibling at
    // every depth above it available.
    for len in 1..=usize::from(code_lens[first]) {
        available[len] = 1 << (32 - len);
    }

    for (i, &len) in code_lens.iter().enumerate().skip(first + 1) {
        if len == 0 {
            continue;
        }

        let len = usize::from(len);

        // Find the deepest available codeword no longer than the entry's codeword.
        let mut z = len;

        while z > 0 && available[z] == 0 {
            z -= 1;
        }

        if z == 0 {
            return decode_error("vorbis: codebook overspecified");
        }

        let codeword = available[z];
        available[z] = 0;

        codewords[i] = codeword.reverse_bits();

        // If a shorter codeword was taken, extend it down to the entry's length. The right
        // sibling at every depth along the way becomes available.
        if z != len {
            for y in (z + 1..=len).rev() {
                available[y] = codeword + (1 << (32 - y));
            }
        }
    }

    Ok(codewords)
}

#[derive(Clone, Copy)]
enum PrefixEntry {
    /// The prefix is not a complete codeword of `table_bits` bits or less.
    Miss,
    /// The prefix begins with the codeword for `entry`.
    Hit { entry: u32, len: u8 },
}

/// A codeword that is too long for the prefix table.
struct OverflowNode {
    bits: u32,
    mask: u32,
    len: u8,
    entry: u32,
    next: Option<usize>,
}

/// A two-tier Huffman decoding table.
///
/// Codewords of up-to `table_bits` bits are decoded by indexing a prefix table with the next
/// `table_bits` bits of the stream. Longer codewords are found by walking a linked list of
/// overflow nodes stored in an arena, shortest first.
struct HuffmanTable {
    table_bits: u32,
    max_bits: u32,
    prefix: Box<[PrefixEntry]>,
    overflow: Vec<OverflowNode>,
    overflow_head: Option<usize>,
}

impl HuffmanTable {
    fn new(code_lens: &[u8], codewords: &[u32]) -> Self {
        let max_bits = code_lens.iter().copied().max().map_or(0, u32::from);
        let table_bits = max_bits.min(MAX_TABLE_BITS);

        // Used entries, in order of increasing codeword length then codeword.
        let mut used: Vec<(u32, u32, u8)> = code_lens
            .iter()
            .zip(codewords)
            .enumerate()
            .filter(|&(_, (&len, _))| len > 0)
            .map(|(entry, (&len, &bits))| (entry as u32, bits, len))
            .collect();

        used.sort_by_key(|&(_, bits, len)| (len, bits));

        let mut prefix = vec![PrefixEntry::Miss; 1 << table_bits];
        let mut overflow = Vec::new();

        for (entry, bits, len) in used {
            if u32::from(len) <= table_bits {
                // Every table index whose low `len` bits equal the codeword decodes to the entry.
                for j in 0..1usize << (table_bits - u32::from(len)) {
                    prefix[(j << len) | bits as usize] = PrefixEntry::Hit { entry, len };
                }
            }
            else {
                let mask = if len >= 32 { u32::MAX } else { (1 << len) - 1 };
                overflow.push(OverflowNode { bits, mask, len, entry, next: None });
            }
        }

        let count = overflow.len();

        for (i, node) in overflow.iter_mut().enumerate() {
            node.next = if i + 1 < count { Some(i + 1) } else { None };
        }

        let overflow_head = if count > 0 { Some(0) } else { None };

        HuffmanTable {
            table_bits,
            max_bits,
            prefix: prefix.into_boxed_slice(),
            overflow,
            overflow_head,
        }
    }

    fn decode<B: ReadBits>(&self, bs: &mut B) -> Option<u32> {
        let (bits, avail) = bs.peek_bits(self.table_bits);

        if avail == 0 {
            return None;
        }

        if let PrefixEntry::Hit { entry, len } = self.prefix[bits as usize] {
            bs.skip_bits(u64::from(len));
            return Some(entry);
        }

        let (bits, _) = bs.peek_bits(self.max_bits);
        let bits = bits as u32;

        let mut cur = self.overflow_head;

        while let Some(idx) = cur {
            let node = &self.overflow[idx];

            if bits & node.mask == node.bits {
                bs.skip_bits(u64::from(node.len));
                return Some(node.entry);
            }

            cur = node.next;
        }

        None
    }
}

/// As defined in section 3.2.1 of the Vorbis I specification.
fn unpack_vq_lookup(
    lookup_type: u32,
    multiplicands: &[u16],
    min_value: f32,
    delta_value: f32,
    sequence_p: bool,
    entries: u32,
    dimensions: u16,
) -> Vec<f32> {
    let dims = usize::from(dimensions);
    let lookup_values = multiplicands.len() as u64;

    let mut vq = vec![0.0; entries as usize * dims];

    for (entry, vector) in vq.chunks_exact_mut(dims).enumerate() {
        let mut last = 0.0;
        let mut index_divisor = 1u64;

        for (i, value) in vector.iter_mut().enumerate() {
            let offset = match lookup_type {
                // Each dimension of a type 1 lookup indexes the multiplicands as one digit of
                // the entry number written in base `lookup_values`.
                1 => ((entry as u64 / index_divisor) % lookup_values) as usize,
                // A type 2 lookup stores every scalar explicitly.
                _ => entry * dims + i,
            };

            *value = f32::from(multiplicands[offset]) * delta_value + min_value + last;

            if sequence_p {
                last = *value;
            }

            index_divisor = index_divisor.saturating_mul(lookup_values);
        }
    }

    vq
}

/// A Vorbis codebook.
pub struct Codebook {
    dimensions: u16,
    entries: u32,
    huffman: HuffmanTable,
    lookup: Option<Box<[f32]>>,
}

impl Codebook {
    pub fn read<B: ReadBits + FiniteBitStream>(bs: &mut B) -> Result<Self> {
        // Verify codebook synchronization word.
        if bs.read_bits_leq32(24) != 0x564342 {
            return decode_error("vorbis: invalid codebook sync");
        }

        let dimensions = bs.read_bits_leq32(16) as u16;
        let entries = bs.read_bits_leq32(24);

        let is_length_ordered = bs.read_bool();

        let mut code_lens = Vec::<u8>::new();

        if !is_length_ordered {
            let is_sparse = bs.read_bool();

            // At least 1 bit is read per entry. Catch truncated or bogus entry counts before
            // allocating.
            if u64::from(entries) > bs.bits_left() {
                return decode_error("vorbis: codebook entry count exceeds header");
            }

            code_lens.reserve_exact(entries as usize);

            for _ in 0..entries {
                // Unused entries in a sparse codebook have a length of 0.
                let is_used = !is_sparse || bs.read_bool();

                let len = if is_used { bs.read_bits_leq32(5) as u8 + 1 } else { 0 };

                code_lens.push(len);
            }
        }
        else {
            let mut cur_len = bs.read_bits_leq32(5) + 1;

            while code_lens.len() < entries as usize {
                let remaining = entries - code_lens.len() as u32;

                let num = bs.read_bits_leq32(ilog(remaining));

                if num > remaining || cur_len > 32 {
                    return decode_error("vorbis: invalid length ordered codebook");
                }

                code_lens.extend(std::iter::repeat(cur_len as u8).take(num as usize));

                cur_len += 1;

                if bs.is_short() {
                    break;
                }
            }
        }

        // Read and unpack vector quantization (VQ) lookup table.
        let lookup_type = bs.read_bits_leq32(4);

        let lookup = match lookup_type {
            0 => None,
            1 | 2 => {
                if dimensions == 0 {
                    return decode_error("vorbis: vq codebook has no dimensions");
                }

                if u64::from(entries) * u64::from(dimensions) > MAX_LOOKUP_SCALARS {
                    return limit_error("vorbis: codebook lookup table too large");
                }

                let min_value = float32_unpack(bs.read_bits_leq32(32));
                let delta_value = float32_unpack(bs.read_bits_leq32(32));
                let value_bits = bs.read_bits_leq32(4) + 1;
                let sequence_p = bs.read_bool();

                let lookup_values = match lookup_type {
                    1 => lookup1_values(entries, dimensions),
                    _ => entries * u32::from(dimensions),
                };

                let multiplicands: Vec<u16> =
                    (0..lookup_values).map(|_| bs.read_bits_leq32(value_bits) as u16).collect();

                let vq = unpack_vq_lookup(
                    lookup_type,
                    &multiplicands,
                    min_value,
                    delta_value,
                    sequence_p,
                    entries,
                    dimensions,
                );

                Some(vq.into_boxed_slice())
            }
            _ => return decode_error("vorbis: invalid codeword lookup type"),
        };

        if bs.is_short() {
            return decode_error("vorbis: codebook truncated");
        }

        let codewords = synthesize_codewords(&code_lens)?;
        let huffman = HuffmanTable::new(&code_lens, &codewords);

        Ok(Codebook { dimensions, entries, huffman, lookup })
    }

    /// Decodes one entry number. Returns `None` if the bits in the stream do not form a codeword.
    #[inline(always)]
    pub fn decode_scalar<B: ReadBits>(&self, bs: &mut B) -> Option<u32> {
        self.huffman.decode(bs)
    }

    /// Decodes one entry and returns its VQ vector.
    #[inline(always)]
    pub fn decode_vq<B: ReadBits>(&self, bs: &mut B) -> Option<&[f32]> {
        let entry = self.decode_scalar(bs)?;
        Some(self.vector(entry))
    }

    /// Gets the VQ vector of an entry. Codebooks without a lookup table have empty vectors.
    #[inline(always)]
    pub fn vector(&self, entry: u32) -> &[f32] {
        match &self.lookup {
            Some(vq) => {
                let dims = usize::from(self.dimensions);
                let start = entry as usize * dims;
                &vq[start..start + dims]
            }
            None => &[],
        }
    }

    #[inline(always)]
    pub fn dimensions(&self) -> usize {
        usize::from(self.dimensions)
    }

    pub fn entries(&self) -> u32 {
        self.entries
    }

    pub fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }
}
