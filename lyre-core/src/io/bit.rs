// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// A `FiniteBitStream` is a bit stream that has a known length in bits.
pub trait FiniteBitStream {
    /// Gets the number of bits left unread.
    fn bits_left(&self) -> u64;
}

/// `ReadBits` reads bits from least-significant to most-significant.
///
/// Reads never fail. If a read runs past the end of the stream, the missing bits are read as 0
/// and the stream is flagged as short. Consumers must check [`ReadBits::is_short`] and abandon
/// whatever they were decoding.
pub trait ReadBits {
    /// Peeks at the next `count` bits, up-to 64, without consuming them.
    ///
    /// Returns the bits, and the number of bits that were actually available. Unavailable bits
    /// are 0.
    fn peek_bits(&mut self, count: u32) -> (u64, u32);

    /// Consumes `count` bits. Consuming more bits than are available flags the stream as short.
    fn skip_bits(&mut self, count: u64);

    /// Returns `true` if a read ran past the end of the stream.
    fn is_short(&self) -> bool;

    /// Gets the number of bits consumed.
    fn bits_read(&self) -> u64;

    /// Reads up-to 64 bits and returns them as a `u64`.
    #[inline(always)]
    fn read_bits_leq64(&mut self, bit_width: u32) -> u64 {
        if bit_width == 0 {
            return 0;
        }

        let (bits, _) = self.peek_bits(bit_width);
        self.skip_bits(u64::from(bit_width));
        bits
    }

    /// Reads up-to 32 bits and returns them as a `u32`.
    #[inline(always)]
    fn read_bits_leq32(&mut self, bit_width: u32) -> u32 {
        debug_assert!(bit_width <= 32);
        self.read_bits_leq64(bit_width) as u32
    }

    /// Reads a single bit as a boolean value.
    #[inline(always)]
    fn read_bool(&mut self) -> bool {
        self.read_bits_leq64(1) == 1
    }

    /// Reads a single bit and returns it as a `u32`.
    #[inline(always)]
    fn read_bit(&mut self) -> u32 {
        self.read_bits_leq64(1) as u32
    }

    /// Reads 8 bits as an unsigned byte.
    #[inline(always)]
    fn read_u8(&mut self) -> u8 {
        self.read_bits_leq64(8) as u8
    }

    /// Reads 16 bits as an unsigned integer.
    #[inline(always)]
    fn read_u16(&mut self) -> u16 {
        self.read_bits_leq64(16) as u16
    }

    /// Reads 32 bits as an unsigned integer.
    #[inline(always)]
    fn read_u32(&mut self) -> u32 {
        self.read_bits_leq64(32) as u32
    }

    /// Reads 64 bits as an unsigned integer.
    #[inline(always)]
    fn read_u64(&mut self) -> u64 {
        self.read_bits_leq64(64)
    }

    /// Reads 16 bits as a signed integer.
    #[inline(always)]
    fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    /// Reads 32 bits as a signed integer.
    #[inline(always)]
    fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    /// Reads 64 bits as a signed integer.
    #[inline(always)]
    fn read_i64(&mut self) -> i64 {
        self.read_u64() as i64
    }

    /// Reads bytes into `buf`. Bytes past the end of the stream are read as 0.
    fn read_buf_exact(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.read_u8();
        }
    }

    /// Consumes `count` bytes.
    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) {
        self.skip_bits(count << 3)
    }
}

/// `BitReader` reads bits from least-significant to most-significant from any `&[u8]`.
///
/// Stated another way, if N-bits are read from a `BitReader` then bit 0, the first bit read,
/// is the least-significant bit, and bit N-1, the last bit read, is the most-significant.
pub struct BitReader<'a> {
    buf: &'a [u8],
    pos: u64,
    is_short: bool,
}

impl<'a> BitReader<'a> {
    /// Instantiate a new `BitReader` with the given buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        BitReader { buf, pos: 0, is_short: false }
    }

    /// Gets the length of the underlying buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }
}

impl ReadBits for BitReader<'_> {
    fn peek_bits(&mut self, count: u32) -> (u64, u32) {
        debug_assert!(count <= 64);

        let avail = self.bits_left().min(u64::from(count)) as u32;

        if avail == 0 {
            return (0, 0);
        }

        let byte = (self.pos >> 3) as usize;
        let shift = (self.pos & 0x7) as u32;

        // 9 bytes hold 64 bits at any bit alignment.
        let mut acc = 0u128;

        for (i, &b) in self.buf[byte..].iter().take(9).enumerate() {
            acc |= u128::from(b) << (i << 3);
        }

        let bits = (acc >> shift) as u64;
        let mask = if avail == 64 { u64::MAX } else { (1 << avail) - 1 };

        (bits & mask, avail)
    }

    fn skip_bits(&mut self, count: u64) {
        let left = self.bits_left();

        if count > left {
            self.pos += left;
            self.is_short = true;
        }
        else {
            self.pos += count;
        }
    }

    fn is_short(&self) -> bool {
        self.is_short
    }

    fn bits_read(&self) -> u64 {
        self.pos
    }
}

impl FiniteBitStream for BitReader<'_> {
    fn bits_left(&self) -> u64 {
        ((self.buf.len() as u64) << 3) - self.pos
    }
}

/// `BitWriter` writes bits from least-significant to most-significant into a growable buffer.
///
/// It is the inverse of [`BitReader`]. Bits written by `write(value, n)` are read back by
/// `read_bits_leq64(n)`.
#[derive(Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    bit_len: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Writes the low `bit_width` bits of `value`.
    pub fn write(&mut self, value: u64, bit_width: u32) {
        debug_assert!(bit_width <= 64);

        for i in 0..bit_width {
            if self.bit_len & 0x7 == 0 {
                self.buf.push(0);
            }

            if (value >> i) & 1 == 1 {
                if let Some(last) = self.buf.last_mut() {
                    *last |= 1 << (self.bit_len & 0x7);
                }
            }

            self.bit_len += 1;
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write(u64::from(value), 1);
    }

    /// Gets the number of bits written.
    pub fn bit_len(&self) -> u64 {
        self.bit_len
    }

    /// Consumes the writer, returning the written bytes. The last byte is zero-padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
