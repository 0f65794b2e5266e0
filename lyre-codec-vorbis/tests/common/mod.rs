// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic Vorbis streams and an in-memory packet provider.

#![allow(dead_code)]

use lyre_core::errors::Result;
use lyre_core::io::BitWriter;
use lyre_core::packet::{Packet, PacketFlags, PacketProvider};

pub const SHORT: usize = 256;
pub const LONG: usize = 2048;

/// Packs a value into the Vorbis codebook float format.
fn float32_pack(value: f32) -> u32 {
    if value == 0.0 {
        return 0;
    }

    let sign = if value < 0.0 { 0x8000_0000 } else { 0 };
    let mut mantissa = f64::from(value.abs());
    let mut exponent = 788i32;

    while mantissa < f64::from(0x10_0000) {
        mantissa *= 2.0;
        exponent -= 1;
    }

    while mantissa >= f64::from(0x20_0000) {
        mantissa /= 2.0;
        exponent += 1;
    }

    sign | ((exponent as u32) << 21) | mantissa as u32
}

/// Writes a sparse codebook with an optional type 2 lookup. The multiplicands are 4 bits wide,
/// with a minimum of -1.0 and a delta of 0.5.
fn write_codebook(w: &mut BitWriter, dims: u16, lens: &[u8], mults: Option<&[u16]>) {
    w.write(0x564342, 24);
    w.write(u64::from(dims), 16);
    w.write(lens.len() as u64, 24);
    w.write_bool(false);
    w.write_bool(true);

    for &len in lens {
        w.write_bool(true);
        w.write(u64::from(len - 1), 5);
    }

    match mults {
        None => w.write(0, 4),
        Some(mults) => {
            w.write(2, 4);
            w.write(u64::from(float32_pack(-1.0)), 32);
            w.write(u64::from(float32_pack(0.5)), 32);
            w.write(3, 4);
            w.write_bool(false);

            for &m in mults {
                w.write(u64::from(m), 4);
            }
        }
    }
}

pub fn ident_header(channels: u8, rate: u32, bitrates: [i32; 3]) -> Vec<u8> {
    let mut buf = vec![1];
    buf.extend_from_slice(b"vorbis");
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(channels);
    buf.extend_from_slice(&rate.to_le_bytes());

    for bitrate in bitrates {
        buf.extend_from_slice(&bitrate.to_le_bytes());
    }

    // Block sizes of 256 and 2048.
    buf.push(8 | (11 << 4));
    buf.push(1);
    buf
}

pub fn comment_header(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut buf = vec![3];
    buf.extend_from_slice(b"vorbis");
    buf.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    buf.extend_from_slice(vendor.as_bytes());
    buf.extend_from_slice(&(comments.len() as u32).to_le_bytes());

    for comment in comments {
        buf.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        buf.extend_from_slice(comment.as_bytes());
    }

    buf.push(1);
    buf
}

/// Number of residue partitions coded in every packet with energy.
pub const RESIDUE_PARTITIONS: usize = 4;
/// Number of VQ codewords per residue partition.
pub const RESIDUE_CODEWORDS: usize = 8;

/// The floor type used by every channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FloorType {
    Floor0,
    Floor1,
}

/// Configuration of the setup header written by `setup_header`.
#[derive(Copy, Clone, Debug)]
pub struct Setup {
    pub floor: FloorType,
    pub residue_type: u16,
}

impl Default for Setup {
    fn default() -> Self {
        Setup { floor: FloorType::Floor1, residue_type: 2 }
    }
}

/// Builds a setup header with:
///
/// * codebook 0, the residue classbook, with 2 entries of 1 bit and no lookup;
/// * codebook 1, a 2-dimensional VQ book with entries (0, 0), (1, 0), (0.5, 0.5), and (-1, 1),
///   each 2 bits long;
/// * either a Floor1 without partitions and a multiplier of 2, or an order 2 Floor0 with 6
///   amplitude bits and an amplitude offset of 40, coded with codebook 1;
/// * a residue of the configured format with 4 partitions of 16 samples, decoded with codebook
///   1 in one pass;
/// * one mapping coupling channels 0 and 1 if there is more than one channel;
/// * a short block mode 0, and a long block mode 1.
pub fn setup_header(channels: u8, setup: Setup) -> Vec<u8> {
    let mut w = BitWriter::default();

    for &byte in b"\x05vorbis" {
        w.write(u64::from(byte), 8);
    }

    w.write(1, 8);
    write_codebook(&mut w, 1, &[1, 1], None);
    write_codebook(&mut w, 2, &[2, 2, 2, 2], Some(&[2, 2, 4, 2, 3, 3, 0, 4]));

    // Time domain transforms.
    w.write(0, 6);
    w.write(0, 16);

    // Floor.
    w.write(0, 6);

    match setup.floor {
        FloorType::Floor0 => {
            w.write(0, 16);
            // Order 2, rate 44100 Hz, and 64 Bark bands.
            w.write(2, 8);
            w.write(44100, 16);
            w.write(64, 16);
            // 6 amplitude bits, and an amplitude offset of 40.
            w.write(6, 6);
            w.write(40, 8);
            // 1 book, codebook 1.
            w.write(0, 4);
            w.write(1, 8);
        }
        FloorType::Floor1 => {
            w.write(1, 16);
            // No partitions, multiplier of 2, and 8 range bits.
            w.write(0, 5);
            w.write(1, 2);
            w.write(8, 4);
        }
    }

    // Residue.
    w.write(0, 6);
    w.write(u64::from(setup.residue_type), 16);
    w.write(0, 24);
    w.write(64, 24);
    w.write(15, 24);
    w.write(0, 6);
    w.write(0, 8);
    w.write(1, 3);
    w.write_bool(false);
    w.write(1, 8);

    // Mapping.
    w.write(0, 6);
    w.write(0, 16);
    w.write_bool(false);

    if channels > 1 {
        w.write_bool(true);
        w.write(0, 8);
        let bits = 32 - (u32::from(channels) - 1).leading_zeros();
        w.write(0, bits);
        w.write(1, bits);
    }
    else {
        w.write_bool(false);
    }

    w.write(0, 2);
    w.write(0, 8);
    w.write(0, 8);
    w.write(0, 8);

    // Modes.
    w.write(1, 6);

    for block_flag in [false, true] {
        w.write_bool(block_flag);
        w.write(0, 16);
        w.write(0, 16);
        w.write(0, 8);
    }

    w.write_bool(true);
    w.into_bytes()
}

#[derive(Copy, Clone, Debug)]
pub enum Block {
    Short,
    Long { prev: bool, next: bool },
}

impl Block {
    pub fn size(&self) -> usize {
        match self {
            Block::Short => SHORT,
            Block::Long { .. } => LONG,
        }
    }
}

/// The content of an audio packet.
#[derive(Copy, Clone, Debug)]
pub enum Content<'a> {
    /// Every floor is unused.
    Silence,
    /// Every channel uses the same Floor1 line from `y0` to `y1`, and the residue codewords
    /// cycle through `entries`.
    Tone { y0: u8, y1: u8, entries: &'a [u8] },
    /// Every channel uses the same Floor0 curve, with the coefficients of codebook 1 entry
    /// `coeffs`. The residue codewords cycle through `entries`.
    Lsp { amplitude: u8, coeffs: u8, entries: &'a [u8] },
}

/// Writes the 2-bit codeword of a codebook 1 entry.
fn write_entry(w: &mut BitWriter, entry: u8) {
    w.write_bool(entry & 2 != 0);
    w.write_bool(entry & 1 != 0);
}

/// Writes the residue of every channel. Format 2 codes a single interleaved vector, formats 0
/// and 1 code one vector per channel.
fn write_residue(w: &mut BitWriter, setup: Setup, channels: u8, entries: &[u8]) {
    let vectors = if setup.residue_type == 2 { 1 } else { usize::from(channels) };

    let mut codewords = entries.iter().cycle();

    for _ in 0..RESIDUE_PARTITIONS {
        // Classwords.
        for _ in 0..vectors {
            w.write_bool(false);
        }

        for &entry in codewords.by_ref().take(vectors * RESIDUE_CODEWORDS) {
            write_entry(w, entry);
        }
    }
}

pub fn audio_packet(setup: Setup, channels: u8, block: Block, content: Content<'_>) -> Vec<u8> {
    let mut w = BitWriter::default();

    w.write_bool(false);

    match block {
        Block::Short => w.write_bool(false),
        Block::Long { prev, next } => {
            w.write_bool(true);
            w.write_bool(prev);
            w.write_bool(next);
        }
    }

    match content {
        Content::Silence => {
            for _ in 0..channels {
                match setup.floor {
                    // An amplitude of 0.
                    FloorType::Floor0 => w.write(0, 6),
                    FloorType::Floor1 => w.write_bool(false),
                }
            }
        }
        Content::Tone { y0, y1, entries } => {
            for _ in 0..channels {
                w.write_bool(true);
                w.write(u64::from(y0), 7);
                w.write(u64::from(y1), 7);
            }

            write_residue(&mut w, setup, channels, entries);
        }
        Content::Lsp { amplitude, coeffs, entries } => {
            for _ in 0..channels {
                w.write(u64::from(amplitude), 6);
                // Book index.
                w.write(0, 1);
                write_entry(&mut w, coeffs);
            }

            write_residue(&mut w, setup, channels, entries);
        }
    }

    w.into_bytes()
}

/// Number of audio packets per page.
const PACKETS_PER_PAGE: usize = 4;

/// Builds the packets of a logical stream, numbering packets and pages, and computing granule
/// positions.
pub struct StreamBuilder {
    packets: Vec<Packet>,
    /// The page of the next packet.
    page: u32,
    /// Audio packets on the current page.
    on_page: usize,
    granule_pos: u64,
    prev_block: Option<usize>,
    setup: Setup,
}

impl StreamBuilder {
    pub fn new(channels: u8) -> Self {
        StreamBuilder::with_setup(channels, Setup::default())
    }

    pub fn with_setup(channels: u8, setup: Setup) -> Self {
        StreamBuilder::start(ident_header(channels, 44100, [0; 3]), channels, setup)
    }

    pub fn with_ident(ident: Vec<u8>, channels: u8) -> Self {
        StreamBuilder::start(ident, channels, Setup::default())
    }

    fn start(ident: Vec<u8>, channels: u8, setup: Setup) -> Self {
        let mut builder = StreamBuilder {
            packets: Vec::new(),
            page: 0,
            on_page: 0,
            granule_pos: 0,
            prev_block: None,
            setup,
        };
        builder.headers(ident, channels);
        builder
    }

    /// Appends a header set. The identification header is given by the caller.
    pub fn headers(&mut self, ident: Vec<u8>, channels: u8) -> &mut Self {
        if self.on_page > 0 {
            self.page += 1;
            self.on_page = 0;
        }

        let comment = comment_header("Lyre test", &["TITLE=Test"]);

        self.push_header(ident, self.page);
        self.push_header(comment, self.page + 1);
        self.push_header(setup_header(channels, self.setup), self.page + 1);

        self.page += 2;
        self.prev_block = None;
        self
    }

    fn push_header(&mut self, buf: Vec<u8>, page: u32) {
        let index = self.packets.len() as u64;
        self.packets.push(Packet::new_from_slice(index, &buf).with_page(page, 0));
    }

    pub fn audio(&mut self, channels: u8, block: Block, content: Content<'_>) -> &mut Self {
        let frames = match self.prev_block {
            Some(prev) => prev / 4 + block.size() / 4,
            None => 0,
        };

        self.granule_pos += frames as u64;
        self.prev_block = Some(block.size());

        let index = self.packets.len() as u64;
        let buf = audio_packet(self.setup, channels, block, content);

        self.packets.push(
            Packet::new_from_slice(index, &buf)
                .with_page(self.page, 0)
                .with_granule_pos(self.granule_pos),
        );

        self.on_page += 1;

        if self.on_page == PACKETS_PER_PAGE {
            self.page += 1;
            self.on_page = 0;
        }

        self
    }

    pub fn blocks(&mut self, channels: u8, blocks: &[Block], content: Content<'_>) -> &mut Self {
        for &block in blocks {
            self.audio(channels, block, content);
        }
        self
    }

    /// The granule position of the last packet.
    pub fn granule_pos(&self) -> u64 {
        self.granule_pos
    }

    /// Completes the stream. Every packet gets the granule position of the last packet on its
    /// page, and the packets on the last page are flagged as the end of the stream.
    pub fn build(&self) -> Vec<Packet> {
        let last_page = self.packets.last().map_or(0, |p| p.page_sequence());

        self.packets
            .iter()
            .map(|packet| {
                let page = packet.page_sequence();

                let page_granule_pos = self
                    .packets
                    .iter()
                    .filter(|p| p.page_sequence() == page)
                    .filter_map(|p| p.granule_pos())
                    .max()
                    .unwrap_or(0);

                let flags = if page == last_page && packet.granule_pos().is_some() {
                    PacketFlags::END_OF_STREAM
                }
                else {
                    PacketFlags::empty()
                };

                packet.clone().with_page(page, page_granule_pos).with_flags(flags)
            })
            .collect()
    }
}

/// The standard block sequence of the tests: short blocks, a run of long blocks, and short blocks
/// again. Decodes to 3584 frames.
pub const BLOCKS: [Block; 8] = [
    Block::Short,
    Block::Short,
    Block::Long { prev: false, next: true },
    Block::Long { prev: true, next: true },
    Block::Long { prev: true, next: false },
    Block::Short,
    Block::Short,
    Block::Short,
];

pub const BLOCKS_FRAMES: u64 = 3584;

/// A packet provider over a list of packets. Packet `i` of the list must have index `i`.
pub struct MemoryProvider {
    packets: Vec<Packet>,
    pos: usize,
    seekable: bool,
    /// Index of the first packet of a new header set.
    change_at: Option<u64>,
    change_signal: Option<u64>,
    /// Granule positions received from the decoder.
    pub resolved: Vec<(u64, u64)>,
}

impl MemoryProvider {
    pub fn new(packets: Vec<Packet>) -> Self {
        MemoryProvider {
            packets,
            pos: 0,
            seekable: true,
            change_at: None,
            change_signal: None,
            resolved: Vec::new(),
        }
    }

    pub fn unseekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    pub fn with_parameter_change(mut self, index: u64) -> Self {
        self.change_at = Some(index);
        self
    }

    /// The index of the next packet.
    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl PacketProvider for MemoryProvider {
    fn can_seek(&self) -> bool {
        self.seekable
    }

    fn next_packet(&mut self) -> Result<Option<Packet>> {
        let packet = self.packets.get(self.pos).cloned();

        if let Some(packet) = &packet {
            self.pos += 1;

            if self.change_at == Some(packet.index()) {
                self.change_signal = Some(packet.index());
            }
        }

        Ok(packet)
    }

    fn peek_next_packet(&mut self) -> Result<Option<&Packet>> {
        Ok(self.packets.get(self.pos))
    }

    fn get_packet(&mut self, index: u64) -> Result<Option<Packet>> {
        Ok(self.packets.get(index as usize).cloned())
    }

    fn find_packet(
        &mut self,
        granule_pos: u64,
        packet_length: &mut dyn FnMut(&Packet, Option<&Packet>) -> u32,
    ) -> Result<Option<Packet>> {
        let mut end = 0;
        let mut prev = None;

        for packet in &self.packets {
            let len = u64::from(packet_length(packet, prev));

            end += len;

            if len > 0 && end >= granule_pos {
                return Ok(Some(packet.clone()));
            }

            prev = Some(packet);
        }

        Ok(None)
    }

    fn seek_to_packet(&mut self, packet: &Packet, preroll: u64) -> Result<()> {
        self.pos = packet.index().saturating_sub(preroll) as usize;
        Ok(())
    }

    fn granule_count(&mut self) -> Result<u64> {
        Ok(self.packets.last().map_or(0, |p| p.page_granule_pos()))
    }

    fn total_page_count(&mut self) -> Result<u32> {
        Ok(self.packets.last().map_or(0, |p| p.page_sequence() + 1))
    }

    fn container_bits(&self) -> u64 {
        // Ogg page headers of 27 bytes.
        u64::from(self.packets.last().map_or(0, |p| p.page_sequence() + 1)) * 27 * 8
    }

    fn take_parameter_change(&mut self) -> Option<u64> {
        self.change_signal.take()
    }

    fn set_granule_pos(&mut self, index: u64, granule_pos: u64) {
        self.resolved.push((index, granule_pos));
    }
}
