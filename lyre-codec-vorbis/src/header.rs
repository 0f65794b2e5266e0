// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lyre_core::errors::{decode_error, unsupported_error, Result};
use lyre_core::io::{BitReader, FiniteBitStream, ReadBits};

use log::debug;

use super::codebook::Codebook;
use super::floor::{Floor, Floor0, Floor1};
use super::mapping::{Mapping, Mode};
use super::residue::Residue;

pub const VORBIS_PACKET_TYPE_IDENTIFICATION: u8 = 1;
pub const VORBIS_PACKET_TYPE_COMMENT: u8 = 3;
pub const VORBIS_PACKET_TYPE_SETUP: u8 = 5;

/// The common Vorbis header packet signature.
const VORBIS_HEADER_PACKET_SIGNATURE: &[u8] = b"vorbis";

/// The Vorbis version supported by this decoder.
const VORBIS_VERSION: u32 = 0;

/// The minimum block size (64) expressed as a power-of-2 exponent.
const VORBIS_BLOCKSIZE_MIN: u8 = 6;
/// The maximum block size (8192) expressed as a power-of-2 exponent.
const VORBIS_BLOCKSIZE_MAX: u8 = 13;

/// The bitrate hints of a stream, in bits per second. A value of 0 or less is unset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitrates {
    pub upper: i32,
    pub nominal: i32,
    pub lower: i32,
}

#[derive(Clone, Debug)]
pub struct IdentHeader {
    pub n_channels: u8,
    pub sample_rate: u32,
    pub bitrates: Bitrates,
    pub bs0_exp: u8,
    pub bs1_exp: u8,
}

impl IdentHeader {
    /// Gets the short and long block sizes.
    pub fn block_sizes(&self) -> (usize, usize) {
        (1 << self.bs0_exp, 1 << self.bs1_exp)
    }
}

#[derive(Clone, Debug, Default)]
pub struct CommentHeader {
    pub vendor: String,
    /// The user comments, each nominally in `KEY=value` form.
    pub comments: Vec<String>,
}

pub struct Setup {
    pub codebooks: Vec<Codebook>,
    pub floors: Vec<Box<dyn Floor>>,
    pub residues: Vec<Residue>,
    pub mappings: Vec<Mapping>,
    pub modes: Vec<Mode>,
}

/// Returns `true` if `buf` starts with the signature of a header packet of type `packet_type`.
pub fn is_header_packet(buf: &[u8], packet_type: u8) -> bool {
    buf.len() > VORBIS_HEADER_PACKET_SIGNATURE.len()
        && buf[0] == packet_type
        && &buf[1..7] == VORBIS_HEADER_PACKET_SIGNATURE
}

pub fn read_ident_header(buf: &[u8]) -> Result<IdentHeader> {
    if !is_header_packet(buf, VORBIS_PACKET_TYPE_IDENTIFICATION) {
        return decode_error("vorbis: invalid identification header signature");
    }

    let mut bs = BitReader::new(&buf[7..]);

    // The Vorbis version must be 0.
    let version = bs.read_u32();

    if version != VORBIS_VERSION {
        return unsupported_error("vorbis: only vorbis 1 is supported");
    }

    // Next, the number of channels and sample rate must be non-zero.
    let n_channels = bs.read_u8();

    if n_channels == 0 {
        return decode_error("vorbis: number of channels cannot be 0");
    }

    let sample_rate = bs.read_u32();

    if sample_rate == 0 {
        return decode_error("vorbis: sample rate cannot be 0");
    }

    let upper = bs.read_i32();
    let mut nominal = bs.read_i32();
    let lower = bs.read_i32();

    // Without a nominal bitrate, assume the midpoint of the bounds.
    if nominal == 0 && upper > 0 && lower > 0 {
        nominal = ((i64::from(upper) + i64::from(lower)) / 2) as i32;
    }

    let bs0_exp = bs.read_bits_leq32(4) as u8;
    let bs1_exp = bs.read_bits_leq32(4) as u8;

    // The block sizes must not exceed the bounds.
    if bs0_exp < VORBIS_BLOCKSIZE_MIN || bs0_exp > VORBIS_BLOCKSIZE_MAX {
        return decode_error("vorbis: blocksize_0 out-of-bounds");
    }

    if bs1_exp < VORBIS_BLOCKSIZE_MIN || bs1_exp > VORBIS_BLOCKSIZE_MAX {
        return decode_error("vorbis: blocksize_1 out-of-bounds");
    }

    // Blocksize_0 must be <= blocksize_1.
    if bs0_exp > bs1_exp {
        return decode_error("vorbis: blocksize_0 exceeds blocksize_1");
    }

    // Framing flag must be set.
    if !bs.read_bool() || bs.is_short() {
        return decode_error("vorbis: ident header framing flag unset");
    }

    debug!(
        "vorbis: channels={}, sample_rate={}, block_sizes=({}, {}), bitrates={}/{}/{}",
        n_channels,
        sample_rate,
        1u32 << bs0_exp,
        1u32 << bs1_exp,
        upper,
        nominal,
        lower
    );

    Ok(IdentHeader {
        n_channels,
        sample_rate,
        bitrates: Bitrates { upper, nominal, lower },
        bs0_exp,
        bs1_exp,
    })
}

pub fn read_comment_header(buf: &[u8]) -> Result<CommentHeader> {
    if !is_header_packet(buf, VORBIS_PACKET_TYPE_COMMENT) {
        return decode_error("vorbis: invalid comment header signature");
    }

    let mut bs = BitReader::new(&buf[7..]);

    let vendor = read_comment_string(&mut bs)?;

    if bs.bits_left() < 32 {
        return decode_error("vorbis: comment header truncated");
    }

    let count = bs.read_u32();

    // The count is not trusted for an allocation, every comment is at least 4 bytes long.
    let mut comments = Vec::new();

    for _ in 0..count {
        comments.push(read_comment_string(&mut bs)?);
    }

    debug!("vorbis: vendor=\"{}\", {} comment(s)", vendor, comments.len());

    Ok(CommentHeader { vendor, comments })
}

/// Reads a length-prefixed UTF-8 string.
fn read_comment_string(bs: &mut BitReader<'_>) -> Result<String> {
    if bs.bits_left() < 32 {
        return decode_error("vorbis: comment header truncated");
    }

    let len = u64::from(bs.read_u32());

    if len * 8 > bs.bits_left() {
        return decode_error("vorbis: comment length exceeds packet");
    }

    let mut bytes = vec![0; len as usize];
    bs.read_buf_exact(&mut bytes);

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn read_setup(buf: &[u8], ident: &IdentHeader) -> Result<Setup> {
    if !is_header_packet(buf, VORBIS_PACKET_TYPE_SETUP) {
        return decode_error("vorbis: invalid setup header signature");
    }

    // The remaining portion of the setup header packet is read bitwise.
    let mut bs = BitReader::new(&buf[7..]);

    // Read codebooks.
    let codebooks = read_codebooks(&mut bs)?;

    // Read time-domain transforms (placeholders in Vorbis 1).
    read_time_domain_transforms(&mut bs)?;

    // Read floors.
    let floors = read_floors(&mut bs, ident.block_sizes(), &codebooks)?;

    // Read residues.
    let residues = read_residues(&mut bs, &codebooks)?;

    // Read channel mappings.
    let mappings = read_mappings(&mut bs, ident.n_channels, floors.len(), residues.len())?;

    // Read modes.
    let modes = read_modes(&mut bs, mappings.len())?;

    // Framing flag must be set.
    if !bs.read_bool() || bs.is_short() {
        return decode_error("vorbis: setup header framing flag unset");
    }

    if bs.bits_left() >= 8 {
        debug!("vorbis: leftover bits in setup header");
    }

    debug!(
        "vorbis: codebooks={}, floors={}, residues={}, mappings={}, modes={}",
        codebooks.len(),
        floors.len(),
        residues.len(),
        mappings.len(),
        modes.len()
    );

    Ok(Setup { codebooks, floors, residues, mappings, modes })
}

fn read_codebooks(bs: &mut BitReader<'_>) -> Result<Vec<Codebook>> {
    let count = bs.read_bits_leq32(8) + 1;
    (0..count).map(|_| Codebook::read(bs)).collect()
}

fn read_time_domain_transforms(bs: &mut BitReader<'_>) -> Result<()> {
    let count = bs.read_bits_leq32(6) + 1;

    for _ in 0..count {
        // All these values are placeholders and must be 0.
        if bs.read_bits_leq32(16) != 0 {
            return decode_error("vorbis: invalid time domain transform");
        }
    }

    Ok(())
}

fn read_floors(
    bs: &mut BitReader<'_>,
    block_sizes: (usize, usize),
    codebooks: &[Codebook],
) -> Result<Vec<Box<dyn Floor>>> {
    let count = bs.read_bits_leq32(6) + 1;
    (0..count).map(|_| read_floor(bs, block_sizes, codebooks)).collect()
}

fn read_floor(
    bs: &mut BitReader<'_>,
    block_sizes: (usize, usize),
    codebooks: &[Codebook],
) -> Result<Box<dyn Floor>> {
    let floor_type = bs.read_bits_leq32(16);

    match floor_type {
        0 => Floor0::try_read(bs, codebooks, block_sizes),
        1 => Floor1::try_read(bs, codebooks),
        _ => unsupported_error("vorbis: invalid floor type"),
    }
}

fn read_residues(bs: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<Vec<Residue>> {
    let count = bs.read_bits_leq32(6) + 1;
    (0..count).map(|_| read_residue(bs, codebooks)).collect()
}

fn read_residue(bs: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<Residue> {
    let residue_type = bs.read_bits_leq32(16) as u16;

    match residue_type {
        0..=2 => Residue::try_read(bs, residue_type, codebooks),
        _ => unsupported_error("vorbis: invalid residue type"),
    }
}

fn read_mappings(
    bs: &mut BitReader<'_>,
    n_channels: u8,
    num_floors: usize,
    num_residues: usize,
) -> Result<Vec<Mapping>> {
    let count = bs.read_bits_leq32(6) + 1;
    (0..count)
        .map(|_| Mapping::read(bs, usize::from(n_channels), num_floors, num_residues))
        .collect()
}

fn read_modes(bs: &mut BitReader<'_>, num_mappings: usize) -> Result<Vec<Mode>> {
    let count = bs.read_bits_leq32(6) + 1;
    (0..count).map(|_| Mode::read(bs, num_mappings)).collect()
}
