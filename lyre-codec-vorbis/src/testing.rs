// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers for writing Vorbis bitstreams in unit tests.

use lyre_core::io::BitWriter;

/// Packs a value into the Vorbis codebook float format. The value must be exactly representable
/// with a 21-bit mantissa.
pub fn float32_pack(value: f32) -> u32 {
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

/// Writes a sparse codebook. A lookup is given as the lookup type and its multiplicands. The
/// multiplicands are 4 bits wide, with a minimum of -1.0 and a delta of 0.5.
pub fn write_codebook(w: &mut BitWriter, dims: u16, lens: &[u8], lookup: Option<(u32, &[u16])>) {
    w.write(0x564342, 24);
    w.write(u64::from(dims), 16);
    w.write(lens.len() as u64, 24);
    // Not length ordered, sparse.
    w.write(0, 1);
    w.write(1, 1);

    for &len in lens {
        if len == 0 {
            w.write(0, 1);
        }
        else {
            w.write(1, 1);
            w.write(u64::from(len - 1), 5);
        }
    }

    match lookup {
        None => w.write(0, 4),
        Some((lookup_type, mults)) => {
            w.write(u64::from(lookup_type), 4);
            w.write(u64::from(float32_pack(-1.0)), 32);
            w.write(u64::from(float32_pack(0.5)), 32);
            w.write(3, 4);
            // Not sequential.
            w.write(0, 1);

            for &m in mults {
                w.write(u64::from(m), 4);
            }
        }
    }
}

/// Builds an identification header. Bitrates are given as upper, nominal, and lower.
pub fn ident_header(channels: u8, rate: u32, bitrates: [i32; 3], bs_exps: (u8, u8)) -> Vec<u8> {
    let mut buf = vec![1];
    buf.extend_from_slice(b"vorbis");
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(channels);
    buf.extend_from_slice(&rate.to_le_bytes());

    for bitrate in bitrates {
        buf.extend_from_slice(&bitrate.to_le_bytes());
    }

    buf.push(bs_exps.0 | (bs_exps.1 << 4));
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

/// Builds a setup header with one Floor1 without partitions, and one empty format 2 residue.
/// Mode 0 uses short blocks, and mode 1 long blocks. With more than one channel, channels 0 and 1
/// are coupled.
pub fn silent_setup_header(channels: u8) -> Vec<u8> {
    let mut w = BitWriter::new();

    for &byte in b"\x05vorbis" {
        w.write(u64::from(byte), 8);
    }

    // Codebooks.
    w.write(0, 8);
    write_codebook(&mut w, 1, &[1, 1], None);

    // Time domain transforms.
    w.write(0, 6);
    w.write(0, 16);

    // Floors.
    w.write(0, 6);
    w.write(1, 16);
    // No partitions, multiplier of 2, and 8 range bits.
    w.write(0, 5);
    w.write(1, 2);
    w.write(8, 4);

    // Residues.
    w.write(0, 6);
    w.write(2, 16);
    w.write(0, 24);
    w.write(0, 24);
    w.write(31, 24);
    w.write(0, 6);
    w.write(0, 8);
    w.write(0, 3);
    w.write(0, 1);

    // Mappings.
    w.write(0, 6);
    w.write(0, 16);
    w.write_bool(false);

    if channels > 1 {
        w.write_bool(true);
        w.write(0, 8);
        let bits = crate::common::ilog(u32::from(channels) - 1);
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

/// Builds an audio packet for a `silent_setup_header` stream in which every floor is unused.
pub fn silent_audio_packet(channels: u8, long: Option<(bool, bool)>) -> Vec<u8> {
    let mut w = BitWriter::new();

    w.write_bool(false);
    w.write_bool(long.is_some());

    if let Some((prev_long, next_long)) = long {
        w.write_bool(prev_long);
        w.write_bool(next_long);
    }

    for _ in 0..channels {
        w.write_bool(false);
    }

    w.into_bytes()
}

#[test]
fn verify_float32_pack() {
    use crate::common::float32_unpack;

    for value in [1.0f32, -1.0, 0.5, 0.0, 3.25, -1024.0, 0.0078125] {
        assert_eq!(float32_unpack(float32_pack(value)), value);
    }
}
