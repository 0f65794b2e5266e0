// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lyre_core::errors::{decode_error, unsupported_error, Result};
use lyre_core::io::{BitReader, ReadBits};

use super::common::*;

pub struct ChannelCouple {
    pub magnitude_ch: u8,
    pub angle_ch: u8,
}

pub struct SubMap {
    pub floor: u8,
    pub residue: u8,
    /// The channels multiplexed to this submap.
    pub channels: ChannelSet,
}

pub struct Mapping {
    pub couplings: Vec<ChannelCouple>,
    /// The submap of each channel.
    pub multiplex: Vec<u8>,
    pub submaps: Vec<SubMap>,
}

impl Mapping {
    pub fn read(
        bs: &mut BitReader<'_>,
        audio_channels: usize,
        num_floors: usize,
        num_residues: usize,
    ) -> Result<Mapping> {
        let mapping_type = bs.read_bits_leq32(16);

        match mapping_type {
            0 => read_mapping_type0(bs, audio_channels, num_floors, num_residues),
            _ => unsupported_error("vorbis: invalid mapping type"),
        }
    }
}

fn read_mapping_type0(
    bs: &mut BitReader<'_>,
    audio_channels: usize,
    num_floors: usize,
    num_residues: usize,
) -> Result<Mapping> {
    let num_submaps = if bs.read_bool() { bs.read_bits_leq32(4) as u8 + 1 } else { 1 };

    let mut couplings = Vec::new();

    if bs.read_bool() {
        // Number of channel couplings (up-to 256).
        let coupling_steps = bs.read_bits_leq32(8) as u16 + 1;

        couplings.reserve_exact(usize::from(coupling_steps));

        // The maximum channel number.
        let max_ch = audio_channels - 1;

        // The number of bits to read for the magnitude and angle channel numbers. Never exceeds 8.
        let coupling_bits = ilog(max_ch as u32);

        for _ in 0..coupling_steps {
            let magnitude_ch = bs.read_bits_leq32(coupling_bits) as u8;
            let angle_ch = bs.read_bits_leq32(coupling_bits) as u8;

            // The channels to be coupled must differ and exist.
            if magnitude_ch == angle_ch
                || usize::from(magnitude_ch) > max_ch
                || usize::from(angle_ch) > max_ch
            {
                return decode_error("vorbis: invalid channel coupling");
            }

            couplings.push(ChannelCouple { magnitude_ch, angle_ch });
        }
    }

    if bs.read_bits_leq32(2) != 0 {
        return decode_error("vorbis: reserved mapping bits non-zero");
    }

    // If there is more than 1 submap, the multiplex numbers are coded, otherwise they're all 0.
    let multiplex = if num_submaps > 1 {
        let mut multiplex = Vec::with_capacity(audio_channels);

        for _ in 0..audio_channels {
            let mux = bs.read_bits_leq32(4) as u8;

            if mux >= num_submaps {
                return decode_error("vorbis: invalid channel multiplex");
            }

            multiplex.push(mux);
        }

        multiplex
    }
    else {
        vec![0; audio_channels]
    };

    let mut submaps = Vec::with_capacity(usize::from(num_submaps));

    for submap_idx in 0..num_submaps {
        // Unused time configuration placeholder.
        let _ = bs.read_bits_leq32(8);

        let floor = bs.read_bits_leq32(8) as u8;

        if usize::from(floor) >= num_floors {
            return decode_error("vorbis: invalid floor for mapping");
        }

        let residue = bs.read_bits_leq32(8) as u8;

        if usize::from(residue) >= num_residues {
            return decode_error("vorbis: invalid residue for mapping");
        }

        let mut channels = ChannelSet::default();

        for (ch, _) in multiplex.iter().enumerate().filter(|&(_, &mux)| mux == submap_idx) {
            channels.insert(ch);
        }

        submaps.push(SubMap { floor, residue, channels });
    }

    Ok(Mapping { couplings, multiplex, submaps })
}

pub struct Mode {
    /// `true` if the mode uses long blocks.
    pub block_flag: bool,
    pub mapping: u8,
}

impl Mode {
    pub fn read(bs: &mut BitReader<'_>, num_mappings: usize) -> Result<Mode> {
        let block_flag = bs.read_bool();
        let window_type = bs.read_bits_leq32(16);
        let transform_type = bs.read_bits_leq32(16);
        let mapping = bs.read_bits_leq32(8) as u8;

        // Only window and transform type 0 are allowed in Vorbis 1 (section 4.2.4).
        if window_type != 0 {
            return decode_error("vorbis: invalid window type for mode");
        }

        if transform_type != 0 {
            return decode_error("vorbis: invalid transform type for mode");
        }

        if usize::from(mapping) >= num_mappings {
            return decode_error("vorbis: invalid mode mapping");
        }

        Ok(Mode { block_flag, mapping })
    }
}

/// Recovers a pair of channel samples from a magnitude and angle, as defined in section 4.3.5 of
/// the Vorbis I specification.
///
/// Returns the new magnitude and angle channel samples.
#[inline(always)]
pub fn inverse_couple(m: f32, a: f32) -> (f32, f32) {
    if m > 0.0 {
        if a > 0.0 {
            (m, m - a)
        }
        else {
            (m + a, m)
        }
    }
    else {
        if a > 0.0 {
            (m, m + a)
        }
        else {
            (m - a, m)
        }
    }
}
