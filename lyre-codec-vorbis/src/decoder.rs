// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lyre_core::dsp::mdct::Imdct;
use lyre_core::io::{BitReader, ReadBits};
use lyre_core::packet::Packet;

use log::warn;

use super::common::ilog;
use super::dsp::{BlockGeometry, DspChannel, OverlapBuffer};
use super::header::{IdentHeader, Setup};
use super::mapping::inverse_couple;
use super::residue::ResidueScratch;
use super::window::Windows;

/// How the bits of an audio packet were spent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketBits {
    /// Packet type, mode number, and window flags.
    pub mode: u64,
    pub floor: u64,
    pub residue: u64,
    /// Trailing bits that were not read.
    pub waste: u64,
}

/// The result of decoding one audio packet.
#[derive(Copy, Clone, Debug)]
pub struct DecodedBlock {
    /// The number of frames the block finalized in the output.
    pub frames: usize,
    pub bits: PacketBits,
}

/// Decodes audio packets into an `OverlapBuffer`.
pub struct BlockDecoder {
    bs0: usize,
    bs1: usize,
    setup: Setup,
    /// The width of the mode number field.
    mode_bits: u32,
    windows: Windows,
    imdct_short: Imdct,
    imdct_long: Imdct,
    channels: Vec<DspChannel>,
    scratch: ResidueScratch,
}

impl BlockDecoder {
    pub fn new(ident: &IdentHeader, setup: Setup) -> Self {
        let (bs0, bs1) = ident.block_sizes();

        let channels = (0..ident.n_channels).map(|_| DspChannel::new(bs1)).collect();

        BlockDecoder {
            bs0,
            bs1,
            mode_bits: ilog(setup.modes.len() as u32 - 1),
            setup,
            windows: Windows::new(bs0, bs1),
            imdct_short: Imdct::new(bs0 >> 1),
            imdct_long: Imdct::new(bs1 >> 1),
            channels,
            scratch: Default::default(),
        }
    }

    /// Replaces the setup while keeping the buffers, windows, and transforms, which only depend
    /// on the identification header.
    pub fn replace_setup(&mut self, setup: Setup) {
        self.mode_bits = ilog(setup.modes.len() as u32 - 1);
        self.setup = setup;
    }

    /// Decodes an audio packet and overlap-adds it into `out`.
    ///
    /// Returns `None` if the packet could not be decoded at all. Such a packet should be
    /// discarded.
    pub fn decode(&mut self, packet: &Packet, out: &mut OverlapBuffer) -> Option<DecodedBlock> {
        let mut bs = BitReader::new(packet.buf());

        // Section 4.3.1 - Packet Type, Mode, and Window Decode

        // First bit must be 0 to indicate audio packet.
        if bs.read_bool() {
            warn!("vorbis: discarding non-audio packet {}", packet.index());
            return None;
        }

        let mode_number = bs.read_bits_leq32(self.mode_bits) as usize;

        let mode = match self.setup.modes.get(mode_number) {
            Some(mode) => mode,
            None => {
                warn!("vorbis: invalid mode number in packet {}", packet.index());
                return None;
            }
        };

        let (prev_long, next_long) =
            if mode.block_flag { (bs.read_bool(), bs.read_bool()) } else { (false, false) };

        if bs.is_short() {
            return None;
        }

        let mapping = &self.setup.mappings[usize::from(mode.mapping)];

        let (n, imdct) = if mode.block_flag {
            (self.bs1, &mut self.imdct_long)
        }
        else {
            (self.bs0, &mut self.imdct_short)
        };

        let n2 = n >> 1;

        let mut bits = PacketBits { mode: bs.bits_read(), ..Default::default() };

        // Section 4.3.2 - Floor Curve Decode

        for (&submap_num, ch) in mapping.multiplex.iter().zip(&mut self.channels) {
            let submap = &mapping.submaps[usize::from(submap_num)];
            let floor = &self.setup.floors[usize::from(submap.floor)];

            floor.unpack(&mut bs, &self.setup.codebooks, &mut ch.floor);
        }

        // Section 4.3.3 - Non-zero Vector Propagate

        for couple in &mapping.couplings {
            let magnitude_ch_idx = usize::from(couple.magnitude_ch);
            let angle_ch_idx = usize::from(couple.angle_ch);

            if self.channels[magnitude_ch_idx].floor.is_executed()
                || self.channels[angle_ch_idx].floor.is_executed()
            {
                self.channels[magnitude_ch_idx].floor.force_energy();
                self.channels[angle_ch_idx].floor.force_energy();
            }
        }

        for ch in self.channels.iter_mut() {
            ch.do_not_decode = !ch.floor.is_executed();
            ch.residue[..n2].fill(0.0);
        }

        bits.floor = bs.bits_read() - bits.mode;

        // Section 4.3.4 - Residue Decode

        for submap in &mapping.submaps {
            let residue = &self.setup.residues[usize::from(submap.residue)];

            residue.decode(
                &mut bs,
                n2,
                &self.setup.codebooks,
                &submap.channels,
                &mut self.scratch,
                &mut self.channels,
            );
        }

        bits.residue = bs.bits_read() - bits.mode - bits.floor;
        bits.waste = packet.bit_len().saturating_sub(bs.bits_read());

        // Section 4.3.5 - Inverse Coupling

        // The steps are undone in the reverse order they were applied by the encoder.
        for coupling in mapping.couplings.iter().rev() {
            // Get mutable reference to each channel in the pair.
            let (magnitude_ch, angle_ch) = if coupling.magnitude_ch < coupling.angle_ch {
                // Magnitude channel index < angle channel index.
                let (a, b) = self.channels.split_at_mut(usize::from(coupling.angle_ch));
                (&mut a[usize::from(coupling.magnitude_ch)], &mut b[0])
            }
            else {
                // Angle channel index < magnitude channel index.
                let (a, b) = self.channels.split_at_mut(usize::from(coupling.magnitude_ch));
                (&mut b[0], &mut a[usize::from(coupling.angle_ch)])
            };

            if magnitude_ch.do_not_decode && angle_ch.do_not_decode {
                continue;
            }

            for (m, a) in magnitude_ch.residue[..n2].iter_mut().zip(&mut angle_ch.residue[..n2]) {
                (*m, *a) = inverse_couple(*m, *a);
            }
        }

        // Section 4.3.6 - Dot Product

        for (&submap_num, ch) in mapping.multiplex.iter().zip(&mut self.channels) {
            let submap = &mapping.submaps[usize::from(submap_num)];
            let floor = &self.setup.floors[usize::from(submap.floor)];

            floor.apply(&mut ch.floor, mode.block_flag, &mut ch.residue[..n2]);
        }

        // Combined Section 4.3.7 and 4.3.8 - Inverse MDCT and Overlap-add (Synthesis)

        let window = self.windows.get(mode.block_flag, prev_long, next_long);

        for ch in self.channels.iter_mut() {
            ch.synth(n, window, imdct);
        }

        let geom = BlockGeometry::new(n, self.bs0, mode.block_flag, prev_long, next_long);

        let frames = out.overlap_add(self.channels.iter().map(|ch| &ch.block[..n]), &geom);

        Some(DecodedBlock { frames, bits })
    }

    /// Estimates the number of frames `packet` finalizes when decoded after `prev`.
    ///
    /// Returns 0 if either packet is not an audio packet, or if `packet` follows a discontinuity.
    pub fn packet_length(&self, packet: &Packet, prev: Option<&Packet>) -> u32 {
        let prev = match prev {
            Some(prev) if !packet.is_resync() => prev,
            _ => return 0,
        };

        match (self.block_size(packet.buf()), self.block_size(prev.buf())) {
            (Some(cur_n), Some(prev_n)) => (cur_n / 4 + prev_n / 4) as u32,
            _ => 0,
        }
    }

    /// Gets the block size of an audio packet.
    fn block_size(&self, buf: &[u8]) -> Option<usize> {
        let mut bs = BitReader::new(buf);

        if bs.read_bool() {
            return None;
        }

        let mode_number = bs.read_bits_leq32(self.mode_bits) as usize;

        if bs.is_short() {
            return None;
        }

        self.setup
            .modes
            .get(mode_number)
            .map(|mode| if mode.block_flag { self.bs1 } else { self.bs0 })
    }
}
