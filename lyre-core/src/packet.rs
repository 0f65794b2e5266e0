// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `packet` module defines the compressed packet model and the interface to the container
//! demuxer that supplies packets.

use bitflags::bitflags;

use crate::errors::Result;

bitflags! {
    /// Container-level conditions attached to a `Packet`.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct PacketFlags: u8 {
        /// The packet follows a discontinuity in the container. Any state carried over from the
        /// previous packet is invalid.
        const RESYNC        = 1 << 0;
        /// The packet is on the last page of the logical stream.
        const END_OF_STREAM = 1 << 1;
    }
}

/// A `Packet` contains one compressed unit of a logical stream, and the page metadata the
/// container associated with it.
#[derive(Clone, Debug)]
pub struct Packet {
    index: u64,
    page_sequence: u32,
    page_granule_pos: u64,
    granule_pos: Option<u64>,
    flags: PacketFlags,
    data: Box<[u8]>,
}

impl Packet {
    /// Create a new `Packet` from a slice.
    pub fn new_from_slice(index: u64, buf: &[u8]) -> Self {
        Packet::new_from_boxed_slice(index, Box::from(buf))
    }

    /// Create a new `Packet` from a boxed slice.
    pub fn new_from_boxed_slice(index: u64, data: Box<[u8]>) -> Self {
        Packet {
            index,
            page_sequence: 0,
            page_granule_pos: 0,
            granule_pos: None,
            flags: PacketFlags::empty(),
            data,
        }
    }

    /// Sets the sequence number and the granule position of the page the packet ended on.
    pub fn with_page(mut self, sequence: u32, granule_pos: u64) -> Self {
        self.page_sequence = sequence;
        self.page_granule_pos = granule_pos;
        self
    }

    /// Sets the granule position of the last sample of the packet, if it is known.
    pub fn with_granule_pos(mut self, granule_pos: u64) -> Self {
        self.granule_pos = Some(granule_pos);
        self
    }

    /// Sets the packet flags.
    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The index of the packet within the logical stream. The first header packet has index 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The sequence number of the page the packet ended on.
    pub fn page_sequence(&self) -> u32 {
        self.page_sequence
    }

    /// The granule position of the page the packet ended on.
    pub fn page_granule_pos(&self) -> u64 {
        self.page_granule_pos
    }

    /// The granule position of the last sample of the packet, if known.
    pub fn granule_pos(&self) -> Option<u64> {
        self.granule_pos
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    /// Returns `true` if the packet follows a discontinuity.
    pub fn is_resync(&self) -> bool {
        self.flags.contains(PacketFlags::RESYNC)
    }

    /// Returns `true` if the packet is at the end of the logical stream.
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(PacketFlags::END_OF_STREAM)
    }

    /// Get an immutable slice to the packet buffer.
    pub fn buf(&self) -> &[u8] {
        &self.data
    }

    /// The length of the packet in bits.
    pub fn bit_len(&self) -> u64 {
        (self.data.len() as u64) << 3
    }
}

/// A `PacketProvider` supplies the ordered packets of one logical stream.
///
/// The provider is the boundary to the container demuxer. How packets are read from their
/// source, and any blocking that involves, is up to the implementation.
pub trait PacketProvider {
    /// Returns `true` if the provider can seek.
    fn can_seek(&self) -> bool;

    /// Get the next packet and advance. Returns `None` at the end of the stream.
    fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Get the next packet without advancing.
    fn peek_next_packet(&mut self) -> Result<Option<&Packet>>;

    /// Get the packet with the given index without changing the read position.
    fn get_packet(&mut self, index: u64) -> Result<Option<Packet>>;

    /// Find the packet containing the sample at `granule_pos`.
    ///
    /// `packet_length` estimates the number of samples a packet contributes given the packet and
    /// its predecessor, if any.
    fn find_packet(
        &mut self,
        granule_pos: u64,
        packet_length: &mut dyn FnMut(&Packet, Option<&Packet>) -> u32,
    ) -> Result<Option<Packet>>;

    /// Reposition the provider such that the next packet returned is `preroll` packets before
    /// `packet`.
    fn seek_to_packet(&mut self, packet: &Packet, preroll: u64) -> Result<()>;

    /// Gets the granule position of the last sample in the logical stream.
    fn granule_count(&mut self) -> Result<u64>;

    /// Gets the total number of pages in the logical stream.
    fn total_page_count(&mut self) -> Result<u32>;

    /// Gets the number of container framing bits read so far.
    fn container_bits(&self) -> u64 {
        0
    }

    /// If the provider encountered a new set of codec headers mid-stream, returns the index of the
    /// first packet of that set. The signal is cleared once taken.
    fn take_parameter_change(&mut self) -> Option<u64> {
        None
    }

    /// Records the granule position of a packet whose position was resolved by the decoder after
    /// a resync.
    fn set_granule_pos(&mut self, _index: u64, _granule_pos: u64) {}
}
