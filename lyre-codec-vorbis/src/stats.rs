// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, VecDeque};

use super::decoder::PacketBits;

/// A snapshot of the decoding statistics of a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// The average bitrate of the decoded audio packets, in bits per second.
    pub effective_bitrate: u32,
    /// The bitrate of the audio packets decoded over roughly the last second.
    pub instant_bitrate: Option<u32>,
    /// The number of pages read, up-to and including the current page.
    pub pages_read: u32,
    pub total_pages: u32,
    /// The number of audio packets decoded.
    pub packets: u64,
    /// The number of frames decoded.
    pub samples: u64,
    /// `true` if any sample was clipped.
    pub clipped: bool,
    /// Bits of container framing.
    pub container_bits: u64,
    pub ident_bits: u64,
    pub comment_bits: u64,
    pub setup_bits: u64,
    /// Bits spent on the packet type, mode number, and window flags of audio packets.
    pub mode_bits: u64,
    pub floor_bits: u64,
    pub residue_bits: u64,
    /// Unread bits at the end of audio packets, and the bits of discarded packets.
    pub waste_bits: u64,
}

/// Collects the statistics of a stream as it is decoded.
#[derive(Default)]
pub struct StatsCollector {
    stats: StreamStats,
    /// The bit length and frame count of the most recent packets.
    history: VecDeque<(u64, u64)>,
    history_samples: u64,
    /// The order each page sequence number was first seen in.
    pages_seen: HashMap<u32, u32>,
    last_page: Option<u32>,
}

impl StatsCollector {
    /// Records the page a packet was read from.
    pub fn add_page(&mut self, sequence: u32) {
        let order = self.pages_seen.len() as u32;
        self.pages_seen.entry(sequence).or_insert(order);
        self.last_page = Some(sequence);
    }

    pub fn add_ident_bits(&mut self, bits: u64) {
        self.stats.ident_bits += bits;
    }

    pub fn add_comment_bits(&mut self, bits: u64) {
        self.stats.comment_bits += bits;
    }

    pub fn add_setup_bits(&mut self, bits: u64) {
        self.stats.setup_bits += bits;
    }

    /// Records an audio packet of `bit_len` bits that finalized `frames` frames.
    pub fn add_packet(&mut self, bit_len: u64, bits: &PacketBits, frames: usize, sample_rate: u32) {
        self.stats.packets += 1;
        self.stats.samples += frames as u64;
        self.stats.mode_bits += bits.mode;
        self.stats.floor_bits += bits.floor;
        self.stats.residue_bits += bits.residue;
        self.stats.waste_bits += bits.waste;

        self.history.push_back((bit_len, frames as u64));
        self.history_samples += frames as u64;

        // Keep about a second of packets.
        while self.history_samples > u64::from(sample_rate) {
            match self.history.pop_front() {
                Some((_, samples)) => self.history_samples -= samples,
                None => break,
            }
        }
    }

    /// Records a packet that was discarded without being decoded.
    pub fn add_discarded(&mut self, bit_len: u64) {
        self.stats.waste_bits += bit_len;
    }

    pub fn set_clipped(&mut self) {
        self.stats.clipped = true;
    }

    pub fn snapshot(&self, sample_rate: u32, total_pages: u32, container_bits: u64) -> StreamStats {
        let mut stats = self.stats.clone();

        let audio_bits = stats.mode_bits + stats.floor_bits + stats.residue_bits + stats.waste_bits;

        if stats.samples > 0 {
            let bitrate = audio_bits * u64::from(sample_rate) / stats.samples;
            stats.effective_bitrate = bitrate.min(u64::from(u32::MAX)) as u32;
        }

        if self.history_samples > 0 {
            let bits: u64 = self.history.iter().map(|&(bits, _)| bits).sum();
            let bitrate = bits * u64::from(sample_rate) / self.history_samples;
            stats.instant_bitrate = Some(bitrate.min(u64::from(u32::MAX)) as u32);
        }

        stats.pages_read =
            self.last_page.and_then(|seq| self.pages_seen.get(&seq)).map_or(0, |&i| i + 1);
        stats.total_pages = total_pages;
        stats.container_bits = container_bits;

        stats
    }

    /// Resets the packet, sample, clipping, and audio bit counters.
    pub fn reset(&mut self) {
        self.stats.packets = 0;
        self.stats.samples = 0;
        self.stats.clipped = false;
        self.stats.mode_bits = 0;
        self.stats.floor_bits = 0;
        self.stats.residue_bits = 0;
        self.stats.waste_bits = 0;
        self.history.clear();
        self.history_samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_bitrates() {
        let mut stats = StatsCollector::default();

        assert_eq!(stats.snapshot(1000, 0, 0).instant_bitrate, None);

        let bits = PacketBits { mode: 2, floor: 40, residue: 50, waste: 8 };

        for _ in 0..20 {
            stats.add_packet(100, &bits, 100, 1000);
        }

        let snapshot = stats.snapshot(1000, 4, 64);

        // 100 bits every 100 frames at 1000 frames per second.
        assert_eq!(snapshot.effective_bitrate, 1000);
        assert_eq!(snapshot.instant_bitrate, Some(1000));
        assert_eq!(snapshot.packets, 20);
        assert_eq!(snapshot.samples, 2000);
        assert_eq!(snapshot.floor_bits, 800);
        assert_eq!(snapshot.total_pages, 4);
        assert_eq!(snapshot.container_bits, 64);

        // The instant bitrate only covers the last second.
        stats.add_packet(1100, &bits, 100, 1000);
        assert_eq!(stats.snapshot(1000, 4, 64).instant_bitrate, Some(2000));

        stats.reset();
        let snapshot = stats.snapshot(1000, 4, 64);
        assert_eq!(snapshot.effective_bitrate, 0);
        assert_eq!(snapshot.instant_bitrate, None);
        assert_eq!(snapshot.packets, 0);
    }

    #[test]
    fn verify_pages_read() {
        let mut stats = StatsCollector::default();

        assert_eq!(stats.snapshot(1000, 0, 0).pages_read, 0);

        stats.add_page(0);
        stats.add_page(1);
        stats.add_page(1);
        stats.add_page(2);
        assert_eq!(stats.snapshot(1000, 0, 0).pages_read, 3);

        // Returning to an earlier page, as after a seek.
        stats.add_page(1);
        assert_eq!(stats.snapshot(1000, 0, 0).pages_read, 2);
    }
}
