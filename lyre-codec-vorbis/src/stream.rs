// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lyre_core::errors::{decode_error, reset_error, seek_error, unsupported_error};
use lyre_core::errors::{Result, SeekErrorKind};
use lyre_core::packet::{Packet, PacketProvider};

use log::{debug, info, warn};

use super::decoder::BlockDecoder;
use super::dsp::OverlapBuffer;
use super::header::*;
use super::stats::{StatsCollector, StreamStats};

/// The largest magnitude of a clipped sample.
const CLIP_MAX: f32 = 0.99999994;

/// The maximum number of packets awaiting a granule position after a resync.
const MAX_RESYNC_PACKETS: usize = 256;

/// The maximum number of frames decoded at once while seeking.
const SEEK_CHUNK_FRAMES: usize = 4096;

/// `DecoderOptions` is a common set of options that the stream decoder uses.
#[derive(Copy, Clone, Debug)]
pub struct DecoderOptions {
    /// Clamp decoded samples to the range `[-0.99999994, 0.99999994]`.
    ///
    /// Default: `true`
    pub clip_samples: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { clip_samples: true }
    }
}

/// A packet decoded after a resync, before its granule position was known.
struct PendingPacket {
    index: u64,
    /// The number of frames finalized since the resync, up-to and including this packet.
    end: u64,
}

struct Resync {
    pending: VecDeque<PendingPacket>,
    /// The number of frames finalized since the resync.
    frames: u64,
}

struct Inner<P> {
    provider: P,
    options: DecoderOptions,
    ident: IdentHeader,
    comment: CommentHeader,
    decoder: BlockDecoder,
    output: OverlapBuffer,
    /// Samples that were finalized but unread when the decoder was last reset.
    saved: Vec<f32>,
    saved_pos: usize,
    saved_channels: usize,
    /// The granule position following the last finalized frame. Provisional while resyncing.
    current: u64,
    resync: Option<Resync>,
    /// The index of the first audio packet following the initial headers.
    first_audio_packet: u64,
    /// The index of the first packet of a new header set, if signalled by the provider.
    pending_change: Option<u64>,
    is_parameter_change: bool,
    is_eos: bool,
    stats: StatsCollector,
}

/// A Vorbis logical stream decoder.
///
/// `VorbisStream` pulls packets from a [`PacketProvider`] and decodes them into interleaved
/// 32-bit float samples. Reading and seeking are serialized by an internal lock, therefore the
/// stream may be shared between threads.
pub struct VorbisStream<P: PacketProvider> {
    inner: Mutex<Inner<P>>,
}

impl<P: PacketProvider> VorbisStream<P> {
    /// Opens a stream by reading its identification, comment, and setup headers.
    pub fn try_new(mut provider: P, options: DecoderOptions) -> Result<Self> {
        let mut stats = StatsCollector::default();

        let packet = next_header_packet(&mut provider, &mut stats)?;

        if !is_header_packet(packet.buf(), VORBIS_PACKET_TYPE_IDENTIFICATION) {
            return unsupported_error("vorbis: not a vorbis stream");
        }

        let ident = read_ident_header(packet.buf())?;
        stats.add_ident_bits(packet.bit_len());

        let packet = next_header_packet(&mut provider, &mut stats)?;
        let comment = read_comment_header(packet.buf())?;
        stats.add_comment_bits(packet.bit_len());

        let packet = next_header_packet(&mut provider, &mut stats)?;
        let setup = read_setup(packet.buf(), &ident)?;
        stats.add_setup_bits(packet.bit_len());

        // Any signal so far belongs to the headers just read.
        let _ = provider.take_parameter_change();

        let decoder = BlockDecoder::new(&ident, setup);
        let output = new_output(&ident);

        let inner = Inner {
            provider,
            options,
            saved_channels: usize::from(ident.n_channels),
            ident,
            comment,
            decoder,
            output,
            saved: Vec::new(),
            saved_pos: 0,
            current: 0,
            resync: None,
            first_audio_packet: packet.index() + 1,
            pending_change: None,
            is_parameter_change: false,
            is_eos: false,
            stats,
        };

        Ok(VorbisStream { inner: Mutex::new(inner) })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channels(&self) -> usize {
        usize::from(self.lock().ident.n_channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().ident.sample_rate
    }

    /// Gets the short and long block sizes.
    pub fn block_sizes(&self) -> (usize, usize) {
        self.lock().ident.block_sizes()
    }

    pub fn bitrates(&self) -> Bitrates {
        self.lock().ident.bitrates
    }

    pub fn vendor(&self) -> String {
        self.lock().comment.vendor.clone()
    }

    /// Gets the user comments, each nominally in `KEY=value` form.
    pub fn comments(&self) -> Vec<String> {
        self.lock().comment.comments.clone()
    }

    pub fn can_seek(&self) -> bool {
        self.lock().provider.can_seek()
    }

    /// Gets the granule position of the next frame `read_samples` returns.
    pub fn position(&self) -> u64 {
        self.lock().position()
    }

    /// Gets the granule position of the last frame of the stream.
    pub fn last_granule_position(&self) -> Result<u64> {
        self.lock().provider.granule_count()
    }

    /// Gets the playback time of the next frame `read_samples` returns.
    pub fn position_duration(&self) -> Duration {
        let inner = self.lock();
        frames_to_duration(inner.position(), inner.ident.sample_rate)
    }

    /// Gets the playback time of the whole stream.
    pub fn total_duration(&self) -> Result<Duration> {
        let mut inner = self.lock();
        let frames = inner.provider.granule_count()?;
        Ok(frames_to_duration(frames, inner.ident.sample_rate))
    }

    /// Returns `true` if the stream parameters changed and the change has not been acknowledged.
    pub fn is_parameter_change(&self) -> bool {
        self.lock().is_parameter_change
    }

    /// Acknowledges a parameter change.
    pub fn clear_parameter_change(&self) {
        self.lock().is_parameter_change = false;
    }

    pub fn stats(&self) -> Result<StreamStats> {
        let mut inner = self.lock();

        let total_pages = inner.provider.total_page_count()?;
        let container_bits = inner.provider.container_bits();

        Ok(inner.stats.snapshot(inner.ident.sample_rate, total_pages, container_bits))
    }

    pub fn reset_stats(&self) {
        self.lock().stats.reset();
    }

    /// Reads interleaved samples into `buf`. Only whole frames are read.
    ///
    /// Returns the number of samples read. Fewer samples than requested are only returned at the
    /// end of the stream, or when the stream parameters change. While a parameter change is
    /// unacknowledged, `ResetRequired` is returned once all samples decoded before the change
    /// have been read.
    pub fn read_samples(&self, buf: &mut [f32]) -> Result<usize> {
        self.lock().read(buf)
    }

    /// Seeks such that the next frame read is at `granule_pos`.
    pub fn seek_to(&self, granule_pos: u64) -> Result<()> {
        self.lock().seek(granule_pos)
    }

    /// Consumes the stream and returns the packet provider.
    pub fn into_inner(self) -> P {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner).provider
    }
}

/// Converts a number of frames into a duration. The sample rate must be non-zero.
fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    let rate = u64::from(sample_rate);

    // The remainder is less than the sample rate, so the product fits in 64 bits.
    let nanos = (frames % rate) * 1_000_000_000 / rate;

    Duration::new(frames / rate, nanos as u32)
}

fn new_output(ident: &IdentHeader) -> OverlapBuffer {
    let (_, bs1) = ident.block_sizes();
    OverlapBuffer::new(usize::from(ident.n_channels), 2 * bs1)
}

fn next_header_packet<P: PacketProvider>(
    provider: &mut P,
    stats: &mut StatsCollector,
) -> Result<Packet> {
    match provider.next_packet()? {
        Some(packet) => {
            stats.add_page(packet.page_sequence());
            Ok(packet)
        }
        None => decode_error("vorbis: missing header packet"),
    }
}

impl<P: PacketProvider> Inner<P> {
    fn channels(&self) -> usize {
        usize::from(self.ident.n_channels)
    }

    fn saved_frames(&self) -> usize {
        (self.saved.len() - self.saved_pos) / self.saved_channels
    }

    fn position(&self) -> u64 {
        let unread = (self.output.prepared() + self.saved_frames()) as u64;
        self.current.saturating_sub(unread)
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut written = self.read_saved(buf);

        if written == 0 && self.is_parameter_change {
            return reset_error();
        }

        loop {
            let wanted = (buf.len() - written) / self.channels();

            if self.output.prepared() >= wanted || self.is_eos || self.is_parameter_change {
                break;
            }

            self.decode_next_packet()?;

            // A reset moves unread samples aside. They precede anything decoded after it.
            written += self.read_saved(&mut buf[written..]);
        }

        let len = self.output.read(&mut buf[written..]);
        self.clip(&mut buf[written..written + len]);

        Ok(written + len)
    }

    fn read_saved(&mut self, buf: &mut [f32]) -> usize {
        let len = buf.len() / self.saved_channels * self.saved_channels;
        let len = len.min(self.saved.len() - self.saved_pos);

        if len == 0 {
            return 0;
        }

        buf[..len].copy_from_slice(&self.saved[self.saved_pos..self.saved_pos + len]);
        self.clip(&mut buf[..len]);

        self.saved_pos += len;

        if self.saved_pos == self.saved.len() {
            self.saved.clear();
            self.saved_pos = 0;
        }

        len
    }

    fn clip(&mut self, samples: &mut [f32]) {
        if !self.options.clip_samples {
            return;
        }

        let mut clipped = false;

        for s in samples.iter_mut() {
            if *s > CLIP_MAX {
                *s = CLIP_MAX;
                clipped = true;
            }
            else if *s < -CLIP_MAX {
                *s = -CLIP_MAX;
                clipped = true;
            }
        }

        if clipped {
            self.stats.set_clipped();
        }
    }

    fn decode_next_packet(&mut self) -> Result<()> {
        let packet = match self.provider.next_packet()? {
            Some(packet) => packet,
            None => {
                self.is_eos = true;
                return Ok(());
            }
        };

        if let Some(index) = self.provider.take_parameter_change() {
            self.pending_change = Some(index);
        }

        self.stats.add_page(packet.page_sequence());

        if packet.is_resync() {
            debug!("vorbis: resync at packet {}", packet.index());
            self.reset();

            // The position is unknown until a packet with a known granule position is decoded.
            self.resync = Some(Resync { pending: VecDeque::new(), frames: 0 });
        }

        if self.pending_change == Some(packet.index()) {
            self.pending_change = None;
            self.is_parameter_change = true;
            return self.change_parameters(packet);
        }

        let block = match self.decoder.decode(&packet, &mut self.output) {
            Some(block) => block,
            None => {
                self.stats.add_discarded(packet.bit_len());
                return Ok(());
            }
        };

        self.stats.add_packet(packet.bit_len(), &block.bits, block.frames, self.ident.sample_rate);

        self.update_position(&packet, block.frames as u64)
    }

    /// Returns `true` if `packet` is the last packet of the stream.
    fn is_last_packet(&mut self, packet: &Packet) -> Result<bool> {
        if !packet.is_end_of_stream() {
            return Ok(false);
        }

        let next = self.provider.peek_next_packet()?;

        Ok(next.map_or(true, |next| next.page_sequence() != packet.page_sequence()))
    }

    fn update_position(&mut self, packet: &Packet, frames: u64) -> Result<()> {
        self.current += frames;

        // While resyncing, the last packet of the stream ends at the granule position of its
        // page.
        let resolved_pos = match packet.granule_pos() {
            None if self.resync.is_some() && self.is_last_packet(packet)? => {
                Some(packet.page_granule_pos())
            }
            granule_pos => granule_pos,
        };

        match self.resync.as_mut() {
            Some(resync) => {
                resync.frames += frames;

                if let Some(granule_pos) = resolved_pos {
                    let base = granule_pos.saturating_sub(resync.frames);

                    for pending in resync.pending.drain(..) {
                        self.provider.set_granule_pos(pending.index, base + pending.end);
                    }

                    if packet.granule_pos().is_none() {
                        self.provider.set_granule_pos(packet.index(), granule_pos);
                    }

                    debug!("vorbis: resolved granule position {} after resync", granule_pos);

                    self.current = granule_pos;
                    self.resync = None;
                }
                else {
                    if resync.pending.len() >= MAX_RESYNC_PACKETS {
                        warn!("vorbis: too many packets without a granule position after resync");
                        resync.pending.pop_front();
                    }

                    let end = resync.frames;
                    resync.pending.push_back(PendingPacket { index: packet.index(), end });
                    return Ok(());
                }
            }
            None => {
                if packet.granule_pos().is_none() {
                    self.provider.set_granule_pos(packet.index(), self.current);
                }
            }
        }

        // The last page may end before the last block, discard the surplus.
        if packet.is_end_of_stream() && self.current > packet.page_granule_pos() {
            let surplus = self.current - packet.page_granule_pos();
            let trimmed = surplus.min(self.output.prepared() as u64);

            self.output.trim_prepared(trimmed as usize);
            self.current -= trimmed;
            self.is_eos = true;
        }

        Ok(())
    }

    /// Moves the unread samples aside, and clears the output.
    fn reset(&mut self) {
        if self.output.prepared() > 0 {
            if self.saved.is_empty() {
                self.saved_channels = self.channels();
            }

            self.output.drain_prepared(&mut self.saved);
        }

        self.output.clear();
    }

    fn change_parameters(&mut self, mut packet: Packet) -> Result<()> {
        info!("vorbis: stream parameters changed at packet {}", packet.index());

        let mut ident = None;

        if is_header_packet(packet.buf(), VORBIS_PACKET_TYPE_IDENTIFICATION) {
            ident = Some(read_ident_header(packet.buf())?);
            self.stats.add_ident_bits(packet.bit_len());

            packet = next_header_packet(&mut self.provider, &mut self.stats)?;
        }

        if is_header_packet(packet.buf(), VORBIS_PACKET_TYPE_COMMENT) {
            self.comment = read_comment_header(packet.buf())?;
            self.stats.add_comment_bits(packet.bit_len());

            packet = next_header_packet(&mut self.provider, &mut self.stats)?;
        }

        let setup = read_setup(packet.buf(), ident.as_ref().unwrap_or(&self.ident))?;
        self.stats.add_setup_bits(packet.bit_len());

        self.reset();

        match ident {
            Some(ident) => {
                // A new identification header requires new buffers.
                self.decoder = BlockDecoder::new(&ident, setup);
                self.output = new_output(&ident);
                self.ident = ident;
            }
            None => self.decoder.replace_setup(setup),
        }

        Ok(())
    }

    fn set_position(&mut self, granule_pos: u64) {
        self.output.clear();
        self.saved.clear();
        self.saved_pos = 0;
        self.current = granule_pos;
        self.resync = None;
        self.is_eos = false;
    }

    fn seek(&mut self, granule_pos: u64) -> Result<()> {
        if !self.provider.can_seek() {
            return seek_error(SeekErrorKind::Unseekable);
        }

        let Inner { provider, decoder, .. } = &mut *self;

        let target = if granule_pos > 0 {
            let mut packet_length = |packet: &Packet, prev: Option<&Packet>| {
                decoder.packet_length(packet, prev)
            };

            match provider.find_packet(granule_pos, &mut packet_length)? {
                Some(packet) => Some(packet),
                None => return seek_error(SeekErrorKind::OutOfRange),
            }
        }
        else {
            None
        };

        let position = match target {
            Some(packet) if packet.index() > self.first_audio_packet => {
                // Decoding starts one packet early since the first block after a reset does not
                // finalize any frames.
                self.provider.seek_to_packet(&packet, 1)?;

                match self.provider.peek_next_packet()?.and_then(|prev| prev.granule_pos()) {
                    Some(prev_granule_pos) => prev_granule_pos,
                    None => return seek_error(SeekErrorKind::OutOfRange),
                }
            }
            _ => {
                let first = match self.provider.get_packet(self.first_audio_packet)? {
                    Some(first) => first,
                    None => return seek_error(SeekErrorKind::OutOfRange),
                };

                self.provider.seek_to_packet(&first, 0)?;
                0
            }
        };

        debug!("vorbis: seeking to {}, decoding from {}", granule_pos, position);

        self.set_position(position);

        // Decode and discard frames up-to the requested position.
        let channels = self.channels();
        let mut remaining = granule_pos.saturating_sub(position) as usize;
        let mut scratch = vec![0.0; remaining.min(SEEK_CHUNK_FRAMES) * channels];

        while remaining > 0 {
            let frames = remaining.min(SEEK_CHUNK_FRAMES);
            let read = self.read(&mut scratch[..frames * channels])? / channels;

            if read == 0 {
                break;
            }

            remaining -= read;
        }

        Ok(())
    }
}
