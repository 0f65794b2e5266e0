// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// Allowed in every Lyre crate, see the workspace Cargo.toml.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]
// Inverse coupling keeps the sign cases of the decoding procedure apart.
#![allow(clippy::collapsible_else_if)]

//! A pure Rust Vorbis decoder.
//!
//! [`VorbisStream`] decodes the packets of one Vorbis logical stream, supplied by a
//! [`PacketProvider`](lyre_core::packet::PacketProvider), into interleaved `f32` samples.

mod codebook;
mod common;
mod decoder;
mod dsp;
mod floor;
mod header;
mod mapping;
mod residue;
mod stats;
mod stream;
mod window;

#[cfg(test)]
mod testing;

pub use header::Bitrates;
pub use stats::StreamStats;
pub use stream::{DecoderOptions, VorbisStream};
