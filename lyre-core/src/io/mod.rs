// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements bit-level reading of fully buffered packets, and the matching
//! [`BitWriter`].
//!
//! Codec packets are always completely buffered before they are decoded, so a [`BitReader`]
//! consumes a `&[u8]` and never blocks. All bit-level reads are derived from the peek and skip
//! primitives of the [`ReadBits`] trait.

mod bit;

pub use bit::*;
