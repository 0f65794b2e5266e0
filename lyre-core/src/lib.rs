// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packets, bit reading, and signal processing shared by the Lyre decoders.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// Allowed in every Lyre crate, see the workspace Cargo.toml.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

pub mod dsp;
pub mod errors;
pub mod io;
pub mod packet;
