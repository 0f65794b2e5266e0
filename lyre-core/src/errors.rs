// Lyre
// Copyright (c) 2019-2026 The Project Lyre Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Errors shared by packet providers and decoders.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// Why a seek could not be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekErrorKind {
    /// The packet provider cannot seek.
    Unseekable,
    /// No packet contains the requested granule position.
    OutOfRange,
}

impl fmt::Display for SeekErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekErrorKind::Unseekable => f.write_str("packet provider cannot seek"),
            SeekErrorKind::OutOfRange => f.write_str("granule position is past the stream end"),
        }
    }
}

/// The error type of Lyre.
#[derive(Debug)]
pub enum Error {
    /// The packet provider failed to read or seek the underlying stream.
    IoError(io::Error),
    /// A header or packet is malformed.
    DecodeError(&'static str),
    /// A seek failed.
    SeekError(SeekErrorKind),
    /// The stream uses a version or feature that is not supported.
    Unsupported(&'static str),
    /// The stream asked for more resources than the decoder allows.
    LimitError(&'static str),
    /// The stream parameters changed. The change must be acknowledged before reading on.
    ResetRequired,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "io error: {}", err),
            Error::DecodeError(msg) => write!(f, "malformed stream: {}", msg),
            Error::SeekError(kind) => write!(f, "seek error: {}", kind),
            Error::Unsupported(what) => write!(f, "unsupported: {}", what),
            Error::LimitError(what) => write!(f, "limit exceeded: {}", what),
            Error::ResetRequired => f.write_str("stream parameters changed"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Returns a `DecodeError`.
pub fn decode_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DecodeError(msg))
}

/// Returns a `SeekError`.
pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(Error::SeekError(kind))
}

/// Returns an `Unsupported` error.
pub fn unsupported_error<T>(what: &'static str) -> Result<T> {
    Err(Error::Unsupported(what))
}

/// Returns a `LimitError`.
pub fn limit_error<T>(what: &'static str) -> Result<T> {
    Err(Error::LimitError(what))
}

/// Returns `ResetRequired`.
pub fn reset_error<T>() -> Result<T> {
    Err(Error::ResetRequired)
}
