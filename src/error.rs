// bwaimg: Versioned, checksummed BWA index images and alignment record encoding.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! Error type shared by every operation in the crate.
//!
//! Each public operation returns either its value or exactly one [Error]
//! variant. Nothing is retried internally.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Opening, reading, writing, mapping or closing a file failed.
    Io {
        context: String,
        source: std::io::Error,
    },

    /// The image was written by a different build and the caller did not
    /// ask to ignore the version.
    VersionMismatch {
        image: String,
        current: String,
    },

    /// Wrong magic, wrong size, bad checksum or an inconsistent payload.
    CorruptImage(String),

    /// Space for an output buffer could not be obtained.
    AllocationFailure {
        bytes: usize,
    },

    /// Unknown algorithm name, unreadable input, invalid options, ...
    InvalidArgument(String),

    /// A batch or directory buffer is truncated or inconsistent.
    MalformedBuffer(String),

    /// An encode tried to write past the measured size.
    CursorOverflow {
        needed: usize,
        remaining: usize,
    },
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io { context: context.into(), source }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { context, source } => write!(f, "{}: {}", context, source),
            Error::VersionMismatch { image, current } => write!(
                f,
                "image was produced by version '{}' but this is version '{}'",
                image, current
            ),
            Error::CorruptImage(msg) => write!(f, "corrupt index image: {}", msg),
            Error::AllocationFailure { bytes } => {
                write!(f, "can't allocate {} bytes for the output buffer", bytes)
            }
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::MalformedBuffer(msg) => write!(f, "malformed buffer: {}", msg),
            Error::CursorOverflow { needed, remaining } => write!(
                f,
                "encoded record needs {} more bytes but only {} remain",
                needed, remaining
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io { context: "I/O error".to_string(), source: error }
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(error: bincode::error::EncodeError) -> Self {
        match error {
            bincode::error::EncodeError::Io { inner, .. } => Error::io("bincode encoding failed", inner),
            error => Error::InvalidArgument(format!("bincode encoding failed: {}", error)),
        }
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(error: bincode::error::DecodeError) -> Self {
        Error::CorruptImage(format!("bincode decoding failed: {}", error))
    }
}
