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
use bincode::{Encode, Decode};
use bincode::encode_into_std_write;
use bincode::decode_from_slice;

use crate::error::Result;

/// Encoded length of [ImageFooter].
pub const FOOTER_LEN: usize = 64;

/// Width of the producer version field.
pub const VERSION_LEN: usize = 40;

/// Magic bytes at the very end of a valid image.
pub const IMAGE_MAGIC: [u8; 7] = *b"BWAINDX";

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ImageFooter {
    pub image_len: u64,
    pub checksum: u64,
    pub producer_version: [u8; VERSION_LEN],
    pub pad_len: u8,
    pub magic: [u8; 7],
}

impl ImageFooter {
    pub fn new(
        payload_len: u64,
        checksum: u64,
        producer_version: [u8; VERSION_LEN],
    ) -> Self {
        let pad_len = padding_len(payload_len);
        ImageFooter {
            image_len: payload_len + pad_len as u64 + FOOTER_LEN as u64,
            checksum,
            producer_version,
            pad_len,
            magic: IMAGE_MAGIC,
        }
    }

    /// Length of the payload region described by this footer.
    ///
    /// Saturates at zero when `image_len` is too small to hold the footer and
    /// the padding, which only happens for corrupt input.
    pub fn payload_len(&self) -> u64 {
        self.image_len.saturating_sub(FOOTER_LEN as u64 + self.pad_len as u64)
    }

    pub fn version(&self) -> String {
        version_string(&self.producer_version)
    }
}

/// Number of padding bytes that bring `payload_len` to a multiple of 8.
pub fn padding_len(
    payload_len: u64,
) -> u8 {
    ((8 - payload_len % 8) % 8) as u8
}

/// Zero padded fixed-width version identifier.
pub fn version_bytes(
    version: &str,
) -> [u8; VERSION_LEN] {
    let mut bytes = [0_u8; VERSION_LEN];
    let n = version.len().min(VERSION_LEN);
    bytes[0..n].copy_from_slice(&version.as_bytes()[0..n]);
    bytes
}

pub fn version_string(
    bytes: &[u8; VERSION_LEN],
) -> String {
    let end = bytes.iter().position(|x| *x == 0).unwrap_or(VERSION_LEN);
    String::from_utf8_lossy(&bytes[0..end]).to_string()
}

pub fn encode_footer(
    footer: &ImageFooter,
) -> Result<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::with_capacity(FOOTER_LEN);
    let nbytes = encode_into_std_write(
        footer,
        &mut bytes,
        bincode::config::standard().with_fixed_int_encoding(),
    )?;
    assert_eq!(nbytes, FOOTER_LEN);
    Ok(bytes)
}

pub fn decode_footer(
    footer_bytes: &[u8],
) -> Result<ImageFooter> {
    Ok(decode_from_slice(footer_bytes, bincode::config::standard().with_fixed_int_encoding())?.0)
}
