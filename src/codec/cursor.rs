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

//! Position + remaining-capacity cursors over word aligned buffers.

use crate::error::Error;
use crate::error::Result;

/// Bytes occupied by a tag of `len` bytes once padded to a word boundary.
pub fn padded_len(
    len: usize,
) -> usize {
    (len + 3) & !3
}

/// Writes host-endian 32-bit words into a preallocated buffer.
///
/// Never grows the buffer: running out of room is an error.
pub struct WordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WordWriter<'a> {
    pub fn new(
        buf: &'a mut [u8],
    ) -> Self {
        WordWriter { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn reserve(
        &mut self,
        nbytes: usize,
    ) -> Result<&mut [u8]> {
        if nbytes > self.remaining() {
            return Err(Error::CursorOverflow { needed: nbytes, remaining: self.remaining() })
        }
        let start = self.pos;
        self.pos += nbytes;
        Ok(&mut self.buf[start..(start + nbytes)])
    }

    pub fn put_i32(
        &mut self,
        val: i32,
    ) -> Result<()> {
        self.reserve(4)?.copy_from_slice(&val.to_ne_bytes());
        Ok(())
    }

    pub fn put_u32(
        &mut self,
        val: u32,
    ) -> Result<()> {
        self.reserve(4)?.copy_from_slice(&val.to_ne_bytes());
        Ok(())
    }

    pub fn put_bytes(
        &mut self,
        bytes: &[u8],
    ) -> Result<()> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Writes a length word followed by `bytes` zero padded to a word boundary.
    pub fn put_tag(
        &mut self,
        bytes: &[u8],
    ) -> Result<()> {
        let padded = padded_len(bytes.len());
        if 4 + padded > self.remaining() {
            return Err(Error::CursorOverflow { needed: 4 + padded, remaining: self.remaining() })
        }
        self.put_i32(bytes.len() as i32)?;
        let dst = self.reserve(padded)?;
        dst[0..bytes.len()].copy_from_slice(bytes);
        dst[bytes.len()..].fill(0);
        Ok(())
    }
}

/// Reads host-endian 32-bit words from a buffer.
pub struct WordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WordReader<'a> {
    pub fn new(
        buf: &'a [u8],
    ) -> Self {
        WordReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn get_bytes(
        &mut self,
        nbytes: usize,
    ) -> Result<&'a [u8]> {
        if nbytes > self.remaining() {
            return Err(Error::MalformedBuffer(format!(
                "needed {} bytes at offset {} but only {} remain",
                nbytes, self.pos, self.remaining()
            )))
        }
        let start = self.pos;
        self.pos += nbytes;
        Ok(&self.buf[start..(start + nbytes)])
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        let bytes = self.get_bytes(4)?;
        Ok(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.get_bytes(4)?;
        Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a length word and a padded tag, returning the declared bytes.
    ///
    /// A zero length tag is `None`.
    pub fn get_tag(&mut self) -> Result<Option<String>> {
        let len = self.get_i32()?;
        if len < 0 {
            return Err(Error::MalformedBuffer(format!("negative tag length {}", len)))
        }
        if len == 0 {
            return Ok(None)
        }
        let bytes = self.get_bytes(padded_len(len as usize))?;
        Ok(Some(String::from_utf8_lossy(&bytes[0..(len as usize)]).to_string()))
    }
}
