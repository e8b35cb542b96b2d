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

//! Decoders for the buffers produced by [encoder](crate::encoder).
//!
//! Decoding never reads past the end of a buffer. Truncated or inconsistent
//! input is reported as [Error::MalformedBuffer].
//!

use crate::codec::AlignmentRecord;
use crate::codec::cursor::WordReader;
use crate::codec::record::decode;
use crate::error::Error;
use crate::error::Result;

/// Decodes an alignment batch output buffer.
///
/// Returns the records of each query sequence in input order.
///
pub fn decode_batch(
    bytes: &[u8],
) -> Result<Vec<Vec<AlignmentRecord>>> {
    let mut reader = WordReader::new(bytes);
    let n_seqs = reader.get_u32()? as usize;

    // Every sequence takes at least its count word
    if n_seqs > reader.remaining() / 4 {
        return Err(Error::MalformedBuffer(format!("batch declares {} sequences but only {} bytes follow", n_seqs, reader.remaining())))
    }

    let mut res: Vec<Vec<AlignmentRecord>> = Vec::with_capacity(n_seqs);
    for _ in 0..n_seqs {
        let n_alns = reader.get_u32()? as usize;
        if n_alns > reader.remaining() / 4 {
            return Err(Error::MalformedBuffer(format!("sequence declares {} alignments but only {} bytes follow", n_alns, reader.remaining())))
        }
        let mut alns: Vec<AlignmentRecord> = Vec::with_capacity(n_alns);
        for _ in 0..n_alns {
            alns.push(decode(&mut reader)?);
        }
        res.push(alns);
    }

    if reader.remaining() != 0 {
        return Err(Error::MalformedBuffer(format!("{} trailing bytes after the last sequence", reader.remaining())))
    }

    Ok(res)
}

/// Decodes a contig directory buffer into the contig names.
pub fn decode_contig_directory(
    bytes: &[u8],
) -> Result<Vec<String>> {
    let mut reader = WordReader::new(bytes);
    let n_contigs = reader.get_u32()? as usize;
    if n_contigs > reader.remaining() / 4 {
        return Err(Error::MalformedBuffer(format!("directory declares {} contigs but only {} bytes follow", n_contigs, reader.remaining())))
    }

    let mut names: Vec<String> = Vec::with_capacity(n_contigs);
    for _ in 0..n_contigs {
        let name_len = reader.get_u32()? as usize;
        let name = reader.get_bytes(name_len)?;
        names.push(String::from_utf8_lossy(name).to_string());
    }

    Ok(names)
}

/// Splits an alignment batch input buffer into its sequences.
///
/// The returned slices borrow from `bytes` and do not include the NUL
/// terminators.
///
pub fn parse_sequences(
    bytes: &[u8],
) -> Result<Vec<&[u8]>> {
    let mut reader = WordReader::new(bytes);
    let n_seqs = reader.get_u32()? as usize;

    let mut rest = &bytes[4..];
    if n_seqs > rest.len() {
        return Err(Error::MalformedBuffer(format!("input declares {} sequences but only {} bytes follow", n_seqs, rest.len())))
    }

    let mut seqs: Vec<&[u8]> = Vec::with_capacity(n_seqs);
    for idx in 0..n_seqs {
        let end = rest.iter().position(|x| *x == 0).ok_or_else(|| {
            Error::MalformedBuffer(format!("sequence {} is not NUL-terminated", idx))
        })?;
        seqs.push(&rest[0..end]);
        rest = &rest[(end + 1)..];
    }

    Ok(seqs)
}
