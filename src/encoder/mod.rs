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

//! Encoders for the buffers that cross the byte-buffer boundary.
//!
//! All encoders compute the exact size of their output before writing a
//! single byte and either return the complete buffer or an error. A partially
//! written buffer is never returned.
//!
//! The alignment batch output buffer is laid out as
//!
//! ```text
//! count: u32
//! count x (n_alignments: u32, n_alignments x record)
//! ```
//!
//! with records encoded by [record::encode](crate::codec::record::encode).
//!

pub mod directory;

use crate::codec::Alignment;
use crate::codec::cursor::WordWriter;
use crate::codec::record::encode;
use crate::codec::record::measure;
use crate::error::Error;
use crate::error::Result;

/// Empty buffer with space for exactly `nbytes` bytes.
///
/// Returns [Error::AllocationFailure] instead of aborting when the space
/// cannot be obtained.
///
pub fn reserve_buffer(
    nbytes: usize,
) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    out.try_reserve_exact(nbytes).map_err(|_| Error::AllocationFailure { bytes: nbytes })?;
    Ok(out)
}

/// Allocates a zeroed buffer of exactly `nbytes` bytes.
pub fn alloc_buffer(
    nbytes: usize,
) -> Result<Vec<u8>> {
    let mut out = reserve_buffer(nbytes)?;
    out.resize(nbytes, 0);
    Ok(out)
}

/// Bytes of a batch given the record sizes in words of each sequence.
fn batch_len<S, R>(
    record_words: S,
) -> Result<usize>
where
    S: IntoIterator<Item = R>,
    R: IntoIterator<Item = usize>,
{
    let n_words = record_words.into_iter().try_fold(1_usize, |acc, seq| {
        let seq_words = seq.into_iter().try_fold(1_usize, |acc, n| acc.checked_add(n))?;
        acc.checked_add(seq_words)
    });
    n_words.and_then(|n| n.checked_mul(4)).ok_or(Error::AllocationFailure { bytes: usize::MAX })
}

/// Number of bytes [encode_batch] will write for `alns`.
pub fn measure_batch(
    alns: &[Vec<Alignment>],
) -> Result<usize> {
    batch_len(alns.iter().map(|seq_alns| seq_alns.iter().map(measure)))
}

/// Encodes the alignments of a batch of query sequences.
///
/// `alns` holds the alignments of each sequence in input order and is
/// consumed. Sequences without alignments are encoded as a zero count.
///
/// In `paired` mode sequences `2i` and `2i + 1` are mates, and each record
/// gets the first (primary) alignment of the other read as its mate. An odd
/// number of sequences is an error.
///
/// ## Usage
/// ```rust
/// use bwaimg::codec::Alignment;
/// use bwaimg::encoder::encode_batch;
///
/// let alns = vec![vec![Alignment::unmapped()], Vec::new()];
/// let bytes = encode_batch(alns, false).unwrap();
///
/// let mut expected: Vec<u8> = Vec::new();
/// expected.extend_from_slice(&2_u32.to_ne_bytes());
/// expected.extend_from_slice(&1_u32.to_ne_bytes());
/// expected.extend_from_slice(&(4_i32 << 16).to_ne_bytes());
/// expected.extend_from_slice(&0_u32.to_ne_bytes());
///
/// assert_eq!(bytes, expected);
/// ```
///
pub fn encode_batch(
    alns: Vec<Vec<Alignment>>,
    paired: bool,
) -> Result<Vec<u8>> {
    if paired && alns.len() % 2 != 0 {
        return Err(Error::InvalidArgument(format!("paired mode needs an even number of sequences, got {}", alns.len())))
    }

    let nbytes = measure_batch(&alns)?;
    log::debug!("Encoding {} sequences into {} bytes", alns.len(), nbytes);

    let mut out = alloc_buffer(nbytes)?;
    {
        let mut writer = WordWriter::new(&mut out);
        writer.put_u32(alns.len() as u32)?;
        for (idx, seq_alns) in alns.iter().enumerate() {
            let mate = if paired { alns[idx ^ 1].first() } else { None };
            writer.put_u32(seq_alns.len() as u32)?;
            for aln in seq_alns.iter() {
                encode(aln, mate, &mut writer)?;
            }
        }
        debug_assert_eq!(writer.remaining(), 0);
    }

    Ok(out)
}

/// Builds the alignment batch input buffer.
///
/// The buffer is a `u32` count followed by each sequence as a NUL-terminated
/// string. Sequences must not contain NUL bytes.
///
pub fn encode_sequences(
    seqs: &[&[u8]],
) -> Result<Vec<u8>> {
    let mut nbytes: usize = 4;
    for (idx, seq) in seqs.iter().enumerate() {
        if seq.contains(&0) {
            return Err(Error::InvalidArgument(format!("sequence {} contains a NUL byte", idx)))
        }
        nbytes += seq.len() + 1;
    }

    let mut out = reserve_buffer(nbytes)?;
    out.extend_from_slice(&(seqs.len() as u32).to_ne_bytes());
    for seq in seqs {
        out.extend_from_slice(seq);
        out.push(0);
    }

    Ok(out)
}
