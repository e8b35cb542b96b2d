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
use crate::encoder::reserve_buffer;
use crate::error::Error;
use crate::error::Result;

/// Bytes of a directory holding names of the given lengths.
fn directory_len<I: IntoIterator<Item = usize>>(
    name_lens: I,
) -> Result<usize> {
    name_lens.into_iter().try_fold(4_usize, |acc, len| {
        acc.checked_add(4)?.checked_add(len)
    }).ok_or(Error::AllocationFailure { bytes: usize::MAX })
}

/// Encodes the contig directory buffer.
///
/// The buffer is a `u32` count followed by `(name_len: u32, name bytes)` for
/// each contig. Names are not padded or terminated.
///
/// ## Usage
/// ```rust
/// use bwaimg::encoder::directory::encode_contig_directory;
///
/// let bytes = encode_contig_directory(&["chr1", "chrM"]).unwrap();
///
/// let mut expected: Vec<u8> = Vec::new();
/// expected.extend_from_slice(&2_u32.to_ne_bytes());
/// expected.extend_from_slice(&4_u32.to_ne_bytes());
/// expected.extend_from_slice(b"chr1");
/// expected.extend_from_slice(&4_u32.to_ne_bytes());
/// expected.extend_from_slice(b"chrM");
///
/// assert_eq!(bytes, expected);
/// ```
///
pub fn encode_contig_directory<S: AsRef<str>>(
    names: &[S],
) -> Result<Vec<u8>> {
    let nbytes = directory_len(names.iter().map(|name| name.as_ref().len()))?;
    let mut out = reserve_buffer(nbytes)?;

    out.extend_from_slice(&(names.len() as u32).to_ne_bytes());
    for name in names {
        let name = name.as_ref().as_bytes();
        out.extend_from_slice(&(name.len() as u32).to_ne_bytes());
        out.extend_from_slice(name);
    }
    assert_eq!(out.len(), nbytes);

    Ok(out)
}
