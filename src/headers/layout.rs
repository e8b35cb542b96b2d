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

use crate::error::Error;
use crate::error::Result;

/// Encoded length of [IndexHeader].
pub const INDEX_HEADER_LEN: usize = 152;

/// Byte range of one payload section, relative to the payload start.
#[derive(Encode, Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Section {
    pub offset: u64,
    pub len: u64,
}

impl Section {
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.len)
    }

    /// Borrows the section from `payload`.
    ///
    /// Fails if the section is misaligned or does not fit in `payload`.
    pub fn slice<'a>(
        &self,
        name: &str,
        payload: &'a [u8],
    ) -> Result<&'a [u8]> {
        if self.offset % 8 != 0 {
            return Err(Error::CorruptImage(format!("{} section starts at unaligned offset {}", name, self.offset)));
        }
        match self.end() {
            Some(end) if end <= payload.len() as u64 => {
                Ok(&payload[(self.offset as usize)..(end as usize)])
            },
            _ => Err(Error::CorruptImage(format!(
                "{} section [{}, +{}) is outside the {} byte payload",
                name, self.offset, self.len, payload.len()
            ))),
        }
    }
}

#[derive(Encode, Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexHeader {
    /// Length of the indexed text, without the sentinel.
    pub seq_len: u64,
    /// Row of the BWT that holds the sentinel.
    pub primary: u64,
    pub sa_intv: u64,
    pub n_contigs: u64,
    /// Number of text symbols smaller than each of A, C, G, T, plus the total.
    pub counts: [u64; 5],

    pub ann: Section,
    pub pac: Section,
    pub bwt: Section,
    pub occ: Section,
    pub sa: Section,
}

/// Rounds `len` up to the next multiple of 8.
pub fn align8(
    len: u64,
) -> u64 {
    (len + 7) & !7
}

pub fn encode_index_header(
    header: &IndexHeader,
) -> Result<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::with_capacity(INDEX_HEADER_LEN);
    let nbytes = encode_into_std_write(
        header,
        &mut bytes,
        bincode::config::standard().with_fixed_int_encoding(),
    )?;
    assert_eq!(nbytes, INDEX_HEADER_LEN);
    Ok(bytes)
}

pub fn decode_index_header(
    header_bytes: &[u8],
) -> Result<IndexHeader> {
    if header_bytes.len() < INDEX_HEADER_LEN {
        return Err(Error::CorruptImage(format!(
            "payload of {} bytes can't hold the {} byte index header",
            header_bytes.len(), INDEX_HEADER_LEN
        )));
    }
    Ok(decode_from_slice(&header_bytes[0..INDEX_HEADER_LEN], bincode::config::standard().with_fixed_int_encoding())?.0)
}

#[cfg(test)]
mod tests {

    #[test]
    fn encode_index_header() {
        use super::IndexHeader;
        use super::Section;
        use super::encode_index_header;
        use super::decode_index_header;
        use super::INDEX_HEADER_LEN;

        let header = IndexHeader {
            seq_len: 10, primary: 3, sa_intv: 32, n_contigs: 1,
            counts: [1, 4, 6, 8, 11],
            ann: Section { offset: 152, len: 20 },
            pac: Section { offset: 176, len: 3 },
            bwt: Section { offset: 184, len: 11 },
            occ: Section { offset: 200, len: 32 },
            sa: Section { offset: 232, len: 8 },
        };

        let got = encode_index_header(&header).unwrap();

        assert_eq!(got.len(), INDEX_HEADER_LEN);
        assert_eq!(got[0..8], [10, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(got[72..88], [152, 0, 0, 0, 0, 0, 0, 0, 20, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_index_header(&got).unwrap(), header);
    }

    #[test]
    fn decode_index_header_too_short() {
        use super::decode_index_header;
        use crate::error::Error;

        let got = decode_index_header(&[0_u8; 100]);

        assert!(matches!(got, Err(Error::CorruptImage(_))));
    }

    #[test]
    fn section_slice_bounds() {
        use super::Section;
        use crate::error::Error;

        let payload = vec![7_u8; 64];

        assert_eq!(Section { offset: 8, len: 4 }.slice("pac", &payload).unwrap(), &[7, 7, 7, 7]);
        assert!(matches!(Section { offset: 60, len: 8 }.slice("pac", &payload), Err(Error::CorruptImage(_))));
        assert!(matches!(Section { offset: 4, len: 4 }.slice("pac", &payload), Err(Error::CorruptImage(_))));
        assert!(matches!(Section { offset: 8, len: u64::MAX }.slice("pac", &payload), Err(Error::CorruptImage(_))));
    }

    #[test]
    fn align8() {
        use super::align8;

        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(153), 160);
    }
}
