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

//! Flat, 32-bit word oriented encoding of alignment records.
//!
//! An encoded record is a sequence of host-endian `i32` words:
//!
//! ```text
//! flag_mapq                    flag << 16 | mapq
//! -- present if flag & 0x4 == 0 --
//! ref_id, pos, NM, AS, XS
//! n_cigar, cigar[n_cigar]      len << 4 | op, op in MIDNSH
//! n_md, md bytes               padded to a multiple of 4
//! n_xa, xa bytes               padded to a multiple of 4
//! -- present if flag & 0x9 == 1 --
//! mate_ref_id, mate_pos, tlen
//! ```
//!
//! [measure](record::measure) and [encode](record::encode) decide field
//! presence with the same predicates so the measured size is always the size
//! that gets written.
//!

pub mod cursor;
pub mod record;

/// SAM flag bits set by the aligner engine.
pub const FLAG_PAIRED: u32 = 0x1;
pub const FLAG_PROPER_PAIR: u32 = 0x2;
pub const FLAG_UNMAPPED: u32 = 0x4;
pub const FLAG_MATE_UNMAPPED: u32 = 0x8;
pub const FLAG_REVERSE: u32 = 0x10;
pub const FLAG_MATE_REVERSE: u32 = 0x20;
pub const FLAG_READ1: u32 = 0x40;
pub const FLAG_READ2: u32 = 0x80;
pub const FLAG_SECONDARY: u32 = 0x100;
/// Supplementary alignment that should be reported as secondary.
pub const FLAG_SUPPLEMENTARY_AS_SECONDARY: u32 = 0x10000;

/// Internal CIGAR operations, in the MIDSH order of the aligner engine.
pub const CIGAR_MATCH: u32 = 0;
pub const CIGAR_DEL: u32 = 2;

/// Symbols of the encoded CIGAR operations.
pub const CIGAR_SYMBOLS: &[u8; 6] = b"MIDNSH";

/// One alignment of a query, as produced by the aligner engine.
///
/// CIGAR words use the internal 5 symbol vocabulary (MIDSH). They are
/// translated to MIDNSH when encoded.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Alignment {
    /// SAM flag, may carry [FLAG_SUPPLEMENTARY_AS_SECONDARY].
    pub flag: u32,
    /// Reference contig index.
    pub rid: i32,
    /// 0-based leftmost reference position.
    pub pos: i64,
    pub is_rev: bool,
    pub mapq: u8,
    /// Number of mismatches and gaps.
    pub nm: i32,
    pub score: i32,
    /// Sub-optimal score.
    pub sub: i32,
    /// `len << 4 | op` words.
    pub cigar: Vec<u32>,
    pub md: String,
    /// Alternative hits.
    pub xa: Option<String>,
}

impl Alignment {
    /// An alignment that only says the query did not map.
    pub fn unmapped() -> Self {
        Alignment { flag: FLAG_UNMAPPED, rid: -1, pos: -1, ..Default::default() }
    }

    pub fn is_mapped(&self) -> bool {
        self.flag & FLAG_UNMAPPED == 0
    }

    /// Number of reference bases covered by the CIGAR.
    pub fn ref_len(&self) -> i64 {
        cigar_ref_len(&self.cigar)
    }
}

/// A decoded alignment record.
///
/// Positions are 0-based, starts inclusive and ends exclusive. Reference
/// fields are -1 for unmapped records and mate fields are -1 unless the record
/// is paired with a mapped mate.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub sam_flag: u32,
    pub ref_id: i32,
    pub ref_start: i32,
    pub ref_end: i32,
    pub seq_start: i32,
    pub seq_end: i32,
    pub map_qual: i32,
    pub n_mismatches: i32,
    pub aligner_score: i32,
    pub suboptimal_score: i32,
    pub cigar: String,
    pub md_tag: Option<String>,
    pub xa_tag: Option<String>,
    pub mate_ref_id: i32,
    pub mate_ref_start: i32,
    pub template_len: i32,
}

pub fn cigar_word(
    len: u32,
    op: u32,
) -> u32 {
    len << 4 | op
}

/// Translates an internal CIGAR word to the encoded MIDNSH vocabulary.
pub fn external_cigar_word(
    word: u32,
) -> u32 {
    if word & 0xf > CIGAR_DEL { word + 1 } else { word }
}

/// Reference length of an internal CIGAR.
pub fn cigar_ref_len(
    cigar: &[u32],
) -> i64 {
    cigar.iter().filter_map(|word| {
        let op = word & 0xf;
        if op == CIGAR_MATCH || op == CIGAR_DEL { Some((word >> 4) as i64) } else { None }
    }).sum()
}

#[cfg(test)]
mod tests {

    #[test]
    fn external_cigar_word() {
        use super::cigar_word;
        use super::external_cigar_word;

        assert_eq!(external_cigar_word(cigar_word(10, 0)), 160);
        assert_eq!(external_cigar_word(cigar_word(2, 1)), 33);
        assert_eq!(external_cigar_word(cigar_word(3, 2)), 50);
        // soft clip becomes S=4, hard clip becomes H=5
        assert_eq!(external_cigar_word(cigar_word(5, 3)), 84);
        assert_eq!(external_cigar_word(cigar_word(5, 4)), 85);
    }

    #[test]
    fn cigar_ref_len() {
        use super::cigar_ref_len;
        use super::cigar_word;

        let cigar = vec![cigar_word(3, 3), cigar_word(10, 0), cigar_word(2, 1), cigar_word(4, 2), cigar_word(6, 0)];

        assert_eq!(cigar_ref_len(&cigar), 20);
        assert_eq!(cigar_ref_len(&[]), 0);
    }
}
