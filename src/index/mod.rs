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

//! FM index over a reference sequence collection.
//!
//! [ReferenceIndex] is the owned index built from a FASTA file by
//! [build](build::build_reference_index) or read back from the index files
//! by [files]. [IndexView](view::IndexView) is the borrowed form that the
//! aligner engine works with; it points into an image payload and never
//! copies the large sections.
//!
//! The payload written by [ReferenceIndex::to_payload] is an
//! [IndexHeader](crate::headers::layout::IndexHeader) followed by the
//! sections it describes, each starting on an 8-byte boundary:
//!
//! ```text
//! ann   bincode Vec<ContigAnn>
//! pac   2-bit packed forward strand, 4 bases per byte
//! bwt   one symbol per row, 0..=3 or 4 for the sentinel row
//! occ   little-endian u64 x 4 per checkpoint
//! sa    little-endian u64 per sampled row
//! ```
//!

pub mod build;
pub mod files;
pub mod view;

use bincode::{Encode, Decode};
use bincode::encode_to_vec;

use crate::error::Error;
use crate::error::Result;
use crate::headers::layout::IndexHeader;
use crate::headers::layout::Section;
use crate::headers::layout::INDEX_HEADER_LEN;
use crate::headers::layout::align8;
use crate::headers::layout::encode_index_header;

/// Rows between two occurrence checkpoints.
pub const OCC_INTERVAL: u64 = 128;

/// Rows between two suffix array samples.
pub const SA_INTERVAL: u64 = 32;

/// Symbol stored in the BWT row that holds the sentinel.
pub const SENTINEL: u8 = 4;

/// Above this many bases `auto` picks [Algorithm::Rb2].
pub const RB2_THRESHOLD: u64 = 50_000_000;

/// Suffix array construction algorithm requested for [build_index](crate::build_index).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    Auto,
    Is,
    Rb2,
}

impl Algorithm {
    /// Resolves [Algorithm::Auto] for a reference of `seq_len` bases.
    pub fn resolve(
        self,
        seq_len: u64,
    ) -> Algorithm {
        match self {
            Algorithm::Auto => if seq_len > RB2_THRESHOLD { Algorithm::Rb2 } else { Algorithm::Is },
            other => other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Auto => "auto",
            Algorithm::Is => "is",
            Algorithm::Rb2 => "rb2",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Algorithm::Auto),
            "is" => Ok(Algorithm::Is),
            "rb2" => Ok(Algorithm::Rb2),
            _ => Err(Error::InvalidArgument(format!("'{}' is not a valid index algorithm", s))),
        }
    }
}

/// Annotation of one reference contig.
#[derive(Encode, Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct ContigAnn {
    pub name: String,
    pub comment: String,
    /// Offset of the first base in the concatenated reference.
    pub offset: u64,
    pub len: u64,
    /// Number of bases that were not one of ACGT.
    pub n_ambs: u64,
}

/// Contig table, stored in `.ann`.
#[derive(Encode, Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub seq_len: u64,
    pub contigs: Vec<ContigAnn>,
}

/// Packed forward strand, stored in `.pac`.
#[derive(Encode, Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedSeq {
    pub seq_len: u64,
    pub bytes: Vec<u8>,
}

/// BWT and occurrence checkpoints, stored in `.bwt`.
#[derive(Encode, Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Bwt {
    pub primary: u64,
    /// `counts[c]` is the first row of suffixes starting with `c`, and
    /// `counts[4]` the number of rows.
    pub counts: [u64; 5],
    pub symbols: Vec<u8>,
    pub occ: Vec<u64>,
}

/// Sampled suffix array, stored in `.sa`.
#[derive(Encode, Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct SaSample {
    pub sa_intv: u64,
    pub samples: Vec<u64>,
}

/// Owned FM index of a reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    pub ann: Annotations,
    pub pac: PackedSeq,
    pub bwt: Bwt,
    pub sa: SaSample,
}

/// Base `idx` of a packed sequence.
pub fn packed_base(
    pac: &[u8],
    idx: u64,
) -> u8 {
    (pac[(idx >> 2) as usize] >> ((!idx & 3) << 1)) & 3
}

/// Number of checkpoints needed for a BWT of `n_rows` rows.
pub fn n_checkpoints(
    n_rows: u64,
) -> u64 {
    n_rows / OCC_INTERVAL + 1
}

/// Number of suffix array samples for `n_rows` rows.
pub fn n_samples(
    n_rows: u64,
    sa_intv: u64,
) -> u64 {
    (n_rows - 1) / sa_intv + 1
}

fn u64s_to_le_bytes(
    values: &[u64],
) -> Vec<u8> {
    values.iter().flat_map(|x| x.to_le_bytes()).collect()
}

impl ReferenceIndex {
    pub fn seq_len(&self) -> u64 {
        self.ann.seq_len
    }

    pub fn contigs(&self) -> &[ContigAnn] {
        &self.ann.contigs
    }

    /// Checks that the parts agree with each other.
    pub fn validate(&self) -> Result<()> {
        let seq_len = self.ann.seq_len;
        let n_rows = seq_len + 1;
        if self.pac.seq_len != seq_len {
            return Err(Error::CorruptImage(format!(".pac holds {} bases but .ann {}", self.pac.seq_len, seq_len)))
        }
        if self.pac.bytes.len() as u64 != seq_len.div_ceil(4) {
            return Err(Error::CorruptImage(format!(".pac has {} bytes for {} bases", self.pac.bytes.len(), seq_len)))
        }
        if self.bwt.symbols.len() as u64 != n_rows || self.bwt.counts[4] != n_rows {
            return Err(Error::CorruptImage(format!(".bwt has {} rows but the reference needs {}", self.bwt.symbols.len(), n_rows)))
        }
        if self.bwt.occ.len() as u64 != 4 * n_checkpoints(n_rows) {
            return Err(Error::CorruptImage(format!(".bwt has {} checkpoint values", self.bwt.occ.len())))
        }
        if self.sa.sa_intv == 0 || self.sa.samples.len() as u64 != n_samples(n_rows, self.sa.sa_intv) {
            return Err(Error::CorruptImage(format!(".sa has {} samples at interval {}", self.sa.samples.len(), self.sa.sa_intv)))
        }
        Ok(())
    }

    /// Serializes the index into an image payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let ann_bytes = encode_to_vec(&self.ann.contigs, bincode::config::standard().with_fixed_int_encoding())?;
        let occ_bytes = u64s_to_le_bytes(&self.bwt.occ);
        let sa_bytes = u64s_to_le_bytes(&self.sa.samples);

        let sections: [&[u8]; 5] = [&ann_bytes, &self.pac.bytes, &self.bwt.symbols, &occ_bytes, &sa_bytes];
        let mut layout: Vec<Section> = Vec::with_capacity(sections.len());
        let mut offset = align8(INDEX_HEADER_LEN as u64);
        for bytes in sections.iter() {
            layout.push(Section { offset, len: bytes.len() as u64 });
            offset = align8(offset + bytes.len() as u64);
        }

        let header = IndexHeader {
            seq_len: self.ann.seq_len,
            primary: self.bwt.primary,
            sa_intv: self.sa.sa_intv,
            n_contigs: self.ann.contigs.len() as u64,
            counts: self.bwt.counts,
            ann: layout[0], pac: layout[1], bwt: layout[2], occ: layout[3], sa: layout[4],
        };

        let total = offset as usize;
        let mut payload: Vec<u8> = Vec::new();
        payload.try_reserve_exact(total).map_err(|_| Error::AllocationFailure { bytes: total })?;
        payload.append(&mut encode_index_header(&header)?);
        for (section, bytes) in layout.iter().zip(sections.iter()) {
            payload.resize(section.offset as usize, 0);
            payload.extend_from_slice(bytes);
        }
        payload.resize(total, 0);

        log::debug!("Index payload is {} bytes for {} bases in {} contigs", total, header.seq_len, header.n_contigs);

        Ok(payload)
    }
}
