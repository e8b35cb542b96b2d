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
use std::ops::Range;

use bincode::decode_from_slice;

use crate::error::Error;
use crate::error::Result;
use crate::headers::layout::IndexHeader;
use crate::index::ContigAnn;
use crate::index::OCC_INTERVAL;
use crate::index::SENTINEL;
use crate::index::n_checkpoints;
use crate::index::n_samples;
use crate::index::packed_base;

fn read_u64_le(
    bytes: &[u8],
    idx: usize,
) -> u64 {
    let mut word: [u8; 8] = [0; 8];
    word.copy_from_slice(&bytes[(idx * 8)..(idx * 8 + 8)]);
    u64::from_le_bytes(word)
}

fn check_len(
    name: &str,
    got: usize,
    expected: u64,
) -> Result<()> {
    if got as u64 != expected {
        return Err(Error::CorruptImage(format!("{} section is {} bytes, expected {}", name, got, expected)))
    }
    Ok(())
}

/// Decodes and checks the contig table of a payload.
pub fn decode_contigs(
    header: &IndexHeader,
    payload: &[u8],
) -> Result<Vec<ContigAnn>> {
    let ann = header.ann.slice("ann", payload)?;
    let contigs: Vec<ContigAnn> = decode_from_slice(ann, bincode::config::standard().with_fixed_int_encoding())?.0;

    if contigs.len() as u64 != header.n_contigs {
        return Err(Error::CorruptImage(format!("header lists {} contigs but the table has {}", header.n_contigs, contigs.len())))
    }
    for contig in contigs.iter() {
        match contig.offset.checked_add(contig.len) {
            Some(end) if end <= header.seq_len => (),
            _ => return Err(Error::CorruptImage(format!("contig {} extends past the {} indexed bases", contig.name, header.seq_len))),
        }
    }

    Ok(contigs)
}

/// Borrowed FM index over an image payload.
///
/// Construction checks every section against the header, so the lookups
/// below can index into the sections without further bounds checks.
///
#[derive(Debug, Clone)]
pub struct IndexView<'a> {
    header: IndexHeader,
    contigs: &'a [ContigAnn],
    pac: &'a [u8],
    bwt: &'a [u8],
    occ: &'a [u8],
    sa: &'a [u8],
}

impl<'a> IndexView<'a> {
    pub fn new(
        header: &IndexHeader,
        contigs: &'a [ContigAnn],
        payload: &'a [u8],
    ) -> Result<Self> {
        let seq_len = header.seq_len;
        if seq_len == 0 {
            return Err(Error::CorruptImage("index has no bases".to_string()))
        }
        let n_rows = seq_len + 1;

        let pac = header.pac.slice("pac", payload)?;
        let bwt = header.bwt.slice("bwt", payload)?;
        let occ = header.occ.slice("occ", payload)?;
        let sa = header.sa.slice("sa", payload)?;

        check_len("pac", pac.len(), seq_len.div_ceil(4))?;
        check_len("bwt", bwt.len(), n_rows)?;
        check_len("occ", occ.len(), 32 * n_checkpoints(n_rows))?;
        if header.sa_intv == 0 {
            return Err(Error::CorruptImage("suffix array interval is zero".to_string()))
        }
        check_len("sa", sa.len(), 8 * n_samples(n_rows, header.sa_intv))?;

        if header.primary >= n_rows || bwt[header.primary as usize] != SENTINEL {
            return Err(Error::CorruptImage(format!("primary row {} does not hold the sentinel", header.primary)))
        }
        if header.counts[0] != 1 || header.counts.windows(2).any(|x| x[0] > x[1]) || header.counts[4] != n_rows {
            return Err(Error::CorruptImage(format!("inconsistent symbol counts {:?}", header.counts)))
        }
        if contigs.len() as u64 != header.n_contigs {
            return Err(Error::CorruptImage(format!("header lists {} contigs but {} were given", header.n_contigs, contigs.len())))
        }

        Ok(IndexView { header: header.clone(), contigs, pac, bwt, occ, sa })
    }

    /// Number of indexed bases.
    pub fn seq_len(&self) -> u64 {
        self.header.seq_len
    }

    pub fn contigs(&self) -> &'a [ContigAnn] {
        self.contigs
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Number of `c` in the BWT rows before `row`.
    ///
    /// Checkpoint values are not checked when the view is built. A value that
    /// can't be right for `row` is reported as [Error::CorruptImage].
    pub fn occ(
        &self,
        c: u8,
        row: u64,
    ) -> Result<u64> {
        let n_rows = self.header.seq_len + 1;
        if c >= SENTINEL || row > n_rows {
            return Err(Error::CorruptImage(format!("occurrence lookup of symbol {} at row {} past {} rows", c, row, n_rows)))
        }
        let checkpoint = row / OCC_INTERVAL;
        let from = checkpoint * OCC_INTERVAL;
        let counted = read_u64_le(self.occ, checkpoint as usize * 4 + c as usize);
        if counted > from {
            return Err(Error::CorruptImage(format!("checkpoint {} counts {} symbols in {} rows", checkpoint, counted, from)))
        }
        Ok(counted + self.bwt[(from as usize)..(row as usize)].iter().filter(|x| **x == c).count() as u64)
    }

    /// Rows of the suffixes that start with `pattern`.
    ///
    /// `pattern` holds 0..=3 codes. Any other code matches nothing.
    pub fn backward_search(
        &self,
        pattern: &[u8],
    ) -> Result<Range<u64>> {
        let n_rows = self.header.seq_len + 1;
        let mut lo: u64 = 0;
        let mut hi: u64 = n_rows;
        for c in pattern.iter().rev() {
            if *c >= SENTINEL {
                return Ok(0..0)
            }
            let start = self.header.counts[*c as usize];
            lo = start + self.occ(*c, lo)?;
            hi = start + self.occ(*c, hi)?;
            if hi > n_rows {
                return Err(Error::CorruptImage(format!("search interval ends at row {} past {} rows", hi, n_rows)))
            }
            if lo >= hi {
                return Ok(0..0)
            }
        }
        Ok(lo..hi)
    }

    /// Text position of the suffix in `row`.
    pub fn locate(
        &self,
        row: u64,
    ) -> Result<u64> {
        let n_rows = self.header.seq_len + 1;
        let corrupt = |what: String| Err(Error::CorruptImage(what));

        let mut row = row;
        let mut steps: u64 = 0;
        while row % self.header.sa_intv != 0 {
            if row >= n_rows || steps > self.header.seq_len {
                return corrupt(format!("suffix array walk reached row {} after {} steps", row, steps))
            }
            let c = self.bwt[row as usize];
            if c == SENTINEL {
                return Ok(steps)
            }
            if c > SENTINEL {
                return corrupt(format!("row {} holds invalid symbol {}", row, c))
            }
            row = self.header.counts[c as usize] + self.occ(c, row)?;
            steps += 1;
        }
        if row >= n_rows {
            return corrupt(format!("suffix array walk reached row {} past {} rows", row, n_rows))
        }

        let pos = read_u64_le(self.sa, (row / self.header.sa_intv) as usize).saturating_add(steps);
        if pos > self.header.seq_len {
            return corrupt(format!("suffix array sample points to {} past {} bases", pos, self.header.seq_len))
        }
        Ok(pos)
    }

    /// Base at text position `pos` as a 0..=3 code.
    pub fn base(
        &self,
        pos: u64,
    ) -> u8 {
        packed_base(self.pac, pos)
    }

    /// Bases in `range` as 0..=3 codes, clamped to the text.
    pub fn fetch(
        &self,
        range: Range<u64>,
    ) -> Vec<u8> {
        let end = range.end.min(self.header.seq_len);
        (range.start.min(end)..end).map(|pos| self.base(pos)).collect()
    }

    /// Index of the contig holding text position `pos`.
    pub fn contig_of(
        &self,
        pos: u64,
    ) -> Option<usize> {
        let idx = self.contigs.partition_point(|contig| contig.offset + contig.len <= pos);
        self.contigs.get(idx).filter(|contig| contig.offset <= pos).map(|_| idx)
    }
}
