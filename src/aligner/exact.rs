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

//! Seed-and-extend aligner for exact-seed, ungapped hits.
//!
//! A seed of `min_seed_len` bases from the start of the query (or of its
//! reverse complement) is searched in the FM index. Every occurrence is
//! extended without gaps over the whole query and scored with the match score
//! and mismatch penalty of [MemOptions]. Hits scoring below `t` are dropped.
//! The best hit is reported with the others as XA alternatives.
//!

use std::cmp::Ordering;

use crate::aligner::AlignerEngine;
use crate::aligner::MemOptions;
use crate::aligner::PairEndStats;
use crate::aligner::PairOrientation;
use crate::codec::Alignment;
use crate::codec::CIGAR_MATCH;
use crate::codec::FLAG_MATE_REVERSE;
use crate::codec::FLAG_MATE_UNMAPPED;
use crate::codec::FLAG_PAIRED;
use crate::codec::FLAG_PROPER_PAIR;
use crate::codec::FLAG_READ1;
use crate::codec::FLAG_READ2;
use crate::codec::FLAG_REVERSE;
use crate::codec::cigar_word;
use crate::error::Error;
use crate::error::Result;
use crate::index::build::nt4;
use crate::index::view::IndexView;

/// Highest mapping quality.
pub const MAX_MAPQ: u8 = 60;

const BASES: &[u8; 5] = b"ACGTN";

/// Ungapped hit of a whole query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Hit {
    rid: usize,
    /// 0-based position in the contig.
    pos: u64,
    is_rev: bool,
    score: i32,
    nm: i32,
    md: String,
}

fn reverse_complement(
    query: &[u8],
) -> Vec<u8> {
    query.iter().rev().map(|c| if *c < 4 { 3 - c } else { 4 }).collect()
}

/// Compares `query` with the reference from text position `start`.
///
/// Returns the score, the number of mismatches and the MD string.
fn extend(
    index: &IndexView,
    opts: &MemOptions,
    query: &[u8],
    start: u64,
) -> (i32, i32, String) {
    let mut score = 0;
    let mut nm = 0;
    let mut md = String::new();
    let mut run = 0;
    for (offset, q) in query.iter().enumerate() {
        let r = index.base(start + offset as u64);
        if *q == r {
            score += opts.a;
            run += 1;
        } else {
            score -= opts.b;
            nm += 1;
            md.push_str(&run.to_string());
            md.push(BASES[r as usize] as char);
            run = 0;
        }
    }
    md.push_str(&run.to_string());
    (score, nm, md)
}

/// All hits of `query` on both strands, best first.
fn find_hits(
    index: &IndexView,
    opts: &MemOptions,
    query: &[u8],
) -> Result<Vec<Hit>> {
    let seed_len = opts.min_seed_len as usize;
    if query.len() < seed_len {
        return Ok(Vec::new())
    }

    let mut hits: Vec<Hit> = Vec::new();
    for is_rev in [false, true] {
        let oriented = if is_rev { reverse_complement(query) } else { query.to_vec() };
        let rows = index.backward_search(&oriented[0..seed_len])?;
        if rows.end - rows.start > opts.max_occ as u64 {
            log::debug!("Skipping seed with {} occurrences", rows.end - rows.start);
            continue;
        }

        for row in rows {
            let start = index.locate(row)?;
            let Some(rid) = index.contig_of(start) else { continue };
            let contig = &index.contigs()[rid];
            if start + query.len() as u64 > contig.offset + contig.len {
                continue;
            }

            let (score, nm, md) = extend(index, opts, &oriented, start);
            if score < opts.t {
                continue;
            }
            hits.push(Hit { rid, pos: start - contig.offset, is_rev, score, nm, md });
        }
    }

    hits.sort_by(|a, b| match b.score.cmp(&a.score) {
        Ordering::Equal => (a.rid, a.pos, a.is_rev).cmp(&(b.rid, b.pos, b.is_rev)),
        other => other,
    });
    Ok(hits)
}

fn mapq(
    best: i32,
    sub: Option<i32>,
) -> u8 {
    match sub {
        None => MAX_MAPQ,
        Some(sub) => ((best - sub) * 6).clamp(0, MAX_MAPQ as i32) as u8,
    }
}

fn format_xa(
    index: &IndexView,
    alternatives: &[Hit],
    query_len: usize,
) -> String {
    alternatives.iter().map(|hit| {
        format!("{},{}{},{}M,{};", index.contigs()[hit.rid].name, if hit.is_rev { '-' } else { '+' }, hit.pos + 1, query_len, hit.nm)
    }).collect()
}

/// Primary alignment of one query, or an unmapped record.
fn best_alignment(
    index: &IndexView,
    opts: &MemOptions,
    seq: &[u8],
) -> Result<Alignment> {
    let query: Vec<u8> = seq.iter().map(|x| nt4(*x)).collect();
    let hits = find_hits(index, opts, &query)?;
    let Some(best) = hits.first() else { return Ok(Alignment::unmapped()) };

    let sub = hits.get(1).map(|hit| hit.score);
    let alternatives = &hits[1..];
    let xa = if !alternatives.is_empty() && alternatives.len() <= opts.max_xa_hits as usize {
        Some(format_xa(index, alternatives, query.len()))
    } else {
        None
    };

    Ok(Alignment {
        flag: if best.is_rev { FLAG_REVERSE } else { 0 },
        rid: best.rid as i32,
        pos: best.pos as i64,
        is_rev: best.is_rev,
        mapq: mapq(best.score, sub),
        nm: best.nm,
        score: best.score,
        sub: sub.unwrap_or(0),
        cigar: vec![cigar_word(query.len() as u32, CIGAR_MATCH)],
        md: best.md.clone(),
        xa,
    })
}

/// Orientation and insert size of two mapped reads on the same contig.
pub fn insert_size(
    a: &Alignment,
    b: &Alignment,
) -> Option<(PairOrientation, i64)> {
    if !a.is_mapped() || !b.is_mapped() || a.rid != b.rid {
        return None
    }
    let (left, right) = if a.pos <= b.pos { (a, b) } else { (b, a) };
    let orientation = match (left.is_rev, right.is_rev) {
        (false, false) => PairOrientation::FF,
        (false, true) => PairOrientation::FR,
        (true, false) => PairOrientation::RF,
        (true, true) => PairOrientation::RR,
    };
    let end = (left.pos + left.ref_len()).max(right.pos + right.ref_len());
    Some((orientation, end - left.pos))
}

fn is_proper_pair(
    read1: &Alignment,
    read2: &Alignment,
    opts: &MemOptions,
    pestat: Option<&[PairEndStats; 4]>,
) -> bool {
    match insert_size(read1, read2) {
        Some((PairOrientation::FR, isize)) => match pestat {
            Some(stats) => stats[PairOrientation::FR.index()].contains(isize),
            None => isize <= opts.max_ins as i64,
        },
        _ => false,
    }
}

fn mate_flags(
    mate: &Alignment,
) -> u32 {
    if !mate.is_mapped() {
        FLAG_MATE_UNMAPPED
    } else if mate.is_rev {
        FLAG_MATE_REVERSE
    } else {
        0
    }
}

/// Sets the pair flags of two primary alignments.
pub fn pair_flags(
    read1: &mut Alignment,
    read2: &mut Alignment,
    opts: &MemOptions,
    pestat: Option<&[PairEndStats; 4]>,
) {
    read1.flag |= FLAG_PAIRED | FLAG_READ1;
    read2.flag |= FLAG_PAIRED | FLAG_READ2;

    if is_proper_pair(read1, read2, opts, pestat) {
        read1.flag |= FLAG_PROPER_PAIR;
        read2.flag |= FLAG_PROPER_PAIR;
    }

    let read1_mate = mate_flags(read2);
    let read2_mate = mate_flags(read1);
    read1.flag |= read1_mate;
    read2.flag |= read2_mate;
}

/// Reports the best ungapped hit of each query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSeedAligner;

impl AlignerEngine for ExactSeedAligner {
    fn align(
        &self,
        index: &IndexView,
        opts: &MemOptions,
        pestat: Option<&[PairEndStats; 4]>,
        seqs: &[&[u8]],
    ) -> Result<Vec<Vec<Alignment>>> {
        let mut res: Vec<Vec<Alignment>> = Vec::new();
        res.try_reserve_exact(seqs.len()).map_err(|_| Error::AllocationFailure {
            bytes: seqs.len().saturating_mul(std::mem::size_of::<Vec<Alignment>>()),
        })?;

        if opts.is_paired() {
            if seqs.len() % 2 != 0 {
                return Err(Error::InvalidArgument(format!("paired mode needs an even number of sequences, got {}", seqs.len())))
            }
            for pair in seqs.chunks(2) {
                let mut read1 = best_alignment(index, opts, pair[0])?;
                let mut read2 = best_alignment(index, opts, pair[1])?;
                pair_flags(&mut read1, &mut read2, opts, pestat);
                res.push(vec![read1]);
                res.push(vec![read2]);
            }
        } else {
            for seq in seqs {
                res.push(vec![best_alignment(index, opts, seq)?]);
            }
        }

        Ok(res)
    }
}
