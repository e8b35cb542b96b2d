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

//! Aligner options, paired-end statistics and the aligner engine seam.
//!
//! [Aligner] bundles an open [ImageHandle] with the options of one alignment
//! configuration. It runs an [AlignerEngine] over a batch of query sequences
//! and encodes the result with [encode_batch].
//!

pub mod exact;

use bincode::{Encode, Decode};
use bincode::decode_from_slice;
use bincode::encode_to_vec;

use crate::codec::Alignment;
use crate::codec::AlignmentRecord;
use crate::decoder::decode_batch;
use crate::decoder::parse_sequences;
use crate::encoder::encode_batch;
use crate::error::Error;
use crate::error::Result;
use crate::image::ImageHandle;
use crate::index::view::IndexView;

pub use exact::ExactSeedAligner;

/// Treat consecutive sequences as the two reads of a pair.
pub const MEM_F_PE: i32 = 0x2;
pub const MEM_F_NOPAIRING: i32 = 0x4;
pub const MEM_F_ALL: i32 = 0x8;
pub const MEM_F_NO_MULTI: i32 = 0x10;
pub const MEM_F_NO_RESCUE: i32 = 0x20;
pub const MEM_F_REF_HDR: i32 = 0x100;
pub const MEM_F_SOFTCLIP: i32 = 0x200;
pub const MEM_F_SMARTPE: i32 = 0x400;
pub const MEM_F_PRIMARY5: i32 = 0x800;

/// Option block of the aligner engine.
///
/// Defaults are those of `bwa mem`.
///
#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub struct MemOptions {
    /// Match score.
    pub a: i32,
    /// Mismatch penalty.
    pub b: i32,
    pub o_del: i32,
    pub e_del: i32,
    pub o_ins: i32,
    pub e_ins: i32,
    pub pen_unpaired: i32,
    pub pen_clip5: i32,
    pub pen_clip3: i32,
    /// Band width.
    pub w: i32,
    pub zdrop: i32,
    pub max_mem_intv: u64,
    /// Minimum score of a reported alignment.
    pub t: i32,
    /// `MEM_F_*` bits.
    pub flag: i32,
    pub min_seed_len: i32,
    pub min_chain_weight: i32,
    pub max_chain_extend: i32,
    pub split_factor: f32,
    pub split_width: i32,
    /// Seeds with more occurrences are skipped.
    pub max_occ: i32,
    pub max_chain_gap: i32,
    pub n_threads: i32,
    pub chunk_size: i32,
    pub mask_level: f32,
    pub drop_ratio: f32,
    pub xa_drop_ratio: f32,
    pub mask_level_redun: f32,
    pub mapq_coef_len: f32,
    pub mapq_coef_fac: i32,
    /// Longest insert of a proper pair when no pair statistics are given.
    pub max_ins: i32,
    pub max_matesw: i32,
    /// XA is omitted when a query has more alternative hits than this.
    pub max_xa_hits: i32,
    pub max_xa_hits_alt: i32,
}

impl Default for MemOptions {
    fn default() -> Self {
        MemOptions {
            a: 1, b: 4,
            o_del: 6, e_del: 1, o_ins: 6, e_ins: 1,
            pen_unpaired: 17, pen_clip5: 5, pen_clip3: 5,
            w: 100, zdrop: 100,
            max_mem_intv: 20,
            t: 30,
            flag: 0,
            min_seed_len: 19,
            min_chain_weight: 0,
            max_chain_extend: 1 << 30,
            split_factor: 1.5,
            split_width: 10,
            max_occ: 500,
            max_chain_gap: 10000,
            n_threads: 1,
            chunk_size: 10_000_000,
            mask_level: 0.50,
            drop_ratio: 0.50,
            xa_drop_ratio: 0.80,
            mask_level_redun: 0.95,
            mapq_coef_len: 50.0,
            mapq_coef_fac: 50.0_f32.ln() as i32,
            max_ins: 10000,
            max_matesw: 50,
            max_xa_hits: 5,
            max_xa_hits_alt: 200,
        }
    }
}

impl MemOptions {
    pub fn is_paired(&self) -> bool {
        self.flag & MEM_F_PE != 0
    }

    /// Rejects option values the engine can't work with.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        if self.a < 1 {
            errors.push(format!("match score must be >= 1, got {}", self.a));
        }
        if self.b < 1 {
            errors.push(format!("mismatch penalty must be >= 1, got {}", self.b));
        }
        if self.min_seed_len < 1 {
            errors.push(format!("min_seed_len must be >= 1, got {}", self.min_seed_len));
        }
        if self.max_occ < 1 {
            errors.push(format!("max_occ must be >= 1, got {}", self.max_occ));
        }
        if self.t < 0 {
            errors.push(format!("score threshold must be >= 0, got {}", self.t));
        }
        if self.max_xa_hits < 0 {
            errors.push(format!("max_xa_hits must be >= 0, got {}", self.max_xa_hits));
        }
        if self.max_ins < 0 {
            errors.push(format!("max_ins must be >= 0, got {}", self.max_ins));
        }
        if !(0.0..=1.0).contains(&self.xa_drop_ratio) {
            errors.push(format!("xa_drop_ratio must be in [0, 1], got {}", self.xa_drop_ratio));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(errors.join("; ")))
        }
    }

    /// Serializes the options for the byte-buffer boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(encode_to_vec(self, bincode::config::standard().with_fixed_int_encoding())?)
    }

    pub fn from_bytes(
        bytes: &[u8],
    ) -> Result<Self> {
        let (opts, nbytes): (MemOptions, usize) = decode_from_slice(bytes, bincode::config::standard().with_fixed_int_encoding())
            .map_err(|e| Error::InvalidArgument(format!("can't decode aligner options: {}", e)))?;
        if nbytes != bytes.len() {
            return Err(Error::InvalidArgument(format!("{} trailing bytes after the aligner options", bytes.len() - nbytes)))
        }
        Ok(opts)
    }
}

/// Relative orientation of the two reads of a pair, in leftmost-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOrientation {
    FF = 0,
    FR = 1,
    RF = 2,
    RR = 3,
}

impl PairOrientation {
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Number of standard deviations between the average and the bounds.
pub const PAIR_BOUNDS_SIGMA: f64 = 4.0;

/// Standard deviation assumed when only an average is known.
pub const DEFAULT_STD_TO_AVERAGE_RATIO: f64 = 0.1;

/// Insert size distribution of one pair orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairEndStats {
    /// Inclusive bounds of the insert size of a proper pair.
    pub low: i32,
    pub high: i32,
    /// Not enough data to support this orientation.
    pub failed: bool,
    pub average: f64,
    pub std: f64,
}

impl Default for PairEndStats {
    fn default() -> Self {
        PairEndStats::failed()
    }
}

fn check_average(
    average: f64,
) -> Result<()> {
    if !average.is_finite() || average <= 0.0 {
        return Err(Error::InvalidArgument(format!("invalid insert size average {}", average)))
    }
    Ok(())
}

fn check_std(
    std: f64,
) -> Result<()> {
    if !std.is_finite() {
        return Err(Error::InvalidArgument(format!("invalid insert size standard deviation {}", std)))
    }
    Ok(())
}

fn sigma_bound(
    x: f64,
) -> i32 {
    (x.round() as i32).max(1)
}

impl PairEndStats {
    /// Stats with bounds four standard deviations around `average`.
    pub fn new(
        average: f64,
        std: f64,
    ) -> Result<Self> {
        check_average(average)?;
        check_std(std)?;
        let std = std.abs();
        Ok(PairEndStats {
            low: sigma_bound(average - PAIR_BOUNDS_SIGMA * std),
            high: sigma_bound(average + PAIR_BOUNDS_SIGMA * std),
            failed: false,
            average,
            std,
        })
    }

    /// Stats assuming a standard deviation of a tenth of `average`.
    pub fn from_average(
        average: f64,
    ) -> Result<Self> {
        check_average(average)?;
        PairEndStats::new(average, average * DEFAULT_STD_TO_AVERAGE_RATIO)
    }

    pub fn with_bounds(
        average: f64,
        std: f64,
        low: i32,
        high: i32,
    ) -> Result<Self> {
        check_average(average)?;
        check_std(std)?;
        if low as f64 > average {
            return Err(Error::InvalidArgument(format!("low bound {} is above the average {}", low, average)))
        }
        if (high as f64) < average {
            return Err(Error::InvalidArgument(format!("high bound {} is below the average {}", high, average)))
        }
        Ok(PairEndStats { low, high, failed: false, average, std })
    }

    /// Marks an orientation that is not supported by the data.
    pub fn failed() -> Self {
        PairEndStats { low: 0, high: 0, failed: true, average: 0.0, std: 0.0 }
    }

    pub fn contains(
        &self,
        insert_size: i64,
    ) -> bool {
        !self.failed && self.low as i64 <= insert_size && insert_size <= self.high as i64
    }
}

/// Produces alignments of query sequences against an index.
///
/// Must return one list per input sequence, in input order. In paired mode
/// (`opts.flag & MEM_F_PE`) sequences `2i` and `2i + 1` are mates and the
/// first alignment of each list is the primary one.
///
pub trait AlignerEngine: Sync {
    fn align(
        &self,
        index: &IndexView,
        opts: &MemOptions,
        pestat: Option<&[PairEndStats; 4]>,
        seqs: &[&[u8]],
    ) -> Result<Vec<Vec<Alignment>>>;
}

/// Alignment context of an open image.
///
/// Holds everything an alignment call needs so nothing is kept in global
/// state. Several threads can align with the same context.
///
pub struct Aligner<'a, E: AlignerEngine = ExactSeedAligner> {
    image: &'a ImageHandle,
    opts: MemOptions,
    pestat: Option<[PairEndStats; 4]>,
    engine: E,
}

impl<'a> Aligner<'a, ExactSeedAligner> {
    pub fn new(
        image: &'a ImageHandle,
    ) -> Self {
        Aligner::with_engine(image, ExactSeedAligner)
    }
}

impl<'a, E: AlignerEngine> Aligner<'a, E> {
    pub fn with_engine(
        image: &'a ImageHandle,
        engine: E,
    ) -> Self {
        Aligner { image, opts: MemOptions::default(), pestat: None, engine }
    }

    pub fn options(&self) -> &MemOptions {
        &self.opts
    }

    pub fn options_mut(&mut self) -> &mut MemOptions {
        &mut self.opts
    }

    pub fn set_options(
        &mut self,
        opts: MemOptions,
    ) {
        self.opts = opts;
    }

    /// Treat consecutive sequences as mates.
    pub fn align_pairs(&mut self) {
        self.opts.flag |= MEM_F_PE;
    }

    pub fn set_pair_stats(
        &mut self,
        pestat: Option<[PairEndStats; 4]>,
    ) {
        self.pestat = pestat;
    }

    /// Runs the engine and returns the per-sequence alignments.
    pub fn align(
        &self,
        seqs: &[&[u8]],
    ) -> Result<Vec<Vec<Alignment>>> {
        self.opts.validate()?;
        if self.opts.is_paired() && seqs.len() % 2 != 0 {
            return Err(Error::InvalidArgument(format!("paired mode needs an even number of sequences, got {}", seqs.len())))
        }

        let view = self.image.view()?;
        let alns = self.engine.align(&view, &self.opts, self.pestat.as_ref(), seqs)?;
        if alns.len() != seqs.len() {
            return Err(Error::InvalidArgument(format!("aligner engine returned {} results for {} sequences", alns.len(), seqs.len())))
        }
        Ok(alns)
    }

    /// Aligns `seqs` and encodes the result as an alignment batch buffer.
    pub fn align_batch(
        &self,
        seqs: &[&[u8]],
    ) -> Result<Vec<u8>> {
        let alns = self.align(seqs)?;
        encode_batch(alns, self.opts.is_paired())
    }

    /// Like [Aligner::align_batch] but takes an alignment batch input buffer.
    pub fn align_buffer(
        &self,
        input: &[u8],
    ) -> Result<Vec<u8>> {
        let seqs = parse_sequences(input)?;
        self.align_batch(&seqs)
    }

    /// Aligns `seqs` and decodes the records of each sequence.
    pub fn align_seqs(
        &self,
        seqs: &[&[u8]],
    ) -> Result<Vec<Vec<AlignmentRecord>>> {
        decode_batch(&self.align_batch(seqs)?)
    }
}
