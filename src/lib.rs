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

//! bwaimg is a library and a command-line client for:
//!
//!   - Building an FM index of a reference sequence collection.
//!   - Packaging the index into a single versioned, checksummed image file.
//!   - Memory-mapping images and aligning query sequences against them.
//!   - Encoding alignment results into a compact buffer that can be handed
//!     across a process or language boundary, and decoding it again.
//!
//! ## Usage
//!
//! ### Command line
//!
//! The bwaimg CLI supports the following subcommands:
//!   - `bwaimg index` build the index files of a FASTA file.
//!   - `bwaimg image` package index files, or a FASTA file, into an image.
//!   - `bwaimg contigs` list the contigs of an image.
//!   - `bwaimg align` align reads against an image and print SAM.
//!   - `bwaimg version` print the version that is written into images.
//!
//! ### Rust API
//!
//! The functions at the crate root cover the life cycle of an image:
//! [build_index], [build_image] (or [create_image_from_fasta]),
//! [open_image], [list_contigs], [align_batch] and [close_image].
//!
//! Buffers returned by [list_contigs] and [align_batch] are decoded with
//! [decode_contig_directory](decoder::decode_contig_directory) and
//! [decode_batch](decoder::decode_batch). [Aligner](aligner::Aligner) keeps
//! the options of repeated alignment calls against one image.
//!
//! ### C++ API
//!
//! With the `cxxbridge` feature the same operations are exported through
//! [cxx](https://cxx.rs) in `cxx_api`. Errors are thrown as exceptions.
//!
//! ## File formats
//!
//! An image is `[ payload ][ padding ][ footer ]` where the padding brings
//! the file size to a multiple of 8 and the 64 byte footer holds the image
//! length, an Adler-32 checksum of the payload, the producer version, the
//! padding length and the magic bytes `BWAINDX`. See [headers] for details.
//!
//! The alignment batch buffer is a `u32` count followed by, for each query,
//! the number of records and the records. Records are 32-bit words in host
//! byte order, see [codec].
//!

use std::path::Path;

#[cfg(feature = "cxxbridge")]
pub mod cxx_api;

pub mod aligner;
pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod headers;
pub mod image;
pub mod index;
pub mod printer;

pub use aligner::MemOptions;
pub use aligner::PairEndStats;
pub use error::Error;
pub use error::Result;
pub use image::ImageHandle;
pub use image::close_image;
pub use image::open_image;
pub use index::Algorithm;

use aligner::Aligner;
use encoder::directory::encode_contig_directory;
use index::SA_INTERVAL;
use index::build::build_reference_index;
use index::files::check_index_files;
use index::files::read_index_files;
use index::files::remove_index_files;
use index::files::write_index_files;

/// Identifier of this build, written into every image.
///
/// ## Usage
/// ```rust
/// assert!(bwaimg::version().starts_with("bwaimg "));
/// ```
pub fn version() -> String {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string()
}

/// Builds the index files of `reference` at `prefix`.
///
/// `reference` is a FASTA or FASTQ file, optionally gzipped. Writes
/// `<prefix>.ann`, `<prefix>.pac`, `<prefix>.bwt` and `<prefix>.sa`.
///
pub fn build_index(
    reference: &Path,
    prefix: &Path,
    algorithm: Algorithm,
) -> Result<()> {
    let index = build_reference_index(reference, algorithm, SA_INTERVAL)?;
    write_index_files(&index, prefix)
}

/// Packages the index files at `index_prefix` into an image.
///
/// A failed write can leave a partial file at `image_path`.
///
pub fn build_image(
    index_prefix: &Path,
    image_path: &Path,
) -> Result<()> {
    check_index_files(index_prefix)?;
    let index = read_index_files(index_prefix)?;
    image::write_image(&index, image_path)?;
    Ok(())
}

/// Indexes `reference` and writes the image, without keeping the index files.
///
/// ## Usage
/// ```rust
/// use bwaimg::{create_image_from_fasta, open_image, close_image, Algorithm};
///
/// let dir = tempfile::tempdir().unwrap();
/// let fasta = dir.path().join("ref.fa");
/// let image = dir.path().join("ref.img");
/// std::fs::write(&fasta, b">chr1\nGATTACAGATTACACCGTAGG\n>chr2\nTTTGACCA\n").unwrap();
///
/// create_image_from_fasta(&fasta, &image, Algorithm::Auto).unwrap();
///
/// let handle = open_image(&image, false, true).unwrap();
/// assert_eq!(handle.seq_len(), 29);
/// close_image(handle).unwrap();
/// ```
///
pub fn create_image_from_fasta(
    reference: &Path,
    image_path: &Path,
    algorithm: Algorithm,
) -> Result<()> {
    let tmp_dir = tempfile::tempdir().map_err(|e| Error::io("Failed to create a temporary directory", e))?;
    let prefix = tmp_dir.path().join("index");

    build_index(reference, &prefix, algorithm)?;
    let res = build_image(&prefix, image_path);
    remove_index_files(&prefix)?;

    res
}

/// Encodes the contig names of an open image as a contig directory buffer.
pub fn list_contigs(
    handle: &ImageHandle,
) -> Result<Vec<u8>> {
    let names: Vec<&str> = handle.contigs().iter().map(|contig| contig.name.as_str()).collect();
    encode_contig_directory(&names)
}

/// Aligns `seqs` against an open image and encodes the alignment batch buffer.
///
/// With `MEM_F_PE` set in `opts.flag`, sequences `2i` and `2i + 1` are aligned
/// as a pair. `pestat` holds the insert size distribution of each
/// [orientation](aligner::PairOrientation).
///
/// ## Usage
/// ```rust
/// use bwaimg::{align_batch, create_image_from_fasta, open_image, Algorithm, MemOptions};
/// use bwaimg::decoder::decode_batch;
///
/// let dir = tempfile::tempdir().unwrap();
/// let fasta = dir.path().join("ref.fa");
/// let image = dir.path().join("ref.img");
/// std::fs::write(&fasta, b">chr1\nTTGACCTAGGCATCGATCGGATCCAAGTCGTAGGCTAACGTACGATCG\n").unwrap();
/// create_image_from_fasta(&fasta, &image, Algorithm::Auto).unwrap();
/// let handle = open_image(&image, false, false).unwrap();
///
/// let opts = MemOptions { min_seed_len: 12, t: 20, ..Default::default() };
/// let reads: Vec<&[u8]> = vec![b"GCATCGATCGGATCCAAGTCGTAG".as_slice(), b"ACGT".as_slice()];
///
/// let bytes = align_batch(&handle, &opts, None, &reads).unwrap();
/// let records = decode_batch(&bytes).unwrap();
///
/// assert_eq!(records[0][0].ref_start, 9);
/// assert_eq!(records[0][0].cigar, "24M");
/// assert_eq!(records[1][0].sam_flag, 4);
/// ```
///
pub fn align_batch(
    handle: &ImageHandle,
    opts: &MemOptions,
    pestat: Option<&[PairEndStats; 4]>,
    seqs: &[&[u8]],
) -> Result<Vec<u8>> {
    let mut aligner = Aligner::new(handle);
    aligner.set_options(opts.clone());
    aligner.set_pair_stats(pestat.copied());
    aligner.align_batch(seqs)
}
