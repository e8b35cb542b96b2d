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

//! Fixed-size headers used in the image format.
//!
//! Consists of the [ImageFooter](footer::ImageFooter) trailer and the
//! [IndexHeader](layout::IndexHeader) that starts the payload. Both are
//! encoded with bincode using fixed-width little-endian integers so that
//! their encoded length never changes.
//!
//! ## Image layout
//!
//! An image file has the following structure:
//!
//! ```text
//! [ payload ][ pad_len bytes of padding ][ ImageFooter: 64 bytes ]
//! ```
//!
//! ### ImageFooter
//!
//! The footer must contain this information:
//!
//! - Total length of the file, including padding and the footer.
//! - Adler-32 checksum of the payload bytes (padding and footer excluded).
//! - A 40 byte identifier of the build that produced the file.
//! - Number of padding bytes between the payload and the footer.
//! - The magic bytes `BWAINDX`.
//!
//! The padding makes the total file length a multiple of 8 bytes.
//!
//! ### IndexHeader
//!
//! The payload starts with an IndexHeader which contains:
//!
//! - Length of the indexed text, primary index of the BWT and the suffix array
//!   sampling interval.
//! - Number of reference contigs.
//! - Cumulative base counts of the BWT.
//! - Offset and length of the contig annotation, packed reference, BWT,
//!   occurrence checkpoint and suffix array sample sections.
//!
//! Every section starts on an 8 byte boundary relative to the payload start.
//!

pub mod footer;
pub mod layout;
