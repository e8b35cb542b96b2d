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

//! C++ bindings
//!
//! Every function takes and returns plain byte buffers so the caller does
//! not need to know the Rust types. Errors are thrown as `rust::Error`.
//!
//! The options buffer is [MemOptions::to_bytes] and the sequences buffer is
//! [encode_sequences](crate::encoder::encode_sequences). Pair stats are
//! either empty or `average, std, low, high` for each of the four
//! [orientations](crate::aligner::PairOrientation); an orientation with a
//! non-positive average is marked as failed.

use crate::image::ImageHandle;
use crate::aligner::Aligner;
use crate::aligner::MemOptions;
use crate::aligner::PairEndStats;
use crate::index::Algorithm;

use std::path::PathBuf;

use cxx::CxxString;
use cxx::CxxVector;

#[cxx::bridge(namespace = "bwaimg")]
mod ffi {

    extern "Rust" {
        type ImageHandle;

        fn open_image(
            path: &CxxString,
            ignore_version: bool,
            verify_checksum: bool,
        ) -> Result<Box<ImageHandle>>;

        fn close_image(
            handle: Box<ImageHandle>,
        ) -> Result<()>;

        fn list_contigs(
            handle: &ImageHandle,
        ) -> Result<Vec<u8>>;

        fn align_batch(
            handle: &ImageHandle,
            options: &CxxVector<u8>,
            pair_stats: &CxxVector<f64>,
            sequences: &CxxVector<u8>,
        ) -> Result<Vec<u8>>;

        fn build_index(
            reference: &CxxString,
            prefix: &CxxString,
            algorithm: &CxxString,
        ) -> Result<()>;

        fn build_image(
            prefix: &CxxString,
            image: &CxxString,
        ) -> Result<()>;

        fn version() -> String;
}
}

fn to_path(
    path: &CxxString,
) -> crate::Result<PathBuf> {
    path.to_str()
        .map(PathBuf::from)
        .map_err(|_| crate::Error::InvalidArgument("path is not valid UTF-8".to_string()))
}

pub fn open_image(
    path: &CxxString,
    ignore_version: bool,
    verify_checksum: bool,
) -> crate::Result<Box<ImageHandle>> {
    let handle = crate::open_image(&to_path(path)?, ignore_version, verify_checksum)?;
    Ok(Box::new(handle))
}

pub fn close_image(
    handle: Box<ImageHandle>,
) -> crate::Result<()> {
    crate::close_image(*handle)
}

pub fn list_contigs(
    handle: &ImageHandle,
) -> crate::Result<Vec<u8>> {
    crate::list_contigs(handle)
}

fn to_pair_stats(
    values: &[f64],
) -> crate::Result<Option<[PairEndStats; 4]>> {
    match values.len() {
        0 => Ok(None),
        16 => {
            let mut pestat = [PairEndStats::failed(); 4];
            for (stats, x) in pestat.iter_mut().zip(values.chunks(4)) {
                if x[0] > 0.0 {
                    *stats = PairEndStats::with_bounds(x[0], x[1], x[2] as i32, x[3] as i32)?;
                }
            }
            Ok(Some(pestat))
        },
        n => Err(crate::Error::InvalidArgument(format!("expected 0 or 16 pair stat values, got {}", n))),
    }
}

pub fn align_batch(
    handle: &ImageHandle,
    options: &CxxVector<u8>,
    pair_stats: &CxxVector<f64>,
    sequences: &CxxVector<u8>,
) -> crate::Result<Vec<u8>> {
    let mut aligner = Aligner::new(handle);
    aligner.set_options(MemOptions::from_bytes(options.as_slice())?);
    aligner.set_pair_stats(to_pair_stats(pair_stats.as_slice())?);
    aligner.align_buffer(sequences.as_slice())
}

pub fn build_index(
    reference: &CxxString,
    prefix: &CxxString,
    algorithm: &CxxString,
) -> crate::Result<()> {
    let algorithm: Algorithm = algorithm.to_string_lossy().parse()?;
    crate::build_index(&to_path(reference)?, &to_path(prefix)?, algorithm)
}

pub fn build_image(
    prefix: &CxxString,
    image: &CxxString,
) -> crate::Result<()> {
    crate::build_image(&to_path(prefix)?, &to_path(image)?)
}

pub fn version() -> String {
    crate::version()
}
