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

//! Index files written next to a common prefix.
//!
//! `<prefix>.ann`, `<prefix>.pac`, `<prefix>.bwt` and `<prefix>.sa` each hold
//! one bincode-encoded part of a [ReferenceIndex].
//!

use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use bincode::Decode;
use bincode::Encode;
use bincode::decode_from_std_read;
use bincode::encode_into_std_write;
use bincode::error::DecodeError;
use bincode::error::EncodeError;

use crate::error::Error;
use crate::error::Result;
use crate::index::ReferenceIndex;

/// Extensions of the index files, in the order they are written.
pub const INDEX_EXTENSIONS: [&str; 4] = ["ann", "pac", "bwt", "sa"];

/// Path of the index file with extension `ext`.
pub fn index_file_path(
    prefix: &Path,
    ext: &str,
) -> PathBuf {
    let mut name: OsString = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn write_part<T: Encode>(
    part: &T,
    path: &Path,
) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(format!("Failed to create {}", path.display()), e))?;
    let mut conn = BufWriter::new(file);
    encode_into_std_write(part, &mut conn, bincode::config::standard().with_fixed_int_encoding()).map_err(|e| match e {
        EncodeError::Io { inner, .. } => Error::io(format!("Failed to write {}", path.display()), inner),
        e => Error::from(e),
    })?;
    conn.flush().map_err(|e| Error::io(format!("Failed to write {}", path.display()), e))?;
    Ok(())
}

fn read_part<T: Decode<()>>(
    path: &Path,
) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::io(format!("Failed to open {}", path.display()), e))?;
    let mut conn = BufReader::new(file);
    decode_from_std_read(&mut conn, bincode::config::standard().with_fixed_int_encoding()).map_err(|e| match e {
        DecodeError::Io { inner, .. } if inner.kind() != ErrorKind::UnexpectedEof => {
            Error::io(format!("Failed to read {}", path.display()), inner)
        },
        e => Error::CorruptImage(format!("can't decode {}: {}", path.display(), e)),
    })
}

/// Checks that every index file exists and is not empty.
pub fn check_index_files(
    prefix: &Path,
) -> Result<()> {
    for ext in INDEX_EXTENSIONS {
        let path = index_file_path(prefix, ext);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => (),
            Ok(_) => return Err(Error::InvalidArgument(format!("index file {} is empty", path.display()))),
            Err(_) => return Err(Error::InvalidArgument(format!("index file {} can't be read", path.display()))),
        }
    }
    Ok(())
}

/// Writes the index files of `index` at `prefix`.
pub fn write_index_files(
    index: &ReferenceIndex,
    prefix: &Path,
) -> Result<()> {
    write_part(&index.ann, &index_file_path(prefix, "ann"))?;
    write_part(&index.pac, &index_file_path(prefix, "pac"))?;
    write_part(&index.bwt, &index_file_path(prefix, "bwt"))?;
    write_part(&index.sa, &index_file_path(prefix, "sa"))?;
    log::info!("Wrote index files at {}", prefix.display());
    Ok(())
}

/// Reads the index files at `prefix` and checks they belong together.
pub fn read_index_files(
    prefix: &Path,
) -> Result<ReferenceIndex> {
    check_index_files(prefix)?;
    let index = ReferenceIndex {
        ann: read_part(&index_file_path(prefix, "ann"))?,
        pac: read_part(&index_file_path(prefix, "pac"))?,
        bwt: read_part(&index_file_path(prefix, "bwt"))?,
        sa: read_part(&index_file_path(prefix, "sa"))?,
    };
    index.validate()?;
    Ok(index)
}

/// Removes the index files at `prefix`, ignoring files that do not exist.
pub fn remove_index_files(
    prefix: &Path,
) -> Result<()> {
    for ext in INDEX_EXTENSIONS {
        let path = index_file_path(prefix, ext);
        match std::fs::remove_file(&path) {
            Ok(()) => (),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => return Err(Error::io(format!("Failed to remove {}", path.display()), e)),
        }
    }
    Ok(())
}
