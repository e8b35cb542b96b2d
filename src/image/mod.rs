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

//! Building, validating and memory-mapping index images.
//!
//! An image is a single file:
//!
//! ```text
//! [ payload ][ pad_len bytes of padding ][ footer: 64 bytes ]
//! ```
//!
//! The payload is written by
//! [ReferenceIndex::to_payload](crate::index::ReferenceIndex::to_payload) and
//! the footer is described in [footer](crate::headers::footer).
//!
//! [open_image] maps the file read-only and hands out borrowed
//! [IndexView]s into the mapping through [ImageHandle::view]. The handle is the
//! single owner of the mapping: dropping it, or passing it to
//! [close_image], unmaps the file, and the borrow checker rejects any view
//! that would outlive it.
//!

use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use memmap2::Mmap;

use crate::error::Error;
use crate::error::Result;
use crate::headers::footer::FOOTER_LEN;
use crate::headers::footer::IMAGE_MAGIC;
use crate::headers::footer::ImageFooter;
use crate::headers::footer::decode_footer;
use crate::headers::footer::encode_footer;
use crate::headers::footer::version_bytes;
use crate::headers::layout::IndexHeader;
use crate::headers::layout::decode_index_header;
use crate::index::ContigAnn;
use crate::index::ReferenceIndex;
use crate::index::view::IndexView;
use crate::index::view::decode_contigs;

/// Largest chunk fed to the checksum at once.
pub const CHECKSUM_CHUNK: usize = 1 << 30;

/// Adler-32 of `payload`, chained over chunks of at most [CHECKSUM_CHUNK] bytes.
pub fn checksum(
    payload: &[u8],
) -> u64 {
    let mut hasher = adler2::Adler32::new();
    payload.chunks(CHECKSUM_CHUNK).for_each(|chunk| hasher.write_slice(chunk));
    hasher.checksum() as u64
}

/// Writes `index` as an image at `image_path`.
///
/// A failed write can leave a partial file behind.
pub fn write_image(
    index: &ReferenceIndex,
    image_path: &Path,
) -> Result<ImageFooter> {
    let payload = index.to_payload()?;
    let footer = ImageFooter::new(payload.len() as u64, checksum(&payload), version_bytes(&crate::version()));
    let footer_bytes = encode_footer(&footer)?;

    let file = File::create(image_path).map_err(|e| Error::io(format!("Failed to create {}", image_path.display()), e))?;
    let mut conn = BufWriter::new(file);
    let write_err = |e| Error::io(format!("Failed to write {}", image_path.display()), e);
    conn.write_all(&payload).map_err(write_err)?;
    conn.write_all(&vec![0_u8; footer.pad_len as usize]).map_err(write_err)?;
    conn.write_all(&footer_bytes).map_err(write_err)?;
    conn.flush().map_err(write_err)?;

    log::info!("Wrote {} byte image {}", footer.image_len, image_path.display());

    Ok(footer)
}

/// Checks the footer of a mapped image against the file it was read from.
fn validate_footer(
    bytes: &[u8],
    ignore_version: bool,
    verify_checksum: bool,
) -> Result<ImageFooter> {
    let file_len = bytes.len();
    if file_len % 8 != 0 {
        return Err(Error::CorruptImage(format!("file size {} is not a multiple of 8", file_len)))
    }
    if file_len < FOOTER_LEN {
        return Err(Error::CorruptImage(format!("file size {} can't hold the {} byte footer", file_len, FOOTER_LEN)))
    }

    let footer = decode_footer(&bytes[(file_len - FOOTER_LEN)..])?;
    if footer.magic != IMAGE_MAGIC {
        return Err(Error::CorruptImage("not an index image, magic bytes do not match".to_string()))
    }
    if footer.image_len != file_len as u64 {
        return Err(Error::CorruptImage(format!("footer records {} bytes but the file has {}", footer.image_len, file_len)))
    }
    log::debug!("Image footer: payload {} bytes, padding {}, version '{}'", footer.payload_len(), footer.pad_len, footer.version());

    let current = crate::version();
    if footer.producer_version != version_bytes(&current) {
        if !ignore_version {
            return Err(Error::VersionMismatch { image: footer.version(), current })
        }
        log::warn!("Using an image produced by '{}' with '{}'", footer.version(), current);
    }

    if (footer.pad_len as usize) >= 8 || footer.payload_len() as usize + footer.pad_len as usize + FOOTER_LEN != file_len {
        return Err(Error::CorruptImage(format!("invalid padding length {}", footer.pad_len)))
    }

    if verify_checksum {
        let got = checksum(&bytes[0..(footer.payload_len() as usize)]);
        if got != footer.checksum {
            return Err(Error::CorruptImage(format!("checksum mismatch, footer has {:#x} but the payload hashes to {:#x}", footer.checksum, got)))
        }
        log::debug!("Image checksum {:#x} verified", got);
    }

    Ok(footer)
}

/// An open, validated index image.
///
/// Owns the read-only mapping of the file. The mapping is released when the
/// handle is dropped or given to [close_image]. Views borrow the handle, so it
/// can't be closed while one is in use. The handle is `Send + Sync` and
/// alignment calls on several threads may share it.
///
pub struct ImageHandle {
    path: PathBuf,
    mmap: Mmap,
    footer: ImageFooter,
    header: IndexHeader,
    contigs: Vec<ContigAnn>,
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle")
            .field("path", &self.path)
            .field("footer", &self.footer)
            .field("header", &self.header)
            .field("n_contigs", &self.contigs.len())
            .finish()
    }
}

impl ImageHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn footer(&self) -> &ImageFooter {
        &self.footer
    }

    pub fn contigs(&self) -> &[ContigAnn] {
        &self.contigs
    }

    /// Number of indexed bases.
    pub fn seq_len(&self) -> u64 {
        self.header.seq_len
    }

    /// Payload bytes, without padding and footer.
    pub fn payload(&self) -> &[u8] {
        &self.mmap[0..(self.footer.payload_len() as usize)]
    }

    /// Borrows the index structures in the mapping.
    pub fn view(&self) -> Result<IndexView<'_>> {
        IndexView::new(&self.header, &self.contigs, self.payload())
    }
}

/// Opens and validates the image at `image_path`.
///
/// Validation stops at the first failure, in this order: file size is a
/// multiple of 8, file holds a footer, magic bytes, recorded image length,
/// producer version (skipped with `ignore_version`), checksum (only with
/// `verify_checksum`), index sections. The mapping is released before an
/// error is returned.
///
/// Without `verify_checksum` a damaged payload can still open. Damage to the
/// index header or contig table is caught by the section checks and reported
/// as [Error::CorruptImage]. Damage inside the other sections is only found
/// when a lookup reads it, which also reports [Error::CorruptImage].
///
pub fn open_image(
    image_path: &Path,
    ignore_version: bool,
    verify_checksum: bool,
) -> Result<ImageHandle> {
    match std::fs::metadata(image_path) {
        Ok(meta) if meta.len() > 0 => (),
        Ok(_) => return Err(Error::InvalidArgument(format!("image {} is empty", image_path.display()))),
        Err(e) => return Err(Error::io(format!("Failed to open {}", image_path.display()), e)),
    }

    let file = File::open(image_path).map_err(|e| Error::io(format!("Failed to open {}", image_path.display()), e))?;
    // The mapping is read-only and the handle never hands out mutable access.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(format!("Failed to map {}", image_path.display()), e))?;
    log::debug!("Mapped {} bytes from {}", mmap.len(), image_path.display());

    let footer = validate_footer(&mmap, ignore_version, verify_checksum)?;
    let payload = &mmap[0..(footer.payload_len() as usize)];
    let header = decode_index_header(payload)?;
    let contigs = decode_contigs(&header, payload)?;
    IndexView::new(&header, &contigs, payload)?;

    log::info!("Opened image {} with {} contigs and {} bases", image_path.display(), contigs.len(), header.seq_len);

    Ok(ImageHandle { path: image_path.to_path_buf(), mmap, footer, header, contigs })
}

/// Releases an image opened by [open_image].
pub fn close_image(
    handle: ImageHandle,
) -> Result<()> {
    log::info!("Closing image {}", handle.path.display());
    drop(handle);
    Ok(())
}

#[cfg(test)]
mod tests {

    fn write_test_image(dir: &std::path::Path) -> std::path::PathBuf {
        let index = crate::index::build::build_from_records(
            &[(b"chr1".as_slice(), b"ACGTTGCAACGGATTACAGATTACA".as_slice()), (b"chr2 extra".as_slice(), b"GGGATCCA".as_slice())],
            4,
        ).unwrap();
        let path = dir.join("test.img");
        super::write_image(&index, &path).unwrap();
        path
    }

    #[test]
    fn checksum_chains_chunks() {
        use super::checksum;

        // Adler-32 of "Wikipedia"
        assert_eq!(checksum(b"Wikipedia"), 0x11E60398);
        assert_eq!(checksum(b""), 1);
    }

    #[test]
    fn write_and_open_image() {
        use super::open_image;
        use super::close_image;

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());

        let handle = open_image(&path, false, true).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len() % 8, 0);
        assert_eq!(handle.seq_len(), 33);
        assert_eq!(handle.contigs().len(), 2);
        assert_eq!(handle.contigs()[1].name, "chr2");
        assert_eq!(handle.footer().version(), crate::version());
        assert_eq!(handle.view().unwrap().seq_len(), 33);

        close_image(handle).unwrap();
    }

    #[test]
    fn open_image_corrupt_payload() {
        use super::open_image;
        use crate::error::Error;

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();
        let last_sa_byte = bytes.len() - 64 - 8 - 1;
        bytes[last_sa_byte] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(open_image(&path, false, true), Err(Error::CorruptImage(_))));
        assert!(open_image(&path, false, false).is_ok());
    }

    #[test]
    fn open_image_corrupt_index_header() {
        use super::open_image;
        use crate::error::Error;

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();
        // low byte of the indexed sequence length
        bytes[0] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(open_image(&path, false, true), Err(Error::CorruptImage(_))));
        assert!(matches!(open_image(&path, false, false), Err(Error::CorruptImage(_))));
    }

    #[test]
    fn open_image_version_gate() {
        use super::open_image;
        use crate::error::Error;
        use crate::headers::footer::FOOTER_LEN;

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();
        let version_start = bytes.len() - FOOTER_LEN + 16;
        bytes[version_start..(version_start + 40)].copy_from_slice(&crate::headers::footer::version_bytes("bwaimg 0.0.0"));
        std::fs::write(&path, &bytes).unwrap();

        match open_image(&path, false, true) {
            Err(Error::VersionMismatch { image, current }) => {
                assert_eq!(image, "bwaimg 0.0.0");
                assert_eq!(current, crate::version());
            },
            other => panic!("expected a version mismatch, got {:?}", other),
        }
        assert!(open_image(&path, true, true).is_ok());
    }

    #[test]
    fn open_image_bad_magic() {
        use super::open_image;
        use crate::error::Error;

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = b'Y';
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(open_image(&path, true, false), Err(Error::CorruptImage(_))));
    }

    #[test]
    fn open_image_wrong_size() {
        use super::open_image;
        use crate::error::Error;

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();

        // Not a multiple of 8
        let mut odd = bytes.clone();
        odd.push(0);
        std::fs::write(&path, &odd).unwrap();
        assert!(matches!(open_image(&path, true, false), Err(Error::CorruptImage(_))));

        // Footer intact but an extra word in front
        bytes.splice(0..0, [0_u8; 8]);
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(open_image(&path, true, false), Err(Error::CorruptImage(_))));

        // Shorter than the footer
        std::fs::write(&path, [0_u8; 32]).unwrap();
        assert!(matches!(open_image(&path, true, false), Err(Error::CorruptImage(_))));
    }

    #[test]
    fn open_image_missing_or_empty() {
        use super::open_image;
        use crate::error::Error;

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.img");
        let empty = dir.path().join("empty.img");
        std::fs::write(&empty, b"").unwrap();

        assert!(matches!(open_image(&missing, false, false), Err(Error::Io { .. })));
        assert!(matches!(open_image(&empty, false, false), Err(Error::InvalidArgument(_))));
    }
}
