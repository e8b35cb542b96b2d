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
use std::path::Path;
use std::path::PathBuf;

use bwaimg::Algorithm;
use bwaimg::Error;
use bwaimg::MemOptions;
use bwaimg::align_batch;
use bwaimg::close_image;
use bwaimg::create_image_from_fasta;
use bwaimg::open_image;

const CHR1: &[u8] = b"TTGACCTAGGCATCGATCGGATCCAAGTCGTAGGCTAACGTACGATCGTAGCTAGCTAGGATCCGATTAGGCATTACGGACTAGCAGTCAGTTACGATCAGGCT";
const CHR2: &[u8] = b"CCGTAAGTCAGGATCGATTTAGGCCATGCATGCTAGCTTAGGCAGCTAGCGGATCGATCAGTCAGTCGATCGTACCCCGATGATTAGCAGTAGGCAGTAGCAGG";

fn write_image(dir: &Path) -> PathBuf {
    let fasta = dir.join("ref.fa");
    let image = dir.join("ref.img");
    let mut contents: Vec<u8> = Vec::new();
    contents.extend_from_slice(b">chr1 first\n");
    contents.extend_from_slice(&CHR1[0..60]);
    contents.push(b'\n');
    contents.extend_from_slice(&CHR1[60..]);
    contents.extend_from_slice(b"\n>chr2\n");
    contents.extend_from_slice(CHR2);
    contents.push(b'\n');
    std::fs::write(&fasta, contents).unwrap();

    create_image_from_fasta(&fasta, &image, Algorithm::Auto).unwrap();
    image
}

fn to_ascii(codes: Vec<u8>) -> Vec<u8> {
    codes.iter().map(|c| b"ACGT"[*c as usize]).collect()
}

fn pac_offset(image: &Path) -> usize {
    let handle = open_image(image, false, false).unwrap();
    let view = handle.view().unwrap();
    view.header().pac.offset as usize
}

#[test]
fn build_then_open_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path());

    let handle = open_image(&image, false, true).unwrap();
    let view = handle.view().unwrap();

    let names: Vec<&str> = handle.contigs().iter().map(|contig| contig.name.as_str()).collect();
    assert_eq!(names, vec!["chr1", "chr2"]);
    assert_eq!(handle.seq_len(), (CHR1.len() + CHR2.len()) as u64);
    assert_eq!(to_ascii(view.fetch(0..CHR1.len() as u64)), CHR1.to_vec());
    assert_eq!(to_ascii(view.fetch(CHR1.len() as u64..handle.seq_len())), CHR2.to_vec());
    assert_eq!(handle.footer().version(), bwaimg::version());

    let file_len = std::fs::metadata(&image).unwrap().len();
    assert_eq!(file_len % 8, 0);
    assert_eq!(handle.footer().image_len, file_len);

    drop(view);
    close_image(handle).unwrap();
}

#[test]
fn backward_search_finds_every_occurrence() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path());
    let handle = open_image(&image, false, false).unwrap();
    let view = handle.view().unwrap();

    // GGATC occurs in both contigs
    let mut got: Vec<u64> = view.backward_search(&[2, 2, 0, 3, 1]).unwrap().map(|row| view.locate(row).unwrap()).collect();
    got.sort();

    let text: Vec<u8> = [CHR1, CHR2].concat();
    let expected: Vec<u64> = text.windows(5).enumerate()
        .filter(|(_, window)| *window == b"GGATC")
        .map(|(pos, _)| pos as u64)
        .collect();

    assert!(expected.len() > 1);
    assert_eq!(got, expected);
}

#[test]
fn corrupt_payload_is_caught_by_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path());
    let offset = pac_offset(&image);
    let pristine = std::fs::read(&image).unwrap();

    for pos in [offset, offset + 5, offset + 20] {
        let mut bytes = pristine.clone();
        bytes[pos] ^= 0xff;
        std::fs::write(&image, &bytes).unwrap();

        let got = open_image(&image, false, true);
        assert!(matches!(got, Err(Error::CorruptImage(_))));

        let got = open_image(&image, false, false);
        assert!(got.is_ok());
    }
}

#[test]
fn corrupt_checkpoint_fails_alignment() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path());
    let occ_offset = {
        let handle = open_image(&image, false, false).unwrap();
        let view = handle.view().unwrap();
        view.header().occ.offset as usize
    };

    let mut bytes = std::fs::read(&image).unwrap();
    bytes[occ_offset + 5] ^= 0x01;
    std::fs::write(&image, &bytes).unwrap();

    assert!(matches!(open_image(&image, false, true), Err(Error::CorruptImage(_))));
    let handle = open_image(&image, false, false).unwrap();

    let got = align_batch(&handle, &MemOptions::default(), None, &[&CHR1[5..35]]);

    assert!(matches!(got, Err(Error::CorruptImage(_))));
}

#[test]
fn version_gate() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path());

    let mut bytes = std::fs::read(&image).unwrap();
    let version_start = bytes.len() - 64 + 16;
    bytes[version_start..(version_start + 40)].fill(0);
    bytes[version_start..(version_start + 12)].copy_from_slice(b"bwaimg 0.0.0");
    std::fs::write(&image, &bytes).unwrap();

    let got = open_image(&image, false, true);
    match got {
        Err(Error::VersionMismatch { image, current }) => {
            assert_eq!(image, "bwaimg 0.0.0");
            assert_eq!(current, bwaimg::version());
        },
        _ => panic!("expected a version mismatch"),
    }

    let handle = open_image(&image, true, true).unwrap();
    assert_eq!(handle.footer().version(), "bwaimg 0.0.0");
}

#[test]
fn truncated_image() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path());

    let bytes = std::fs::read(&image).unwrap();
    std::fs::write(&image, &bytes[8..]).unwrap();

    let got = open_image(&image, false, false);

    assert!(matches!(got, Err(Error::CorruptImage(_))));
}
