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

use crate::error::Error;
use crate::error::Result;
use crate::index::Algorithm;
use crate::index::Annotations;
use crate::index::Bwt;
use crate::index::ContigAnn;
use crate::index::OCC_INTERVAL;
use crate::index::PackedSeq;
use crate::index::ReferenceIndex;
use crate::index::SENTINEL;
use crate::index::SaSample;
use crate::index::n_checkpoints;

/// Translates a base to 0..=3 for ACGT and 4 for anything else.
pub fn nt4(
    base: u8,
) -> u8 {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' | b'U' | b'u' => 3,
        _ => 4,
    }
}

/// Splits a FASTA header line into name and comment.
fn split_header(
    header: &[u8],
) -> (String, String) {
    let header = String::from_utf8_lossy(header);
    let header = header.trim();
    match header.split_once(char::is_whitespace) {
        Some((name, comment)) => (name.to_string(), comment.trim_start().to_string()),
        None => (header.to_string(), String::new()),
    }
}

/// Appends one contig to the annotations and the unpacked text.
///
/// Bases other than ACGT are stored as `A` and counted in `n_ambs`.
pub fn add_contig(
    ann: &mut Annotations,
    text: &mut Vec<u8>,
    header: &[u8],
    seq: &[u8],
) -> Result<()> {
    let (name, comment) = split_header(header);
    text.try_reserve(seq.len()).map_err(|_| Error::AllocationFailure { bytes: seq.len() })?;

    let mut n_ambs: u64 = 0;
    for base in seq {
        let c = nt4(*base);
        if c > 3 {
            n_ambs += 1;
        }
        text.push(if c > 3 { 0 } else { c });
    }

    ann.contigs.push(ContigAnn { name, comment, offset: ann.seq_len, len: seq.len() as u64, n_ambs });
    ann.seq_len += seq.len() as u64;

    Ok(())
}

/// Packs 0..=3 symbols four to a byte, first base in the high bits.
pub fn pack_text(
    text: &[u8],
) -> PackedSeq {
    let mut bytes: Vec<u8> = vec![0; text.len().div_ceil(4)];
    text.iter().enumerate().for_each(|(idx, c)| {
        bytes[idx >> 2] |= c << ((!idx & 3) << 1);
    });
    PackedSeq { seq_len: text.len() as u64, bytes }
}

/// Suffix array of `text` followed by a sentinel smaller than every symbol.
///
/// Sorts by prefix doubling. The result has `text.len() + 1` entries and
/// starts with the sentinel suffix.
pub fn suffix_array(
    text: &[u8],
) -> Vec<u64> {
    let n = text.len() + 1;
    let mut sa: Vec<usize> = (0..n).collect();
    let mut rank: Vec<usize> = text.iter().map(|x| *x as usize + 1).chain(std::iter::once(0)).collect();
    let mut next_rank: Vec<usize> = vec![0; n];

    let mut k = 1;
    loop {
        let key = |idx: usize| (rank[idx], if idx + k < n { rank[idx + k] + 1 } else { 0 });
        sa.sort_unstable_by_key(|idx| key(*idx));

        next_rank[sa[0]] = 0;
        for j in 1..n {
            let is_new = key(sa[j - 1]) < key(sa[j]);
            next_rank[sa[j]] = next_rank[sa[j - 1]] + is_new as usize;
        }
        std::mem::swap(&mut rank, &mut next_rank);

        if rank[sa[n - 1]] == n - 1 {
            break;
        }
        k *= 2;
    }

    sa.into_iter().map(|x| x as u64).collect()
}

/// Builds the BWT, counts and checkpoints from a text and its suffix array.
pub fn build_bwt(
    text: &[u8],
    sa: &[u64],
) -> Bwt {
    let n_rows = sa.len() as u64;

    let mut primary = 0;
    let symbols: Vec<u8> = sa.iter().enumerate().map(|(row, pos)| {
        if *pos == 0 {
            primary = row as u64;
            SENTINEL
        } else {
            text[*pos as usize - 1]
        }
    }).collect();

    let mut counts: [u64; 5] = [0; 5];
    counts[0] = 1;
    let mut n_per_symbol: [u64; 4] = [0; 4];
    text.iter().for_each(|c| n_per_symbol[*c as usize] += 1);
    for c in 0..4 {
        counts[c + 1] = counts[c] + n_per_symbol[c];
    }

    let mut occ: Vec<u64> = Vec::with_capacity(4 * n_checkpoints(n_rows) as usize);
    let mut running: [u64; 4] = [0; 4];
    for (row, c) in symbols.iter().enumerate() {
        if row as u64 % OCC_INTERVAL == 0 {
            occ.extend_from_slice(&running);
        }
        if *c < SENTINEL {
            running[*c as usize] += 1;
        }
    }
    if n_rows % OCC_INTERVAL == 0 {
        occ.extend_from_slice(&running);
    }

    Bwt { primary, counts, symbols, occ }
}

/// Keeps every `sa_intv`th suffix array entry.
pub fn sample_sa(
    sa: &[u64],
    sa_intv: u64,
) -> SaSample {
    let samples: Vec<u64> = sa.iter().step_by(sa_intv as usize).copied().collect();
    SaSample { sa_intv, samples }
}

/// Builds the index of an already concatenated reference text.
pub fn build_from_text(
    ann: Annotations,
    text: &[u8],
    sa_intv: u64,
) -> Result<ReferenceIndex> {
    if text.is_empty() {
        return Err(Error::InvalidArgument("reference contains no bases".to_string()))
    }
    if sa_intv == 0 {
        return Err(Error::InvalidArgument("suffix array interval must be positive".to_string()))
    }

    let pac = pack_text(text);
    log::debug!("Sorting {} suffixes", text.len() + 1);
    let sa = suffix_array(text);
    let bwt = build_bwt(text, &sa);
    let sa = sample_sa(&sa, sa_intv);

    Ok(ReferenceIndex { ann, pac, bwt, sa })
}

/// Builds the index of in-memory `(header, sequence)` records.
pub fn build_from_records(
    records: &[(&[u8], &[u8])],
    sa_intv: u64,
) -> Result<ReferenceIndex> {
    let mut ann = Annotations::default();
    let mut text: Vec<u8> = Vec::new();
    for (header, seq) in records {
        add_contig(&mut ann, &mut text, header, seq)?;
    }
    build_from_text(ann, &text, sa_intv)
}

/// Reads a FASTA/FASTQ file, possibly gzipped, and builds its index.
pub fn build_reference_index(
    reference: &Path,
    algorithm: Algorithm,
    sa_intv: u64,
) -> Result<ReferenceIndex> {
    let mut reader = needletail::parse_fastx_file(reference).map_err(|e| {
        Error::InvalidArgument(format!("can't read reference {}: {}", reference.display(), e))
    })?;

    let mut ann = Annotations::default();
    let mut text: Vec<u8> = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| {
            Error::InvalidArgument(format!("malformed record in {}: {}", reference.display(), e))
        })?;
        add_contig(&mut ann, &mut text, record.id(), &record.seq())?;
    }

    let algorithm = algorithm.resolve(ann.seq_len);
    log::info!("Indexing {} bases in {} contigs from {} with '{}'", ann.seq_len, ann.contigs.len(), reference.display(), algorithm.name());

    build_from_text(ann, &text, sa_intv)
}

#[cfg(test)]
mod tests {

    #[test]
    fn split_header() {
        use super::split_header;

        assert_eq!(split_header(b"chr1"), ("chr1".to_string(), String::new()));
        assert_eq!(split_header(b"chr1  AC:CM000663.2 gi|568336023"), ("chr1".to_string(), "AC:CM000663.2 gi|568336023".to_string()));
    }

    #[test]
    fn add_contig_counts_ambiguous() {
        use super::add_contig;
        use crate::index::Annotations;
        use crate::index::ContigAnn;

        let mut ann = Annotations::default();
        let mut text: Vec<u8> = Vec::new();
        add_contig(&mut ann, &mut text, b"a", b"ACNT").unwrap();
        add_contig(&mut ann, &mut text, b"b x", b"gRt").unwrap();

        let expected = vec![
            ContigAnn { name: "a".to_string(), comment: String::new(), offset: 0, len: 4, n_ambs: 1 },
            ContigAnn { name: "b".to_string(), comment: "x".to_string(), offset: 4, len: 3, n_ambs: 1 },
        ];

        assert_eq!(ann.seq_len, 7);
        assert_eq!(ann.contigs, expected);
        assert_eq!(text, vec![0, 1, 0, 3, 2, 0, 3]);
    }

    #[test]
    fn pack_text() {
        use super::pack_text;

        let got = pack_text(&[0, 1, 2, 3, 3, 2]);

        assert_eq!(got.seq_len, 6);
        assert_eq!(got.bytes, vec![0b00_01_10_11, 0b11_10_00_00]);
    }

    #[test]
    fn suffix_array_small() {
        use super::suffix_array;

        // ACA$
        assert_eq!(suffix_array(&[0, 1, 0]), vec![3, 2, 0, 1]);
        // AAAA$
        assert_eq!(suffix_array(&[0, 0, 0, 0]), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn suffix_array_matches_naive_sort() {
        use super::suffix_array;

        let text: Vec<u8> = b"GATTACAGATTACACCGTAGGATTTTACGAGGGACATTAC".iter().map(|x| super::nt4(*x)).collect();

        let mut expected: Vec<u64> = (0..=text.len() as u64).collect();
        expected.sort_by(|a, b| {
            let a: Vec<i16> = text[(*a as usize)..].iter().map(|x| *x as i16).chain(std::iter::once(-1)).collect();
            let b: Vec<i16> = text[(*b as usize)..].iter().map(|x| *x as i16).chain(std::iter::once(-1)).collect();
            a.cmp(&b)
        });

        assert_eq!(suffix_array(&text), expected);
    }

    #[test]
    fn build_bwt_small() {
        use super::build_bwt;
        use super::suffix_array;
        use crate::index::Bwt;

        let text = vec![0, 1, 0];
        let sa = suffix_array(&text);

        let expected = Bwt { primary: 2, counts: [1, 3, 4, 4, 4], symbols: vec![0, 1, 4, 0], occ: vec![0, 0, 0, 0] };

        assert_eq!(build_bwt(&text, &sa), expected);
    }

    #[test]
    fn build_bwt_checkpoint_at_end() {
        use super::build_bwt;
        use super::suffix_array;

        let text: Vec<u8> = (0..127).map(|x| (x % 4) as u8).collect();
        let sa = suffix_array(&text);

        let got = build_bwt(&text, &sa);

        assert_eq!(got.occ.len(), 8);
        assert_eq!(got.occ[4..8], [32, 32, 32, 31]);
    }

    #[test]
    fn build_from_records_empty() {
        use super::build_from_records;
        use crate::error::Error;

        let got = build_from_records(&[(b"chr1".as_slice(), b"".as_slice())], 32);

        assert!(matches!(got, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn build_reference_index_from_fasta() {
        use super::build_reference_index;
        use crate::index::Algorithm;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.fa");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b">chr1 first\nACGTACGTAC\nGTAC\n>chr2\nNNACGG\n").unwrap();
        drop(file);

        let got = build_reference_index(&path, Algorithm::Auto, 32).unwrap();

        assert_eq!(got.seq_len(), 20);
        assert_eq!(got.contigs().len(), 2);
        assert_eq!(got.contigs()[0].comment, "first");
        assert_eq!(got.contigs()[1].offset, 14);
        assert_eq!(got.contigs()[1].n_ambs, 2);
        got.validate().unwrap();
    }

    #[test]
    fn build_reference_index_missing_file() {
        use super::build_reference_index;
        use crate::index::Algorithm;
        use crate::error::Error;

        let got = build_reference_index(std::path::Path::new("/nonexistent/ref.fa"), Algorithm::Is, 32);

        assert!(matches!(got, Err(Error::InvalidArgument(_))));
    }
}
