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
use std::cmp::Ordering;

use crate::codec::Alignment;
use crate::codec::AlignmentRecord;
use crate::codec::CIGAR_SYMBOLS;
use crate::codec::FLAG_MATE_UNMAPPED;
use crate::codec::FLAG_PAIRED;
use crate::codec::FLAG_SECONDARY;
use crate::codec::FLAG_SUPPLEMENTARY_AS_SECONDARY;
use crate::codec::FLAG_UNMAPPED;
use crate::codec::external_cigar_word;
use crate::codec::cursor::WordReader;
use crate::codec::cursor::WordWriter;
use crate::codec::cursor::padded_len;
use crate::error::Error;
use crate::error::Result;

/// Reference, score, CIGAR and tag fields are present.
fn has_alignment_fields(
    flag: u32,
) -> bool {
    flag & FLAG_UNMAPPED == 0
}

/// Mate reference, mate position and template length are present.
fn has_mate_fields(
    flag: u32,
) -> bool {
    flag & (FLAG_PAIRED | FLAG_MATE_UNMAPPED) == FLAG_PAIRED
}

// MD is only reported for alignments that have a CIGAR
fn md_bytes(
    aln: &Alignment,
) -> &[u8] {
    if aln.cigar.is_empty() { &[] } else { aln.md.as_bytes() }
}

fn xa_bytes(
    aln: &Alignment,
) -> &[u8] {
    aln.xa.as_deref().map(|xa| xa.as_bytes()).unwrap_or(&[])
}

/// Packs the flag and the mapping quality into the first word of a record.
pub fn flag_mapq(
    aln: &Alignment,
) -> i32 {
    let mut flag = aln.flag;
    if flag & FLAG_SUPPLEMENTARY_AS_SECONDARY != 0 {
        flag |= FLAG_SECONDARY;
    }
    (flag << 16 | aln.mapq as u32) as i32
}

/// Inferred template length between `aln` and its mate.
///
/// Compares the 5' end of forward alignments and the 3' end of reverse
/// alignments and biases the difference by one towards the downstream read.
/// This is what bwa reports, which differs from the SAM specification for
/// outward facing pairs.
///
/// Zero if `aln` is unmapped or the mate is on another contig.
pub fn template_len(
    aln: &Alignment,
    mate: &Alignment,
) -> i32 {
    if !aln.is_mapped() || aln.rid != mate.rid {
        return 0
    }
    let p0 = if aln.is_rev { aln.pos + aln.ref_len() - 1 } else { aln.pos };
    let m0 = if mate.is_rev { mate.pos + mate.ref_len() - 1 } else { mate.pos };
    let bias = match p0.cmp(&m0) {
        Ordering::Greater => -1,
        Ordering::Less => 1,
        Ordering::Equal => 0,
    };
    (m0 - p0 + bias) as i32
}

/// Number of 32-bit words [encode] will write for `aln`.
pub fn measure(
    aln: &Alignment,
) -> usize {
    let mut n_words = 1;
    if has_alignment_fields(aln.flag) {
        // ref_id, pos, NM, AS, XS, n_cigar, n_md, n_xa
        n_words += 8;
        n_words += aln.cigar.len();
        n_words += padded_len(md_bytes(aln).len()) / 4;
        n_words += padded_len(xa_bytes(aln).len()) / 4;
    }
    if has_mate_fields(aln.flag) {
        n_words += 3;
    }
    n_words
}

/// Encodes `aln` at the writer position.
///
/// `mate` is the primary alignment of the mate and must be given when `aln`
/// is paired with a mapped mate. Writes exactly `measure(aln) * 4` bytes and
/// returns that count. Nothing is written on error.
///
pub fn encode(
    aln: &Alignment,
    mate: Option<&Alignment>,
    writer: &mut WordWriter,
) -> Result<usize> {
    let mate = if has_mate_fields(aln.flag) {
        Some(mate.ok_or_else(|| Error::InvalidArgument(
            "alignment is flagged as paired with a mapped mate but no mate was given".to_string()
        ))?)
    } else {
        None
    };

    let nbytes = measure(aln) * 4;
    if nbytes > writer.remaining() {
        return Err(Error::CursorOverflow { needed: nbytes, remaining: writer.remaining() })
    }

    let start = writer.position();
    writer.put_i32(flag_mapq(aln))?;

    if has_alignment_fields(aln.flag) {
        writer.put_i32(aln.rid)?;
        writer.put_i32(aln.pos as i32)?;
        writer.put_i32(aln.nm)?;
        writer.put_i32(aln.score)?;
        writer.put_i32(aln.sub)?;
        writer.put_i32(aln.cigar.len() as i32)?;
        for word in aln.cigar.iter() {
            writer.put_u32(external_cigar_word(*word))?;
        }
        writer.put_tag(md_bytes(aln))?;
        writer.put_tag(xa_bytes(aln))?;
    }

    if let Some(mate) = mate {
        writer.put_i32(mate.rid)?;
        writer.put_i32(mate.pos as i32)?;
        writer.put_i32(template_len(aln, mate))?;
    }

    Ok(writer.position() - start)
}

/// Decodes one record written by [encode].
pub fn decode(
    reader: &mut WordReader,
) -> Result<AlignmentRecord> {
    let flag_mapq = reader.get_i32()?;
    let flags = (flag_mapq as u32) >> 16;

    let mut record = AlignmentRecord {
        sam_flag: flags,
        map_qual: flag_mapq & 0xff,
        ref_id: -1, ref_start: -1, ref_end: -1,
        seq_start: -1, seq_end: -1,
        mate_ref_id: -1, mate_ref_start: -1,
        ..Default::default()
    };

    if has_alignment_fields(flags) {
        record.ref_id = reader.get_i32()?;
        record.ref_start = reader.get_i32()?;
        record.n_mismatches = reader.get_i32()?;
        record.aligner_score = reader.get_i32()?;
        record.suboptimal_score = reader.get_i32()?;

        let n_cigar = reader.get_i32()?;
        let mut seq_start = 0;
        let mut ref_len = 0;
        let mut seq_len = 0;
        for idx in 0..n_cigar.max(0) {
            let word = reader.get_u32()?;
            let len = (word >> 4) as i32;
            let symbol = *CIGAR_SYMBOLS.get((word & 0xf) as usize).ok_or_else(|| {
                Error::MalformedBuffer(format!("unknown CIGAR operation {}", word & 0xf))
            })?;
            record.cigar.push_str(&len.to_string());
            record.cigar.push(symbol as char);

            if idx == 0 && symbol == b'S' {
                seq_start = len;
            }
            match symbol {
                b'M' => { ref_len += len; seq_len += len; },
                b'D' => ref_len += len,
                b'I' => seq_len += len,
                _ => (),
            }
        }
        record.seq_start = seq_start;
        record.seq_end = seq_start + seq_len;
        record.ref_end = record.ref_start + ref_len;

        record.md_tag = reader.get_tag()?;
        record.xa_tag = reader.get_tag()?;
    }

    if has_mate_fields(flags) {
        record.mate_ref_id = reader.get_i32()?;
        record.mate_ref_start = reader.get_i32()?;
        record.template_len = reader.get_i32()?;
    }

    Ok(record)
}

#[cfg(test)]
mod tests {

    fn words(bytes: &[u8]) -> Vec<i32> {
        bytes.chunks(4).map(|x| i32::from_ne_bytes([x[0], x[1], x[2], x[3]])).collect()
    }

    fn encode_to_vec(aln: &crate::codec::Alignment, mate: Option<&crate::codec::Alignment>) -> Vec<u8> {
        use super::encode;
        use super::measure;
        use crate::codec::cursor::WordWriter;

        let mut buf = vec![0_u8; measure(aln) * 4];
        let mut writer = WordWriter::new(&mut buf);
        encode(aln, mate, &mut writer).unwrap();
        assert_eq!(writer.remaining(), 0);
        buf
    }

    #[test]
    fn encode_unmapped() {
        use crate::codec::Alignment;

        let got = encode_to_vec(&Alignment::unmapped(), None);

        assert_eq!(words(&got), vec![4 << 16]);
    }

    #[test]
    fn encode_mapped_single_op() {
        use crate::codec::Alignment;
        use crate::codec::cigar_word;

        let aln = Alignment {
            flag: 0, rid: 2, pos: 0, is_rev: false, mapq: 37, nm: 0, score: 10, sub: 0,
            cigar: vec![cigar_word(10, 0)], md: String::new(), xa: None,
        };

        let got = encode_to_vec(&aln, None);

        assert_eq!(words(&got), vec![37, 2, 0, 0, 10, 0, 1, 10 << 4, 0, 0]);
    }

    #[test]
    fn encode_tags_and_clips() {
        use crate::codec::Alignment;
        use crate::codec::cigar_word;

        let aln = Alignment {
            flag: 16, rid: 0, pos: 1234, is_rev: true, mapq: 60, nm: 1, score: 40, sub: 22,
            cigar: vec![cigar_word(5, 3), cigar_word(45, 0), cigar_word(2, 4)],
            md: "20A24".to_string(), xa: Some("chr2,+77,45M,2;".to_string()),
        };

        let got = encode_to_vec(&aln, None);

        let mut expected: Vec<u8> = Vec::new();
        for word in [16 << 16 | 60, 0, 1234, 1, 40, 22, 3, 5 << 4 | 4, 45 << 4, 2 << 4 | 5, 5] {
            expected.extend_from_slice(&(word as i32).to_ne_bytes());
        }
        expected.extend_from_slice(b"20A24\0\0\0");
        expected.extend_from_slice(&15_i32.to_ne_bytes());
        expected.extend_from_slice(b"chr2,+77,45M,2;\0");

        assert_eq!(got, expected);
    }

    #[test]
    fn encode_marks_supplementary_as_secondary() {
        use crate::codec::Alignment;
        use crate::codec::cigar_word;

        let aln = Alignment {
            flag: 0x10000 | 0x800, rid: 0, pos: 5, mapq: 0,
            cigar: vec![cigar_word(8, 0)], md: "8".to_string(),
            ..Default::default()
        };

        let got = encode_to_vec(&aln, None);

        assert_eq!(words(&got)[0], (0x900 << 16) as i32);
    }

    #[test]
    fn encode_md_dropped_without_cigar() {
        use super::measure;
        use crate::codec::Alignment;

        let aln = Alignment { flag: 0, md: "12".to_string(), ..Default::default() };

        let got = encode_to_vec(&aln, None);

        assert_eq!(measure(&aln), 9);
        assert_eq!(words(&got)[6..9], [0, 0, 0]);
    }

    #[test]
    fn encode_paired_with_mapped_mate() {
        use crate::codec::Alignment;
        use crate::codec::cigar_word;

        let read = Alignment {
            flag: 0x1 | 0x2 | 0x20 | 0x40, rid: 1, pos: 100, mapq: 60, score: 50,
            cigar: vec![cigar_word(50, 0)], md: "50".to_string(), ..Default::default()
        };
        let mate = Alignment {
            flag: 0x1 | 0x2 | 0x10 | 0x80, rid: 1, pos: 300, is_rev: true, mapq: 60, score: 50,
            cigar: vec![cigar_word(50, 0)], md: "50".to_string(), ..Default::default()
        };

        let got = words(&encode_to_vec(&read, Some(&mate)));

        assert_eq!(got.len(), 1 + 8 + 1 + 1 + 3);
        // mate 3' end is 349, read 5' end is 100
        assert_eq!(got[got.len() - 3..], [1, 300, 250]);
    }

    #[test]
    fn encode_unmapped_with_mapped_mate() {
        use crate::codec::Alignment;
        use crate::codec::cigar_word;

        let read = Alignment { flag: 0x1 | 0x4 | 0x80, rid: 0, pos: 10, ..Default::default() };
        let mate = Alignment {
            flag: 0x1 | 0x8 | 0x40, rid: 0, pos: 10, mapq: 60,
            cigar: vec![cigar_word(20, 0)], md: "20".to_string(), ..Default::default()
        };

        let got = words(&encode_to_vec(&read, Some(&mate)));

        assert_eq!(got, vec![((0x1 | 0x4 | 0x80) << 16), 0, 10, 0]);
    }

    #[test]
    fn encode_without_required_mate() {
        use super::encode;
        use super::measure;
        use crate::codec::Alignment;
        use crate::codec::cursor::WordWriter;
        use crate::error::Error;

        let read = Alignment { flag: 0x1, ..Default::default() };
        let mut buf = vec![0_u8; measure(&read) * 4];
        let mut writer = WordWriter::new(&mut buf);

        let got = encode(&read, None, &mut writer);

        assert!(matches!(got, Err(Error::InvalidArgument(_))));
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn encode_into_short_buffer() {
        use super::encode;
        use crate::codec::Alignment;
        use crate::codec::cursor::WordWriter;
        use crate::error::Error;

        let aln = Alignment { flag: 0, md: "12".to_string(), ..Default::default() };
        let mut buf = vec![0_u8; 16];
        let mut writer = WordWriter::new(&mut buf);

        let got = encode(&aln, None, &mut writer);

        assert!(matches!(got, Err(Error::CursorOverflow { needed: 36, remaining: 16 })));
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn measure_agrees_with_encode() {
        use super::encode;
        use super::measure;
        use crate::codec::Alignment;
        use crate::codec::cigar_word;
        use crate::codec::cursor::WordWriter;

        let mate = Alignment { flag: 0x1 | 0x40, rid: 0, pos: 500, cigar: vec![cigar_word(30, 0)], ..Default::default() };
        let flags = [0_u32, 0x4, 0x10, 0x1, 0x1 | 0x8, 0x1 | 0x4, 0x1 | 0x4 | 0x8, 0x1 | 0x10 | 0x80, 0x10000];

        for flag in flags {
            for n_cigar in 0..4_u32 {
                for md_len in 0..6 {
                    for xa_len in [None, Some(0), Some(1), Some(4), Some(7)] {
                        let aln = Alignment {
                            flag, rid: 0, pos: 17, is_rev: flag & 0x10 != 0, mapq: 23,
                            cigar: (0..n_cigar).map(|op| cigar_word(op + 1, op)).collect(),
                            md: "7".repeat(md_len),
                            xa: xa_len.map(|n| "x".repeat(n)),
                            ..Default::default()
                        };
                        let n_words = measure(&aln);
                        let mut buf = vec![0_u8; n_words * 4 + 8];
                        let mut writer = WordWriter::new(&mut buf);

                        let written = encode(&aln, Some(&mate), &mut writer).unwrap();

                        assert_eq!(written, n_words * 4);
                    }
                }
            }
        }
    }

    #[test]
    fn template_len() {
        use super::template_len;
        use crate::codec::Alignment;
        use crate::codec::cigar_word;

        let fwd = |pos: i64| Alignment { flag: 0x1, rid: 0, pos, cigar: vec![cigar_word(50, 0)], ..Default::default() };
        let rev = |pos: i64| Alignment { flag: 0x11, rid: 0, pos, is_rev: true, cigar: vec![cigar_word(50, 0)], ..Default::default() };

        assert_eq!(template_len(&fwd(100), &fwd(300)), 201);
        assert_eq!(template_len(&fwd(300), &fwd(100)), -201);
        assert_eq!(template_len(&rev(100), &fwd(300)), 152);
        assert_eq!(template_len(&fwd(300), &rev(100)), -152);
        assert_eq!(template_len(&fwd(100), &rev(300)), 250);
        assert_eq!(template_len(&rev(300), &fwd(100)), -250);
        assert_eq!(template_len(&fwd(100), &fwd(100)), 0);

        let other_contig = Alignment { rid: 1, ..fwd(300) };
        assert_eq!(template_len(&fwd(100), &other_contig), 0);

        let unmapped = Alignment { flag: 0x5, ..fwd(100) };
        assert_eq!(template_len(&unmapped, &fwd(300)), 0);
    }

    #[test]
    fn decode_mapped() {
        use super::decode;
        use crate::codec::Alignment;
        use crate::codec::AlignmentRecord;
        use crate::codec::cigar_word;
        use crate::codec::cursor::WordReader;

        let aln = Alignment {
            flag: 16, rid: 3, pos: 1000, is_rev: true, mapq: 17, nm: 2, score: 31, sub: 19,
            cigar: vec![cigar_word(4, 3), cigar_word(30, 0), cigar_word(1, 1), cigar_word(2, 2), cigar_word(5, 0)],
            md: "30^AC3T1".to_string(), xa: None,
        };
        let bytes = encode_to_vec(&aln, None);

        let expected = AlignmentRecord {
            sam_flag: 16, ref_id: 3, ref_start: 1000, ref_end: 1037, seq_start: 4, seq_end: 40,
            map_qual: 17, n_mismatches: 2, aligner_score: 31, suboptimal_score: 19,
            cigar: "4S30M1I2D5M".to_string(), md_tag: Some("30^AC3T1".to_string()), xa_tag: None,
            mate_ref_id: -1, mate_ref_start: -1, template_len: 0,
        };

        let mut reader = WordReader::new(&bytes);
        let got = decode(&mut reader).unwrap();

        assert_eq!(got, expected);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn decode_unmapped() {
        use super::decode;
        use crate::codec::AlignmentRecord;
        use crate::codec::cursor::WordReader;

        let bytes = (4_i32 << 16).to_ne_bytes();

        let expected = AlignmentRecord {
            sam_flag: 4, ref_id: -1, ref_start: -1, ref_end: -1, seq_start: -1, seq_end: -1,
            mate_ref_id: -1, mate_ref_start: -1, ..Default::default()
        };

        let got = decode(&mut WordReader::new(&bytes)).unwrap();

        assert_eq!(got, expected);
    }

    #[test]
    fn decode_paired() {
        use super::decode;
        use crate::codec::Alignment;
        use crate::codec::cigar_word;
        use crate::codec::cursor::WordReader;

        let read = Alignment { flag: 0x1 | 0x40, rid: 0, pos: 900, mapq: 60, cigar: vec![cigar_word(50, 0)], md: "50".to_string(), ..Default::default() };
        let mate = Alignment { flag: 0x1 | 0x80 | 0x10, rid: 0, pos: 700, is_rev: true, cigar: vec![cigar_word(50, 0)], ..Default::default() };
        let bytes = encode_to_vec(&read, Some(&mate));

        let got = decode(&mut WordReader::new(&bytes)).unwrap();

        assert_eq!(got.sam_flag, 0x41);
        assert_eq!(got.mate_ref_id, 0);
        assert_eq!(got.mate_ref_start, 700);
        assert_eq!(got.template_len, -152);
    }

    #[test]
    fn decode_truncated() {
        use super::decode;
        use crate::codec::cursor::WordReader;
        use crate::error::Error;

        let mut bytes: Vec<u8> = Vec::new();
        for word in [0_i32, 1, 2, 0, 5, 0, 2, 160] {
            bytes.extend_from_slice(&word.to_ne_bytes());
        }

        let got = decode(&mut WordReader::new(&bytes));

        assert!(matches!(got, Err(Error::MalformedBuffer(_))));
    }
}
