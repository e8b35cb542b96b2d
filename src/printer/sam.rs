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
use std::io::Write;
use std::num::NonZeroUsize;

use bstr::BString;
use indexmap::map::IndexMap;
use noodles_core::Position;
use noodles_sam::{
    self as sam,
    alignment::io::Write as _,
    alignment::record::{
        cigar::{op::Kind, Op},
        data::field::Tag,
        Flags, MappingQuality,
    },
    alignment::record_buf::{data::field::Value, Cigar, Data, QualityScores, Sequence},
    header::record::value::{map::ReferenceSequence, Map},
};

use crate::codec::AlignmentRecord;
use crate::codec::FLAG_REVERSE;
use crate::error::Error;
use crate::error::Result;
use crate::index::ContigAnn;

/// Builds a SAM header listing `contigs` as the reference sequences.
pub fn format_sam_header(
    contigs: &[ContigAnn],
) -> Result<sam::Header> {
    let refs = contigs.iter().map(|contig| -> Result<(BString, Map<ReferenceSequence>)> {
        let len = NonZeroUsize::new(contig.len.max(1) as usize).ok_or_else(|| {
            Error::InvalidArgument(format!("contig {} has no length", contig.name))
        })?;
        Ok((BString::from(contig.name.clone()), Map::<ReferenceSequence>::new(len)))
    }).collect::<Result<IndexMap<BString, Map<ReferenceSequence>>>>()?;

    Ok(
        sam::Header::builder()
            .set_header(Default::default())
            .set_reference_sequences(refs)
            .build()
    )
}

/// Writes `header` as SAM header lines.
pub fn write_sam_header<W: Write>(
    header: &sam::Header,
    conn: &mut W,
) -> Result<()> {
    let mut writer = sam::io::Writer::new(conn);
    writer.write_header(header).map_err(|e| Error::io("Failed to write the SAM header", e))?;
    Ok(())
}

fn reverse_complement(
    seq: &[u8],
) -> Vec<u8> {
    seq.iter().rev().map(|base| match base {
        b'A' | b'a' => b'T',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        b'T' | b't' => b'A',
        _ => b'N',
    }).collect()
}

fn sam_cigar(
    cigar: &str,
) -> Result<Cigar> {
    let mut ops: Vec<Op> = Vec::new();
    let mut len: usize = 0;
    for symbol in cigar.bytes() {
        if symbol.is_ascii_digit() {
            len = len * 10 + (symbol - b'0') as usize;
            continue;
        }
        let kind = match symbol {
            b'M' => Kind::Match,
            b'I' => Kind::Insertion,
            b'D' => Kind::Deletion,
            b'N' => Kind::Skip,
            b'S' => Kind::SoftClip,
            b'H' => Kind::HardClip,
            _ => return Err(Error::InvalidArgument(format!("unknown CIGAR operation in {}", cigar))),
        };
        ops.push(Op::new(kind, len));
        len = 0;
    }
    Ok(Cigar::from(ops))
}

fn position(
    start: i32,
) -> Option<Position> {
    usize::try_from(start).ok().and_then(|x| Position::new(x + 1))
}

/// Formats a single alignment record of a query as a SAM line.
///
/// `seq` and `qual` are given in sequencing orientation and are reversed
/// for alignments on the reverse strand. `qual` holds phred+33 characters.
/// Reference names are looked up in `header`, which must come from
/// [format_sam_header] of the same image.
///
pub fn format_sam_line<W: Write>(
    name: &str,
    seq: &[u8],
    qual: Option<&[u8]>,
    record: &AlignmentRecord,
    header: &sam::Header,
    conn: &mut W,
) -> Result<()> {
    let is_rev = record.sam_flag & FLAG_REVERSE != 0;
    let seq: Vec<u8> = if is_rev { reverse_complement(seq) } else { seq.to_vec() };
    let qual: Vec<u8> = match qual {
        Some(qual) if is_rev => qual.iter().rev().map(|x| x.saturating_sub(b'!')).collect(),
        Some(qual) => qual.iter().map(|x| x.saturating_sub(b'!')).collect(),
        None => Vec::new(),
    };

    let mut builder = sam::alignment::RecordBuf::builder()
        .set_name(name)
        .set_flags(Flags::from((record.sam_flag & 0xffff) as u16))
        .set_cigar(sam_cigar(&record.cigar)?)
        .set_template_length(record.template_len)
        .set_sequence(Sequence::from(seq))
        .set_quality_scores(QualityScores::from(qual));

    if let Ok(ref_id) = usize::try_from(record.ref_id) {
        builder = builder.set_reference_sequence_id(ref_id);
    }
    if let Some(start) = position(record.ref_start) {
        builder = builder.set_alignment_start(start);
    }
    if let Some(mapq) = u8::try_from(record.map_qual).ok().and_then(MappingQuality::new) {
        builder = builder.set_mapping_quality(mapq);
    }
    if let Ok(mate_ref_id) = usize::try_from(record.mate_ref_id) {
        builder = builder.set_mate_reference_sequence_id(mate_ref_id);
    }
    if let Some(mate_start) = position(record.mate_ref_start) {
        builder = builder.set_mate_alignment_start(mate_start);
    }

    if record.ref_id >= 0 {
        let mut data: Vec<(Tag, Value)> = vec![
            (Tag::EDIT_DISTANCE, Value::from(record.n_mismatches)),
            (Tag::ALIGNMENT_SCORE, Value::from(record.aligner_score)),
            (Tag::new(b'X', b'S'), Value::from(record.suboptimal_score)),
        ];
        if let Some(md) = &record.md_tag {
            data.push((Tag::MISMATCHED_POSITIONS, Value::from(md.as_str())));
        }
        if let Some(xa) = &record.xa_tag {
            data.push((Tag::new(b'X', b'A'), Value::from(xa.as_str())));
        }
        builder = builder.set_data(data.into_iter().collect::<Data>());
    }

    let mut writer = sam::io::Writer::new(conn);
    writer.write_alignment_record(header, &builder.build()).map_err(|e| Error::io("Failed to write a SAM record", e))?;
    Ok(())
}

// Tests
#[cfg(test)]
mod tests {

    fn contigs() -> Vec<crate::index::ContigAnn> {
        vec![
            crate::index::ContigAnn { name: "OZ038621.1".to_string(), len: 5000000, ..Default::default() },
            crate::index::ContigAnn { name: "plasmid".to_string(), offset: 5000000, len: 90000, ..Default::default() },
        ]
    }

    #[test]
    fn format_sam_line_aligned() {
        use super::format_sam_line;
        use crate::codec::AlignmentRecord;

        let record = AlignmentRecord {
            sam_flag: 16, ref_id: 0, ref_start: 4541507, ref_end: 4541519, seq_start: 0, seq_end: 12,
            map_qual: 60, n_mismatches: 0, aligner_score: 12, suboptimal_score: 0,
            cigar: "12M".to_string(), md_tag: Some("12".to_string()), xa_tag: None,
            mate_ref_id: -1, mate_ref_start: -1, template_len: 0,
        };

        let expected: Vec<u8> = b"ERR4035126.1\t16\tOZ038621.1\t4541508\t60\t12M\t*\t0\t0\tGCCTTAGTAAGT\tJJJFFJ<<FJAA\tNM:i:0\tAS:i:12\tXS:i:0\tMD:Z:12\n".to_vec();

        let mut got: Vec<u8> = Vec::new();
        let header = super::format_sam_header(&contigs()).unwrap();
        format_sam_line("ERR4035126.1", b"ACTTACTAAGGC", Some(b"AAJF<<JFFJJJ"), &record, &header, &mut got).unwrap();

        assert_eq!(got, expected)
    }

    #[test]
    fn format_sam_line_unmapped_with_mate() {
        use super::format_sam_line;
        use crate::codec::AlignmentRecord;

        let record = AlignmentRecord {
            sam_flag: 0x1 | 0x4 | 0x80, ref_id: -1, ref_start: -1, ref_end: -1, seq_start: -1, seq_end: -1,
            mate_ref_id: 1, mate_ref_start: 99, ..Default::default()
        };

        let expected: Vec<u8> = b"r2\t133\t*\t0\t0\t*\tplasmid\t100\t0\tACGT\t*\n".to_vec();

        let mut got: Vec<u8> = Vec::new();
        let header = super::format_sam_header(&contigs()).unwrap();
        format_sam_line("r2", b"ACGT", None, &record, &header, &mut got).unwrap();

        assert_eq!(got, expected)
    }

    #[test]
    fn format_sam_line_paired_with_alternatives() {
        use super::format_sam_line;
        use super::format_sam_header;
        use crate::codec::AlignmentRecord;

        let record = AlignmentRecord {
            sam_flag: 0x1 | 0x2 | 0x20 | 0x40, ref_id: 1, ref_start: 9, ref_end: 17, seq_start: 2, seq_end: 8,
            map_qual: 3, n_mismatches: 1, aligner_score: 4, suboptimal_score: 4,
            cigar: "2S6M".to_string(), md_tag: Some("3C2".to_string()), xa_tag: Some("OZ038621.1,-101,6M,1;".to_string()),
            mate_ref_id: 1, mate_ref_start: 39, template_len: 36,
        };

        let expected: Vec<u8> = b"r1\t99\tplasmid\t10\t3\t2S6M\t=\t40\t36\tGGACGTAA\tIIIIIIII\tNM:i:1\tAS:i:4\tXS:i:4\tMD:Z:3C2\tXA:Z:OZ038621.1,-101,6M,1;\n".to_vec();

        let header = format_sam_header(&contigs()).unwrap();
        let mut got: Vec<u8> = Vec::new();
        format_sam_line("r1", b"GGACGTAA", Some(b"IIIIIIII"), &record, &header, &mut got).unwrap();

        assert_eq!(got, expected)
    }

    #[test]
    fn format_sam_line_bad_cigar() {
        use super::format_sam_line;
        use super::format_sam_header;
        use crate::codec::AlignmentRecord;
        use crate::error::Error;

        let record = AlignmentRecord { ref_id: 0, ref_start: 0, cigar: "4Q".to_string(), ..Default::default() };

        let header = format_sam_header(&contigs()).unwrap();
        let mut got: Vec<u8> = Vec::new();
        let res = format_sam_line("r1", b"ACGT", None, &record, &header, &mut got);

        assert!(matches!(res, Err(Error::InvalidArgument(_))));
        assert!(got.is_empty());
    }

    #[test]
    fn format_sam_header() {
        use super::format_sam_header;
        use super::write_sam_header;

        let header = format_sam_header(&contigs()).unwrap();

        let mut got: Vec<u8> = Vec::new();
        write_sam_header(&header, &mut got).unwrap();
        let got = String::from_utf8(got).unwrap();

        assert_eq!(header.reference_sequences().len(), 2);
        assert!(got.contains("@SQ\tSN:OZ038621.1\tLN:5000000\n"));
        assert!(got.contains("@SQ\tSN:plasmid\tLN:90000\n"));
    }
}
