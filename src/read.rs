// readstats: Read statistics and alignment reports for rRNA read filtering.
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

//! Reads, their alignments and the loaded reference sequences.
//!
//! Alignments are produced elsewhere; this module only holds them and
//! derives the values the report needs from them.

/// Operation of one packed alignment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    Match,
    Insertion,
    Deletion,
}

impl CigarOp {
    pub fn letter(&self) -> char {
        match self {
            CigarOp::Match => 'M',
            CigarOp::Insertion => 'I',
            CigarOp::Deletion => 'D',
        }
    }
}

/// Splits a packed operation into its run length and kind.
///
/// The low 4 bits give the kind, 0 for a match and 1 for an insertion. Any
/// other value is a deletion.
pub fn decode_cigar_op(
    packed: u32,
) -> (u32, CigarOp) {
    let len = (packed & 0xfffffff0) >> 4;
    let op = match packed & 0xf {
        0 => CigarOp::Match,
        1 => CigarOp::Insertion,
        _ => CigarOp::Deletion,
    };
    (len, op)
}

/// Packs a run length and kind, inverse of [decode_cigar_op].
pub fn encode_cigar_op(
    len: u32,
    op: CigarOp,
) -> u32 {
    let kind: u32 = match op {
        CigarOp::Match => 0,
        CigarOp::Insertion => 1,
        CigarOp::Deletion => 2,
    };
    (len << 4) | kind
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    /// Reference database.
    pub index_num: u16,
    /// Part of the reference database index.
    pub part: u16,
    /// True if the read aligned on the forward strand.
    pub strand: bool,
    /// Reference sequence within the loaded part.
    pub ref_num: u32,
    /// 0-based start on the reference.
    pub ref_begin1: u32,
    pub ref_end1: u32,
    /// 0-based start on the read.
    pub read_begin1: u32,
    /// 0-based inclusive end on the read.
    pub read_end1: u32,
    /// Packed operations, see [decode_cigar_op].
    pub cigar: Vec<u32>,
    pub score1: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRead {
    /// Header line, with or without the leading '>' or '@'.
    pub id: String,
    pub sequence: Vec<u8>,
    pub quality: Option<Vec<u8>>,
    /// The sequence is stored reverse complemented.
    pub reversed: bool,
    pub alignments: Vec<Alignment>,
}

impl QueryRead {
    /// Read id: the header up to the first whitespace, without the header start.
    pub fn seq_id(&self) -> &str {
        let id = self.id.trim_start_matches(['>', '@']);
        id.split_ascii_whitespace().next().unwrap_or("")
    }

    /// Sequence in the orientation of `aln`.
    ///
    /// Reverse complemented when the alignment is on the reverse strand and
    /// the stored sequence is not reversed, or the other way around.
    pub fn sequence_for(
        &self,
        aln: &Alignment,
    ) -> Vec<u8> {
        if !aln.strand ^ self.reversed {
            reverse_complement(&self.sequence)
        } else {
            self.sequence.clone()
        }
    }

    /// Quality in the orientation of `aln`, None for FASTA reads.
    pub fn quality_for(
        &self,
        aln: &Alignment,
    ) -> Option<Vec<u8>> {
        let quality = self.quality.as_ref().filter(|x| !x.is_empty())?;
        if aln.strand {
            Some(quality.clone())
        } else {
            Some(quality.iter().rev().copied().collect())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSeq {
    pub id: String,
    pub sequence: Vec<u8>,
}

/// Reference sequences of the index part currently loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    /// Reference database.
    pub num: u16,
    /// Part of the reference database index.
    pub part: u16,
    pub buffer: Vec<RefSeq>,
}

impl References {
    /// Whether `aln` points into the loaded part.
    pub fn is_loaded(
        &self,
        aln: &Alignment,
    ) -> bool {
        aln.index_num == self.num && aln.part == self.part
    }
}

pub fn reverse_complement(
    seq: &[u8],
) -> Vec<u8> {
    seq.iter().rev().map(|x| needletail::sequence::complement(*x)).collect()
}

/// Counts mismatches, gap length and matches of `aln` against its reference.
///
/// Bases past the end of either sequence count as mismatches. Returns None if
/// `aln` refers to a reference sequence that is not loaded.
pub fn calc_miss_gap_match(
    read: &QueryRead,
    refs: &References,
    aln: &Alignment,
) -> Option<(u32, u32, u32)> {
    let ref_seq = &refs.buffer.get(aln.ref_num as usize)?.sequence;
    let read_seq = read.sequence_for(aln);

    let mut ref_pos = aln.ref_begin1 as usize;
    let mut read_pos = aln.read_begin1 as usize;
    let mut mismatches: u32 = 0;
    let mut gaps: u32 = 0;
    let mut matches: u32 = 0;

    for packed in aln.cigar.iter() {
        let (len, op) = decode_cigar_op(*packed);
        match op {
            CigarOp::Match => {
                for _ in 0..len {
                    let same = match (ref_seq.get(ref_pos), read_seq.get(read_pos)) {
                        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
                        _ => false,
                    };
                    if same {
                        matches += 1;
                    } else {
                        mismatches += 1;
                    }
                    ref_pos += 1;
                    read_pos += 1;
                }
            },
            CigarOp::Insertion => {
                gaps += len;
                read_pos += len as usize;
            },
            CigarOp::Deletion => {
                gaps += len;
                ref_pos += len as usize;
            },
        }
    }

    Some((mismatches, gaps, matches))
}
