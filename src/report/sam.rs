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
use std::fmt::Write;

use crate::opts::RunOpts;
use crate::read::Alignment;
use crate::read::QueryRead;
use crate::read::References;
use crate::read::calc_miss_gap_match;
use crate::read::decode_cigar_op;
use crate::refstats::RefStatsEntry;

use super::ReportError;

type E = Box<dyn std::error::Error>;

/// Flag of a read aligned on the reverse strand.
pub const FLAG_REVERSE: u16 = 16;
/// Flag of a read that did not align.
pub const FLAG_UNMAPPED: u16 = 4;
/// Mapping quality written for every record.
pub const MAPQ_UNAVAILABLE: u8 = 255;

/// Formats the operations of `aln` with soft clips for the unaligned ends.
pub fn format_cigar(
    read_len: usize,
    aln: &Alignment,
) -> String {
    let mut cigar = String::new();
    if aln.read_begin1 != 0 {
        let _ = write!(cigar, "{}S", aln.read_begin1);
    }
    for packed in aln.cigar.iter() {
        let (len, op) = decode_cigar_op(*packed);
        let _ = write!(cigar, "{}{}", len, op.letter());
    }
    let end_mask = read_len.saturating_sub(aln.read_end1 as usize + 1);
    if end_mask > 0 {
        let _ = write!(cigar, "{}S", end_mask);
    }
    cigar
}

/// Line for a read that did not align.
pub fn format_unaligned(
    read: &QueryRead,
) -> String {
    format!("{}\t{}\t*\t0\t0\t*\t*\t0\t0\t*\t*\n", read.seq_id(), FLAG_UNMAPPED)
}

/// Formats one alignment of `read` against the loaded references.
///
/// Terminates with [ReportError::UnknownReference] if the target of `aln`
/// is not in `refs`.
pub fn format_sam_record(
    read: &QueryRead,
    aln: &Alignment,
    refs: &References,
) -> Result<String, E> {
    let unknown = || ReportError::UnknownReference{ ref_num: aln.ref_num, loaded: refs.buffer.len() };
    let target = refs.buffer.get(aln.ref_num as usize).ok_or_else(unknown)?;
    let (mismatches, gaps, _) = calc_miss_gap_match(read, refs, aln).ok_or_else(unknown)?;

    let flag: u16 = if aln.strand { 0 } else { FLAG_REVERSE };
    let seq = read.sequence_for(aln);
    let qual = read.quality_for(aln).unwrap_or(b"*".to_vec());

    let mut line = String::new();
    let _ = write!(line, "{}\t{}\t{}\t{}\t{}\t", read.seq_id(), flag, target.id, aln.ref_begin1 + 1, MAPQ_UNAVAILABLE);
    line += &format_cigar(read.sequence.len(), aln);
    line += "\t*\t0\t0\t";
    line += &String::from_utf8_lossy(&seq);
    line += "\t";
    line += &String::from_utf8_lossy(&qual);
    let _ = writeln!(line, "\tAS:i:{}\tNM:i:{}", aln.score1, mismatches + gaps);

    Ok(line)
}

/// Formats every alignment of `read` that points into the loaded references.
///
/// A read with no alignments gets an unaligned line if
/// [RunOpts::is_print_all_reads] is set, otherwise nothing.
pub fn format_read(
    read: &QueryRead,
    refs: &References,
    opts: &RunOpts,
) -> Result<String, E> {
    if read.alignments.is_empty() {
        if opts.is_print_all_reads {
            return Ok(format_unaligned(read));
        }
        return Ok(String::new());
    }

    let mut text = String::new();
    for aln in read.alignments.iter().filter(|aln| refs.is_loaded(aln)) {
        text += &format_sam_record(read, aln, refs)?;
    }
    Ok(text)
}

/// Formats the header block.
///
/// `entries` holds the reference sequences of each database; their @SQ
/// lines are written only if [RunOpts::is_sq] is set.
pub fn format_sam_header(
    entries: &[Vec<RefStatsEntry>],
    opts: &RunOpts,
) -> String {
    let mut header = String::from("@HD\tVN:1.0\tSO:unsorted\n");
    if opts.is_sq {
        entries.iter().flatten().for_each(|entry| {
            let _ = writeln!(header, "@SQ\tSN:{}\tLN:{}", entry.id, entry.len);
        });
    }
    let _ = writeln!(header, "@PG\tID:{}\tVN:1.0\tCL:{}", opts.program_id, opts.cmdline);
    header
}
