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

//! Single pass record counter for FASTA and FASTQ read files.
//!
//! [Scanner] reads its input line by line and reconstructs the records
//! without keeping them. The format is decided from the first non-empty line:
//! `>` selects FASTA and `@` selects FASTQ. Anything else is an error.
//!
//! FASTA records end at the next header line and their sequence may span
//! several lines. FASTQ records are exactly four lines long; the separator
//! line is skipped and the quality line is kept apart from the sequence.
//!
//! [Scanner::next_record] yields the records one at a time and
//! [Scanner::scan] only counts them.
//!
//! Every line is right-trimmed of ASCII whitespace (this removes `\r` from
//! files with Windows line endings) and empty lines are ignored.
//!
//! ## Usage
//!
//! ```rust
//! use readstats::scanner::{Scanner, SeqFormat};
//! use std::io::Cursor;
//!
//! let input = b">r1\nACGTACGTAC\n>r2\nACGTA\nCGTACGTAC\n".to_vec();
//! let mut scanner = Scanner::new(Cursor::new(input));
//!
//! let (n_reads, n_bases) = scanner.scan().unwrap();
//!
//! assert_eq!(scanner.format(), Some(SeqFormat::Fasta));
//! assert_eq!((n_reads, n_bases), (2, 24));
//! ```
//!

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use bstr::ByteSlice;
use flate2::read::MultiGzDecoder;

type E = Box<dyn std::error::Error>;

/// First byte of a FASTA header line.
pub const FASTA_HEADER_START: u8 = b'>';
/// First byte of a FASTQ header line.
pub const FASTQ_HEADER_START: u8 = b'@';

const FASTQ_SEPARATOR_START: u8 = b'+';
const FASTQ_RECORD_LINES: usize = 4;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Read file formats.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqFormat {
    Fasta,
    Fastq,
}

impl SeqFormat {
    /// Default file suffix for aligned reads in this format.
    pub fn suffix(&self) -> &'static str {
        match self {
            SeqFormat::Fasta => "fasta",
            SeqFormat::Fastq => "fastq",
        }
    }
}

/// Classifies a read file from the first byte of its first non-empty line.
pub fn guess_format(
    first_byte: u8,
) -> Option<SeqFormat> {
    match first_byte {
        FASTA_HEADER_START => Some(SeqFormat::Fasta),
        FASTQ_HEADER_START => Some(SeqFormat::Fastq),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct OpenError {
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Failed to open reads file {}: {}", self.path.display(), self.reason)
    }
}

impl std::error::Error for OpenError {}

/// Malformed read file.
///
/// Carries the offending line and the counters at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The first non-empty line starts with neither `>` nor `@`.
    NotAHeader {
        line: String,
    },
    /// A FASTQ record runs past four lines, ie. a header was expected but not found.
    FastqRecordLength {
        line: String,
        n_reads: u64,
        n_lines: u64,
    },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ScanError::NotAHeader { line } => {
                write!(f, "the line [{}] is not a FASTA/FASTQ header", line)
            },
            ScanError::FastqRecordLength { line, n_reads, n_lines } => {
                write!(f, "the line [{}] is not a FASTQ header, more than {} lines in a single FASTQ read. Reads processed: {} lines read: {}",
                       line, FASTQ_RECORD_LINES, n_reads, n_lines)
            },
        }
    }
}

impl std::error::Error for ScanError {}

/// Opens a read file for [Scanner], decompressing it when it is gzipped.
///
/// Gzip input is detected from `is_gz` or from the magic bytes of the file.
/// Returns the reader and whether the file is decompressed.
pub fn open_reads(
    path: &Path,
    is_gz: bool,
) -> Result<(Box<dyn BufRead>, bool), E> {
    let file = File::open(path).map_err(|err| {
        OpenError{ path: path.to_path_buf(), reason: err.to_string() }
    })?;
    let mut reader = BufReader::new(file);
    let has_magic = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    if is_gz || has_magic {
        Ok((Box::new(BufReader::new(MultiGzDecoder::new(reader))), true))
    } else {
        Ok((Box::new(reader), false))
    }
}

/// One record reconstructed by [Scanner].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub sequence: Vec<u8>,
    /// Quality line of a FASTQ record, None for FASTA.
    pub quality: Option<Vec<u8>>,
    pub format: SeqFormat,
}

impl ReadRecord {
    fn new(format: SeqFormat) -> Self {
        ReadRecord{ sequence: Vec::new(), quality: None, format }
    }
}

pub struct Scanner<R: BufRead> {
    reader: R,
    format: Option<SeqFormat>,
    line: Vec<u8>,

    // Record being reconstructed.
    pending: Option<ReadRecord>,
    // fastq: 0 (header), 1 (sequence), 2 (+), 3 (quality)
    fastq_line: usize,

    n_reads: u64,
    n_bases: u64,
    n_lines: u64,
}

impl<R: BufRead> Scanner<R> {
    pub fn new(
        reader: R,
    ) -> Self {
        Scanner{
            reader, format: None, line: Vec::new(),
            pending: None, fastq_line: 0,
            n_reads: 0, n_bases: 0, n_lines: 0,
        }
    }

    /// Format detected from the first line, None before any record is read or on empty input.
    pub fn format(&self) -> Option<SeqFormat> {
        self.format
    }

    /// Number of non-empty lines consumed so far.
    pub fn lines_read(&self) -> u64 {
        self.n_lines
    }

    /// Reads the input to the end.
    ///
    /// Returns the number of reads and the total number of bases in them.
    ///
    /// ## Errors
    ///
    /// Returns a [ScanError] on the first line that breaks the format, and
    /// any I/O error from the underlying reader. The counts are not usable
    /// after an error.
    ///
    pub fn scan(
        &mut self,
    ) -> Result<(u64, u64), E> {
        while self.next_record()?.is_some() {}
        Ok((self.n_reads, self.n_bases))
    }

    /// Reads the next record, None at the end of the input.
    ///
    /// Records without sequence are skipped and not counted.
    pub fn next_record(
        &mut self,
    ) -> Result<Option<ReadRecord>, E> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(self.take_pending());
            }

            let trimmed = self.line.trim_end_with(|c| c.is_ascii_whitespace());
            if trimmed.is_empty() {
                continue;
            }
            self.n_lines += 1;

            let format = match self.format {
                Some(format) => format,
                None => {
                    let format = guess_format(trimmed[0]).ok_or_else(|| {
                        ScanError::NotAHeader{ line: trimmed.to_str_lossy().to_string() }
                    })?;
                    self.format = Some(format);
                    format
                },
            };

            match format {
                SeqFormat::Fasta => {
                    if trimmed[0] == FASTA_HEADER_START {
                        let finished = self.take_pending();
                        self.pending = Some(ReadRecord::new(format));
                        if finished.is_some() {
                            return Ok(finished);
                        }
                    } else if let Some(record) = self.pending.as_mut() {
                        record.sequence.extend_from_slice(trimmed);
                    }
                },
                SeqFormat::Fastq => {
                    if self.fastq_line == FASTQ_RECORD_LINES {
                        if trimmed[0] != FASTQ_HEADER_START {
                            return Err(Box::new(ScanError::FastqRecordLength{
                                line: trimmed.to_str_lossy().to_string(),
                                n_reads: self.n_reads,
                                n_lines: self.n_lines,
                            }));
                        }
                        self.fastq_line = 0;
                    }

                    let fastq_line = self.fastq_line;
                    self.fastq_line += 1;
                    if fastq_line == 0 {
                        let finished = self.take_pending();
                        self.pending = Some(ReadRecord::new(format));
                        if finished.is_some() {
                            return Ok(finished);
                        }
                    } else if let Some(record) = self.pending.as_mut() {
                        if fastq_line == FASTQ_RECORD_LINES - 1 {
                            record.quality = Some(trimmed.to_vec());
                        } else if trimmed[0] != FASTQ_SEPARATOR_START {
                            record.sequence.extend_from_slice(trimmed);
                        }
                    }
                },
            }
        }
    }

    fn take_pending(
        &mut self,
    ) -> Option<ReadRecord> {
        let record = self.pending.take().filter(|record| !record.sequence.is_empty())?;
        self.n_reads += 1;
        self.n_bases += record.sequence.len() as u64;
        Some(record)
    }
}
