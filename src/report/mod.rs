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

//! Alignment report in SAM format, one file per input split.
//!
//! Each split has its own [SplitWriter] with its own output file and, if the
//! report is compressed, its own gzip stream. Workers processing different
//! splits can hold their writers at the same time through
//! [SamReport::split_writers_mut]; nothing is shared between splits.
//!
//! The header is written to the first split only.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use readstats::opts::RunOpts;
//! use readstats::read::QueryRead;
//! use readstats::read::References;
//! use readstats::report::SamReport;
//!
//! let opts = RunOpts::default();
//! let mut report = SamReport::init(2, &opts, false).unwrap();
//! report.write_header(&opts).unwrap();
//!
//! let refs = References::default();
//! std::thread::scope(|scope| {
//!     for writer in report.split_writers_mut().iter_mut() {
//!         let (refs, opts) = (&refs, &opts);
//!         scope.spawn(move || {
//!             let read = QueryRead::default();
//!             writer.append(&read, refs, opts).unwrap();
//!         });
//!     }
//! });
//!
//! report.finish().unwrap();
//! ```
//!

pub mod sam;

use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::opts::RunOpts;
use crate::read::QueryRead;
use crate::read::References;
use crate::refstats::RefStatsEntry;
use crate::refstats::read_header_entries_from_path;

use sam::format_read;
use sam::format_sam_header;

type E = Box<dyn std::error::Error>;

/// Extension of the report files before the optional `.gz`.
pub const REPORT_EXT: &str = ".sam";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    SplitOutOfRange{ split: usize, num_splits: usize },
    UnknownReference{ ref_num: u32, loaded: usize },
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ReportError::SplitOutOfRange{ split, num_splits } =>
                write!(f, "split {} is out of range, the report has {} splits", split, num_splits),
            ReportError::UnknownReference{ ref_num, loaded } =>
                write!(f, "alignment points to reference {} but {} references are loaded", ref_num, loaded),
        }
    }
}

impl std::error::Error for ReportError {}

enum SplitWriterInner {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

/// Output stream of one split.
///
/// Dropping the writer finalizes the stream; [finish](SplitWriter::finish)
/// does the same and reports errors.
pub struct SplitWriter {
    path: PathBuf,
    inner: SplitWriterInner,
}

impl SplitWriter {
    pub fn create(
        path: &Path,
        is_zip: bool,
    ) -> Result<Self, E> {
        log::debug!("Opening report file {}", path.display());
        let conn = BufWriter::new(File::create(path)?);
        let inner = if is_zip {
            SplitWriterInner::Gz(GzEncoder::new(conn, Compression::default()))
        } else {
            SplitWriterInner::Plain(conn)
        };
        Ok(SplitWriter{ path: path.to_path_buf(), inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_zip(&self) -> bool {
        matches!(self.inner, SplitWriterInner::Gz(_))
    }

    /// Writes `text` to the stream.
    ///
    /// A failure to compress is logged and the text is dropped; the run
    /// continues.
    pub fn write_text(
        &mut self,
        text: &str,
    ) -> Result<(), E> {
        match &mut self.inner {
            SplitWriterInner::Plain(conn) => conn.write_all(text.as_bytes())?,
            SplitWriterInner::Gz(conn) => {
                if let Err(err) = conn.write_all(text.as_bytes()) {
                    log::error!("Failed deflating readstring: {} zlib status: {}", text.trim_end(), err);
                }
            },
        }
        Ok(())
    }

    /// Writes the report lines of `read` for the loaded references.
    pub fn append(
        &mut self,
        read: &QueryRead,
        refs: &References,
        opts: &RunOpts,
    ) -> Result<(), E> {
        let text = format_read(read, refs, opts)?;
        if !text.is_empty() {
            self.write_text(&text)?;
        }
        Ok(())
    }

    /// Flushes the stream and writes the gzip trailer.
    pub fn finish(
        self,
    ) -> Result<(), E> {
        match self.inner {
            SplitWriterInner::Plain(mut conn) => conn.flush()?,
            SplitWriterInner::Gz(conn) => conn.finish()?.flush()?,
        }
        Ok(())
    }
}

/// Name of the report file for split `split`.
///
/// `<aligned_pfx>_<split>[_<pid>].sam[.gz]`
pub fn report_path(
    opts: &RunOpts,
    split: usize,
    is_zip: bool,
) -> PathBuf {
    let mut name = opts.aligned_pfx.to_string_lossy().to_string();
    name += &format!("_{}", split);
    if opts.is_pid {
        name += &format!("_{}", std::process::id());
    }
    name += REPORT_EXT;
    if is_zip {
        name += ".gz";
    }
    PathBuf::from(name)
}

/// Reads the @SQ entries of every configured database.
///
/// Returns nothing if [RunOpts::is_sq] is not set.
pub fn load_header_entries(
    opts: &RunOpts,
) -> Result<Vec<Vec<RefStatsEntry>>, E> {
    if !opts.is_sq {
        return Ok(Vec::new());
    }
    let mut entries: Vec<Vec<RefStatsEntry>> = Vec::with_capacity(opts.num_dbs());
    for db in 0..opts.num_dbs() {
        if let Some(path) = opts.stats_path(db) {
            entries.push(read_header_entries_from_path(&path)?);
        }
    }
    Ok(entries)
}

pub struct SamReport {
    writers: Box<[SplitWriter]>,
}

impl SamReport {
    /// Creates one report file per split.
    ///
    /// The report is compressed if [RunOpts::zip_out] says so, or when it is
    /// unset and the input is gzipped.
    pub fn init(
        num_splits: usize,
        opts: &RunOpts,
        input_is_gz: bool,
    ) -> Result<Self, E> {
        let is_zip = opts.is_zip_output(input_is_gz);
        let writers = (0..num_splits).map(|split| {
            SplitWriter::create(&report_path(opts, split, is_zip), is_zip)
        }).collect::<Result<Vec<SplitWriter>, E>>()?;

        log::info!("Writing alignments to {} report files", writers.len());
        Ok(SamReport{ writers: writers.into_boxed_slice() })
    }

    pub fn num_splits(&self) -> usize {
        self.writers.len()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.writers.iter().map(|x| x.path().to_path_buf()).collect()
    }

    /// Writes the header to the first split.
    ///
    /// The @SQ lines come from the reference stats file of each database.
    pub fn write_header(
        &mut self,
        opts: &RunOpts,
    ) -> Result<(), E> {
        let entries = load_header_entries(opts)?;
        self.write_header_entries(&entries, opts)
    }

    pub fn write_header_entries(
        &mut self,
        entries: &[Vec<RefStatsEntry>],
        opts: &RunOpts,
    ) -> Result<(), E> {
        let header = format_sam_header(entries, opts);
        self.split_writer_mut(0)?.write_text(&header)
    }

    pub fn split_writer_mut(
        &mut self,
        split: usize,
    ) -> Result<&mut SplitWriter, ReportError> {
        let num_splits = self.writers.len();
        self.writers.get_mut(split).ok_or(ReportError::SplitOutOfRange{ split, num_splits })
    }

    /// Writers of all splits, for handing one to each worker.
    pub fn split_writers_mut(&mut self) -> &mut [SplitWriter] {
        &mut self.writers
    }

    /// Writes the report lines of `read` to split `split`.
    pub fn append(
        &mut self,
        split: usize,
        read: &QueryRead,
        refs: &References,
        opts: &RunOpts,
    ) -> Result<(), E> {
        self.split_writer_mut(split)?.append(read, refs, opts)
    }

    /// Finalizes every split.
    ///
    /// All splits are finalized even if one fails; the first error is returned.
    pub fn finish(
        self,
    ) -> Result<(), E> {
        let mut first_err: Option<E> = None;
        for writer in self.writers.into_vec() {
            let path = writer.path().to_path_buf();
            if let Err(err) = writer.finish() {
                log::error!("Failed to finalize report file {}: {}", path.display(), err);
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// Tests
#[cfg(test)]
mod tests {

    fn aligned_read(split: usize) -> crate::read::QueryRead {
        use crate::read::Alignment;
        use crate::read::QueryRead;
        use crate::read::encode_cigar_op;
        use crate::read::CigarOp;

        QueryRead{
            id: format!("@s{}.r1", split),
            sequence: b"ACGTACGT".to_vec(),
            quality: Some(b"FFFFFFFF".to_vec()),
            alignments: vec![Alignment{
                index_num: 0, part: 0, strand: true, ref_num: 0,
                ref_begin1: 0, ref_end1: 7, read_begin1: 0, read_end1: 7,
                cigar: vec![encode_cigar_op(8, CigarOp::Match)], score1: 16,
            }],
            ..Default::default()
        }
    }

    fn one_ref() -> crate::read::References {
        use crate::read::RefSeq;
        use crate::read::References;

        References{ num: 0, part: 0, buffer: vec![RefSeq{ id: "ref1".to_string(), sequence: b"ACGTACGT".to_vec() }] }
    }

    #[test]
    fn report_path_naming() {
        use super::report_path;
        use crate::opts::RunOpts;
        use std::path::PathBuf;

        let opts = RunOpts{ aligned_pfx: PathBuf::from("out/aligned"), ..Default::default() };
        assert_eq!(report_path(&opts, 0, false), PathBuf::from("out/aligned_0.sam"));
        assert_eq!(report_path(&opts, 3, true), PathBuf::from("out/aligned_3.sam.gz"));

        let opts = RunOpts{ aligned_pfx: PathBuf::from("a"), is_pid: true, ..Default::default() };
        let expected = PathBuf::from(format!("a_1_{}.sam", std::process::id()));
        assert_eq!(report_path(&opts, 1, false), expected);
    }

    #[test]
    fn header_goes_to_first_split() {
        use super::SamReport;
        use crate::opts::RunOpts;
        use crate::refstats::RefStatsEntry;

        let tmp = tempfile::tempdir().unwrap();
        let opts = RunOpts{
            aligned_pfx: tmp.path().join("aligned"),
            cmdline: "readstats".to_string(),
            program_id: "readstats".to_string(),
            ..Default::default()
        };

        let mut report = SamReport::init(2, &opts, false).unwrap();
        let entries = vec![vec![RefStatsEntry{ id: "ref1".to_string(), len: 8 }]];
        report.write_header_entries(&entries, &opts).unwrap();
        report.append(1, &aligned_read(1), &one_ref(), &opts).unwrap();
        let paths = report.paths();
        report.finish().unwrap();

        let got = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(got, "@HD\tVN:1.0\tSO:unsorted\n@SQ\tSN:ref1\tLN:8\n@PG\tID:readstats\tVN:1.0\tCL:readstats\n");

        let got = std::fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(got, "s1.r1\t0\tref1\t1\t255\t8M\t*\t0\t0\tACGTACGT\tFFFFFFFF\tAS:i:16\tNM:i:0\n");
    }

    #[test]
    fn header_from_sidecar() {
        use super::SamReport;
        use crate::opts::RunOpts;
        use crate::refstats::RefStats;
        use crate::refstats::RefStatsEntry;
        use crate::refstats::write_ref_stats;
        use std::path::PathBuf;

        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("idx");
        let stats = RefStats{
            file_size: 0, fasta_name: "ref.fa".to_string(), background_freq: [0.25; 4],
            full_len: 8, seed_win_len: 18, num_seq: 1, parts: vec![],
            entries: vec![RefStatsEntry{ id: "ref1".to_string(), len: 8 }],
        };
        let mut conn = std::fs::File::create(tmp.path().join("idx.stats")).unwrap();
        write_ref_stats(&stats, &mut conn).unwrap();

        let opts = RunOpts{
            aligned_pfx: tmp.path().join("aligned"),
            indexfiles: vec![(PathBuf::from("ref.fa"), prefix)],
            program_id: "readstats".to_string(),
            ..Default::default()
        };
        let mut report = SamReport::init(1, &opts, false).unwrap();
        report.write_header(&opts).unwrap();
        let paths = report.paths();
        report.finish().unwrap();

        let got = std::fs::read_to_string(&paths[0]).unwrap();
        assert!(got.contains("@SQ\tSN:ref1\tLN:8\n"));
    }

    #[test]
    fn gzipped_splits_written_in_parallel() {
        use super::SamReport;
        use crate::opts::RunOpts;
        use flate2::read::MultiGzDecoder;
        use std::io::Read;

        let tmp = tempfile::tempdir().unwrap();
        let opts = RunOpts{ aligned_pfx: tmp.path().join("aligned"), ..Default::default() };
        let refs = one_ref();

        let mut report = SamReport::init(4, &opts, true).unwrap();
        std::thread::scope(|scope| {
            for (split, writer) in report.split_writers_mut().iter_mut().enumerate() {
                let (refs, opts) = (&refs, &opts);
                scope.spawn(move || {
                    for _ in 0..100 {
                        writer.append(&aligned_read(split), refs, opts).unwrap();
                    }
                });
            }
        });
        let paths = report.paths();
        report.finish().unwrap();

        for (split, path) in paths.iter().enumerate() {
            assert!(path.to_string_lossy().ends_with(".sam.gz"));
            let mut got = String::new();
            MultiGzDecoder::new(std::fs::File::open(path).unwrap()).read_to_string(&mut got).unwrap();
            assert_eq!(got.lines().count(), 100);
            assert!(got.lines().all(|line| line.starts_with(&format!("s{}.r1\t", split))));
        }
    }

    #[test]
    fn dropped_gzip_report_is_complete() {
        use super::ReportError;
        use super::SamReport;
        use crate::opts::RunOpts;
        use crate::refstats::RefStatsEntry;
        use flate2::read::MultiGzDecoder;
        use std::io::Read;

        let tmp = tempfile::tempdir().unwrap();
        let opts = RunOpts{
            aligned_pfx: tmp.path().join("aligned"),
            zip_out: Some(true),
            cmdline: "readstats".to_string(),
            program_id: "readstats".to_string(),
            ..Default::default()
        };

        let paths = {
            let mut report = SamReport::init(2, &opts, false).unwrap();
            let entries = vec![vec![RefStatsEntry{ id: "ref1".to_string(), len: 8 }]];
            report.write_header_entries(&entries, &opts).unwrap();
            report.append(0, &aligned_read(0), &one_ref(), &opts).unwrap();

            let got = report.append(5, &aligned_read(0), &one_ref(), &opts).unwrap_err();
            assert_eq!(got.downcast_ref::<ReportError>(), Some(&ReportError::SplitOutOfRange{ split: 5, num_splits: 2 }));
            report.paths()
        };

        let mut got = String::new();
        MultiGzDecoder::new(std::fs::File::open(&paths[0]).unwrap()).read_to_string(&mut got).unwrap();
        let expected = "@HD\tVN:1.0\tSO:unsorted\n@SQ\tSN:ref1\tLN:8\n@PG\tID:readstats\tVN:1.0\tCL:readstats\n".to_string() +
            "s0.r1\t0\tref1\t1\t255\t8M\t*\t0\t0\tACGTACGT\tFFFFFFFF\tAS:i:16\tNM:i:0\n";
        assert_eq!(got, expected);

        let mut got = String::new();
        MultiGzDecoder::new(std::fs::File::open(&paths[1]).unwrap()).read_to_string(&mut got).unwrap();
        assert_eq!(got, "");
    }

    #[test]
    fn append_out_of_range_split() {
        use super::ReportError;
        use super::SamReport;
        use crate::opts::RunOpts;

        let tmp = tempfile::tempdir().unwrap();
        let opts = RunOpts{ aligned_pfx: tmp.path().join("aligned"), zip_out: Some(false), ..Default::default() };
        let mut report = SamReport::init(1, &opts, true).unwrap();

        let got = report.append(2, &aligned_read(0), &one_ref(), &opts).unwrap_err();
        assert_eq!(got.downcast_ref::<ReportError>(), Some(&ReportError::SplitOutOfRange{ split: 2, num_splits: 1 }));
        assert!(!report.split_writer_mut(0).unwrap().is_zip());
    }
}
