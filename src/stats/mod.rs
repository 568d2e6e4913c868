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

//! Aggregate statistics of a run.
//!
//! [ReadStats] is created once per run. The read counts come from scanning
//! the first read file with [calculate](ReadStats::calculate); the alignment
//! counters are incremented by the alignment workers through shared
//! references, so they are kept in atomics.
//!
//! The counters that are expensive to recompute can be cached in a
//! [KeyValueStore] with [store_to_db](ReadStats::store_to_db) and restored on
//! the next run with [restore_from_db](ReadStats::restore_from_db). See
//! [persist] for the byte layout.
//!
//! ## Usage
//!
//! ```rust
//! use readstats::kvdb::MemoryStore;
//! use readstats::opts::RunOpts;
//! use readstats::stats::ReadStats;
//! use std::path::PathBuf;
//!
//! let opts = RunOpts {
//!     indexfiles: vec![(PathBuf::from("rfam-5s.fasta"), PathBuf::from("idx/rfam-5s"))],
//!     ..Default::default()
//! };
//!
//! let stats = ReadStats::new(&opts);
//! stats.add_matched(0);
//! stats.add_mapped();
//! stats.observe_read_len(151);
//!
//! let mut store = MemoryStore::new();
//! stats.store_to_db(&mut store).unwrap();
//!
//! let mut restored = ReadStats::new(&opts);
//! assert!(restored.restore_from_db(&store).unwrap());
//! assert_eq!(restored.matched_per_db(), vec![1]);
//! assert_eq!(restored.total_reads_mapped(), 1);
//! ```
//!

pub mod persist;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::kvdb::KeyValueStore;
use crate::opts::RunOpts;
use crate::otu::OtuMap;
use crate::scanner::SeqFormat;
use crate::scanner::Scanner;
use crate::scanner::open_reads;

use persist::StatsHeader;
use persist::decode_stats;
use persist::encode_stats;

type E = Box<dyn std::error::Error>;

/// Initial value of the minimum read length.
pub const READLEN: u32 = 30000;

/// Key of the statistics blob in the key-value store.
pub const DB_KEY: &str = "Readstats";

/// Result of scanning one read file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub n_reads: u64,
    pub n_bases: u64,
    /// None if the file had no records.
    pub format: Option<SeqFormat>,
    /// The file was gzipped, whether or not it was flagged as such.
    pub is_gz: bool,
}

#[derive(Debug)]
pub struct ReadStats {
    min_read_len: AtomicU32,
    max_read_len: AtomicU32,
    total_reads_mapped: AtomicU64,
    total_reads_mapped_cov: AtomicU64,
    total_reads_denovo_clustering: AtomicU32,
    stats_calc_done: AtomicBool,

    // One slot per reference database, never resized.
    reads_matched_per_db: Box<[AtomicU64]>,

    /// Reads in the first read file.
    pub number_total_read: u64,
    /// Bases in the first read file.
    pub full_read_main: u64,
    /// Suffix for the aligned reads output.
    pub suffix: String,

    pub otu_map: OtuMap,
}

impl ReadStats {
    pub fn new(
        opts: &RunOpts,
    ) -> Self {
        ReadStats::with_num_dbs(opts.num_dbs())
    }

    pub fn with_num_dbs(
        num_dbs: usize,
    ) -> Self {
        ReadStats{
            min_read_len: AtomicU32::new(READLEN),
            max_read_len: AtomicU32::new(0),
            total_reads_mapped: AtomicU64::new(0),
            total_reads_mapped_cov: AtomicU64::new(0),
            total_reads_denovo_clustering: AtomicU32::new(0),
            stats_calc_done: AtomicBool::new(false),
            reads_matched_per_db: (0..num_dbs).map(|_| AtomicU64::new(0)).collect(),
            number_total_read: 0,
            full_read_main: 0,
            suffix: String::new(),
            otu_map: OtuMap::new(),
        }
    }

    /// Counts the reads and bases in the first read file of `opts`.
    ///
    /// Also sets [suffix](ReadStats::suffix) for the aligned reads output.
    pub fn calculate(
        &mut self,
        opts: &RunOpts,
    ) -> Result<(u64, u64), E> {
        let readfile = opts.readfiles.first().ok_or("No reads file given")?;
        let summary = self.calculate_from_path(readfile, opts.is_gz)?;
        self.suffix = calc_suffix(readfile, summary.is_gz, summary.format);
        Ok((summary.n_reads, summary.n_bases))
    }

    /// Scans `path` and stores the read and base counts.
    pub fn calculate_from_path(
        &mut self,
        path: &Path,
        is_gz: bool,
    ) -> Result<ScanSummary, E> {
        log::info!("Counting reads in {}", path.display());
        let start = Instant::now();

        let (reader, is_gz) = open_reads(path, is_gz)?;
        let mut scanner = Scanner::new(reader);
        let (n_reads, n_bases) = scanner.scan()?;

        self.number_total_read = n_reads;
        self.full_read_main = n_bases;

        log::info!("Counting reads done. Elapsed time: {:.2} sec. Reads processed: {}",
                   start.elapsed().as_secs_f64(), n_reads);

        Ok(ScanSummary{ n_reads, n_bases, format: scanner.format(), is_gz })
    }

    pub fn num_dbs(&self) -> usize {
        self.reads_matched_per_db.len()
    }

    /// Records the length of an aligned read.
    pub fn observe_read_len(
        &self,
        len: u32,
    ) {
        self.min_read_len.fetch_min(len, Ordering::Relaxed);
        self.max_read_len.fetch_max(len, Ordering::Relaxed);
    }

    pub fn add_mapped(&self) {
        self.total_reads_mapped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_mapped_cov(&self) {
        self.total_reads_mapped_cov.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_denovo(&self) {
        self.total_reads_denovo_clustering.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a read matching reference database `db`.
    ///
    /// Panics if `db` is not a configured database.
    pub fn add_matched(
        &self,
        db: usize,
    ) {
        self.reads_matched_per_db[db].fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the statistics as complete.
    ///
    /// Call this only after the alignment pass has observed every read
    /// length, so that the minimum is not above the maximum. Scanning the
    /// read file alone does not complete the statistics.
    pub fn set_calc_done(&self) {
        self.stats_calc_done.store(true, Ordering::Release);
    }

    pub fn is_calc_done(&self) -> bool {
        self.stats_calc_done.load(Ordering::Acquire)
    }

    pub fn min_read_len(&self) -> u32 {
        self.min_read_len.load(Ordering::Relaxed)
    }

    pub fn max_read_len(&self) -> u32 {
        self.max_read_len.load(Ordering::Relaxed)
    }

    pub fn total_reads_mapped(&self) -> u64 {
        self.total_reads_mapped.load(Ordering::Relaxed)
    }

    pub fn total_reads_mapped_cov(&self) -> u64 {
        self.total_reads_mapped_cov.load(Ordering::Relaxed)
    }

    pub fn total_reads_denovo_clustering(&self) -> u32 {
        self.total_reads_denovo_clustering.load(Ordering::Relaxed)
    }

    /// Reads matched per reference database, in database order.
    pub fn matched_per_db(&self) -> Vec<u64> {
        self.reads_matched_per_db.iter().map(|x| x.load(Ordering::Relaxed)).collect()
    }

    /// The fixed width fields of the persisted blob.
    pub fn header(&self) -> StatsHeader {
        StatsHeader{
            min_read_len: self.min_read_len(),
            max_read_len: self.max_read_len(),
            total_reads_mapped: self.total_reads_mapped(),
            total_reads_mapped_cov: self.total_reads_mapped_cov(),
            total_reads_denovo_clustering: self.total_reads_denovo_clustering(),
            stats_calc_done: self.is_calc_done(),
        }
    }

    pub(crate) fn set_header(
        &mut self,
        header: &StatsHeader,
    ) {
        *self.min_read_len.get_mut() = header.min_read_len;
        *self.max_read_len.get_mut() = header.max_read_len;
        *self.total_reads_mapped.get_mut() = header.total_reads_mapped;
        *self.total_reads_mapped_cov.get_mut() = header.total_reads_mapped_cov;
        *self.total_reads_denovo_clustering.get_mut() = header.total_reads_denovo_clustering;
        *self.stats_calc_done.get_mut() = header.stats_calc_done;
    }

    pub(crate) fn set_matched_per_db(
        &mut self,
        values: &[u64],
    ) {
        assert_eq!(values.len(), self.reads_matched_per_db.len());
        self.reads_matched_per_db.iter_mut().zip(values.iter()).for_each(|(slot, value)| {
            *slot.get_mut() = *value;
        });
    }

    /// Writes the cached statistics to `kvdb` under [DB_KEY].
    pub fn store_to_db<S: KeyValueStore>(
        &self,
        kvdb: &mut S,
    ) -> Result<(), E> {
        let bytes = encode_stats(self)?;
        kvdb.put(DB_KEY, &bytes)?;
        Ok(())
    }

    /// Restores the cached statistics from `kvdb`.
    ///
    /// Returns false if there is no usable cache: the key is missing, or the
    /// stored blob does not match this run. The caller should recompute the
    /// statistics in that case.
    pub fn restore_from_db<S: KeyValueStore>(
        &mut self,
        kvdb: &S,
    ) -> Result<bool, E> {
        let bytes = kvdb.get(DB_KEY)?;
        Ok(decode_stats(&bytes, self))
    }

    /// Adds `read_key` to the reads matching `ref_key` in the OTU map.
    pub fn push_otu_map(
        &self,
        ref_key: &str,
        read_key: &str,
    ) {
        self.otu_map.add(ref_key, read_key);
    }
}

impl std::fmt::Display for ReadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Total reads = {}", self.number_total_read)?;
        writeln!(f, "Total bases = {}", self.full_read_main)?;
        if self.max_read_len() > 0 {
            writeln!(f, "Minimum read length = {}", self.min_read_len())?;
            writeln!(f, "Maximum read length = {}", self.max_read_len())?;
        }
        writeln!(f, "Total reads passing E-value threshold = {}", self.total_reads_mapped())?;
        writeln!(f, "Total reads passing %id and %coverage thresholds = {}", self.total_reads_mapped_cov())?;
        writeln!(f, "Total reads for de novo clustering = {}", self.total_reads_denovo_clustering())?;
        for (db, matched) in self.matched_per_db().iter().enumerate() {
            writeln!(f, "Reads matched to database {} = {}", db, matched)?;
        }
        Ok(())
    }
}

/// Determines the suffix of aligned reads files.
///
/// Uses the extension of `readfile` when it has one and is not gzipped,
/// otherwise the name of the detected `format` (fastq if it is unknown).
pub fn calc_suffix(
    readfile: &Path,
    is_gz: bool,
    format: Option<SeqFormat>,
) -> String {
    match readfile.extension() {
        Some(ext) if !is_gz && !ext.is_empty() => ext.to_string_lossy().to_string(),
        _ => format.unwrap_or(SeqFormat::Fastq).suffix().to_string(),
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn new_stats_sentinels() {
        use super::ReadStats;
        use super::READLEN;

        let stats = ReadStats::with_num_dbs(3);

        assert_eq!(stats.min_read_len(), READLEN);
        assert_eq!(stats.max_read_len(), 0);
        assert_eq!(stats.matched_per_db(), vec![0, 0, 0]);
        assert!(!stats.is_calc_done());
    }

    #[test]
    fn observe_read_len_tracks_min_and_max() {
        use super::ReadStats;

        let stats = ReadStats::with_num_dbs(1);
        stats.observe_read_len(151);
        stats.observe_read_len(35);
        stats.observe_read_len(250);

        assert_eq!(stats.min_read_len(), 35);
        assert_eq!(stats.max_read_len(), 250);
    }

    #[test]
    fn concurrent_counters() {
        use super::ReadStats;

        let stats = ReadStats::with_num_dbs(2);
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let stats = &stats;
                scope.spawn(move || {
                    for _ in 0..100 {
                        stats.add_mapped();
                        stats.add_matched(worker % 2);
                    }
                });
            }
        });

        assert_eq!(stats.total_reads_mapped(), 400);
        assert_eq!(stats.matched_per_db(), vec![200, 200]);
    }

    #[test]
    fn calculate_fasta_file() {
        use super::ReadStats;
        use crate::opts::RunOpts;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reads.fa");
        std::fs::write(&path, b">r1\nACGTACGTAC\n>r2\nACGTACGTACGTACG\n").unwrap();

        let opts = RunOpts { readfiles: vec![path], ..Default::default() };
        let mut stats = ReadStats::new(&opts);
        let got = stats.calculate(&opts).unwrap();

        assert_eq!(got, (2, 25));
        assert_eq!(stats.number_total_read, 2);
        assert_eq!(stats.full_read_main, 25);
        assert_eq!(stats.suffix, "fa");
    }

    #[test]
    fn calculate_unflagged_gzip_suffix() {
        use super::ReadStats;
        use crate::opts::RunOpts;
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reads.fq.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"@r1\nACGTACGTAC\n+\nFFFFFFFFFF\n").unwrap();
        encoder.finish().unwrap();

        let opts = RunOpts { readfiles: vec![path], is_gz: false, ..Default::default() };
        let mut stats = ReadStats::new(&opts);

        assert_eq!(stats.calculate(&opts).unwrap(), (1, 10));
        assert_eq!(stats.suffix, "fastq");
    }

    #[test]
    fn calculate_propagates_format_error() {
        use super::ReadStats;
        use crate::opts::RunOpts;
        use crate::scanner::ScanError;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reads.fq");
        std::fs::write(&path, b"@r1\nACGT\n+\nFFFF\nACGT\n@r2\nACGT\n+\nFFFF\n").unwrap();

        let opts = RunOpts { readfiles: vec![path], ..Default::default() };
        let mut stats = ReadStats::new(&opts);
        let got = stats.calculate(&opts).unwrap_err();

        assert!(got.downcast_ref::<ScanError>().is_some());
    }

    #[test]
    fn calc_suffix_from_extension_or_format() {
        use super::calc_suffix;
        use crate::scanner::SeqFormat;
        use std::path::Path;

        assert_eq!(calc_suffix(Path::new("reads.fq"), false, Some(SeqFormat::Fastq)), "fq");
        assert_eq!(calc_suffix(Path::new("reads.fa.gz"), true, Some(SeqFormat::Fasta)), "fasta");
        assert_eq!(calc_suffix(Path::new("reads"), false, Some(SeqFormat::Fasta)), "fasta");
        assert_eq!(calc_suffix(Path::new("reads"), false, None), "fastq");
    }
}
