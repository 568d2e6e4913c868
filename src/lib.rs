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

//! readstats is a library and a command-line client for the bookkeeping
//! side of filtering sequencing reads against reference databases:
//!
//!   - Counting and validating the reads in a FASTA or FASTQ file.
//!   - Caching the run statistics in a key-value store so that a restarted run can skip recomputing them.
//!   - Writing the alignments of reads in [SAM](https://samtools.github.io/hts-specs/SAMv1.pdf) format, one optionally gzipped file per input split.
//!   - Grouping the reads by the reference sequence they matched (the OTU map).
//!
//! Computing the alignments is not part of readstats. The report writer takes
//! reads with their alignments already attached, see [read].
//!
//! ## Usage
//!
//! ### Command line
//!
//! The readstats CLI supports the following subcommands:
//!   - `readstats stats` count the reads in a file and cache the statistics.
//!   - `readstats header` write the SAM header for a set of reference databases.
//!
//! ### Rust API
//!
//! All operations take a [RunOpts](opts::RunOpts) describing the run. The
//! main entry points are:
//!
//!   - [Scanner](scanner::Scanner): takes a [BufRead](std::io::BufRead) with FASTA or FASTQ data and counts its reads and bases.
//!   - [ReadStats](stats::ReadStats): the run statistics, updated concurrently by alignment workers.
//!   - [SamReport](report::SamReport): per-split SAM output.
//!   - [OtuMap](otu::OtuMap): reads grouped by reference sequence.
//!
//! [compute_stats] combines the scanner with the cached statistics and
//! [update_stats] also saves the result.
//!

pub mod kvdb;
pub mod opts;
pub mod otu;
pub mod read;
pub mod refstats;
pub mod report;
pub mod scanner;
pub mod stats;

use kvdb::KeyValueStore;
use opts::RunOpts;
use stats::ReadStats;

type E = Box<dyn std::error::Error>;

/// Counts the reads in the first read file and restores cached counters.
///
/// The read and base counts are always recomputed. The alignment counters
/// are restored from `kvdb` if it holds statistics for the same number of
/// reference databases; otherwise they start from zero.
pub fn compute_stats<S: KeyValueStore>(
    opts: &RunOpts,
    kvdb: &S,
) -> Result<ReadStats, E> {
    let mut stats = ReadStats::new(opts);
    stats.calculate(opts)?;

    if stats.restore_from_db(kvdb)? {
        log::info!("Restored cached statistics for {} reference databases", stats.num_dbs());
    } else {
        log::info!("No usable cached statistics, starting from zero");
        // Drop partially restored fields, keep the scan.
        let (n_reads, n_bases, suffix) = (stats.number_total_read, stats.full_read_main, stats.suffix.clone());
        stats = ReadStats::new(opts);
        stats.number_total_read = n_reads;
        stats.full_read_main = n_bases;
        stats.suffix = suffix;
    }

    Ok(stats)
}

/// Computes the statistics with [compute_stats] and saves them in `kvdb`.
///
/// The completion flag is left as restored; see
/// [set_calc_done](ReadStats::set_calc_done).
pub fn update_stats<S: KeyValueStore>(
    opts: &RunOpts,
    kvdb: &mut S,
) -> Result<ReadStats, E> {
    let stats = compute_stats(opts, &*kvdb)?;
    stats.store_to_db(kvdb)?;
    Ok(stats)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn compute_stats_uses_cache() {
        use super::compute_stats;
        use crate::kvdb::MemoryStore;
        use crate::opts::RunOpts;
        use crate::stats::ReadStats;
        use std::path::PathBuf;

        let tmp = tempfile::tempdir().unwrap();
        let reads = tmp.path().join("reads.fq");
        std::fs::write(&reads, b"@r1\nACGT\n+\nFFFF\n@r2\nACG\n+\nFFF\n").unwrap();

        let opts = RunOpts{
            readfiles: vec![reads],
            indexfiles: vec![(PathBuf::from("ref.fa"), PathBuf::from("idx"))],
            ..Default::default()
        };

        let cached = ReadStats::new(&opts);
        cached.add_matched(0);
        cached.add_mapped();
        let mut store = MemoryStore::new();
        cached.store_to_db(&mut store).unwrap();

        let got = compute_stats(&opts, &store).unwrap();
        assert_eq!(got.number_total_read, 2);
        assert_eq!(got.full_read_main, 7);
        assert_eq!(got.matched_per_db(), vec![1]);
        assert_eq!(got.total_reads_mapped(), 1);
    }

    #[test]
    fn update_stats_leaves_calc_unfinished() {
        use super::update_stats;
        use crate::kvdb::DirStore;
        use crate::kvdb::KeyValueStore;
        use crate::opts::RunOpts;
        use crate::stats::persist::decode_stats;
        use crate::stats::ReadStats;
        use crate::stats::DB_KEY;

        let tmp = tempfile::tempdir().unwrap();
        let reads = tmp.path().join("reads.fa");
        std::fs::write(&reads, b">r1\nACGTACGTAC\n>r2\nACGTACGTACGTACG\n").unwrap();

        let opts = RunOpts{ readfiles: vec![reads], workdir: tmp.path().to_path_buf(), ..Default::default() };
        let mut store = DirStore::open(&opts.kvdb_dir()).unwrap();

        let got = update_stats(&opts, &mut store).unwrap();
        assert_eq!(got.number_total_read, 2);
        assert!(!got.is_calc_done());

        let bytes = DirStore::open(&opts.kvdb_dir()).unwrap().get(DB_KEY).unwrap();
        let mut restored = ReadStats::new(&opts);
        assert!(decode_stats(&bytes, &mut restored));
        assert!(!restored.is_calc_done());
    }

    #[test]
    fn compute_stats_discards_mismatched_cache() {
        use super::compute_stats;
        use crate::kvdb::MemoryStore;
        use crate::opts::RunOpts;
        use crate::stats::ReadStats;
        use crate::stats::READLEN;
        use std::path::PathBuf;

        let tmp = tempfile::tempdir().unwrap();
        let reads = tmp.path().join("reads.fa");
        std::fs::write(&reads, b">r1\nACGT\n").unwrap();

        let opts = RunOpts{
            readfiles: vec![reads],
            indexfiles: vec![(PathBuf::from("ref.fa"), PathBuf::from("idx"))],
            ..Default::default()
        };

        let cached = ReadStats::with_num_dbs(2);
        cached.observe_read_len(90);
        let mut store = MemoryStore::new();
        cached.store_to_db(&mut store).unwrap();

        let got = compute_stats(&opts, &store).unwrap();
        assert_eq!(got.number_total_read, 1);
        assert_eq!(got.min_read_len(), READLEN);
        assert_eq!(got.suffix, "fa");
    }
}
