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

//! Run configuration.
//!
//! [RunOpts] is built once by the caller (the command-line client builds it
//! from its arguments) and then passed by reference to every operation that
//! needs it. Nothing in the library modifies it.

use std::path::PathBuf;

/// Immutable configuration for a single run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOpts {
    /// Read files. Statistics are computed from the first one.
    pub readfiles: Vec<PathBuf>,
    /// Reference databases as (reference fasta, index prefix) pairs.
    pub indexfiles: Vec<(PathBuf, PathBuf)>,
    /// Working directory holding the key-value store and outputs.
    pub workdir: PathBuf,
    /// Prefix of the aligned reads report files.
    pub aligned_pfx: PathBuf,
    /// Read files are gzipped.
    pub is_gz: bool,
    /// Compress the report: Some(true) always, Some(false) never, None if the input is gzipped.
    pub zip_out: Option<bool>,
    /// Append the process id to report file names.
    pub is_pid: bool,
    /// Also report reads that did not align.
    pub is_print_all_reads: bool,
    /// Write @SQ lines in the report header.
    pub is_sq: bool,
    /// Full invocation, written on the @PG line.
    pub cmdline: String,
    /// Program id written on the @PG line.
    pub program_id: String,
}

impl Default for RunOpts {
    fn default() -> Self {
        RunOpts {
            readfiles: Vec::new(),
            indexfiles: Vec::new(),
            workdir: PathBuf::from("."),
            aligned_pfx: PathBuf::from("aligned"),
            is_gz: false,
            zip_out: None,
            is_pid: false,
            is_print_all_reads: false,
            is_sq: true,
            cmdline: String::new(),
            program_id: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl RunOpts {
    /// Number of configured reference databases.
    pub fn num_dbs(&self) -> usize {
        self.indexfiles.len()
    }

    /// Path to the reference stats sidecar written by the indexer for database `db`.
    pub fn stats_path(
        &self,
        db: usize,
    ) -> Option<PathBuf> {
        self.indexfiles.get(db).map(|(_, prefix)| {
            PathBuf::from(prefix.to_string_lossy().to_string() + ".stats")
        })
    }

    /// Whether report outputs are gzipped given whether the input was.
    pub fn is_zip_output(
        &self,
        input_is_gz: bool,
    ) -> bool {
        self.zip_out.unwrap_or(input_is_gz)
    }

    /// Directory holding the key-value store.
    pub fn kvdb_dir(&self) -> PathBuf {
        self.workdir.join("kvdb")
    }
}
