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
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // Count reads and cache the run statistics
    Stats {
        // Input fasta or fastq sequence file(s)
        #[arg(group = "input", required = true, help = "Input reads file(s)")]
        input_files: Vec<PathBuf>,

        // Reference fasta files
        #[arg(long = "ref", required = false, help = "Reference database fasta, repeat for each database")]
        refs: Vec<PathBuf>,

        // Index prefixes, one per reference
        #[arg(long = "idx", required = false, help = "Index prefix of each reference database")]
        idx_prefixes: Vec<PathBuf>,

        // Working directory
        #[arg(long = "workdir", default_value = ".")]
        workdir: PathBuf,

        // Input is gzipped
        #[arg(long = "gz", default_value_t = false)]
        is_gz: bool,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Write the SAM header for the reference databases
    Header {
        // Reference fasta files
        #[arg(long = "ref", required = true, help = "Reference database fasta, repeat for each database")]
        refs: Vec<PathBuf>,

        // Index prefixes, one per reference
        #[arg(long = "idx", required = true, help = "Index prefix of each reference database")]
        idx_prefixes: Vec<PathBuf>,

        // Report prefix
        #[arg(long = "aligned", default_value = "aligned")]
        aligned_pfx: PathBuf,

        // Number of report splits
        #[arg(long = "splits", default_value_t = 1)]
        num_splits: usize,

        // Compress the report, inferred from --gz if unset
        #[arg(long = "zip-out", required = false)]
        zip_out: Option<bool>,

        // Input is gzipped
        #[arg(long = "gz", default_value_t = false)]
        is_gz: bool,

        // Append the process id to report file names
        #[arg(long = "pid", default_value_t = false)]
        is_pid: bool,

        // Omit @SQ lines
        #[arg(long = "no-sq", default_value_t = false)]
        no_sq: bool,

        // Write to stdout instead of the report files
        #[arg(short = 'c', long = "stdout", default_value_t = false)]
        write_to_stdout: bool,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },
}
