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
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use readstats::kvdb::DirStore;
use readstats::opts::RunOpts;
use readstats::report::SamReport;
use readstats::report::load_header_entries;
use readstats::report::sam::format_sam_header;

mod cli;

type E = Box<dyn std::error::Error>;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
    let res = stderrlog::new()
        .module(module_path!())
        .quiet(false)
        .verbosity(log_max_level)
        .timestamp(stderrlog::Timestamp::Second)
        .init();
    if let Err(err) = res {
        eprintln!("Failed to initialize logging: {}", err);
    }
}

fn pair_refs(
    refs: &[PathBuf],
    idx_prefixes: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>, E> {
    if refs.len() != idx_prefixes.len() {
        return Err(format!("Got {} --ref and {} --idx arguments, expected one --idx per --ref",
                           refs.len(), idx_prefixes.len()).into());
    }
    Ok(refs.iter().cloned().zip(idx_prefixes.iter().cloned()).collect())
}

fn cmdline() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

fn run(
    command: &cli::Commands,
) -> Result<(), E> {
    match command {
        // Stats
        cli::Commands::Stats {
            input_files,
            refs,
            idx_prefixes,
            workdir,
            is_gz,
            verbose,
        } => {
            init_log(if *verbose { 2 } else { 1 });

            let opts = RunOpts{
                readfiles: input_files.clone(),
                indexfiles: pair_refs(refs, idx_prefixes)?,
                workdir: workdir.clone(),
                is_gz: *is_gz,
                cmdline: cmdline(),
                ..Default::default()
            };

            let mut kvdb = DirStore::open(&opts.kvdb_dir())?;
            let stats = readstats::update_stats(&opts, &mut kvdb)?;

            let mut conn = std::io::stdout().lock();
            conn.write_all(stats.to_string().as_bytes())?;
            conn.flush()?;
        },

        // Header
        cli::Commands::Header {
            refs,
            idx_prefixes,
            aligned_pfx,
            num_splits,
            zip_out,
            is_gz,
            is_pid,
            no_sq,
            write_to_stdout,
            verbose,
        } => {
            init_log(if *verbose { 2 } else { 1 });

            let opts = RunOpts{
                indexfiles: pair_refs(refs, idx_prefixes)?,
                aligned_pfx: aligned_pfx.clone(),
                is_gz: *is_gz,
                zip_out: *zip_out,
                is_pid: *is_pid,
                is_sq: !*no_sq,
                cmdline: cmdline(),
                ..Default::default()
            };

            if *write_to_stdout {
                let entries = load_header_entries(&opts)?;
                let mut conn = std::io::stdout().lock();
                conn.write_all(format_sam_header(&entries, &opts).as_bytes())?;
                conn.flush()?;
            } else {
                let mut report = SamReport::init(*num_splits, &opts, opts.is_gz)?;
                report.write_header(&opts)?;
                report.finish()?;
            }
        },
    }
    Ok(())
}

fn main() {
    let cli = cli::Cli::parse();

    let Some(command) = &cli.command else {
        eprintln!("No subcommand given, see `readstats --help`");
        std::process::exit(2);
    };

    if let Err(err) = run(command) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
