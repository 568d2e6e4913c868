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

//! Binary encoding of the cached statistics.
//!
//! Layout, all integers little-endian with fixed width:
//!
//! | field                          | bytes |
//! |--------------------------------|-------|
//! | min read length                | 4     |
//! | max read length                | 4     |
//! | total mapped                   | 8     |
//! | total mapped with coverage     | 8     |
//! | de novo clustering             | 4     |
//! | calculation done               | 1     |
//! | number of databases (N)        | 8     |
//! | N x matched reads per database | 8 * N |
//! | blob version                   | 2     |
//!
//! Blobs written without the version field are accepted.

use bincode::{Encode, Decode};
use bincode::encode_into_std_write;
use bincode::decode_from_slice;

use super::ReadStats;

type E = Box<dyn std::error::Error>;

/// Version written at the end of the blob.
pub const STATS_BLOB_VERSION: u16 = 1;

/// Fixed width fields at the start of the blob.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct StatsHeader {
    pub min_read_len: u32,
    pub max_read_len: u32,
    pub total_reads_mapped: u64,
    pub total_reads_mapped_cov: u64,
    pub total_reads_denovo_clustering: u32,
    pub stats_calc_done: bool,
}

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

pub fn encode_stats(
    stats: &ReadStats,
) -> Result<Vec<u8>, E> {
    let mut bytes: Vec<u8> = Vec::new();
    encode_into_std_write(stats.header(), &mut bytes, bincode_config())?;

    let matched = stats.matched_per_db();
    encode_into_std_write(matched.len() as u64, &mut bytes, bincode_config())?;
    for value in matched {
        encode_into_std_write(value, &mut bytes, bincode_config())?;
    }

    encode_into_std_write(STATS_BLOB_VERSION, &mut bytes, bincode_config())?;
    Ok(bytes)
}

fn decode_field<T: Decode<()>>(
    bytes: &[u8],
    offset: &mut usize,
) -> Option<T> {
    let (value, nbytes) = decode_from_slice(&bytes[*offset..], bincode_config()).ok()?;
    *offset += nbytes;
    Some(value)
}

/// Restores `stats` from `bytes`.
///
/// Returns false if `bytes` is empty, truncated, has a different version or
/// was written for a different number of databases. The fixed width fields
/// are restored as soon as they are read; the matched reads per database are
/// only restored if the whole blob is usable.
pub fn decode_stats(
    bytes: &[u8],
    stats: &mut ReadStats,
) -> bool {
    if bytes.is_empty() {
        log::debug!("No cached statistics");
        return false;
    }

    let mut offset: usize = 0;
    let Some(header) = decode_field::<StatsHeader>(bytes, &mut offset) else {
        log::warn!("Cached statistics are truncated, ignoring them");
        return false;
    };
    stats.set_header(&header);

    let Some(n_dbs) = decode_field::<u64>(bytes, &mut offset) else {
        log::warn!("Cached statistics are truncated, ignoring them");
        return false;
    };
    if n_dbs != stats.num_dbs() as u64 {
        log::warn!("Cached statistics were computed for {} reference databases but {} are configured, ignoring them",
                   n_dbs, stats.num_dbs());
        return false;
    }

    let mut matched: Vec<u64> = Vec::with_capacity(stats.num_dbs());
    for _ in 0..n_dbs {
        let Some(value) = decode_field::<u64>(bytes, &mut offset) else {
            log::warn!("Cached statistics are truncated, ignoring them");
            return false;
        };
        matched.push(value);
    }

    if offset < bytes.len() {
        match decode_field::<u16>(bytes, &mut offset) {
            Some(STATS_BLOB_VERSION) => (),
            Some(version) => {
                log::warn!("Cached statistics have version {} but {} is supported, ignoring them",
                           version, STATS_BLOB_VERSION);
                return false;
            },
            None => {
                log::warn!("Cached statistics have a garbled version field, ignoring them");
                return false;
            },
        }
    }

    stats.set_matched_per_db(&matched);
    true
}
