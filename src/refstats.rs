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

//! Reference stats sidecar written next to each reference index.
//!
//! The report header only needs the id and length of each reference
//! sequence. [read_header_entries] skips everything before them, while
//! [read_ref_stats] and [write_ref_stats] handle the whole file.
//!
//! Layout, all integers little-endian with fixed width:
//!
//! | field                              | bytes      |
//! |------------------------------------|------------|
//! | index file size                    | 8          |
//! | reference fasta name length (L)    | 4          |
//! | reference fasta name               | L          |
//! | background base frequencies        | 4 * 8      |
//! | total reference length             | 8          |
//! | seed window length                 | 4          |
//! | number of reference sequences      | 8          |
//! | number of index parts (P)          | 2          |
//! | P x [IndexPartStats]               | 24 * P     |
//! | number of entries (S)              | 4          |
//! | S x (id length, id, seq length)    | 4 + n + 4  |
//!

use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use bincode::{Encode, Decode};
use bincode::decode_from_std_read;
use bincode::encode_into_std_write;

type E = Box<dyn std::error::Error>;

/// Size of [IndexPartStats] in the sidecar.
const INDEX_PART_STATS_BYTES: u64 = 24;

/// Error from a truncated or garbled sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarError {
    pub field: &'static str,
}

impl std::fmt::Display for SidecarError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "reference stats file is truncated or garbled at field `{}`", self.field)
    }
}

impl std::error::Error for SidecarError {}

/// Location of one part of a split reference index.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct IndexPartStats {
    pub start_part: u64,
    pub seq_part_size: u64,
    pub numseq_part: u32,
    pub start_seq: u32,
}

/// Reference sequence id and length, one @SQ line in the report header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefStatsEntry {
    pub id: String,
    pub len: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefStats {
    pub file_size: u64,
    pub fasta_name: String,
    pub background_freq: [f64; 4],
    pub full_len: u64,
    pub seed_win_len: u32,
    pub num_seq: u64,
    pub parts: Vec<IndexPartStats>,
    pub entries: Vec<RefStatsEntry>,
}

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

fn read_field<T: Decode<()>, R: Read>(
    conn: &mut R,
    field: &'static str,
) -> Result<T, SidecarError> {
    decode_from_std_read(conn, bincode_config()).map_err(|_| SidecarError{ field })
}

fn read_string<R: Read>(
    conn: &mut R,
    field: &'static str,
) -> Result<String, SidecarError> {
    let len: u32 = read_field(conn, field)?;
    let mut bytes: Vec<u8> = Vec::new();
    let nbytes = conn.take(len as u64).read_to_end(&mut bytes).map_err(|_| SidecarError{ field })?;
    if nbytes != len as usize {
        return Err(SidecarError{ field });
    }
    String::from_utf8(bytes).map_err(|_| SidecarError{ field })
}

fn skip_bytes<R: Read>(
    conn: &mut R,
    nbytes: u64,
    field: &'static str,
) -> Result<(), SidecarError> {
    let skipped = std::io::copy(&mut conn.take(nbytes), &mut std::io::sink())
        .map_err(|_| SidecarError{ field })?;
    if skipped != nbytes {
        return Err(SidecarError{ field });
    }
    Ok(())
}

fn read_entries<R: Read>(
    conn: &mut R,
) -> Result<Vec<RefStatsEntry>, SidecarError> {
    let num_sq: u32 = read_field(conn, "num_sq")?;
    let mut entries: Vec<RefStatsEntry> = Vec::new();
    for _ in 0..num_sq {
        let id = read_string(conn, "sequence id")?;
        let len: u32 = read_field(conn, "sequence length")?;
        entries.push(RefStatsEntry{ id, len });
    }
    Ok(entries)
}

/// Reads the reference sequence ids and lengths from a sidecar.
///
/// Skips over the fields before the entries without decoding them.
pub fn read_header_entries<R: Read>(
    conn: &mut R,
) -> Result<Vec<RefStatsEntry>, E> {
    skip_bytes(conn, 8, "file_size")?;
    let name_len: u32 = read_field(conn, "fasta name length")?;
    skip_bytes(conn, name_len as u64, "fasta name")?;
    // background_freq, full_len, seed_win_len, num_seq
    skip_bytes(conn, 4 * 8 + 8 + 4 + 8, "index totals")?;
    let part_num: u16 = read_field(conn, "part_num")?;
    skip_bytes(conn, part_num as u64 * INDEX_PART_STATS_BYTES, "index parts")?;

    Ok(read_entries(conn)?)
}

/// Opens the sidecar at `path` and reads its entries, see [read_header_entries].
pub fn read_header_entries_from_path(
    path: &Path,
) -> Result<Vec<RefStatsEntry>, E> {
    log::debug!("Reading reference stats from {}", path.display());
    let file = File::open(path).map_err(|err| {
        crate::scanner::OpenError{ path: path.to_path_buf(), reason: err.to_string() }
    })?;
    let mut conn = BufReader::new(file);
    read_header_entries(&mut conn)
}

/// Reads a whole sidecar.
pub fn read_ref_stats<R: Read>(
    conn: &mut R,
) -> Result<RefStats, E> {
    let file_size: u64 = read_field(conn, "file_size")?;
    let fasta_name = read_string(conn, "fasta name")?;
    let mut background_freq: [f64; 4] = [0.0; 4];
    for freq in background_freq.iter_mut() {
        *freq = read_field(conn, "background_freq")?;
    }
    let full_len: u64 = read_field(conn, "full_len")?;
    let seed_win_len: u32 = read_field(conn, "seed_win_len")?;
    let num_seq: u64 = read_field(conn, "num_seq")?;

    let part_num: u16 = read_field(conn, "part_num")?;
    let mut parts: Vec<IndexPartStats> = Vec::with_capacity(part_num as usize);
    for _ in 0..part_num {
        parts.push(read_field(conn, "index parts")?);
    }

    let entries = read_entries(conn)?;

    Ok(RefStats{ file_size, fasta_name, background_freq, full_len, seed_win_len, num_seq, parts, entries })
}

/// Writes `stats` in the sidecar layout.
pub fn write_ref_stats<W: Write>(
    stats: &RefStats,
    conn: &mut W,
) -> Result<(), E> {
    encode_into_std_write(stats.file_size, conn, bincode_config())?;
    encode_into_std_write(stats.fasta_name.len() as u32, conn, bincode_config())?;
    conn.write_all(stats.fasta_name.as_bytes())?;
    for freq in stats.background_freq.iter() {
        encode_into_std_write(*freq, conn, bincode_config())?;
    }
    encode_into_std_write(stats.full_len, conn, bincode_config())?;
    encode_into_std_write(stats.seed_win_len, conn, bincode_config())?;
    encode_into_std_write(stats.num_seq, conn, bincode_config())?;

    encode_into_std_write(stats.parts.len() as u16, conn, bincode_config())?;
    for part in stats.parts.iter() {
        encode_into_std_write(part, conn, bincode_config())?;
    }

    encode_into_std_write(stats.entries.len() as u32, conn, bincode_config())?;
    for entry in stats.entries.iter() {
        encode_into_std_write(entry.id.len() as u32, conn, bincode_config())?;
        conn.write_all(entry.id.as_bytes())?;
        encode_into_std_write(entry.len, conn, bincode_config())?;
    }
    conn.flush()?;
    Ok(())
}
