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

//! Key-value storage for cached run state.
//!
//! The statistics are cached under a single key so that a restarted run can
//! skip recomputing them. Any store implementing [KeyValueStore] works;
//! [MemoryStore] and the file based [DirStore] are provided.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

type E = Box<dyn std::error::Error>;

pub trait KeyValueStore {
    /// Value stored under `key`, or an empty vector if there is none.
    fn get(&self, key: &str) -> Result<Vec<u8>, E>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), E>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, E> {
        Ok(self.values.get(key).cloned().unwrap_or_default())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), E> {
        self.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Store keeping one file per key in a directory.
#[derive(Clone, Debug)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Opens the store in `dir`, creating the directory if needed.
    pub fn open(
        dir: &Path,
    ) -> Result<Self, E> {
        std::fs::create_dir_all(dir)?;
        Ok(DirStore{ dir: dir.to_path_buf() })
    }
}

impl KeyValueStore for DirStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, E> {
        match std::fs::read(self.dir.join(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(Box::new(err)),
        }
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), E> {
        std::fs::write(self.dir.join(key), value)?;
        Ok(())
    }
}
