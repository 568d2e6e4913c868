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

//! OTU map: reads grouped by the reference sequence they matched.
//!
//! Alignment workers call [OtuMap::add] concurrently; the map is guarded by a
//! single lock. The map only grows and is read when it is flushed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use parking_lot::MutexGuard;

type E = Box<dyn std::error::Error>;

#[derive(Debug, Default)]
pub struct OtuMap {
    clusters: Mutex<BTreeMap<String, Vec<String>>>,
}

impl OtuMap {
    pub fn new() -> Self {
        OtuMap::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<String>>> {
        self.clusters.lock()
    }

    /// Appends `read_key` to the reads matching `ref_key`.
    pub fn add(
        &self,
        ref_key: &str,
        read_key: &str,
    ) {
        self.lock().entry(ref_key.to_string()).or_default().push(read_key.to_string());
    }

    /// Reads matching `ref_key` in the order they were added.
    pub fn get(
        &self,
        ref_key: &str,
    ) -> Option<Vec<String>> {
        self.lock().get(ref_key).cloned()
    }

    /// Number of reference sequences with at least one read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes one tab separated line per reference: the key followed by its reads.
    ///
    /// Keys are written in sorted order.
    pub fn write_to<W: Write>(
        &self,
        conn: &mut W,
    ) -> Result<(), E> {
        let clusters = self.lock();
        for (ref_key, reads) in clusters.iter() {
            let mut line: String = ref_key.clone();
            line += "\t";
            line += &reads.join("\t");
            line += "\n";
            conn.write_all(line.as_bytes())?;
        }
        conn.flush()?;
        Ok(())
    }

    /// Writes the map to `path`, see [write_to](OtuMap::write_to).
    pub fn flush(
        &self,
        path: &Path,
    ) -> Result<(), E> {
        log::info!("Printing OTU map to {}", path.display());
        let mut conn = BufWriter::new(File::create(path)?);
        self.write_to(&mut conn)
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn flush_two_reads_one_key() {
        use super::OtuMap;

        let otus = OtuMap::new();
        otus.add("AB001234.1", "ERR4035126.1");
        otus.add("AB001234.1", "ERR4035126.7543");

        let mut got: Vec<u8> = Vec::new();
        otus.write_to(&mut got).unwrap();

        assert_eq!(got, b"AB001234.1\tERR4035126.1\tERR4035126.7543\n".to_vec());
    }

    #[test]
    fn flush_sorted_keys_to_file() {
        use super::OtuMap;

        let otus = OtuMap::new();
        otus.add("ref.2", "r3");
        otus.add("ref.1", "r1");
        otus.add("ref.2", "r2");

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("otu_map.txt");
        otus.flush(&path).unwrap();

        let got = std::fs::read_to_string(&path).unwrap();
        assert_eq!(got, "ref.1\tr1\nref.2\tr3\tr2\n");
        assert_eq!(otus.len(), 2);
    }

    #[test]
    fn add_after_worker_panic() {
        use super::OtuMap;

        let otus = OtuMap::new();
        let res = std::thread::scope(|scope| {
            scope.spawn(|| {
                otus.add("ref.1", "r1");
                let _guard = otus.lock();
                panic!("worker failed while holding the map");
            }).join()
        });
        assert!(res.is_err());

        otus.add("ref.1", "r2");
        assert_eq!(otus.get("ref.1"), Some(vec!["r1".to_string(), "r2".to_string()]));
    }

    #[test]
    fn concurrent_adds_keep_every_read() {
        use super::OtuMap;

        let otus = OtuMap::new();
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let otus = &otus;
                scope.spawn(move || {
                    for idx in 0..250 {
                        otus.add("shared", &format!("w{}.r{}", worker, idx));
                    }
                });
            }
        });

        let reads = otus.get("shared").unwrap();
        assert_eq!(reads.len(), 1000);
        assert_eq!(reads.iter().filter(|x| x.starts_with("w2.")).count(), 250);
    }
}
