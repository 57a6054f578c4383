use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use log::{debug, warn};

const HEADER: &str = "# CSOPESY Backing Store";

/// The store is rewritten from scratch once it grows past this size.
const MAX_STORE_BYTES: u64 = 5 * 1024 * 1024;

/// Whether store contents survive across runs. Off by default; the
/// `persist-backing-store` feature keeps appending to an existing file.
const PERSISTENT: bool = cfg!(feature = "persist-backing-store");

/// Append-only text log of evicted pages.
///
/// One record per eviction: `PID PAGE_NUM HEX(page_bytes)`. Write failures
/// are logged and swallowed; paging counters are maintained by the caller
/// regardless of whether the record landed on disk.
#[derive(Debug)]
pub struct BackingStore {
    path: PathBuf,
}

impl BackingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let store = Self { path: path.into() };
        if let Err(err) = store.init() {
            warn!("backing store init failed at {:?}: {}", store.path, err);
        }
        store
    }

    /// In persistent mode an existing non-empty store is kept; otherwise the
    /// file is truncated down to its header line.
    fn init(&self) -> io::Result<()> {
        if PERSISTENT {
            if let Ok(meta) = fs::metadata(&self.path) {
                if meta.len() > 0 {
                    return Ok(());
                }
            }
        }
        self.rewrite_header()
    }

    fn rewrite_header(&self) -> io::Result<()> {
        fs::write(&self.path, format!("{HEADER}\n"))
    }

    /// Append one evicted page. The store is bounded: past the size cap the
    /// file is truncated and the header rewritten before appending.
    pub fn write_page(&self, pid: i32, page_number: usize, page_bytes: &[u8]) -> io::Result<()> {
        if let Ok(meta) = fs::metadata(&self.path) {
            if meta.len() > MAX_STORE_BYTES {
                debug!("backing store exceeded {} bytes, truncating", MAX_STORE_BYTES);
                self.rewrite_header()?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{} {} {}", pid, page_number, hex::encode(page_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_pid_page_hex_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.txt");
        let store = BackingStore::new(&path);
        store.write_page(7, 2, &[0xab, 0xcd]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(HEADER));
        assert_eq!(lines.next(), Some("7 2 abcd"));
    }

    #[test]
    fn init_truncates_a_stale_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.txt");
        fs::write(&path, "leftover from a previous run\n").unwrap();

        let _store = BackingStore::new(&path);
        if !PERSISTENT {
            assert_eq!(fs::read_to_string(&path).unwrap(), format!("{HEADER}\n"));
        }
    }
}
