use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use log::warn;
use thiserror::Error;

use crate::backing_store::BackingStore;
use crate::stats::MemoryStats;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("no page table for process {0}")]
    UnknownProcess(i32),
    #[error("process {0} already has an allocation")]
    DuplicateProcess(i32),
    #[error("address 0x{address:X} is outside the process address space")]
    OutOfRange { address: usize },
    #[error("no frame available for page-in")]
    NoFrames,
}

/// One slot of physical memory. `pid == -1` marks a free frame.
#[derive(Debug, Clone, Copy)]
struct Frame {
    pid: i32,
    page_number: usize,
    modified: bool,
    last_access_time: u64,
}

impl Frame {
    const FREE: Frame = Frame {
        pid: -1,
        page_number: 0,
        modified: false,
        last_access_time: 0,
    };
}

#[derive(Debug, Clone, Copy)]
struct PageTableEntry {
    valid: bool,
    frame_number: Option<usize>,
    modified: bool,
}

impl PageTableEntry {
    const INVALID: PageTableEntry = PageTableEntry {
        valid: false,
        frame_number: None,
        modified: false,
    };
}

/// Demand-paged virtual memory with LRU replacement.
///
/// The manager models residency and replacement only: frames carry no byte
/// contents, and the u16 payloads of READ/WRITE live in each process's own
/// buffer. Every mutation happens under one internal mutex, and backing
/// store appends are bounded so the lock is never held across slow I/O.
#[derive(Debug)]
pub struct MemoryManager {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    total_bytes: usize,
    page_size: usize,
    frames: Vec<Frame>,
    free_frames: VecDeque<usize>,
    page_tables: HashMap<i32, Vec<PageTableEntry>>,
    store: BackingStore,
    /// Pages that have ever been written to the backing store.
    store_presence: HashSet<(i32, usize)>,
    current_time: u64,
    used_bytes: usize,
    paged_in: usize,
    paged_out: usize,
    idle_ticks: u64,
    active_ticks: u64,
}

impl MemoryManager {
    /// Build a manager over `total_bytes` of simulated physical memory split
    /// into `page_size` frames. `frame_cap_bytes` optionally shrinks the
    /// frame pool to the per-process ceiling from the configuration.
    pub fn new(
        total_bytes: usize,
        page_size: usize,
        frame_cap_bytes: Option<usize>,
        store_path: impl AsRef<Path>,
    ) -> Self {
        let mut num_frames = total_bytes / page_size;
        if let Some(cap) = frame_cap_bytes {
            num_frames = num_frames.min(cap / page_size);
        }
        if num_frames == 0 {
            num_frames = 1;
        }
        let inner = MemoryInner {
            total_bytes,
            page_size,
            frames: vec![Frame::FREE; num_frames],
            free_frames: (0..num_frames).collect(),
            page_tables: HashMap::new(),
            store: BackingStore::new(store_path.as_ref().to_path_buf()),
            store_presence: HashSet::new(),
            current_time: 0,
            used_bytes: 0,
            paged_in: 0,
            paged_out: 0,
            idle_ticks: 0,
            active_ticks: 0,
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install an all-invalid page table covering `bytes` of address space.
    pub fn allocate_process(&self, pid: i32, bytes: usize) -> Result<(), MemoryError> {
        let mut inner = self.lock();
        if inner.page_tables.contains_key(&pid) {
            return Err(MemoryError::DuplicateProcess(pid));
        }
        let pages_needed = bytes.div_ceil(inner.page_size).max(1);
        inner
            .page_tables
            .insert(pid, vec![PageTableEntry::INVALID; pages_needed]);
        Ok(())
    }

    /// Release every frame mapped to `pid` and drop its page table.
    pub fn deallocate_process(&self, pid: i32) {
        let mut inner = self.lock();
        let Some(table) = inner.page_tables.remove(&pid) else {
            return;
        };
        for entry in &table {
            if let (true, Some(frame_idx)) = (entry.valid, entry.frame_number) {
                inner.frames[frame_idx] = Frame::FREE;
                inner.free_frames.push_back(frame_idx);
                inner.used_bytes -= inner.page_size;
            }
        }
    }

    /// Touch one virtual address, faulting the page in if needed.
    ///
    /// A fault takes the head of the free list, or evicts the globally
    /// least-recently-used frame when none is free. Writes mark both the
    /// frame and the page entry dirty.
    pub fn access(&self, pid: i32, virtual_address: usize, is_write: bool) -> Result<(), MemoryError> {
        let mut inner = self.lock();
        inner.current_time += 1;
        let now = inner.current_time;

        let page_size = inner.page_size;
        let page_number = virtual_address / page_size;
        let (valid, mapped_frame) = {
            let table = inner
                .page_tables
                .get(&pid)
                .ok_or(MemoryError::UnknownProcess(pid))?;
            if page_number >= table.len() {
                return Err(MemoryError::OutOfRange {
                    address: virtual_address,
                });
            }
            (table[page_number].valid, table[page_number].frame_number)
        };

        if !valid {
            let frame_idx = match inner.free_frames.pop_front() {
                Some(idx) => idx,
                None => {
                    let victim = inner.oldest_frame_lru().ok_or(MemoryError::NoFrames)?;
                    inner.evict_frame(victim);
                    inner.free_frames.pop_front().ok_or(MemoryError::NoFrames)?
                }
            };
            inner.frames[frame_idx] = Frame {
                pid,
                page_number,
                modified: false,
                last_access_time: now,
            };
            let entry = &mut inner.page_tables.get_mut(&pid).expect("table checked above")[page_number];
            entry.valid = true;
            entry.frame_number = Some(frame_idx);
            entry.modified = false;
            inner.paged_in += 1;
            inner.used_bytes += page_size;
        } else if let Some(frame_idx) = mapped_frame {
            inner.frames[frame_idx].last_access_time = now;
        }

        if is_write {
            let entry = &mut inner.page_tables.get_mut(&pid).expect("table checked above")[page_number];
            entry.modified = true;
            if let Some(frame_idx) = entry.frame_number {
                inner.frames[frame_idx].modified = true;
                inner.frames[frame_idx].last_access_time = now;
            }
        }
        Ok(())
    }

    /// Fault-modeling read: the byte payload lives in the process buffer.
    pub fn read_byte(&self, pid: i32, virtual_address: usize) -> Result<u8, MemoryError> {
        self.access(pid, virtual_address, false)?;
        Ok(0)
    }

    /// Fault-modeling write counterpart of [`read_byte`].
    ///
    /// [`read_byte`]: MemoryManager::read_byte
    pub fn write_byte(&self, pid: i32, virtual_address: usize, _value: u8) -> Result<(), MemoryError> {
        self.access(pid, virtual_address, true)
    }

    pub fn stats(&self) -> MemoryStats {
        let inner = self.lock();
        MemoryStats {
            total: inner.total_bytes,
            used: inner.used_bytes,
            free: inner.total_bytes - inner.used_bytes,
            paged_in: inner.paged_in,
            paged_out: inner.paged_out,
            idle_ticks: inner.idle_ticks,
            active_ticks: inner.active_ticks,
        }
    }

    pub fn update_cpu_ticks(&self, is_idle: bool) {
        let mut inner = self.lock();
        if is_idle {
            inner.idle_ticks += 1;
        } else {
            inner.active_ticks += 1;
        }
    }

    /// Address-space size registered for `pid`, in bytes. Zero if unknown.
    pub fn process_memory_usage(&self, pid: i32) -> usize {
        let inner = self.lock();
        inner
            .page_tables
            .get(&pid)
            .map(|table| table.len() * inner.page_size)
            .unwrap_or(0)
    }

    /// `(pid, bytes)` for every registered process.
    pub fn all_process_memory(&self) -> Vec<(i32, usize)> {
        let inner = self.lock();
        let mut out: Vec<(i32, usize)> = inner
            .page_tables
            .iter()
            .map(|(pid, table)| (*pid, table.len() * inner.page_size))
            .collect();
        out.sort_by_key(|(pid, _)| *pid);
        out
    }

    pub fn has_process(&self, pid: i32) -> bool {
        self.lock().page_tables.contains_key(&pid)
    }

    pub fn num_frames(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.lock().free_frames.len()
    }

    pub fn page_size(&self) -> usize {
        self.lock().page_size
    }

    /// Page numbers of `pid` currently resident in a frame, ascending.
    pub fn resident_pages(&self, pid: i32) -> Vec<usize> {
        let inner = self.lock();
        let mut pages: Vec<usize> = inner
            .frames
            .iter()
            .filter(|frame| frame.pid == pid)
            .map(|frame| frame.page_number)
            .collect();
        pages.sort_unstable();
        pages
    }

    /// Whether `(pid, page)` has ever been spilled to the backing store.
    pub fn page_in_store(&self, pid: i32, page_number: usize) -> bool {
        self.lock().store_presence.contains(&(pid, page_number))
    }
}

impl MemoryInner {
    /// Victim selection: the occupied frame with the oldest access time.
    fn oldest_frame_lru(&self) -> Option<usize> {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.pid >= 0)
            .min_by_key(|(_, frame)| frame.last_access_time)
            .map(|(idx, _)| idx)
    }

    /// Push a frame's page out. Every evicted page must appear in the store
    /// at least once, so unmodified pages are still written on their first
    /// eviction.
    fn evict_frame(&mut self, frame_idx: usize) {
        let frame = self.frames[frame_idx];
        if frame.pid < 0 {
            return;
        }
        let key = (frame.pid, frame.page_number);
        self.paged_out += 1;

        if frame.modified || !self.store_presence.contains(&key) {
            let page_image = vec![0u8; self.page_size];
            if let Err(err) = self.store.write_page(frame.pid, frame.page_number, &page_image) {
                warn!(
                    "backing store write failed for pid {} page {}: {}",
                    frame.pid, frame.page_number, err
                );
            }
        }
        self.store_presence.insert(key);

        if let Some(table) = self.page_tables.get_mut(&frame.pid) {
            if let Some(entry) = table.get_mut(frame.page_number) {
                entry.valid = false;
                entry.frame_number = None;
                entry.modified = false;
            }
        }
        self.frames[frame_idx] = Frame::FREE;
        self.free_frames.push_back(frame_idx);
        self.used_bytes -= self.page_size;
    }
}
