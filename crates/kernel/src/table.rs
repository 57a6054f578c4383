use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use process::{Pcb, PcbHandle};
use thiserror::Error;
use types::ProcessState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("a process named '{0}' already exists")]
    DuplicateName(String),
}

/// Live process map, FIFO ready queue, and the finished list, all guarded by
/// one mutex with a condvar for worker wake-ups.
///
/// Lock order is always table before PCB; workers that own a dequeued PCB
/// take only the PCB lock.
#[derive(Debug, Default)]
pub struct ProcessTable {
    inner: Mutex<TableInner>,
    ready_cv: Condvar,
}

#[derive(Debug, Default)]
struct TableInner {
    live: HashMap<String, PcbHandle>,
    ready_queue: VecDeque<PcbHandle>,
    finished: Vec<PcbHandle>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a fresh PCB into the live table and the ready queue.
    /// Duplicate names are rejected rather than overwritten.
    pub fn admit(&self, pcb: Pcb) -> Result<PcbHandle, TableError> {
        let name = pcb.process.name.clone();
        let mut inner = self.lock();
        if inner.live.contains_key(&name) {
            return Err(TableError::DuplicateName(name));
        }
        let handle = pcb.into_handle();
        inner.live.insert(name, handle.clone());
        inner.ready_queue.push_back(handle.clone());
        drop(inner);
        self.ready_cv.notify_one();
        Ok(handle)
    }

    /// Put a preempted or woken PCB back at the tail of the ready queue.
    pub fn enqueue(&self, handle: PcbHandle) {
        self.lock().ready_queue.push_back(handle);
        self.ready_cv.notify_one();
    }

    /// Dequeue the next ready PCB, waiting up to `timeout` for one to show
    /// up. `None` on timeout so callers can re-check shutdown flags.
    pub fn pop_ready(&self, timeout: Duration) -> Option<PcbHandle> {
        let mut inner = self.lock();
        if let Some(handle) = inner.ready_queue.pop_front() {
            return Some(handle);
        }
        let (mut inner, _) = self
            .ready_cv
            .wait_timeout(inner, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        inner.ready_queue.pop_front()
    }

    /// One sleep-watcher tick: count down every Blocked PCB and move the
    /// ones that reach zero back to Ready and onto the queue.
    pub fn wake_sleepers(&self) {
        let mut inner = self.lock();
        let mut woken = Vec::new();
        for handle in inner.live.values() {
            let mut pcb = handle.lock().unwrap_or_else(PoisonError::into_inner);
            if pcb.state != ProcessState::Blocked {
                continue;
            }
            if pcb.sleep_ticks > 0 {
                pcb.sleep_ticks -= 1;
            }
            if pcb.sleep_ticks == 0 {
                pcb.state = ProcessState::Ready;
                woken.push(handle.clone());
            }
        }
        let any_woken = !woken.is_empty();
        inner.ready_queue.extend(woken);
        drop(inner);
        if any_woken {
            self.ready_cv.notify_all();
        }
    }

    /// Retire a terminated PCB: out of the live table, into the finished
    /// list. Finished PCBs never re-enter the ready queue.
    pub fn finish(&self, handle: &PcbHandle) {
        let name = handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process
            .name
            .clone();
        let mut inner = self.lock();
        inner.live.remove(&name);
        inner.finished.push(handle.clone());
    }

    /// Look a process up by name, live processes first.
    /// The second field is true when it was found in the finished list.
    pub fn find(&self, name: &str) -> Option<(PcbHandle, bool)> {
        let inner = self.lock();
        if let Some(handle) = inner.live.get(name) {
            return Some((handle.clone(), false));
        }
        inner
            .finished
            .iter()
            .find(|handle| {
                handle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .process
                    .name
                    == name
            })
            .map(|handle| (handle.clone(), true))
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn ready_count(&self) -> usize {
        self.lock().ready_queue.len()
    }

    pub fn live_handles(&self) -> Vec<PcbHandle> {
        self.lock().live.values().cloned().collect()
    }

    pub fn finished_handles(&self) -> Vec<PcbHandle> {
        self.lock().finished.clone()
    }

    /// Kick every waiting worker, used on shutdown.
    pub fn notify_all(&self) {
        self.ready_cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use process::Process;
    use types::Instruction;

    fn pcb(name: &str, instructions: Vec<Instruction>) -> Pcb {
        Pcb::new(Process {
            pid: 1,
            name: name.to_string(),
            instructions,
            memory_size: 256,
        })
    }

    #[test]
    fn admit_enqueues_and_rejects_duplicates() {
        let table = ProcessTable::new();
        table.admit(pcb("a", Vec::new())).unwrap();
        assert_eq!(table.live_count(), 1);
        assert_eq!(table.ready_count(), 1);

        let err = table.admit(pcb("a", Vec::new())).unwrap_err();
        assert_eq!(err, TableError::DuplicateName("a".to_string()));
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn queue_is_fifo() {
        let table = ProcessTable::new();
        let first = table.admit(pcb("first", Vec::new())).unwrap();
        let second = table.admit(pcb("second", Vec::new())).unwrap();

        let popped = table.pop_ready(Duration::from_millis(1)).unwrap();
        assert!(std::sync::Arc::ptr_eq(&popped, &first));
        let popped = table.pop_ready(Duration::from_millis(1)).unwrap();
        assert!(std::sync::Arc::ptr_eq(&popped, &second));
        assert!(table.pop_ready(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn sleeper_wakes_after_its_ticks_and_enqueues_once() {
        let table = ProcessTable::new();
        let handle = table.admit(pcb("s", Vec::new())).unwrap();
        // Simulate the worker taking it off the queue and blocking it.
        table.pop_ready(Duration::from_millis(1)).unwrap();
        {
            let mut pcb = handle.lock().unwrap();
            pcb.state = ProcessState::Blocked;
            pcb.sleep_ticks = 5;
        }

        for _ in 0..4 {
            table.wake_sleepers();
            assert_eq!(handle.lock().unwrap().state, ProcessState::Blocked);
            assert_eq!(table.ready_count(), 0);
        }
        table.wake_sleepers();
        assert_eq!(handle.lock().unwrap().state, ProcessState::Ready);
        assert_eq!(table.ready_count(), 1);

        // Already awake: further ticks must not enqueue it again.
        table.wake_sleepers();
        assert_eq!(table.ready_count(), 1);
    }

    #[test]
    fn finished_processes_leave_the_live_table() {
        let table = ProcessTable::new();
        let handle = table.admit(pcb("done", Vec::new())).unwrap();
        table.pop_ready(Duration::from_millis(1)).unwrap();
        handle.lock().unwrap().state = ProcessState::Terminated;

        table.finish(&handle);
        assert_eq!(table.live_count(), 0);
        assert_eq!(table.ready_count(), 0);
        let (found, finished) = table.find("done").unwrap();
        assert!(finished);
        assert!(std::sync::Arc::ptr_eq(&found, &handle));
    }
}
