use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic logical tick counter shared by the generator and core workers.
#[derive(Debug, Default)]
pub struct CpuClock {
    cycles: AtomicU64,
}

impl CpuClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_count_up() {
        let clock = CpuClock::new();
        assert_eq!(clock.cycles(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.cycles(), 2);
    }
}
