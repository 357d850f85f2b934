//! Resident memory sources

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sysinfo::{Pid, System};

/// Something that can report the process resident set size
pub trait MemoryProbe: Send + Sync + 'static {
    /// Current resident memory in bytes
    fn resident_bytes(&self) -> u64;
}

/// Reads this process's RSS through `sysinfo`
pub struct ProcessMemoryProbe {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = e, "Cannot determine current pid, memory checks disabled");
                None
            }
        };
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

/// A probe whose value is set by hand, for tests and embedding
#[derive(Debug, Default)]
pub struct ManualProbe {
    bytes: AtomicU64,
}

impl ManualProbe {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for ManualProbe {
    fn resident_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
