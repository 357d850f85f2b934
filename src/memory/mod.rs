//! Cross-session memory pressure handling
//!
//! One [`MemoryCoordinator`] is shared by every streaming session. It reads
//! process resident memory on a timer (and on demand), compares it with
//! three thresholds derived from a configurable base, and asks every
//! registered session to shrink its buffers.
//!
//! ```text
//!                 Arc<MemoryCoordinator>
//!            ┌──────────────────────────────┐
//!            │ probe: resident bytes        │
//!            │ handlers: id -> CleanupHandler│
//!            │ cooldowns per level          │
//!            └──────────────┬───────────────┘
//!          CleanupRequest   │
//!     ┌─────────────────────┼─────────────────────┐
//!     ▼                     ▼                     ▼
//! [session A]          [session B]          [session C]
//! apply_cleanup()      apply_cleanup()      apply_cleanup()
//! ```
//!
//! The coordinator never touches session buffers; sessions apply requests
//! on their own task.

pub mod config;
pub mod coordinator;
pub mod probe;

pub use config::{MemoryConfig, Thresholds};
pub use coordinator::{CleanupHandler, MemoryCoordinator};
pub use probe::{ManualProbe, MemoryProbe, ProcessMemoryProbe};

/// Severity of a cleanup request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CleanupLevel {
    /// Trim buffers to about 60%
    Gentle,
    /// Cap buffers at a handful of units
    Aggressive,
    /// Keep only the newest unit, drop assembly buffers
    Emergency,
}

impl CleanupLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupLevel::Gentle => "gentle",
            CleanupLevel::Aggressive => "aggressive",
            CleanupLevel::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for CleanupLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request delivered to every registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupRequest {
    pub level: CleanupLevel,
    /// Resident memory at the time of the check
    pub process_rss_bytes: u64,
    /// Base threshold in effect
    pub threshold_bytes: u64,
}
