//! Streaming session management
//!
//! A session drives one device's stream: start and stop commands, NAL unit
//! ingestion and buffering, and the loopback listener consumers read from.

pub mod config;
pub mod handle;
pub mod state;
pub mod stream;

pub use config::SessionConfig;
pub use handle::StreamSession;
pub use state::{StreamPhase, StreamState};
pub use stream::KEEPALIVE_FILLER;
