//! Session registry and event routing
//!
//! # Architecture
//!
//! ```text
//!    device channel ──► mpsc<DeviceEvent> ──► StreamManager::dispatch
//!                                                   │
//!                        ┌──────────────────────────┼──────────────────────┐
//!                        ▼                          ▼                      ▼
//!                 StreamSession(cam-1)      StreamSession(cam-2)         ...
//!                        │                          │
//!                 127.0.0.1:port ◄── consumer  127.0.0.1:port ◄── consumer
//! ```
//!
//! All sessions share one `Arc<MemoryCoordinator>`, handed in at
//! construction.

pub mod store;

pub use store::StreamManager;
