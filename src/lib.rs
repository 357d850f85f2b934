//! Live H.264/AAC camera stream relay
//!
//! Takes video and audio chunks pushed by a remote camera channel,
//! reassembles them into NAL units, keeps a bounded late-joiner buffer, and
//! serves the stream to a local consumer (typically a transcoder) over a
//! loopback TCP socket, prefixed with a synthesized fMP4 init segment.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camstream_rs::device::{DeviceClient, DeviceEvent};
//! use camstream_rs::registry::StreamManager;
//!
//! # async fn run(client: Arc<dyn DeviceClient>, events: tokio::sync::mpsc::Receiver<DeviceEvent>)
//! #     -> camstream_rs::Result<()> {
//! let manager = Arc::new(StreamManager::new(client));
//! manager.spawn_event_router(events);
//!
//! let endpoint = manager.acquire_stream("front-door").await?;
//! println!("ffmpeg -f h264 -i tcp://{endpoint} ...");
//!
//! manager.release_stream("front-door", "viewer left").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Memory across all sessions is watched by one shared
//! [`MemoryCoordinator`](memory::MemoryCoordinator), which asks sessions to
//! shrink their buffers when the process grows past its threshold.

pub mod device;
pub mod error;
pub mod media;
pub mod memory;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use device::{DeviceClient, DeviceEvent};
pub use error::{DeviceError, Error, MediaError, Result, SessionError};
pub use memory::{MemoryConfig, MemoryCoordinator};
pub use registry::StreamManager;
pub use server::ServerConfig;
pub use session::{SessionConfig, StreamSession};
