//! Remote camera control surface
//!
//! The crate never talks to a camera itself. Callers supply a
//! [`DeviceClient`] that issues start/stop commands over whatever vendor
//! channel they use, and push [`DeviceEvent`]s into the session registry as
//! media arrives.

pub mod client;
pub mod event;

pub use client::DeviceClient;
pub use event::{AudioMetadata, DeviceEvent, VideoMetadata};
