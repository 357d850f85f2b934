//! Loopback TCP surface of a session
//!
//! Every session binds its own listener. At most one consumer is current at
//! a time; a new connection replaces the previous one.

pub mod config;
pub mod consumer;
pub mod listener;

pub use config::ServerConfig;
pub use consumer::{Consumer, ConsumerExit, SendError};
pub use listener::StreamListener;
