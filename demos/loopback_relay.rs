//! Loopback relay demo
//!
//! Run with: cargo run --example loopback_relay
//!
//! A fake camera produces a synthetic H.264 stream (SPS, PPS, then one IDR
//! followed by P-slices, repeating). The demo acquires the stream, connects
//! to the returned endpoint the way a transcoder would, and reports what
//! arrived.
//!
//! ```text
//!   FakeCamera ──► mpsc<DeviceEvent> ──► StreamManager ──► 127.0.0.1:port ──► reader
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use camstream_rs::device::{DeviceClient, DeviceEvent, VideoMetadata};
use camstream_rs::{DeviceError, StreamManager};

const DEVICE: &str = "demo-cam";

const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE4];
const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

/// Pretends to be a camera; streaming is a flag flipped by start/stop
#[derive(Default)]
struct FakeCamera {
    streaming: AtomicBool,
}

impl FakeCamera {
    fn check(&self, device_id: &str) -> Result<(), DeviceError> {
        if device_id == DEVICE {
            Ok(())
        } else {
            Err(DeviceError::NotFound(device_id.to_string()))
        }
    }
}

#[async_trait]
impl DeviceClient for FakeCamera {
    async fn start_livestream(&self, device_id: &str) -> Result<(), DeviceError> {
        self.check(device_id)?;
        println!("[{device_id}] start_livestream");
        self.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_livestream(&self, device_id: &str) -> Result<(), DeviceError> {
        self.check(device_id)?;
        println!("[{device_id}] stop_livestream");
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_livestreaming(&self, device_id: &str) -> Result<bool, DeviceError> {
        self.check(device_id)?;
        Ok(self.streaming.load(Ordering::SeqCst))
    }
}

fn unit(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 4);
    buf.put_slice(&[0, 0, 0, 1]);
    buf.put_slice(payload);
    buf.freeze()
}

fn slice(nal_header: u8, frame: u8) -> Bytes {
    let mut payload = vec![nal_header, 0x88, 0x84, frame];
    payload.extend(std::iter::repeat(0xAB).take(200));
    unit(&payload)
}

/// Push one GOP every second until the channel closes
async fn run_camera(camera: Arc<FakeCamera>, events: mpsc::Sender<DeviceEvent>) {
    let mut frame: u8 = 0;
    loop {
        if camera.streaming.load(Ordering::SeqCst) {
            let mut chunk = BytesMut::new();
            chunk.put(unit(SPS));
            chunk.put(unit(PPS));
            chunk.put(slice(0x65, frame));
            let first = DeviceEvent::VideoData {
                device_id: DEVICE.into(),
                data: chunk.freeze(),
                metadata: Some(VideoMetadata::new(1280, 720, 15.0)),
            };
            if events.send(first).await.is_err() {
                return;
            }
            for _ in 0..14 {
                frame = frame.wrapping_add(1);
                if events.send(DeviceEvent::video(DEVICE, slice(0x41, frame))).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(66)).await;
            }
        } else {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camstream_rs=debug".parse()?)
                .add_directive("loopback_relay=debug".parse()?),
        )
        .init();

    let camera = Arc::new(FakeCamera::default());
    let manager = Arc::new(StreamManager::new(camera.clone()));

    let (tx, rx) = mpsc::channel(64);
    let router = manager.spawn_event_router(rx);
    tokio::spawn(run_camera(camera, tx));

    let endpoint = manager.acquire_stream(DEVICE).await?;
    println!("Stream available at tcp://{endpoint}");

    let mut reader = TcpStream::connect(endpoint).await?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0usize;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout_at(deadline, reader.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => {
                if total == 0 {
                    println!("First bytes: {:02X?}", &buf[..n.min(8)]);
                }
                total += n;
            }
            Ok(Err(e)) => return Err(e.into()),
        }
    }
    println!("Received {total} bytes");

    if let Some(stats) = manager.stats(DEVICE).await {
        println!(
            "Stats: phase={} units={} dropped={} forwarded={} keyframes={} buffered={}",
            stats.phase,
            stats.counters.video_units,
            stats.counters.dropped_units,
            stats.counters.forwarded,
            stats.counters.keyframes,
            stats.buffered_video_units,
        );
    }

    manager.shutdown().await;
    router.abort();
    Ok(())
}
