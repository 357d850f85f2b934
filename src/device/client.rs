//! Device command client

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DeviceError;

/// Commands a session issues against a remote camera
///
/// Implementations should treat "already started" and "already stopped" as
/// errors only if the device reports them as such; sessions log command
/// failures and re-check [`is_livestreaming`](Self::is_livestreaming) rather
/// than trusting their own view of the device.
#[async_trait]
pub trait DeviceClient: Send + Sync + 'static {
    async fn start_livestream(&self, device_id: &str) -> Result<(), DeviceError>;

    async fn stop_livestream(&self, device_id: &str) -> Result<(), DeviceError>;

    async fn is_livestreaming(&self, device_id: &str) -> Result<bool, DeviceError>;
}

/// Await a device command for at most `limit`
///
/// Expiry becomes [`DeviceError::Timeout`], so callers handle a hung device
/// the same way as a failed command.
pub(crate) async fn bounded<T, F>(
    device_id: &str,
    command: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, DeviceError>
where
    F: Future<Output = Result<T, DeviceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DeviceError::Timeout {
            device: device_id.to_string(),
            command,
            after: limit,
        }),
    }
}
