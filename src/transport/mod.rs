/*!
 # Link transport

 The session talks to the bulb through [`Transport`]: a connected GATT link
 that writes, reads and subscribes to characteristics by UUID. The
 [`ble::BleTransport`] implementation drives a real adapter through btleplug,
 [`fake::FakeTransport`] is a scripted stand-in for tests and dry runs.
*/

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;

pub mod ble;
pub mod fake;

/// Receives raw notification payloads from the subscribed characteristic
pub type NotificationCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Invoked once when the link drops on the transport side
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Outcome of a write request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteReply {
    /// The peripheral confirmed the write
    Acknowledged,
    /// The write went out but the peripheral answered with something else
    Unacknowledged(Vec<u8>),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the link. `on_disconnect` fires when the peripheral goes away.
    async fn connect(&self, on_disconnect: DisconnectCallback) -> Result<()>;

    /// Closes the link
    async fn disconnect(&self) -> Result<()>;

    /// Writes `data` to the characteristic `uuid`
    async fn write(&self, uuid: Uuid, data: &[u8], with_response: bool) -> Result<WriteReply>;

    /// Reads the current value of the characteristic `uuid`
    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>>;

    /// Enables notifications on `uuid` and forwards each payload to `on_data`
    async fn subscribe(&self, uuid: Uuid, on_data: NotificationCallback) -> Result<()>;

    async fn is_connected(&self) -> bool;
}
