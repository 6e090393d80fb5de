/*!
 # Scripted transport

 An in-memory [`Transport`] with queued replies. Tests script what the bulb
 answers, then inspect what was written and inject notifications or link
 drops. Callbacks handed to the transport are kept in registration order so
 stale ones can be fired deliberately.
*/

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{DisconnectCallback, NotificationCallback, Transport, WriteReply};
use crate::session::DEVICE_NAME_UUID;
use crate::{Error, Result};

#[derive(Default)]
struct FakeState {
    connected: bool,
    connect_attempts: usize,
    failing_connects: usize,
    failing_writes: usize,
    failing_name_reads: usize,
    write_replies: VecDeque<WriteReply>,
    reads: VecDeque<Vec<u8>>,
    device_name: Vec<u8>,
    written: Vec<(Uuid, Vec<u8>)>,
    notify_after_write: VecDeque<Vec<u8>>,
    disconnect_callbacks: Vec<DisconnectCallback>,
    notification_callbacks: Vec<NotificationCallback>,
}

/// Transport double driven entirely from test code
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl std::fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeTransport")
            .field("connected", &state.connected)
            .field("connect_attempts", &state.connect_attempts)
            .field("written", &state.written.len())
            .finish()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` connection attempts fail
    pub fn fail_connects(&self, count: usize) {
        self.state.lock().failing_connects = count;
    }

    /// Makes the next `count` writes fail as rejected by the device
    pub fn fail_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    pub fn fail_next_write(&self) {
        self.fail_writes(1);
    }

    /// Queues the reply for an upcoming write. Writes are acknowledged when
    /// nothing is queued.
    pub fn push_write_reply(&self, reply: WriteReply) {
        self.state.lock().write_replies.push_back(reply);
    }

    /// Queues the value returned by an upcoming status read
    pub fn push_read(&self, data: impl Into<Vec<u8>>) {
        self.state.lock().reads.push_back(data.into());
    }

    pub fn set_device_name(&self, name: impl Into<Vec<u8>>) {
        self.state.lock().device_name = name.into();
    }

    /// Makes the next `count` device-name reads fail
    pub fn fail_name_reads(&self, count: usize) {
        self.state.lock().failing_name_reads = count;
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    /// Every successful write, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .written
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    /// Delivers `data` to the most recent notification subscriber
    pub fn notify(&self, data: impl Into<Vec<u8>>) {
        let callback = self.state.lock().notification_callbacks.last().cloned();
        if let Some(callback) = callback {
            callback(data.into());
        }
    }

    /// Delivers `data` to the current subscriber right after the next
    /// successful write, before its reply can be read
    pub fn notify_after_next_write(&self, data: impl Into<Vec<u8>>) {
        self.state.lock().notify_after_write.push_back(data.into());
    }

    /// Delivers `data` to the subscriber registered at `index`
    pub fn notify_via(&self, index: usize, data: impl Into<Vec<u8>>) {
        let callback = self.state.lock().notification_callbacks.get(index).cloned();
        if let Some(callback) = callback {
            callback(data.into());
        }
    }

    /// Drops the link and fires the current disconnect callback
    pub fn drop_link(&self) {
        let callback = {
            let mut state = self.state.lock();
            state.connected = false;
            state.disconnect_callbacks.last().cloned()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Fires the disconnect callback registered at `index` without touching the link
    pub fn fire_disconnect(&self, index: usize) {
        let callback = self.state.lock().disconnect_callbacks.get(index).cloned();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, on_disconnect: DisconnectCallback) -> Result<()> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            debug!(attempt = state.connect_attempts, "fake connect refused");
            return Err(Error::BleError("connection refused".to_string()));
        }
        state.connected = true;
        state.disconnect_callbacks.push(on_disconnect);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.lock().connected = false;
        Ok(())
    }

    async fn write(&self, uuid: Uuid, data: &[u8], _with_response: bool) -> Result<WriteReply> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::BleError("not connected".to_string()));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(Error::CommandRejected);
        }
        state.written.push((uuid, data.to_vec()));
        let reply = state
            .write_replies
            .pop_front()
            .unwrap_or(WriteReply::Acknowledged);

        let pushed = state.notify_after_write.pop_front();
        let callback = state.notification_callbacks.last().cloned();
        drop(state);
        if let (Some(pushed), Some(callback)) = (pushed, callback) {
            debug!("fake notification during exchange");
            callback(pushed);
        }
        Ok(reply)
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::BleError("not connected".to_string()));
        }
        if uuid == DEVICE_NAME_UUID {
            if state.failing_name_reads > 0 {
                state.failing_name_reads -= 1;
                return Err(Error::BleError("read failed".to_string()));
            }
            return Ok(state.device_name.clone());
        }
        Ok(state.reads.pop_front().unwrap_or_default())
    }

    async fn subscribe(&self, _uuid: Uuid, on_data: NotificationCallback) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::BleError("not connected".to_string()));
        }
        state.notification_callbacks.push(on_data);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}
