/*!
 # Connection session

 [`Session`] owns the transport and the connection lifecycle. Every exchange
 with the bulb goes through a single-permit command queue, so a command and
 the status read that follows it are never interleaved with another caller.

 Each successful connection gets a new generation number. Notification and
 disconnect callbacks remember the generation they were registered under and
 are ignored once a newer connection exists.
*/

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::decode::{decode, Status};
use crate::transport::{DisconnectCallback, NotificationCallback, Transport, WriteReply};
use crate::{Error, Result};

/// Characteristic commands are written to
pub const WRITE_UUID: Uuid = Uuid::from_u128(0x0000a040_0000_1000_8000_00805f9b34fb);
/// Characteristic status frames are read and notified from
pub const RECEIVE_UUID: Uuid = Uuid::from_u128(0x0000a041_0000_1000_8000_00805f9b34fb);
/// Standard GAP device name, used as a liveness probe
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);

/// Receives every status the bulb pushes on its own
pub type StatusObserver = Arc<dyn Fn(&Status) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Session tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Connection attempts made before an operation gives up
    pub retries: u8,
    /// Upper bound for a single transport operation
    pub timeout: Duration,
    /// Minimum delay between two exchanges
    pub command_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(20),
            command_delay: Duration::ZERO,
        }
    }
}

impl SessionConfig {
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_command_delay(mut self, command_delay: Duration) -> Self {
        self.command_delay = command_delay;
        self
    }
}

/// Command queue to serialize exchanges with rate limiting
struct CommandQueue {
    /// Minimum delay between commands
    min_delay: Duration,
    /// Completion time of the last exchange; the lock doubles as the permit
    last_command: Mutex<Option<Instant>>,
}

impl CommandQueue {
    fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_command: Mutex::new(None),
        }
    }

    async fn execute<T, F>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_cmd = self.last_command.lock().await;

        if let Some(last) = *last_cmd {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                trace!("Rate limiting: waiting {:?} before next command", wait_time);
                time::sleep(wait_time).await;
            }
        }

        let result = future.await;
        *last_cmd = Some(Instant::now());
        result
    }
}

struct Link {
    state: ConnectionState,
    generation: u64,
}

struct Dispatcher {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

/// One logical connection to a bulb
pub struct Session {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    queue: CommandQueue,
    link: Arc<SyncMutex<Link>>,
    observers: Arc<RwLock<Vec<StatusObserver>>>,
    dispatcher: SyncMutex<Option<Dispatcher>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.link.lock();
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &link.state)
            .field("generation", &link.generation)
            .finish()
    }
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let queue = CommandQueue::new(config.command_delay);
        Self {
            transport,
            config,
            queue,
            link: Arc::new(SyncMutex::new(Link {
                state: ConnectionState::Disconnected,
                generation: 0,
            })),
            observers: Arc::new(RwLock::new(Vec::new())),
            dispatcher: SyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    /// Generation of the current (or last) connection
    pub fn generation(&self) -> u64 {
        self.link.lock().generation
    }

    /// Registers an observer for statuses the bulb pushes
    pub fn on_status(&self, observer: impl Fn(&Status) + Send + Sync + 'static) {
        self.observers.write().push(Arc::new(observer));
    }

    /// Connects, making at most `max_attempts` attempts
    #[instrument(skip(self))]
    pub async fn connect(&self, max_attempts: u8) -> Result<()> {
        self.queue.execute(self.establish(max_attempts)).await
    }

    /// Closes the link. Callbacks of the closed connection go stale.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        self.queue
            .execute(async {
                self.close().await;
                info!("Disconnected");
                Ok(())
            })
            .await
    }

    /// Writes a command frame. `true` only when the bulb acknowledged it.
    #[instrument(skip(self, frame), fields(frame = ?frame))]
    pub async fn send_command(&self, frame: &[u8]) -> Result<bool> {
        self.queue
            .execute(async {
                self.ensure_connected().await?;
                Ok(self.write_frame(frame).await)
            })
            .await
    }

    /// Reads the receive characteristic
    #[instrument(skip(self))]
    pub async fn read_status(&self) -> Result<Option<Vec<u8>>> {
        self.queue
            .execute(async {
                self.ensure_connected().await?;
                Ok(self.read_frame().await)
            })
            .await
    }

    /// Writes `frame` and reads the reply as one exchange
    #[instrument(skip(self, frame), fields(frame = ?frame))]
    pub async fn request(&self, frame: &[u8]) -> Result<Option<Vec<u8>>> {
        self.queue
            .execute(async {
                self.ensure_connected().await?;
                if !self.write_frame(frame).await {
                    return Ok(None);
                }
                Ok(self.read_frame().await)
            })
            .await
    }

    /// Runs one exchange per frame, in order, without releasing the queue.
    /// Any failed exchange discards the whole batch.
    #[instrument(skip(self, frames), fields(frames = frames.len()))]
    pub async fn request_batch(&self, frames: &[Vec<u8>]) -> Result<Option<Vec<Vec<u8>>>> {
        self.queue
            .execute(async {
                self.ensure_connected().await?;
                let mut replies = Vec::with_capacity(frames.len());
                for frame in frames {
                    if !self.write_frame(frame).await {
                        debug!("Batch discarded after {} replies", replies.len());
                        return Ok(None);
                    }
                    match self.read_frame().await {
                        Some(reply) => replies.push(reply),
                        None => {
                            debug!("Batch discarded after {} replies", replies.len());
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(replies))
            })
            .await
    }

    /// Probes the link by reading the device name. A failed read closes the
    /// link and leaves the callbacks of that connection stale.
    #[instrument(skip(self))]
    pub async fn test_liveness(&self) -> bool {
        self.queue
            .execute(async {
                if self.state() != ConnectionState::Connected {
                    return false;
                }
                match self.bounded(self.transport.read(DEVICE_NAME_UUID)).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Liveness probe failed: {}", e);
                        self.close().await;
                        false
                    }
                }
            })
            .await
    }

    /// Advertised device name with trailing NULs stripped
    #[instrument(skip(self))]
    pub async fn device_name(&self) -> Result<Option<String>> {
        self.queue
            .execute(async {
                self.ensure_connected().await?;
                match self.bounded(self.transport.read(DEVICE_NAME_UUID)).await {
                    Ok(raw) => {
                        let name = String::from_utf8_lossy(&raw)
                            .trim_matches('\0')
                            .to_string();
                        Ok(Some(name))
                    }
                    Err(e) => {
                        warn!("Device name read failed: {}", e);
                        Ok(None)
                    }
                }
            })
            .await
    }

    /// Retires the current generation and closes the transport
    async fn close(&self) {
        {
            let mut link = self.link.lock();
            link.generation += 1;
            link.state = ConnectionState::Disconnected;
        }
        if let Err(e) = self.bounded(self.transport.disconnect()).await {
            warn!("Disconnect failed: {}", e);
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.state() == ConnectionState::Connected && self.transport.is_connected().await {
            return Ok(());
        }
        debug!("Link is down, reconnecting");
        self.establish(self.config.retries).await
    }

    async fn establish(&self, max_attempts: u8) -> Result<()> {
        let sender = self.dispatcher();

        for attempt in 1..=max_attempts {
            let generation = {
                let mut link = self.link.lock();
                link.generation += 1;
                link.state = ConnectionState::Connecting;
                link.generation
            };
            debug!(
                "Connecting (attempt {}/{}, generation {})",
                attempt, max_attempts, generation
            );

            match self.open(generation, sender.clone()).await {
                Ok(()) => {
                    let mut link = self.link.lock();
                    if link.generation == generation {
                        link.state = ConnectionState::Connected;
                    }
                    info!("Connected (generation {})", generation);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Connection failed (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    );
                }
            }
        }

        self.link.lock().state = ConnectionState::Disconnected;
        error!("Device unavailable after {} attempts", max_attempts);
        Err(Error::TransportUnavailable(max_attempts))
    }

    async fn open(&self, generation: u64, sender: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        let link = Arc::clone(&self.link);
        let on_disconnect: DisconnectCallback = Arc::new(move || {
            let mut link = link.lock();
            if link.generation != generation {
                trace!("Ignoring disconnect of stale generation {}", generation);
                return;
            }
            if link.state == ConnectionState::Connected {
                info!("Device disconnected");
                link.state = ConnectionState::Disconnected;
            }
        });

        let link = Arc::clone(&self.link);
        let on_data: NotificationCallback = Arc::new(move |data| {
            if link.lock().generation != generation {
                trace!("Ignoring notification of stale generation {}", generation);
                return;
            }
            if sender.send(data).is_err() {
                debug!("Notification dispatcher is gone");
            }
        });

        self.bounded(self.transport.connect(on_disconnect)).await?;
        if let Err(e) = self
            .bounded(self.transport.subscribe(RECEIVE_UUID, on_data))
            .await
        {
            if let Err(close) = self.transport.disconnect().await {
                debug!("Closing half-open link failed: {}", close);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> bool {
        match self
            .bounded(self.transport.write(WRITE_UUID, frame, true))
            .await
        {
            Ok(WriteReply::Acknowledged) => {
                trace!("Command acknowledged");
                true
            }
            Ok(WriteReply::Unacknowledged(reply)) => {
                warn!("Command not acknowledged: {:02x?}", reply);
                false
            }
            Err(e) => {
                warn!("Command failed: {}", e);
                false
            }
        }
    }

    async fn read_frame(&self) -> Option<Vec<u8>> {
        match self.bounded(self.transport.read(RECEIVE_UUID)).await {
            Ok(raw) if raw.is_empty() => {
                debug!("Status read returned no data");
                None
            }
            Ok(raw) => {
                trace!("Status frame: {:02x?}", raw);
                Some(raw)
            }
            Err(e) => {
                warn!("Status read failed: {}", e);
                None
            }
        }
    }

    async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        time::timeout(self.config.timeout, operation)
            .await
            .map_err(|_| Error::Timeout(self.config.timeout))?
    }

    fn dispatcher(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        let mut slot = self.dispatcher.lock();
        if let Some(dispatcher) = slot.as_ref() {
            return dispatcher.sender.clone();
        }

        let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
        let observers = Arc::clone(&self.observers);
        let task = tokio::spawn(async move {
            while let Some(data) = receiver.recv().await {
                match decode(&data) {
                    Ok(Some(status)) => {
                        let observers = observers.read().clone();
                        for observer in observers {
                            observer(&status);
                        }
                    }
                    Ok(None) => debug!("Notification without a known status: {:02x?}", data),
                    Err(e) => debug!("Undecodable notification: {}", e),
                }
            }
        });

        *slot = Some(Dispatcher {
            sender: sender.clone(),
            task,
        });
        sender
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;
    use pretty_assertions::assert_eq;

    #[test]
    fn characteristic_uuids() {
        assert_eq!(
            "0000a040-0000-1000-8000-00805f9b34fb",
            WRITE_UUID.to_string()
        );
        assert_eq!(
            "0000a041-0000-1000-8000-00805f9b34fb",
            RECEIVE_UUID.to_string()
        );
        assert_eq!(
            "00002a00-0000-1000-8000-00805f9b34fb",
            DEVICE_NAME_UUID.to_string()
        );
    }

    #[test]
    fn config_builder() {
        let config = SessionConfig::default()
            .with_retries(5)
            .with_timeout(Duration::from_secs(2))
            .with_command_delay(Duration::from_millis(50));
        assert_eq!(5, config.retries);
        assert_eq!(Duration::from_secs(2), config.timeout);
        assert_eq!(Duration::from_millis(50), config.command_delay);
        assert_eq!(3, SessionConfig::default().retries);
    }

    #[tokio::test(start_paused = true)]
    async fn command_queue_spaces_out_exchanges() {
        let queue = CommandQueue::new(Duration::from_millis(200));
        let start = Instant::now();
        queue.execute(async {}).await;
        queue.execute(async {}).await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn fresh_session_is_disconnected() {
        let session = Session::new(Arc::new(FakeTransport::new()), SessionConfig::default());
        assert_eq!(ConnectionState::Disconnected, session.state());
        assert_eq!(0, session.generation());
        assert!(!session.test_liveness().await);
    }
}
