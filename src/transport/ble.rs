use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use super::{DisconnectCallback, NotificationCallback, Transport, WriteReply};
use crate::session::{RECEIVE_UUID, WRITE_UUID};
use crate::{Error, Result};

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapter = manager.adapters().await?.into_iter().next().ok_or_else(|| {
        error!("No Bluetooth adapters found");
        Error::NoBluetoothAdapters
    })?;
    debug!("Using Bluetooth adapter");
    Ok(adapter)
}

/// btleplug-backed link to one bulb
pub struct BleTransport {
    central: Adapter,
    peripheral: Peripheral,
    characteristics: Mutex<HashMap<Uuid, Characteristic>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("peripheral", &self.peripheral.id())
            .finish()
    }
}

impl BleTransport {
    /// Scans until a peripheral whose address or id matches `address` shows up
    #[instrument]
    pub async fn find(address: &str, scan_timeout: Duration) -> Result<BleTransport> {
        info!("Initializing BLE speaker bulb transport");
        let manager = Manager::new().await?;
        let central = get_central(&manager).await?;

        info!("Scanning for {}...", address);
        central.start_scan(ScanFilter::default()).await?;

        let wanted = address.to_lowercase();
        let start_time = std::time::Instant::now();
        let mut found = None;

        while start_time.elapsed() < scan_timeout && found.is_none() {
            let peripherals = central.peripherals().await?;
            debug!("Found {} BLE peripherals so far", peripherals.len());

            for p in peripherals {
                if p.address().to_string().to_lowercase() == wanted
                    || p.id().to_string().to_lowercase() == wanted
                {
                    let name = match p.properties().await {
                        Ok(Some(props)) => props.local_name,
                        _ => None,
                    };
                    debug!("Found device: {:?}", name);
                    found = Some(p);
                    break;
                }
            }

            if found.is_none() {
                let remaining = scan_timeout.saturating_sub(start_time.elapsed());
                info!(
                    "Still scanning for a device... ({} seconds remaining)",
                    remaining.as_secs()
                );
                time::sleep(Duration::from_millis(500)).await;
            }
        }

        central.stop_scan().await?;
        let peripheral = found.ok_or_else(|| {
            error!(
                "No device {} found within {} seconds",
                address,
                scan_timeout.as_secs()
            );
            Error::NoCompatibleDevice
        })?;

        Ok(BleTransport {
            central,
            peripheral,
            characteristics: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .lock()
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound(uuid.to_string()))
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    async fn watch_disconnect(&self, on_disconnect: DisconnectCallback) -> Result<()> {
        let mut events = self.central.events().await?;
        let id = self.peripheral.id();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        debug!("Peripheral {:?} disconnected", gone);
                        on_disconnect();
                        break;
                    }
                }
            }
        });
        self.tasks.lock().push(task);
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self, on_disconnect: DisconnectCallback) -> Result<()> {
        self.abort_tasks();

        info!("Connecting to device...");
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }

        debug!("Discovering services...");
        self.peripheral.discover_services().await?;

        let characteristics: HashMap<Uuid, Characteristic> = self
            .peripheral
            .characteristics()
            .into_iter()
            .map(|c| (c.uuid, c))
            .collect();
        for required in [WRITE_UUID, RECEIVE_UUID] {
            if !characteristics.contains_key(&required) {
                return Err(Error::CharacteristicNotFound(required.to_string()));
            }
        }
        debug!("Found {} characteristics", characteristics.len());
        *self.characteristics.lock() = characteristics;

        self.watch_disconnect(on_disconnect).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.abort_tasks();
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }

    #[instrument(skip(self, data), level = "trace", fields(data_len = data.len()))]
    async fn write(&self, uuid: Uuid, data: &[u8], with_response: bool) -> Result<WriteReply> {
        let characteristic = self.characteristic(uuid)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral
            .write(&characteristic, data, write_type)
            .await?;
        trace!("Write completed");
        Ok(WriteReply::Acknowledged)
    }

    #[instrument(skip(self), level = "trace")]
    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(uuid)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn subscribe(&self, uuid: Uuid, on_data: NotificationCallback) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        let mut notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;

        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != uuid {
                    continue;
                }
                on_data(notification.value);
            }
            warn!("Notification stream closed");
        });
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }
}
