/*!
 # Speaker Bulb Bluetooth Controller Library

 A Rust library for controlling Bluetooth LE smart bulbs with an integrated speaker.
 Commands are sent as small fixed-format frames (`55 aa len category function payload checksum`)
 and device state is reconciled from the status frames the bulb sends back.

 ## Features

 * Power on/off control
 * RGB color, white mode and white intensity
 * Brightness adjustment
 * Light effects (rainbow, heartbeat, candlelight, ...)
 * Speaker volume, equalizer bands and equalizer presets
 * Auto-light, auto-music and alarm timer toggles
 * Automatic reconnect with a bounded retry budget
 * Status notifications pushed by the bulb

 ## Example

 ```no_run
 use speaker_bulb::*;
 use std::sync::Arc;
 use std::time::Duration;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let transport = BleTransport::find("AA:BB:CC:DD:EE:FF", Duration::from_secs(10)).await?;
     let bulb = SpeakerBulb::new(Arc::new(transport), SessionConfig::default());
     bulb.connect().await?;

     // Basic operations
     bulb.turn_on(None, None).await?;
     bulb.set_color_rgb(Rgb::new(255, 0, 0)).await?; // Set to red
     bulb.set_brightness(200).await?;
     bulb.set_volume(40).await?;

     Ok(())
 }
 ```
*/

use std::time::Duration;
use thiserror::Error;

/// Custom error types for the speaker bulb library
#[derive(Error, Debug)]
pub enum Error {
    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// No compatible bulb found
    #[error("No compatible bulb found")]
    NoCompatibleDevice,

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// BLE communication error
    #[error("BLE communication error: {0}")]
    BleError(String),

    /// Every connection attempt failed
    #[error("Device unavailable after {0} connection attempts")]
    TransportUnavailable(u8),

    /// The peripheral refused a write
    #[error("Command rejected by the device")]
    CommandRejected,

    /// A transport operation did not finish in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Effect or preset name that is not part of the effect tables
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    /// Malformed protocol frame
    #[error(transparent)]
    Frame(#[from] frame::FrameError),

    /// Error from btleplug
    #[error(transparent)]
    BtlePlugError(#[from] btleplug::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod command;
pub mod decode;
pub mod device;
pub mod effects;
pub mod frame;
pub mod schedule;
pub mod session;
pub mod state;
pub mod transport;

// Re-export key types
pub use command::{Category, Command, Direction, EqualizerBand, LevelRange, Query, Rgb};
pub use decode::{decode, AlarmStatus, AutoTimerStatus, LightStatus, SpeakerStatus, Status};
pub use device::SpeakerBulb;
pub use effects::{Effect, LightEffect, SpeakerEffect, WhiteEffect};
pub use frame::{checksum, encode, verify_checksum, Frame, FrameError, Payload};
pub use schedule::TimerSlot;
pub use session::{ConnectionState, Session, SessionConfig};
pub use state::{LightState, LightUpdate, SpeakerState, SpeakerUpdate, TimerState, TimerUpdate};
pub use transport::ble::BleTransport;
pub use transport::fake::FakeTransport;
pub use transport::{DisconnectCallback, NotificationCallback, Transport, WriteReply};
