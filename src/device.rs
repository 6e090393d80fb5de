use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::command::{Command, LightFunction, Query, Rgb, SpeakerFunction, OFF, ON};
use crate::decode::{decode, SpeakerStatus, Status};
use crate::effects::{Effect, SpeakerEffect};
use crate::frame::Payload;
use crate::schedule::TimerSlot;
use crate::session::{ConnectionState, Session, SessionConfig};
use crate::state::{
    LightState, LightUpdate, SpeakerState, SpeakerUpdate, TimerState, TimerUpdate,
};
use crate::transport::Transport;
use crate::{EqualizerBand, Result};

/// Main struct for controlling a speaker bulb
///
/// Every operation returns `Ok(true)` when the bulb acknowledged it and
/// `Ok(false)` when a write or read failed. Only running out of connection
/// attempts is reported as an error.
pub struct SpeakerBulb {
    session: Session,
    /// Serializes public operations, including their read-backs
    operation: Mutex<()>,
    light: Arc<RwLock<LightState>>,
    speaker: RwLock<SpeakerState>,
    timers: RwLock<TimerState>,
}

impl std::fmt::Debug for SpeakerBulb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerBulb")
            .field("session", &self.session)
            .field("light", &*self.light.read())
            .field("speaker", &*self.speaker.read())
            .finish()
    }
}

impl SpeakerBulb {
    /// Creates a controller for the bulb behind `transport`. Nothing is sent
    /// until [`SpeakerBulb::connect`] or the first operation.
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let session = Session::new(transport, config);
        let light = Arc::new(RwLock::new(LightState::default()));

        let pushed = Arc::clone(&light);
        session.on_status(move |status| {
            if let Status::Light(status) = status {
                debug!("Light status pushed by the bulb");
                pushed.write().apply(LightUpdate::Status(*status));
            }
        });

        Self {
            session,
            operation: Mutex::new(()),
            light,
            speaker: RwLock::new(SpeakerState::default()),
            timers: RwLock::new(TimerState::default()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Snapshot of the light model
    pub fn light(&self) -> LightState {
        self.light.read().clone()
    }

    /// Snapshot of the speaker model
    pub fn speaker(&self) -> SpeakerState {
        self.speaker.read().clone()
    }

    /// Snapshot of the timer model
    pub fn timers(&self) -> TimerState {
        self.timers.read().clone()
    }

    /// Registers an observer for statuses the bulb pushes on its own
    pub fn on_status(&self, observer: impl Fn(&Status) + Send + Sync + 'static) {
        self.session.on_status(observer);
    }

    /// Connects using the configured number of attempts
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let retries = self.session.config().retries;
        self.session.connect(retries).await?;
        info!("Speaker bulb connected");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Checks that the link still answers
    pub async fn test_connection(&self) -> bool {
        self.session.test_liveness().await
    }

    pub async fn device_name(&self) -> Result<Option<String>> {
        self.session.device_name().await
    }

    /// Names of every light effect, white presets included
    pub fn light_effects(&self) -> Vec<&'static str> {
        Effect::all().map(Effect::name).collect()
    }

    /// Names of the equalizer presets
    pub fn speaker_effects(&self) -> Vec<&'static str> {
        SpeakerEffect::ALL.into_iter().map(SpeakerEffect::name).collect()
    }

    /// Refreshes the light model, then the speaker model
    #[instrument(skip(self))]
    pub async fn update(&self) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let light = self.refresh_light().await?;
        let speaker = self.refresh_speaker().await?;
        Ok(light && speaker)
    }

    #[instrument(skip(self))]
    pub async fn update_light(&self) -> Result<bool> {
        let _guard = self.operation.lock().await;
        self.refresh_light().await
    }

    #[instrument(skip(self))]
    pub async fn update_speaker(&self) -> Result<bool> {
        let _guard = self.operation.lock().await;
        self.refresh_speaker().await
    }

    #[instrument(skip(self))]
    pub async fn update_timers(&self) -> Result<bool> {
        let _guard = self.operation.lock().await;

        let frames = Query::TIMER
            .into_iter()
            .map(Query::frame)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let Some(replies) = self.session.request_batch(&frames).await? else {
            return Ok(false);
        };

        let mut statuses = Vec::with_capacity(replies.len());
        for reply in &replies {
            match decode(reply) {
                Ok(Some(status @ (Status::AutoTimer(_) | Status::Alarm(_)))) => {
                    statuses.push(status)
                }
                other => {
                    debug!("Discarding timer refresh, unexpected reply: {:?}", other);
                    return Ok(false);
                }
            }
        }

        self.timers.write().apply(TimerUpdate::Status(statuses));
        Ok(true)
    }

    /// Turns the light on.
    ///
    /// With a brightness, sets the brightness; otherwise with a color, sets
    /// the color; otherwise switches power on.
    #[instrument(skip(self))]
    pub async fn turn_on(&self, brightness: Option<u8>, rgb: Option<Rgb>) -> Result<bool> {
        let _guard = self.operation.lock().await;
        if let Some(brightness) = brightness {
            return self.brightness(brightness).await;
        }
        if let Some(rgb) = rgb {
            return self.color(rgb).await;
        }
        self.power(true).await
    }

    #[instrument(skip(self))]
    pub async fn turn_off(&self) -> Result<bool> {
        let _guard = self.operation.lock().await;
        self.power(false).await
    }

    /// Sets the brightness (raw 0-255) and reads the light status back
    #[instrument(skip(self))]
    pub async fn set_brightness(&self, brightness: u8) -> Result<bool> {
        let _guard = self.operation.lock().await;
        self.brightness(brightness).await
    }

    /// Sets an RGB color. Leaves white mode.
    #[instrument(skip(self))]
    pub async fn set_color_rgb(&self, rgb: Rgb) -> Result<bool> {
        let _guard = self.operation.lock().await;
        self.color(rgb).await
    }

    /// Switches to white mode. Clears the stored color.
    #[instrument(skip(self))]
    pub async fn set_white(&self) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let acked = self.send(Command::Light(LightFunction::White), ON).await?;
        if acked {
            self.light.write().apply(LightUpdate::White);
            info!("White mode enabled");
        }
        Ok(acked)
    }

    #[instrument(skip(self))]
    pub async fn set_white_intensity(&self, intensity: u8) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let acked = self
            .send(Command::Light(LightFunction::WhiteIntensity), intensity)
            .await?;
        if acked {
            self.light.write().apply(LightUpdate::WhiteIntensity(intensity));
            info!("White intensity set to {}", intensity);
        }
        Ok(acked)
    }

    /// Selects a light or white effect
    #[instrument(skip(self))]
    pub async fn set_effect(&self, effect: Effect) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let acked = self
            .send(Command::Light(effect.function()), effect.value())
            .await?;
        if acked {
            self.light.write().apply(LightUpdate::Effect(effect));
            info!("Effect set to {}", effect);
        }
        Ok(acked)
    }

    /// Sets the speaker volume
    ///
    /// # Arguments
    ///
    /// * `level` - Volume level (0-100)
    #[instrument(skip(self))]
    pub async fn set_volume(&self, level: u8) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let level = limit_level("Volume", level);
        let Some(range) = SpeakerFunction::Volume.level_range() else {
            return Ok(false);
        };

        let acked = self
            .send(Command::Speaker(SpeakerFunction::Volume), range.to_raw(level))
            .await?;
        if acked {
            self.speaker.write().apply(SpeakerUpdate::Volume(level));
            info!("Volume set to {}%", level);
        }
        Ok(acked)
    }

    /// Selects an equalizer preset
    #[instrument(skip(self))]
    pub async fn set_speaker_effect(&self, effect: SpeakerEffect) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let acked = self
            .send(Command::Speaker(SpeakerFunction::Effect), effect.id())
            .await?;
        if acked {
            self.speaker.write().apply(SpeakerUpdate::Effect(effect));
            info!("Speaker effect set to {}", effect);
        }
        Ok(acked)
    }

    /// Sets one equalizer band
    ///
    /// # Arguments
    ///
    /// * `band` - Equalizer band
    /// * `level` - Band level (0-100)
    #[instrument(skip(self))]
    pub async fn set_equalizer_band(&self, band: EqualizerBand, level: u8) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let level = limit_level("Equalizer level", level);
        let raw = band.level_range().to_raw(level);

        let acked = self
            .send(Command::Speaker(SpeakerFunction::Band(band)), raw)
            .await?;
        if acked {
            self.speaker.write().apply(SpeakerUpdate::Band(band, level));
            info!("Equalizer band {} set to {}%", band, level);
        }
        Ok(acked)
    }

    /// Enables or disables a schedule or alarm
    #[instrument(skip(self))]
    pub async fn set_timer(&self, slot: TimerSlot, enabled: bool) -> Result<bool> {
        let _guard = self.operation.lock().await;
        let acked = self
            .send(Command::Timer(slot.toggle(enabled)), Payload::empty())
            .await?;
        if acked {
            self.timers
                .write()
                .apply(TimerUpdate::Toggled(slot, enabled));
            info!("Timer {} {}", slot, if enabled { "enabled" } else { "disabled" });
        }
        Ok(acked)
    }

    async fn send(&self, command: Command, payload: impl Into<Payload>) -> Result<bool> {
        let frame = command.frame(payload)?;
        self.session.send_command(&frame).await
    }

    async fn power(&self, on: bool) -> Result<bool> {
        debug!("Turning light {}", if on { "on" } else { "off" });
        let acked = self
            .send(Command::Light(LightFunction::Power), if on { ON } else { OFF })
            .await?;
        if acked {
            self.light.write().apply(LightUpdate::Power(on));
            self.refresh_light().await?;
            info!("Light powered {}", if on { "on" } else { "off" });
        }
        Ok(acked)
    }

    async fn brightness(&self, brightness: u8) -> Result<bool> {
        debug!("Setting brightness to {}", brightness);
        let acked = self
            .send(Command::Light(LightFunction::Brightness), brightness)
            .await?;
        if acked {
            self.light.write().apply(LightUpdate::Brightness(brightness));
            self.refresh_light().await?;
            info!("Brightness set to {}", brightness);
        }
        Ok(acked)
    }

    async fn color(&self, rgb: Rgb) -> Result<bool> {
        debug!("Setting color to {}", rgb);
        let acked = self.send(Command::Light(LightFunction::Color), rgb).await?;
        if acked {
            self.light.write().apply(LightUpdate::Color(rgb));
            info!("Color set to {}", rgb);
        }
        Ok(acked)
    }

    async fn refresh_light(&self) -> Result<bool> {
        let frame = Query::LightStatus.frame()?;
        let Some(reply) = self.session.request(&frame).await? else {
            return Ok(false);
        };

        match decode(&reply) {
            Ok(Some(Status::Light(status))) => {
                self.light.write().apply(LightUpdate::Status(status));
                Ok(true)
            }
            other => {
                debug!("No light status in reply: {:?}", other);
                Ok(false)
            }
        }
    }

    async fn refresh_speaker(&self) -> Result<bool> {
        let frames = Query::SPEAKER
            .into_iter()
            .map(Query::frame)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let Some(replies) = self.session.request_batch(&frames).await? else {
            return Ok(false);
        };

        let mut volume_raw = None;
        let mut equalizer = None;
        for reply in &replies {
            match decode(reply) {
                Ok(Some(Status::Volume(raw))) => volume_raw = Some(raw),
                Ok(Some(Status::Equalizer(levels))) => equalizer = Some(levels),
                other => debug!("Unexpected speaker reply: {:?}", other),
            }
        }

        match (volume_raw, equalizer) {
            (Some(volume_raw), Some(equalizer)) => {
                self.speaker
                    .write()
                    .apply(SpeakerUpdate::Status(SpeakerStatus {
                        volume_raw,
                        equalizer,
                    }));
                Ok(true)
            }
            _ => {
                debug!("Discarding incomplete speaker refresh");
                Ok(false)
            }
        }
    }
}

fn limit_level(what: &str, level: u8) -> u8 {
    if level > 100 {
        warn!("{} {} out of range (0-100), limiting to 100", what, level);
    }
    level.min(100)
}
