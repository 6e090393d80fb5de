/*!
 # Status decoders

 Status frames use fixed byte offsets per (category, function) pair. The
 layouts are not self-describing, so each decoder documents its offsets.
 Pairs without a decoder are ignored rather than treated as errors.
*/

use chrono::NaiveTime;
use tracing::{debug, trace, warn};

use crate::command::{Category, Direction, Query, Rgb};
use crate::effects::LightEffect;
use crate::frame::{verify_checksum, FrameError, CATEGORY_OFFSET, FUNCTION_OFFSET, PAYLOAD_OFFSET};
use crate::schedule::TimerSlot;

/// A decoded status frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Light(LightStatus),
    /// Raw volume byte
    Volume(u8),
    /// Band levels (80Hz, 200Hz, 500Hz, 2kHz, 8kHz)
    Equalizer([u8; 5]),
    AutoTimer(AutoTimerStatus),
    Alarm(AlarmStatus),
}

/// Light status reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightStatus {
    pub rgb: Rgb,
    /// Cold white channel
    pub cold: u8,
    /// Warm white channel
    pub warm: u8,
    pub brightness: u8,
    pub on: bool,
    /// Effect byte as sent by the firmware (0 = none, otherwise id + 1)
    pub effect_raw: u8,
    /// Effect resolved from `effect_raw`, if it is in the table
    pub effect: Option<LightEffect>,
}

/// Speaker state assembled from the volume and equalizer replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakerStatus {
    pub volume_raw: u8,
    pub equalizer: [u8; 5],
}

/// Auto-light or auto-music schedule reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoTimerStatus {
    pub slot: TimerSlot,
    pub enabled: bool,
    pub start_hour: u8,
    pub start_minute: u8,
    pub stop_hour: u8,
    pub stop_minute: u8,
}

impl AutoTimerStatus {
    pub fn start(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.start_hour.into(), self.start_minute.into(), 0)
    }

    pub fn stop(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.stop_hour.into(), self.stop_minute.into(), 0)
    }
}

/// Alarm reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmStatus {
    pub slot: TimerSlot,
    /// Alarm number byte as reported by the bulb
    pub number: u8,
    pub enabled: bool,
    pub hour: u8,
    pub minute: u8,
}

impl AlarmStatus {
    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), 0)
    }
}

type Decoder = fn(&[u8]) -> Result<Status, FrameError>;

/// Reply (category, function) pairs with a known layout
const DECODERS: [(Query, Decoder); 8] = [
    (Query::LightStatus, decode_light_status),
    (Query::SpeakerVolume, decode_volume),
    (Query::SpeakerEqualizer, decode_equalizer),
    (Query::Timer(TimerSlot::AutoLight), |raw| {
        decode_auto_timer(TimerSlot::AutoLight, raw)
    }),
    (Query::Timer(TimerSlot::AutoMusic), |raw| {
        decode_auto_timer(TimerSlot::AutoMusic, raw)
    }),
    (Query::Timer(TimerSlot::Alarm1), |raw| decode_alarm(TimerSlot::Alarm1, raw)),
    (Query::Timer(TimerSlot::Alarm2), |raw| decode_alarm(TimerSlot::Alarm2, raw)),
    (Query::Timer(TimerSlot::Alarm3), |raw| decode_alarm(TimerSlot::Alarm3, raw)),
];

/// Decodes a raw status frame.
///
/// Returns `Ok(None)` for frames whose (category, function) pair has no
/// decoder, and [`FrameError::Empty`] when nothing was received.
pub fn decode(raw: &[u8]) -> Result<Option<Status>, FrameError> {
    if raw.is_empty() {
        return Err(FrameError::Empty);
    }
    require(raw, FUNCTION_OFFSET + 1)?;

    let category_code = raw[CATEGORY_OFFSET];
    let function = raw[FUNCTION_OFFSET];

    let Some((category, Direction::Reply)) = Category::from_code(category_code) else {
        trace!("Ignoring frame with category {:#04x}", category_code);
        return Ok(None);
    };

    let Some((_, decoder)) = DECODERS
        .iter()
        .find(|(query, _)| query.category() == category && query.code() == function)
    else {
        debug!(
            "No decoder for {} function {:#04x}, ignoring frame",
            category, function
        );
        return Ok(None);
    };

    if !verify_checksum(raw) {
        warn!("Checksum mismatch on status frame {:02x?}", raw);
    }

    decoder(raw).map(Some)
}

fn require(raw: &[u8], needed: usize) -> Result<(), FrameError> {
    if raw.len() < needed {
        return Err(FrameError::Truncated {
            len: raw.len(),
            needed,
        });
    }
    Ok(())
}

/// Light status layout
///
/// ```text
/// 5,6,7  R, G, B
/// 8      cold white
/// 9      warm white
/// 10     brightness
/// 11     on/off
/// 12     effect (0 = none, otherwise effect id + 1)
/// ```
fn decode_light_status(raw: &[u8]) -> Result<Status, FrameError> {
    require(raw, 13)?;

    let effect_raw = raw[12];
    let effect = match effect_raw {
        0 => None,
        raw_id => LightEffect::from_id(raw_id - 1),
    };
    if effect_raw > 0 && effect.is_none() {
        debug!("Effect byte {:#04x} is not in the effect table", effect_raw);
    }

    Ok(Status::Light(LightStatus {
        rgb: Rgb::new(raw[5], raw[6], raw[7]),
        cold: raw[8],
        warm: raw[9],
        brightness: raw[10],
        on: raw[11] != 0,
        effect_raw,
        effect,
    }))
}

/// Speaker volume layout: 5 = volume
fn decode_volume(raw: &[u8]) -> Result<Status, FrameError> {
    require(raw, PAYLOAD_OFFSET + 1)?;
    Ok(Status::Volume(raw[PAYLOAD_OFFSET]))
}

/// Equalizer layout: 5..=9 = 80Hz, 200Hz, 500Hz, 2kHz, 8kHz
fn decode_equalizer(raw: &[u8]) -> Result<Status, FrameError> {
    require(raw, PAYLOAD_OFFSET + 5)?;
    let mut levels = [0u8; 5];
    levels.copy_from_slice(&raw[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 5]);
    Ok(Status::Equalizer(levels))
}

/// Auto schedule layout
///
/// ```text
/// 4  function (auto-light or auto-music)
/// 5  on/off
/// 6  start hour    7  start minute
/// 8  stop hour     9  stop minute
/// ```
fn decode_auto_timer(slot: TimerSlot, raw: &[u8]) -> Result<Status, FrameError> {
    require(raw, 10)?;
    Ok(Status::AutoTimer(AutoTimerStatus {
        slot,
        enabled: raw[5] != 0,
        start_hour: raw[6],
        start_minute: raw[7],
        stop_hour: raw[8],
        stop_minute: raw[9],
    }))
}

/// Alarm layout
///
/// ```text
/// 4   function (alarm number)
/// 11  hour    12  minute
/// 14  on/off
/// ```
fn decode_alarm(slot: TimerSlot, raw: &[u8]) -> Result<Status, FrameError> {
    require(raw, 15)?;
    Ok(Status::Alarm(AlarmStatus {
        slot,
        number: raw[FUNCTION_OFFSET],
        enabled: raw[14] != 0,
        hour: raw[11],
        minute: raw[12],
    }))
}
