/*!
 # Device state models

 In-memory view of the bulb. Every model changes through a single `apply`
 entry point: a decoded status replaces the whole model, while the other
 updates record what a just-acknowledged command implies.
*/

use crate::command::{EqualizerBand, LevelRange, Rgb, SpeakerFunction};
use crate::decode::{AlarmStatus, AutoTimerStatus, LightStatus, SpeakerStatus, Status};
use crate::effects::{Effect, SpeakerEffect};
use crate::schedule::TimerSlot;

/// Changes that can be applied to a [`LightState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightUpdate {
    /// Complete status read back from the bulb
    Status(LightStatus),
    Power(bool),
    Brightness(u8),
    Color(Rgb),
    White,
    WhiteIntensity(u8),
    Effect(Effect),
}

/// Light part of the bulb. Fields are `None` until first known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightState {
    on: Option<bool>,
    brightness: Option<u8>,
    rgb: Option<Rgb>,
    cold: Option<u8>,
    warm: Option<u8>,
    white_intensity: Option<u8>,
    white: bool,
    effect: Option<Effect>,
    effect_raw: Option<u8>,
}

impl LightState {
    pub fn apply(&mut self, update: LightUpdate) {
        match update {
            LightUpdate::Status(status) => *self = Self::from_status(&status),
            LightUpdate::Power(on) => self.on = Some(on),
            LightUpdate::Brightness(brightness) => self.brightness = Some(brightness),
            LightUpdate::Color(rgb) => {
                self.rgb = Some(rgb);
                self.white = false;
                self.effect = None;
            }
            LightUpdate::White => {
                self.white = true;
                self.rgb = None;
                self.effect = None;
            }
            LightUpdate::WhiteIntensity(intensity) => self.white_intensity = Some(intensity),
            LightUpdate::Effect(effect) => {
                self.white = effect.is_white();
                self.effect = Some(effect);
                self.effect_raw = None;
            }
        }
    }

    fn from_status(status: &LightStatus) -> Self {
        Self {
            on: Some(status.on),
            brightness: Some(status.brightness),
            rgb: Some(status.rgb),
            cold: Some(status.cold),
            warm: Some(status.warm),
            white_intensity: Some(status.cold),
            white: status.cold > 0 || status.warm > 0,
            effect: status.effect.map(Effect::Light),
            effect_raw: Some(status.effect_raw),
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.on
    }

    pub fn brightness(&self) -> Option<u8> {
        self.brightness
    }

    /// Stored color; cleared while the bulb is in white mode
    pub fn rgb(&self) -> Option<Rgb> {
        self.rgb
    }

    pub fn cold(&self) -> Option<u8> {
        self.cold
    }

    pub fn warm(&self) -> Option<u8> {
        self.warm
    }

    pub fn white_intensity(&self) -> Option<u8> {
        self.white_intensity
    }

    pub fn is_white(&self) -> bool {
        self.white
    }

    pub fn effect(&self) -> Option<Effect> {
        self.effect
    }

    /// Effect byte of the last status read, before the off-by-one shift
    pub fn effect_raw(&self) -> Option<u8> {
        self.effect_raw
    }
}

/// Changes that can be applied to a [`SpeakerState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerUpdate {
    /// Complete status read back from the bulb
    Status(SpeakerStatus),
    /// Volume level 0-100
    Volume(u8),
    /// Equalizer band level 0-100
    Band(EqualizerBand, u8),
    Effect(SpeakerEffect),
}

/// Speaker part of the bulb. Fields are `None` until first known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerState {
    volume_raw: Option<u8>,
    equalizer: Option<[u8; 5]>,
    effect: Option<SpeakerEffect>,
}

impl SpeakerState {
    pub fn apply(&mut self, update: SpeakerUpdate) {
        match update {
            SpeakerUpdate::Status(status) => {
                *self = Self {
                    volume_raw: Some(status.volume_raw),
                    equalizer: Some(status.equalizer),
                    effect: SpeakerEffect::from_levels(&status.equalizer),
                }
            }
            SpeakerUpdate::Volume(level) => self.volume_raw = Some(volume_range().to_raw(level)),
            SpeakerUpdate::Band(band, level) => {
                if let Some(levels) = self.equalizer.as_mut() {
                    levels[band.index()] = level.min(100);
                    self.effect = SpeakerEffect::from_levels(levels);
                }
            }
            SpeakerUpdate::Effect(effect) => {
                self.equalizer = Some(effect.levels());
                self.effect = Some(effect);
            }
        }
    }

    pub fn is_muted(&self) -> Option<bool> {
        self.volume_raw.map(|raw| raw == 0)
    }

    /// Volume level 0-100
    pub fn volume(&self) -> Option<u8> {
        self.volume_raw.map(|raw| volume_range().from_raw(raw))
    }

    pub fn volume_raw(&self) -> Option<u8> {
        self.volume_raw
    }

    /// Band levels (80Hz, 200Hz, 500Hz, 2kHz, 8kHz)
    pub fn equalizer(&self) -> Option<[u8; 5]> {
        self.equalizer
    }

    pub fn band(&self, band: EqualizerBand) -> Option<u8> {
        self.equalizer.map(|levels| levels[band.index()])
    }

    /// Preset matching the equalizer; `None` for custom curves
    pub fn effect(&self) -> Option<SpeakerEffect> {
        self.effect
    }
}

fn volume_range() -> LevelRange {
    SpeakerFunction::Volume
        .level_range()
        .unwrap_or(LevelRange::new(0x00, 0x1f))
}

/// Changes that can be applied to a [`TimerState`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerUpdate {
    /// Complete set of timer replies, in any order
    Status(Vec<Status>),
    /// A slot was switched on or off
    Toggled(TimerSlot, bool),
}

/// Schedules and alarms. Slots are `None` until first read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerState {
    auto_light: Option<AutoTimerStatus>,
    auto_music: Option<AutoTimerStatus>,
    alarms: [Option<AlarmStatus>; 3],
}

impl TimerState {
    pub fn apply(&mut self, update: TimerUpdate) {
        match update {
            TimerUpdate::Status(statuses) => {
                let mut fresh = TimerState::default();
                for status in statuses {
                    match status {
                        Status::AutoTimer(timer) => {
                            if let Some(slot) = fresh.schedule_mut(timer.slot) {
                                *slot = Some(timer);
                            }
                        }
                        Status::Alarm(alarm) => {
                            if let Some(slot) = fresh.alarm_mut(alarm.slot) {
                                *slot = Some(alarm);
                            }
                        }
                        Status::Light(_) | Status::Volume(_) | Status::Equalizer(_) => {}
                    }
                }
                *self = fresh;
            }
            TimerUpdate::Toggled(slot, enabled) => {
                if slot.is_schedule() {
                    if let Some(Some(timer)) = self.schedule_mut(slot) {
                        timer.enabled = enabled;
                    }
                } else if let Some(Some(alarm)) = self.alarm_mut(slot) {
                    alarm.enabled = enabled;
                }
            }
        }
    }

    fn schedule_mut(&mut self, slot: TimerSlot) -> Option<&mut Option<AutoTimerStatus>> {
        match slot {
            TimerSlot::AutoLight => Some(&mut self.auto_light),
            TimerSlot::AutoMusic => Some(&mut self.auto_music),
            TimerSlot::Alarm1 | TimerSlot::Alarm2 | TimerSlot::Alarm3 => None,
        }
    }

    fn alarm_mut(&mut self, slot: TimerSlot) -> Option<&mut Option<AlarmStatus>> {
        let index = usize::from(slot.alarm_number()?) - 1;
        self.alarms.get_mut(index)
    }

    pub fn auto_light(&self) -> Option<&AutoTimerStatus> {
        self.auto_light.as_ref()
    }

    pub fn auto_music(&self) -> Option<&AutoTimerStatus> {
        self.auto_music.as_ref()
    }

    /// Alarm by number (1-3)
    pub fn alarm(&self, number: u8) -> Option<&AlarmStatus> {
        let index = usize::from(number).checked_sub(1)?;
        self.alarms.get(index)?.as_ref()
    }

    /// Whether the slot is enabled, if it has been read
    pub fn is_enabled(&self, slot: TimerSlot) -> Option<bool> {
        match slot {
            TimerSlot::AutoLight => self.auto_light.map(|timer| timer.enabled),
            TimerSlot::AutoMusic => self.auto_music.map(|timer| timer.enabled),
            _ => self.alarm(slot.alarm_number()?).map(|alarm| alarm.enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{LightEffect, WhiteEffect};
    use pretty_assertions::assert_eq;

    fn light_status() -> LightStatus {
        LightStatus {
            rgb: Rgb::new(0, 0, 0),
            cold: 0x75,
            warm: 0x8a,
            brightness: 0x8d,
            on: true,
            effect_raw: 0,
            effect: None,
        }
    }

    #[test]
    fn new_light_state_is_unknown() {
        let light = LightState::default();
        assert_eq!(None, light.is_on());
        assert_eq!(None, light.brightness());
        assert_eq!(None, light.effect());
        assert!(!light.is_white());
    }

    #[test]
    fn status_derives_white_mode_from_channels() {
        let mut light = LightState::default();
        light.apply(LightUpdate::Status(light_status()));
        assert!(light.is_white());
        assert_eq!(Some(true), light.is_on());
        assert_eq!(Some(0x8d), light.brightness());
        assert_eq!(Some(0x75), light.white_intensity());

        light.apply(LightUpdate::Status(LightStatus {
            cold: 0,
            warm: 0,
            rgb: Rgb::new(10, 20, 30),
            ..light_status()
        }));
        assert!(!light.is_white());
        assert_eq!(Some(Rgb::new(10, 20, 30)), light.rgb());
    }

    #[test]
    fn status_replaces_optimistic_fields() {
        let mut light = LightState::default();
        light.apply(LightUpdate::Effect(Effect::Light(LightEffect::Rainbow)));
        light.apply(LightUpdate::Brightness(10));
        light.apply(LightUpdate::Status(light_status()));
        assert_eq!(None, light.effect());
        assert_eq!(Some(0), light.effect_raw());
        assert_eq!(Some(0x8d), light.brightness());
    }

    #[test]
    fn color_and_white_are_mutually_exclusive() {
        let mut light = LightState::default();
        light.apply(LightUpdate::White);
        assert!(light.is_white());

        light.apply(LightUpdate::Color(Rgb::new(255, 0, 0)));
        assert!(!light.is_white());
        assert_eq!(Some(Rgb::new(255, 0, 0)), light.rgb());

        light.apply(LightUpdate::White);
        assert!(light.is_white());
        assert_eq!(None, light.rgb());
    }

    #[test]
    fn effect_function_decides_white_mode() {
        let mut light = LightState::default();
        light.apply(LightUpdate::Effect(Effect::White(WhiteEffect::Sunset)));
        assert!(light.is_white());

        light.apply(LightUpdate::Effect(Effect::Light(LightEffect::Heartbeat)));
        assert!(!light.is_white());
        assert_eq!(Some(Effect::Light(LightEffect::Heartbeat)), light.effect());
    }

    #[test]
    fn speaker_status_derives_mute_volume_and_preset() {
        let mut speaker = SpeakerState::default();
        speaker.apply(SpeakerUpdate::Status(SpeakerStatus {
            volume_raw: 0,
            equalizer: SpeakerEffect::Jazz.levels(),
        }));
        assert_eq!(Some(true), speaker.is_muted());
        assert_eq!(Some(0), speaker.volume());
        assert_eq!(Some(SpeakerEffect::Jazz), speaker.effect());

        speaker.apply(SpeakerUpdate::Status(SpeakerStatus {
            volume_raw: 0x1f,
            equalizer: [1, 2, 3, 4, 5],
        }));
        assert_eq!(Some(false), speaker.is_muted());
        assert_eq!(Some(100), speaker.volume());
        assert_eq!(None, speaker.effect());
        assert_eq!(Some(3), speaker.band(EqualizerBand::Hz500));
    }

    #[test]
    fn speaker_optimistic_updates() {
        let mut speaker = SpeakerState::default();
        speaker.apply(SpeakerUpdate::Volume(50));
        assert_eq!(Some(16), speaker.volume_raw());

        speaker.apply(SpeakerUpdate::Effect(SpeakerEffect::Pop));
        assert_eq!(Some(SpeakerEffect::Pop.levels()), speaker.equalizer());

        speaker.apply(SpeakerUpdate::Band(EqualizerBand::Hz8k, 10));
        assert_eq!(None, speaker.effect());
        assert_eq!(Some(10), speaker.band(EqualizerBand::Hz8k));
    }

    #[test]
    fn timer_status_and_toggles() {
        let mut timers = TimerState::default();
        timers.apply(TimerUpdate::Status(vec![
            Status::AutoTimer(AutoTimerStatus {
                slot: TimerSlot::AutoMusic,
                enabled: false,
                start_hour: 7,
                start_minute: 30,
                stop_hour: 8,
                stop_minute: 0,
            }),
            Status::Alarm(AlarmStatus {
                slot: TimerSlot::Alarm3,
                number: 0x0c,
                enabled: true,
                hour: 6,
                minute: 45,
            }),
        ]));
        assert_eq!(Some(false), timers.is_enabled(TimerSlot::AutoMusic));
        assert_eq!(None, timers.is_enabled(TimerSlot::AutoLight));
        assert_eq!(Some(true), timers.is_enabled(TimerSlot::Alarm3));
        assert_eq!(Some(6), timers.alarm(3).map(|alarm| alarm.hour));
        assert_eq!(None, timers.alarm(0));

        timers.apply(TimerUpdate::Toggled(TimerSlot::AutoMusic, true));
        timers.apply(TimerUpdate::Toggled(TimerSlot::Alarm3, false));
        assert_eq!(Some(true), timers.is_enabled(TimerSlot::AutoMusic));
        assert_eq!(Some(false), timers.is_enabled(TimerSlot::Alarm3));
    }

    #[test]
    fn schedule_status_with_an_alarm_slot_is_dropped() {
        let mut timers = TimerState::default();
        timers.apply(TimerUpdate::Status(vec![Status::AutoTimer(AutoTimerStatus {
            slot: TimerSlot::Alarm1,
            enabled: true,
            start_hour: 7,
            start_minute: 0,
            stop_hour: 8,
            stop_minute: 0,
        })]));
        assert_eq!(TimerState::default(), timers);

        timers.apply(TimerUpdate::Toggled(TimerSlot::Alarm1, true));
        assert_eq!(None, timers.auto_light());
        assert_eq!(None, timers.is_enabled(TimerSlot::Alarm1));
    }
}
