/*!
 # Command taxonomy

 Categories and the functions inside each of them, with the byte codes the
 bulb firmware expects. Outbound commands use the category code as is;
 status replies carry the same code with [`REPLY_FLAG`] set.
*/

use std::fmt;

use crate::frame::{self, FrameError, Payload};
use crate::schedule::{TimerFunction, TimerSlot};

/// Payload value for "on"
pub const ON: u8 = 0x01;
/// Payload value for "off"
pub const OFF: u8 = 0x00;
/// Payload value asking the bulb to reply with the state of a function
pub const REQ_DATA: u8 = 0x06;
/// Bit set on the category code of every inbound frame
pub const REPLY_FLAG: u8 = 0x80;

/// Top-level command group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Speaker volume and equalizer (0x04)
    Speaker,
    /// Auto-light, auto-music and alarm timers (0x05)
    Timer,
    /// Light color, brightness and effects (0x08)
    Light,
    /// Device state (0x0b)
    DeviceState,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Speaker,
        Category::Timer,
        Category::Light,
        Category::DeviceState,
    ];

    /// Code used on outbound commands
    pub const fn code(self) -> u8 {
        match self {
            Category::Speaker => 0x04,
            Category::Timer => 0x05,
            Category::Light => 0x08,
            Category::DeviceState => 0x0b,
        }
    }

    /// Code carried by inbound status frames
    pub const fn reply_code(self) -> u8 {
        self.code() | REPLY_FLAG
    }

    /// Code for the given frame direction
    pub const fn code_for(self, direction: Direction) -> u8 {
        match direction {
            Direction::Command => self.code(),
            Direction::Reply => self.reply_code(),
        }
    }

    /// Resolves a raw category byte into its category and direction
    pub fn from_code(code: u8) -> Option<(Category, Direction)> {
        let direction = if code & REPLY_FLAG != 0 {
            Direction::Reply
        } else {
            Direction::Command
        };
        let base = code & !REPLY_FLAG;
        Self::ALL
            .into_iter()
            .find(|category| category.code() == base)
            .map(|category| (category, direction))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Speaker => write!(f, "speaker"),
            Category::Timer => write!(f, "timer"),
            Category::Light => write!(f, "light"),
            Category::DeviceState => write!(f, "device_state"),
        }
    }
}

/// Which way a frame travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to bulb
    Command,
    /// Bulb to host
    Reply,
}

/// Functions of the light category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightFunction {
    Brightness,
    Color,
    Power,
    Effect,
    WhiteIntensity,
    White,
}

impl LightFunction {
    pub const fn code(self) -> u8 {
        match self {
            LightFunction::Brightness => 0x01,
            LightFunction::Color => 0x02,
            LightFunction::Power => 0x05,
            LightFunction::Effect => 0x06,
            LightFunction::WhiteIntensity => 0x07,
            LightFunction::White => 0x09,
        }
    }
}

/// The five equalizer bands, in the order the status frame reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqualizerBand {
    Hz80,
    Hz200,
    Hz500,
    Hz2k,
    Hz8k,
}

impl EqualizerBand {
    pub const ALL: [EqualizerBand; 5] = [
        EqualizerBand::Hz80,
        EqualizerBand::Hz200,
        EqualizerBand::Hz500,
        EqualizerBand::Hz2k,
        EqualizerBand::Hz8k,
    ];

    /// Position of the band in the equalizer tuple
    pub const fn index(self) -> usize {
        match self {
            EqualizerBand::Hz80 => 0,
            EqualizerBand::Hz200 => 1,
            EqualizerBand::Hz500 => 2,
            EqualizerBand::Hz2k => 3,
            EqualizerBand::Hz8k => 4,
        }
    }

    const fn code(self) -> u8 {
        match self {
            EqualizerBand::Hz80 => 0x0b,
            EqualizerBand::Hz200 => 0x0c,
            EqualizerBand::Hz500 => 0x0d,
            EqualizerBand::Hz2k => 0x0e,
            EqualizerBand::Hz8k => 0x0f,
        }
    }

    /// Raw byte range accepted by this band. Most bands run "backwards" (min > max).
    pub const fn level_range(self) -> LevelRange {
        match self {
            EqualizerBand::Hz80 => LevelRange::new(0x15, 0x00),
            EqualizerBand::Hz200 => LevelRange::new(0x4d, 0x09),
            EqualizerBand::Hz500 => LevelRange::new(0x4f, 0x09),
            EqualizerBand::Hz2k => LevelRange::new(0x48, 0x0d),
            EqualizerBand::Hz8k => LevelRange::new(0x48, 0x0d),
        }
    }
}

impl fmt::Display for EqualizerBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqualizerBand::Hz80 => write!(f, "80Hz"),
            EqualizerBand::Hz200 => write!(f, "200Hz"),
            EqualizerBand::Hz500 => write!(f, "500Hz"),
            EqualizerBand::Hz2k => write!(f, "2kHz"),
            EqualizerBand::Hz8k => write!(f, "8kHz"),
        }
    }
}

/// Functions of the speaker category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeakerFunction {
    Volume,
    /// Equalizer preset selection
    Effect,
    Band(EqualizerBand),
}

impl SpeakerFunction {
    pub const fn code(self) -> u8 {
        match self {
            SpeakerFunction::Volume => 0x03,
            SpeakerFunction::Effect => 0x05,
            SpeakerFunction::Band(band) => band.code(),
        }
    }

    /// Raw byte range for functions that take a 0-100 level
    pub const fn level_range(self) -> Option<LevelRange> {
        match self {
            SpeakerFunction::Volume => Some(LevelRange::new(0x00, 0x1f)),
            SpeakerFunction::Effect => None,
            SpeakerFunction::Band(band) => Some(band.level_range()),
        }
    }
}

/// An outbound command: a category together with one of its functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Light(LightFunction),
    Speaker(SpeakerFunction),
    Timer(TimerFunction),
}

impl Command {
    pub const fn category(self) -> Category {
        match self {
            Command::Light(_) => Category::Light,
            Command::Speaker(_) => Category::Speaker,
            Command::Timer(_) => Category::Timer,
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Command::Light(function) => function.code(),
            Command::Speaker(function) => function.code(),
            Command::Timer(function) => function.code(),
        }
    }

    /// Encodes the command with `payload` into a complete frame
    pub fn frame(self, payload: impl Into<Payload>) -> Result<Vec<u8>, FrameError> {
        frame::encode(self.category(), self.code(), payload)
    }
}

/// A status request. Sent with the outbound category code and a single
/// [`REQ_DATA`] payload byte; answered with a frame on the reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    LightStatus,
    SpeakerVolume,
    SpeakerEqualizer,
    Timer(TimerSlot),
}

impl Query {
    /// Queries making up one light refresh
    pub const LIGHT: [Query; 1] = [Query::LightStatus];
    /// Queries making up one speaker refresh, in reply order
    pub const SPEAKER: [Query; 2] = [Query::SpeakerVolume, Query::SpeakerEqualizer];
    /// Queries making up one timer refresh
    pub const TIMER: [Query; 5] = [
        Query::Timer(TimerSlot::AutoMusic),
        Query::Timer(TimerSlot::AutoLight),
        Query::Timer(TimerSlot::Alarm1),
        Query::Timer(TimerSlot::Alarm2),
        Query::Timer(TimerSlot::Alarm3),
    ];

    pub const fn category(self) -> Category {
        match self {
            Query::LightStatus => Category::Light,
            Query::SpeakerVolume | Query::SpeakerEqualizer => Category::Speaker,
            Query::Timer(_) => Category::Timer,
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Query::LightStatus => 0x15,
            Query::SpeakerVolume => 0x04,
            Query::SpeakerEqualizer => 0x14,
            Query::Timer(slot) => slot.query_code(),
        }
    }

    /// Encodes the status request frame
    pub fn frame(self) -> Result<Vec<u8>, FrameError> {
        frame::encode(self.category(), self.code(), REQ_DATA)
    }
}

/// Mapping between a logical 0-100 level and a function's raw byte range.
///
/// `min` is the byte for level 0 and `max` the byte for level 100. The range
/// may be inverted, in which case raw values fall as the level rises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRange {
    pub min: u8,
    pub max: u8,
}

impl LevelRange {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    fn span(self) -> f64 {
        f64::from(self.max) - f64::from(self.min)
    }

    /// Converts a logical level (clamped to 0-100) into the raw byte
    pub fn to_raw(self, level: u8) -> u8 {
        let level = f64::from(level.min(100));
        let raw = f64::from(self.min) + (level / 100.0 * self.span()).round();
        raw as u8
    }

    /// Converts a raw byte back into a logical 0-100 level
    pub fn from_raw(self, raw: u8) -> u8 {
        let span = self.span();
        if span == 0.0 {
            return 0;
        }
        let level = ((f64::from(raw) - f64::from(self.min)) * 100.0 / span).round();
        level.clamp(0.0, 100.0) as u8
    }
}

/// A 24-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

impl From<Rgb> for Payload {
    fn from(rgb: Rgb) -> Self {
        Payload::from([rgb.red, rgb.green, rgb.blue])
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB({}, {}, {})", self.red, self.green, self.blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn reply_codes_are_command_codes_with_the_reply_flag() {
        for category in Category::ALL {
            assert_eq!(category.code() | 0x80, category.reply_code());
            assert_eq!(
                Some((category, Direction::Reply)),
                Category::from_code(category.reply_code())
            );
            assert_eq!(
                Some((category, Direction::Command)),
                Category::from_code(category.code())
            );
        }
    }

    #[test]
    fn unknown_category_codes_resolve_to_nothing() {
        assert_eq!(None, Category::from_code(0x01));
        assert_eq!(None, Category::from_code(0x81));
    }

    #[test]
    fn query_frame_carries_request_data_marker() {
        let frame = Query::SpeakerEqualizer.frame().unwrap();
        assert_eq!(&[0x55, 0xaa, 0x01, 0x04, 0x14, REQ_DATA], &frame[..6]);
    }

    #[rstest]
    #[case::volume(SpeakerFunction::Volume.level_range().unwrap())]
    #[case::hz80(EqualizerBand::Hz80.level_range())]
    #[case::hz200(EqualizerBand::Hz200.level_range())]
    #[case::hz500(EqualizerBand::Hz500.level_range())]
    #[case::hz2k(EqualizerBand::Hz2k.level_range())]
    #[case::hz8k(EqualizerBand::Hz8k.level_range())]
    fn level_range_round_trips_every_raw_value(#[case] range: LevelRange) {
        assert_eq!(range.min, range.to_raw(0));
        assert_eq!(range.max, range.to_raw(100));
        for raw in range.min.min(range.max)..=range.min.max(range.max) {
            assert_eq!(raw, range.to_raw(range.from_raw(raw)), "raw {raw:#04x}");
        }
    }

    #[test]
    fn level_range_clamps_levels_above_100() {
        let range = SpeakerFunction::Volume.level_range().unwrap();
        assert_eq!(0x1f, range.to_raw(250));
        assert_eq!(100, range.from_raw(0xff));
    }

    #[test]
    fn half_volume_maps_to_middle_of_range() {
        let range = SpeakerFunction::Volume.level_range().unwrap();
        assert_eq!(16, range.to_raw(50));
        assert_eq!(52, range.from_raw(16));
    }

    #[test]
    fn inverted_band_range_falls_as_level_rises() {
        let range = EqualizerBand::Hz500.level_range();
        assert!(range.to_raw(25) > range.to_raw(75));
    }
}
