/*!
 # Effect modes for speaker bulbs

 Light effects are animations selected through the light *effect* function.
 White effects are selected through the *white* function and put the bulb in
 white mode. Speaker effects are equalizer presets.
*/

use std::fmt;
use std::str::FromStr;

use crate::command::LightFunction;
use crate::Error;

/// Animations selectable with the light effect function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightEffect {
    /// Stops any running animation (id 0)
    Off,
    Rainbow,
    Flowing,
    Heartbeat,
    RedPulse,
    GreenPulse,
    BluePulse,
    Alarm,
    Flash,
    Breathing,
    FeelGreen,
    Sunsets,
    Music,
}

impl LightEffect {
    pub const ALL: [LightEffect; 13] = [
        LightEffect::Off,
        LightEffect::Rainbow,
        LightEffect::Flowing,
        LightEffect::Heartbeat,
        LightEffect::RedPulse,
        LightEffect::GreenPulse,
        LightEffect::BluePulse,
        LightEffect::Alarm,
        LightEffect::Flash,
        LightEffect::Breathing,
        LightEffect::FeelGreen,
        LightEffect::Sunsets,
        LightEffect::Music,
    ];

    /// Effect id sent as the payload of the effect function
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<LightEffect> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            LightEffect::Off => "none",
            LightEffect::Rainbow => "rainbow",
            LightEffect::Flowing => "flowing",
            LightEffect::Heartbeat => "heartbeat",
            LightEffect::RedPulse => "red_pulse",
            LightEffect::GreenPulse => "green_pulse",
            LightEffect::BluePulse => "blue_pulse",
            LightEffect::Alarm => "alarm",
            LightEffect::Flash => "flash",
            LightEffect::Breathing => "breathing",
            LightEffect::FeelGreen => "feel_green",
            LightEffect::Sunsets => "sunsets",
            LightEffect::Music => "music",
        }
    }
}

/// Presets selectable with the light white function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhiteEffect {
    White,
    NatureLight,
    Sunlight,
    Sunset,
    Candlelight,
}

impl WhiteEffect {
    pub const ALL: [WhiteEffect; 5] = [
        WhiteEffect::White,
        WhiteEffect::NatureLight,
        WhiteEffect::Sunlight,
        WhiteEffect::Sunset,
        WhiteEffect::Candlelight,
    ];

    pub const fn id(self) -> u8 {
        match self {
            WhiteEffect::White => 0x01,
            WhiteEffect::NatureLight => 0x02,
            WhiteEffect::Sunlight => 0x03,
            WhiteEffect::Sunset => 0x04,
            WhiteEffect::Candlelight => 0x05,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            WhiteEffect::White => "white",
            WhiteEffect::NatureLight => "naturelight",
            WhiteEffect::Sunlight => "sunlight",
            WhiteEffect::Sunset => "sunset",
            WhiteEffect::Candlelight => "candlelight",
        }
    }
}

/// Any effect the light accepts, together with the function that selects it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Light(LightEffect),
    White(WhiteEffect),
}

impl Effect {
    /// Every effect, light effects first
    pub fn all() -> impl Iterator<Item = Effect> {
        LightEffect::ALL
            .into_iter()
            .map(Effect::Light)
            .chain(WhiteEffect::ALL.into_iter().map(Effect::White))
    }

    /// Light function the effect is sent with
    pub const fn function(self) -> LightFunction {
        match self {
            Effect::Light(_) => LightFunction::Effect,
            Effect::White(_) => LightFunction::White,
        }
    }

    /// Payload byte for [`Effect::function`]
    pub const fn value(self) -> u8 {
        match self {
            Effect::Light(effect) => effect.id(),
            Effect::White(effect) => effect.id(),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Effect::Light(effect) => effect.name(),
            Effect::White(effect) => effect.name(),
        }
    }

    /// Whether selecting this effect puts the bulb in white mode
    pub fn is_white(self) -> bool {
        self.function() == LightFunction::White
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Effect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Effect::all()
            .find(|effect| effect.name() == wanted)
            .ok_or_else(|| Error::UnknownEffect(s.to_string()))
    }
}

/// Equalizer presets of the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeakerEffect {
    Flat,
    Classical,
    Pop,
    Bass,
    Jazz,
}

impl SpeakerEffect {
    pub const ALL: [SpeakerEffect; 5] = [
        SpeakerEffect::Flat,
        SpeakerEffect::Classical,
        SpeakerEffect::Pop,
        SpeakerEffect::Bass,
        SpeakerEffect::Jazz,
    ];

    /// Payload byte of the speaker effect function
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            SpeakerEffect::Flat => "flat",
            SpeakerEffect::Classical => "classical",
            SpeakerEffect::Pop => "pop",
            SpeakerEffect::Bass => "bass",
            SpeakerEffect::Jazz => "jazz",
        }
    }

    /// Band levels (80Hz, 200Hz, 500Hz, 2kHz, 8kHz) the preset applies
    pub const fn levels(self) -> [u8; 5] {
        match self {
            SpeakerEffect::Flat => [50, 50, 50, 50, 50],
            SpeakerEffect::Classical => [65, 67, 50, 29, 68],
            SpeakerEffect::Pop => [59, 50, 32, 57, 80],
            SpeakerEffect::Bass => [81, 66, 32, 51, 68],
            SpeakerEffect::Jazz => [72, 70, 61, 48, 34],
        }
    }

    /// Finds the preset matching an equalizer tuple. Custom curves match nothing.
    pub fn from_levels(levels: &[u8; 5]) -> Option<SpeakerEffect> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.levels() == *levels)
    }
}

impl fmt::Display for SpeakerEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpeakerEffect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|effect| effect.name() == wanted)
            .ok_or_else(|| Error::UnknownEffect(s.to_string()))
    }
}
