/*!
 # Timer functionality for speaker bulbs

 The bulb keeps two daily schedules (auto-light and auto-music) and three
 alarms. Each of them is a timer slot that can be toggled on or off and
 queried for its current settings.
*/

use std::fmt;

/// Functions of the timer category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerFunction {
    /// Enable a slot
    On(TimerSlot),
    /// Disable a slot
    Off(TimerSlot),
}

impl TimerFunction {
    pub const fn code(self) -> u8 {
        match self {
            TimerFunction::On(slot) => slot.on_code(),
            TimerFunction::Off(slot) => slot.off_code(),
        }
    }
}

/// A timer the bulb keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// Daily light schedule
    AutoLight,
    /// Daily music schedule
    AutoMusic,
    /// First alarm
    Alarm1,
    /// Second alarm
    Alarm2,
    /// Third alarm
    Alarm3,
}

impl TimerSlot {
    pub const ALL: [TimerSlot; 5] = [
        TimerSlot::AutoLight,
        TimerSlot::AutoMusic,
        TimerSlot::Alarm1,
        TimerSlot::Alarm2,
        TimerSlot::Alarm3,
    ];

    /// Whether this is one of the two daily schedules
    pub const fn is_schedule(self) -> bool {
        matches!(self, TimerSlot::AutoLight | TimerSlot::AutoMusic)
    }

    /// Alarm number (1-3), if this slot is an alarm
    pub const fn alarm_number(self) -> Option<u8> {
        match self {
            TimerSlot::Alarm1 => Some(1),
            TimerSlot::Alarm2 => Some(2),
            TimerSlot::Alarm3 => Some(3),
            TimerSlot::AutoLight | TimerSlot::AutoMusic => None,
        }
    }

    const fn on_code(self) -> u8 {
        match self {
            TimerSlot::AutoLight => 0x16,
            TimerSlot::AutoMusic => 0x20,
            TimerSlot::Alarm1 => 0x05,
            TimerSlot::Alarm2 => 0x09,
            TimerSlot::Alarm3 => 0x0d,
        }
    }

    const fn off_code(self) -> u8 {
        match self {
            TimerSlot::AutoLight => 0x17,
            TimerSlot::AutoMusic => 0x21,
            TimerSlot::Alarm1 => 0x06,
            TimerSlot::Alarm2 => 0x0a,
            TimerSlot::Alarm3 => 0x0e,
        }
    }

    /// Function code used to query this slot
    pub const fn query_code(self) -> u8 {
        match self {
            TimerSlot::AutoMusic => 0x22,
            TimerSlot::AutoLight => 0x23,
            TimerSlot::Alarm1 => 0x04,
            TimerSlot::Alarm2 => 0x08,
            TimerSlot::Alarm3 => 0x0c,
        }
    }

    /// Function toggling this slot on or off
    pub const fn toggle(self, enabled: bool) -> TimerFunction {
        if enabled {
            TimerFunction::On(self)
        } else {
            TimerFunction::Off(self)
        }
    }
}

impl fmt::Display for TimerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerSlot::AutoLight => write!(f, "auto_light"),
            TimerSlot::AutoMusic => write!(f, "auto_music"),
            TimerSlot::Alarm1 => write!(f, "alarm_1"),
            TimerSlot::Alarm2 => write!(f, "alarm_2"),
            TimerSlot::Alarm3 => write!(f, "alarm_3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_codes_are_distinct() {
        let mut codes: Vec<_> = TimerSlot::ALL.into_iter().map(TimerSlot::query_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(TimerSlot::ALL.len(), codes.len());
    }

    #[test]
    fn toggles_use_distinct_on_and_off_functions() {
        assert_eq!(0x16, TimerSlot::AutoLight.toggle(true).code());
        assert_eq!(0x17, TimerSlot::AutoLight.toggle(false).code());
        assert_eq!(0x0d, TimerSlot::Alarm3.toggle(true).code());
        assert_eq!(0x0e, TimerSlot::Alarm3.toggle(false).code());
    }

    #[test]
    fn alarm_numbers() {
        assert_eq!(Some(2), TimerSlot::Alarm2.alarm_number());
        assert_eq!(None, TimerSlot::AutoMusic.alarm_number());
        assert!(TimerSlot::AutoMusic.is_schedule());
    }
}
