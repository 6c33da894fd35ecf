// Controls Module - Two-key command mode on the lowest keys of the keyboard
//
// Holding A0 and B0 together turns the rest of the bottom octaves into
// buttons: power toggle, background cycle, saturation/brightness ramps,
// color modes and WLED presets.
use std::time::{Duration, Instant};

use crate::midi::NOTE_A0;
use crate::types::ColorMode;

pub const KEY_CTRL_0: u8 = NOTE_A0;
pub const KEY_TOGGLE_ACTIVE: u8 = NOTE_A0 + 1;
pub const KEY_CTRL_1: u8 = NOTE_A0 + 2;
pub const KEY_DEC_SAT: u8 = NOTE_A0 + 3;
pub const KEY_DEC_BRI: u8 = NOTE_A0 + 4;
pub const KEY_TOGGLE_BACKGROUND: u8 = NOTE_A0 + 5;
pub const KEY_INC_BRI: u8 = NOTE_A0 + 6;
pub const KEY_INC_SAT: u8 = NOTE_A0 + 7;

/// How long the power key must be held to switch the device off
pub const HOLD_TO_POWER_OFF: Duration = Duration::from_secs(1);

pub const SATURATION_MIN: u8 = 64;
pub const BRIGHTNESS_MIN: u8 = 8;
pub const SATURATION_STEP: u8 = 1;
pub const BRIGHTNESS_STEP: u8 = 4;

// Ramp steps per second while an adjustment key is held
pub const SATURATION_STEPS_PER_SECOND: u32 = 8;
pub const BRIGHTNESS_STEPS_PER_SECOND: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    DecSaturation,
    IncSaturation,
    DecBrightness,
    IncBrightness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ToggleActive,
    ToggleBackground,
    Adjust(Adjustment),
}

static COMMAND_KEYS: [(u8, ControlCommand); 6] = [
    (KEY_TOGGLE_ACTIVE, ControlCommand::ToggleActive),
    (KEY_TOGGLE_BACKGROUND, ControlCommand::ToggleBackground),
    (KEY_DEC_SAT, ControlCommand::Adjust(Adjustment::DecSaturation)),
    (KEY_INC_SAT, ControlCommand::Adjust(Adjustment::IncSaturation)),
    (KEY_DEC_BRI, ControlCommand::Adjust(Adjustment::DecBrightness)),
    (KEY_INC_BRI, ControlCommand::Adjust(Adjustment::IncBrightness)),
];

static COLOR_MODE_KEYS: [(u8, ColorMode); 19] = [
    (NOTE_A0 + 8, ColorMode::Rainbow1),
    (NOTE_A0 + 9, ColorMode::WhiteCold),
    (NOTE_A0 + 10, ColorMode::Rainbow2),
    (NOTE_A0 + 11, ColorMode::White),
    (NOTE_A0 + 12, ColorMode::Rainbow3),
    (NOTE_A0 + 13, ColorMode::WhiteWarm),
    (NOTE_A0 + 14, ColorMode::Rainbow4),
    (NOTE_A0 + 15, ColorMode::Red),
    (NOTE_A0 + 16, ColorMode::RedYellow),
    (NOTE_A0 + 17, ColorMode::Yellow),
    (NOTE_A0 + 18, ColorMode::YellowGreen),
    (NOTE_A0 + 19, ColorMode::Green),
    (NOTE_A0 + 20, ColorMode::GreenCyan),
    (NOTE_A0 + 21, ColorMode::Cyan),
    (NOTE_A0 + 22, ColorMode::CyanBlue),
    (NOTE_A0 + 23, ColorMode::Blue),
    (NOTE_A0 + 24, ColorMode::BlueMagenta),
    (NOTE_A0 + 25, ColorMode::Magenta),
    (NOTE_A0 + 26, ColorMode::MagentaRed),
];

pub fn command_for(note: u8) -> Option<ControlCommand> {
    COMMAND_KEYS.iter().find(|(key, _)| *key == note).map(|(_, cmd)| *cmd)
}

pub fn color_mode_for(note: u8) -> Option<ColorMode> {
    COLOR_MODE_KEYS.iter().find(|(key, _)| *key == note).map(|(_, mode)| *mode)
}

/// Preset slot selected by `note` while lighting is off
/// The first preset sits on the decrease-saturation key
pub fn preset_for(note: u8) -> Option<u8> {
    let preset = note as i32 - KEY_DEC_SAT as i32 + 1;
    u8::try_from(preset).ok().filter(|p| *p > 0)
}

pub fn step_saturation(saturation: u8, adjustment: Adjustment) -> u8 {
    match adjustment {
        Adjustment::IncSaturation if saturation <= u8::MAX - SATURATION_STEP => saturation + SATURATION_STEP,
        Adjustment::DecSaturation if saturation >= SATURATION_MIN + SATURATION_STEP => saturation - SATURATION_STEP,
        _ => saturation,
    }
}

pub fn step_brightness(brightness: u8, adjustment: Adjustment) -> u8 {
    match adjustment {
        Adjustment::IncBrightness if brightness <= u8::MAX - BRIGHTNESS_STEP => brightness + BRIGHTNESS_STEP,
        Adjustment::DecBrightness if brightness >= BRIGHTNESS_MIN + BRIGHTNESS_STEP => brightness - BRIGHTNESS_STEP,
        _ => brightness,
    }
}

/// Modifier keys, running adjustments and the pending power-off deadline
#[derive(Debug, Default)]
pub struct ControlState {
    modifiers: [bool; 2],
    dec_saturation: bool,
    inc_saturation: bool,
    dec_brightness: bool,
    inc_brightness: bool,
    power_off_at: Option<Instant>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key press; returns true while both modifiers are held
    pub fn press(&mut self, note: u8) -> bool {
        self.modifiers[0] = self.modifiers[0] || note == KEY_CTRL_0;
        self.modifiers[1] = self.modifiers[1] || note == KEY_CTRL_1;
        self.combo_held()
    }

    pub fn release(&mut self, note: u8) {
        self.modifiers[0] = self.modifiers[0] && note != KEY_CTRL_0;
        self.modifiers[1] = self.modifiers[1] && note != KEY_CTRL_1;
    }

    pub fn combo_held(&self) -> bool {
        self.modifiers[0] && self.modifiers[1]
    }

    pub fn hold_pending(&self) -> bool {
        self.power_off_at.is_some()
    }

    pub fn arm_hold(&mut self, now: Instant) {
        self.power_off_at = Some(now + HOLD_TO_POWER_OFF);
    }

    /// Drop the pending deadline; true if one was pending
    pub fn cancel_hold(&mut self) -> bool {
        self.power_off_at.take().is_some()
    }

    /// True once (and only once) when the pending deadline has passed
    pub fn hold_expired(&mut self, now: Instant) -> bool {
        match self.power_off_at {
            Some(deadline) if now >= deadline => {
                self.power_off_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn begin_adjust(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::DecSaturation => self.dec_saturation = true,
            Adjustment::IncSaturation => self.inc_saturation = true,
            Adjustment::DecBrightness => self.dec_brightness = true,
            Adjustment::IncBrightness => self.inc_brightness = true,
        }
    }

    /// Releasing the key of a running adjustment stops all of them
    /// Returns true if something was running on that key
    pub fn end_adjust(&mut self, note: u8) -> bool {
        let matched = (self.dec_saturation && note == KEY_DEC_SAT)
            || (self.inc_saturation && note == KEY_INC_SAT)
            || (self.dec_brightness && note == KEY_DEC_BRI)
            || (self.inc_brightness && note == KEY_INC_BRI);
        if matched {
            self.dec_saturation = false;
            self.inc_saturation = false;
            self.dec_brightness = false;
            self.inc_brightness = false;
        }
        matched
    }

    /// Saturation ramp to apply on a ramp tick, decrease wins
    pub fn saturation_ramp(&self) -> Option<Adjustment> {
        if self.dec_saturation {
            Some(Adjustment::DecSaturation)
        } else if self.inc_saturation {
            Some(Adjustment::IncSaturation)
        } else {
            None
        }
    }

    pub fn brightness_ramp(&self) -> Option<Adjustment> {
        if self.dec_brightness {
            Some(Adjustment::DecBrightness)
        } else if self.inc_brightness {
            Some(Adjustment::IncBrightness)
        } else {
            None
        }
    }
}
