// Shared types module - Common types used across multiple modules

use serde::{Deserialize, Serialize};

// RGB color representation, laid out in the same order the strip expects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn as_bytes(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

pub const BLACK: Rgb = Rgb::new(0, 0, 0);
pub const WHITE_COLD: Rgb = Rgb::new(255, 255, 255);
pub const WHITE: Rgb = Rgb::new(255, 224, 160);
pub const WHITE_WARM: Rgb = Rgb::new(255, 182, 111);
pub const RED: Rgb = Rgb::new(255, 0, 0);
pub const GREEN: Rgb = Rgb::new(0, 255, 0);

/// Color modes selectable from the keyboard
///
/// The rainbow variants stretch one hue cycle over 1..=4 octaves,
/// the solid variants walk the color wheel in 30 degree steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    None,
    Rainbow1,
    Rainbow2,
    Rainbow3,
    Rainbow4,
    WhiteWarm,
    White,
    WhiteCold,
    Red,
    RedYellow,
    Yellow,
    YellowGreen,
    Green,
    GreenCyan,
    Cyan,
    CyanBlue,
    Blue,
    BlueMagenta,
    Magenta,
    MagentaRed,
}

impl ColorMode {
    /// Hue period in semitones for the rainbow family
    pub fn rainbow_period(&self) -> Option<u16> {
        match self {
            ColorMode::Rainbow1 => Some(12),
            ColorMode::Rainbow2 => Some(24),
            ColorMode::Rainbow3 => Some(36),
            ColorMode::Rainbow4 => Some(48),
            _ => None,
        }
    }

    /// Position on the 12 step color wheel for the solid family
    pub fn solid_step(&self) -> Option<u16> {
        let step = match self {
            ColorMode::Red => 0,
            ColorMode::RedYellow => 1,
            ColorMode::Yellow => 2,
            ColorMode::YellowGreen => 3,
            ColorMode::Green => 4,
            ColorMode::GreenCyan => 5,
            ColorMode::Cyan => 6,
            ColorMode::CyanBlue => 7,
            ColorMode::Blue => 8,
            ColorMode::BlueMagenta => 9,
            ColorMode::Magenta => 10,
            ColorMode::MagentaRed => 11,
            _ => return None,
        };
        Some(step)
    }
}

// What unlit keys show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    Black,
    Dimmed,
    Light,
}

impl BackgroundMode {
    pub fn next(self) -> Self {
        match self {
            BackgroundMode::Black => BackgroundMode::Dimmed,
            BackgroundMode::Dimmed => BackgroundMode::Light,
            BackgroundMode::Light => BackgroundMode::Black,
        }
    }
}

/// Global lighting state, owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LightingState {
    pub active: bool,
    pub brightness: u8,
    pub saturation: u8,
    pub color_mode: ColorMode,
    pub background_mode: BackgroundMode,
    pub sustain_mode: bool,
}

impl Default for LightingState {
    fn default() -> Self {
        LightingState {
            active: true,
            brightness: 127,
            saturation: 255,
            color_mode: ColorMode::WhiteWarm,
            background_mode: BackgroundMode::Black,
            sustain_mode: true,
        }
    }
}
