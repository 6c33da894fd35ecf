// Colors Module - Maps notes to colors for the current lighting state
use crate::types::{BackgroundMode, ColorMode, LightingState, Rgb, BLACK, WHITE, WHITE_COLD, WHITE_WARM};

// Rainbow hues are shifted so that note colors line up with the web player's palette
const RAINBOW_SHIFT: u16 = 24;

/// Color of a note struck with `velocity` in the current color mode
/// Velocity 0 means "not playing" and resolves to the background color
pub fn note_to_color(note: u8, velocity: u8, state: &LightingState) -> Rgb {
    if velocity == 0 {
        return background_color(note, state);
    }

    match state.color_mode {
        ColorMode::White => return WHITE,
        ColorMode::WhiteWarm => return WHITE_WARM,
        ColorMode::WhiteCold => return WHITE_COLD,
        _ => {}
    }

    let hue = if let Some(period) = state.color_mode.rainbow_period() {
        let frac = ((note as u16 + RAINBOW_SHIFT) % period) as f64 / period as f64;
        (frac * 360.0) as u16
    } else if let Some(step) = state.color_mode.solid_step() {
        (360 / 12) * step
    } else {
        return BLACK;
    };

    hs_to_rgb(hue, state.saturation)
}

/// Color shown on a key that is neither pressed nor decaying
pub fn background_color(note: u8, state: &LightingState) -> Rgb {
    match state.background_mode {
        BackgroundMode::Dimmed => dimmed_color(note_to_color(note, 64, state)),
        BackgroundMode::Light => dimmed_color(WHITE),
        BackgroundMode::Black => BLACK,
    }
}

/// Divide every channel by 8
pub fn dimmed_color(rgb: Rgb) -> Rgb {
    Rgb::new(rgb.r / 8, rgb.g / 8, rgb.b / 8)
}

/// Linear mix of two colors
/// t=0 returns `from`, t=1 returns `to`
pub fn blend(from: Rgb, to: Rgb, t: f64) -> Rgb {
    let mix = |a: u8, b: u8| (a as f64 * (1.0 - t) + b as f64 * t) as u8;
    Rgb::new(mix(from.r, to.r), mix(from.g, to.g), mix(from.b, to.b))
}

/// Convert hue (0-360) and saturation (0-255) at full value to RGB
pub fn hs_to_rgb(hue: u16, saturation: u8) -> Rgb {
    let h = (hue % 360) as f64 / 360.0;
    let s = saturation as f64 / 255.0;
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = (255.0 * (1.0 - s)) as u8;
    let q = (255.0 * (1.0 - f * s)) as u8;
    let t = (255.0 * (1.0 - (1.0 - f) * s)) as u8;

    match i as u8 % 6 {
        0 => Rgb::new(255, t, p),
        1 => Rgb::new(q, 255, p),
        2 => Rgb::new(p, 255, t),
        3 => Rgb::new(p, q, 255),
        4 => Rgb::new(t, p, 255),
        _ => Rgb::new(255, p, q),
    }
}
