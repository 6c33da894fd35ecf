// LEDs Module - Frame buffer for the strip and key-addressed views into it
use crate::types::Rgb;

/// Raw RGB bytes for every LED on the strip, in strip order
///
/// The buffer is owned by the engine. Views never hold storage of their own,
/// so two views that cover the same LEDs read and write the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(led_count: usize) -> Self {
        FrameBuffer {
            bytes: vec![0; led_count * 3],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn led_count(&self) -> usize {
        self.bytes.len() / 3
    }

    /// True when every LED is off
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

/// Index mapping from note numbers to LEDs
///
/// `first_note` is lit by the LEDs starting at `first_led`, every following
/// note takes the next `leds_per_key` LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedView {
    pub keys: usize,
    pub leds_per_key: usize,
    pub first_led: usize,
    pub first_note: u8,
}

impl LedView {
    pub fn new(keys: usize, leds_per_key: usize, first_led: usize, first_note: u8) -> Self {
        LedView {
            keys,
            leds_per_key,
            first_led,
            first_note,
        }
    }

    /// Number of LEDs a buffer needs so that this view fits
    pub fn required_leds(&self) -> usize {
        self.first_led + self.keys * self.leds_per_key
    }

    pub fn contains(&self, note: u8) -> bool {
        let note = note as usize;
        let first = self.first_note as usize;
        note >= first && note < first + self.keys
    }

    /// All notes covered by this view, lowest first
    pub fn notes(&self) -> impl Iterator<Item = u8> {
        let first = self.first_note as usize;
        (first..first + self.keys).map(|n| n as u8)
    }

    // Byte range of the LEDs lit by `note`
    fn byte_range(&self, note: u8) -> std::ops::Range<usize> {
        let key_index = note as usize - self.first_note as usize;
        let led_index = self.first_led + key_index * self.leds_per_key;
        led_index * 3..(led_index + self.leds_per_key) * 3
    }

    /// Paint every LED of `note` with `rgb`
    /// Returns false (and leaves the buffer untouched) when the note is outside the view
    pub fn set(&self, frame: &mut FrameBuffer, note: u8, rgb: Rgb) -> bool {
        if !self.contains(note) {
            return false;
        }
        let range = self.byte_range(note);
        let Some(leds) = frame.bytes.get_mut(range) else {
            return false;
        };
        for (i, byte) in leds.iter_mut().enumerate() {
            *byte = rgb.as_bytes()[i % 3];
        }
        true
    }

    /// Color of the first LED of `note`
    #[cfg(test)]
    pub fn get(&self, frame: &FrameBuffer, note: u8) -> Option<Rgb> {
        if !self.contains(note) {
            return None;
        }
        let range = self.byte_range(note);
        let led = frame.bytes.get(range.start..range.start + 3)?;
        Some(Rgb::new(led[0], led[1], led[2]))
    }
}
