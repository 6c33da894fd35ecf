// Notes Module - Per-note press/sustain/decay tracking
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Tracking record for one sounding (or decaying) note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteRecord {
    pub pressed: bool,     // key is held down
    pub sustained: bool,   // released while the pedal was down
    pub pressed_at: Instant,
}

/// What a tracked note should look like on the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteLook {
    /// Full note color
    Lit,
    /// Mix between note color and background, 0.0 = note color
    Fading(f64),
    /// Background color, the record has been dropped
    Cleared,
}

/// Note records keyed by MIDI note number plus the sustain pedal position
#[derive(Debug, Default)]
pub struct NoteTracker {
    records: BTreeMap<u8, NoteRecord>,
    pedal_down: bool,
}

impl NoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, note: u8, now: Instant) {
        self.records.insert(
            note,
            NoteRecord {
                pressed: true,
                sustained: false,
                pressed_at: now,
            },
        );
    }

    /// Mark a note released; it stays sustained if the pedal is down
    /// Returns false when the note was not being tracked
    pub fn release(&mut self, note: u8) -> bool {
        let pedal_down = self.pedal_down;
        match self.records.get_mut(&note) {
            Some(record) => {
                record.pressed = false;
                record.sustained = pedal_down;
                true
            }
            None => false,
        }
    }

    /// Sustain pedal (CC 64) value; lifting the pedal silences everything held by it
    pub fn pedal(&mut self, value: u8) {
        self.pedal_down = value > 0;
        if value == 0 {
            for record in self.records.values_mut() {
                record.sustained = false;
            }
        }
    }

    pub fn forget(&mut self, note: u8) {
        self.records.remove(&note);
    }

    /// True when no note is held down or sustained
    pub fn is_quiet(&self) -> bool {
        !self.records.values().any(|r| r.pressed || r.sustained)
    }

    /// Advance every record to `now` and report how each note should be drawn
    ///
    /// Decay progress is measured from the moment the key was struck. When
    /// `sustain_enabled` is false released notes are never faded.
    /// Notes reported as `Cleared` are removed once the walk has finished.
    pub fn render(&mut self, now: Instant, window: Duration, sustain_enabled: bool) -> Vec<(u8, NoteLook)> {
        let looks: Vec<(u8, NoteLook)> = self
            .records
            .iter()
            .map(|(&note, record)| {
                let elapsed = now.saturating_duration_since(record.pressed_at);
                let t = elapsed.as_secs_f64() / window.as_secs_f64();
                let look = if record.pressed {
                    NoteLook::Lit
                } else if sustain_enabled && record.sustained && t < 1.0 {
                    NoteLook::Fading(t)
                } else {
                    NoteLook::Cleared
                };
                (note, look)
            })
            .collect();

        for (note, look) in &looks {
            if *look == NoteLook::Cleared {
                self.records.remove(note);
            }
        }

        looks
    }
}

#[cfg(test)]
impl NoteTracker {
    pub fn get(&self, note: u8) -> Option<&NoteRecord> {
        self.records.get(&note)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(5);

    #[test]
    fn test_press_and_release_without_pedal() {
        let start = Instant::now();
        let mut notes = NoteTracker::new();
        notes.press(60, start);
        assert!(!notes.is_quiet());
        assert_eq!(notes.render(start, WINDOW, true), vec![(60, NoteLook::Lit)]);

        assert!(notes.release(60));
        assert!(notes.is_quiet());
        let looks = notes.render(start + Duration::from_millis(20), WINDOW, true);
        assert_eq!(looks, vec![(60, NoteLook::Cleared)]);
        assert_eq!(notes.len(), 0);
    }

    #[test]
    fn test_release_untracked_note() {
        let mut notes = NoteTracker::new();
        assert!(!notes.release(61));
        assert_eq!(notes.len(), 0);
    }

    #[test]
    fn test_sustained_note_fades_then_clears() {
        let start = Instant::now();
        let mut notes = NoteTracker::new();
        notes.pedal(127);
        notes.press(60, start);
        notes.release(60);

        let record = notes.get(60).unwrap();
        assert!(!record.pressed);
        assert!(record.sustained);
        assert!(!notes.is_quiet());

        let looks = notes.render(start + Duration::from_millis(2500), WINDOW, true);
        match looks[0] {
            (60, NoteLook::Fading(t)) => assert!((t - 0.5).abs() < 1e-9),
            other => panic!("unexpected look {:?}", other),
        }
        assert_eq!(notes.len(), 1);

        let looks = notes.render(start + WINDOW, WINDOW, true);
        assert_eq!(looks, vec![(60, NoteLook::Cleared)]);
        assert_eq!(notes.len(), 0);
    }

    #[test]
    fn test_pedal_up_silences_sustained_notes() {
        let start = Instant::now();
        let mut notes = NoteTracker::new();
        notes.pedal(100);
        notes.press(60, start);
        notes.press(64, start);
        notes.release(60);
        notes.pedal(0);

        assert!(!notes.pedal_down);
        assert!(!notes.get(60).unwrap().sustained);
        // 64 is still held, 60 goes back to background on the next frame
        let looks = notes.render(start + Duration::from_secs(1), WINDOW, true);
        assert_eq!(looks, vec![(60, NoteLook::Cleared), (64, NoteLook::Lit)]);
        assert!(notes.get(60).is_none());
    }

    #[test]
    fn test_sustain_disabled_clears_released_notes() {
        let start = Instant::now();
        let mut notes = NoteTracker::new();
        notes.pedal(127);
        notes.press(70, start);
        notes.release(70);
        let looks = notes.render(start + Duration::from_millis(100), WINDOW, false);
        assert_eq!(looks, vec![(70, NoteLook::Cleared)]);
        assert_eq!(notes.len(), 0);
    }

    #[test]
    fn test_repress_restarts_record() {
        let start = Instant::now();
        let mut notes = NoteTracker::new();
        notes.pedal(127);
        notes.press(60, start);
        notes.release(60);
        let later = start + Duration::from_secs(3);
        notes.press(60, later);
        let record = notes.get(60).unwrap();
        assert!(record.pressed);
        assert!(!record.sustained);
        assert_eq!(record.pressed_at, later);
    }
}
