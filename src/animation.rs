// Animation Module - Power on/off wipes on the indicator LEDs
//
// The wipe runs in the engine's own control flow while a spawned task ramps
// the device brightness; the wipe waits for the ramp before the final frame.
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::debug;

use crate::colors::background_color;
use crate::engine::Engine;
use crate::realtime::{Link, LEAVE_SOON};
use crate::types::{BackgroundMode, Rgb, BLACK, GREEN, RED};

const RAMP_STEP: Duration = Duration::from_millis(25);
const WIPE_STEP: Duration = Duration::from_millis(100);
// The strip is slow to show the first frame after switching on
const WARMUP: Duration = Duration::from_millis(250);

/// Brightness levels from 15 up to (not including) `target`
pub fn ramp_up_levels(target: u8) -> Vec<u8> {
    (15..target).step_by(16).collect()
}

/// Brightness levels from `from` down in steps of 16, all above 15
pub fn ramp_down_levels(from: u8) -> Vec<u8> {
    let mut levels = Vec::new();
    let mut level = from as i16;
    while level > 15 {
        levels.push(level as u8);
        level -= 16;
    }
    levels
}

impl<L: Link> Engine<L> {
    pub(crate) async fn animate_on(&mut self) {
        debug!("animating power on");
        let background = self.state.background_mode;
        self.state.background_mode = BackgroundMode::Black;
        self.reset_view(self.keyboard);
        self.state.background_mode = background;

        let ramp = self.spawn_brightness_ramp(ramp_up_levels(self.state.brightness));

        self.flush(self.settings.hold_seconds);
        sleep(WARMUP).await;

        let half = self.controls_view.keys / 2;
        for band in (0..half).rev() {
            self.wipe(band, GREEN);
            self.flush(self.settings.hold_seconds);
            sleep(WIPE_STEP).await;
        }

        self.state.background_mode = BackgroundMode::Black;
        self.reset_view(self.controls_view);
        let _ = ramp.await;
        self.state.background_mode = background;
        self.reset_view(self.keyboard);
        self.flush(self.settings.hold_seconds);
    }

    pub(crate) async fn animate_off(&mut self) {
        debug!("animating power off");
        let background = self.state.background_mode;
        let ramp = self.spawn_brightness_ramp(ramp_down_levels(self.state.brightness));

        let half = self.controls_view.keys / 2;
        for band in 0..half {
            self.wipe(band, RED);
            self.flush(self.settings.hold_seconds);
            sleep(WIPE_STEP).await;
        }

        self.state.background_mode = BackgroundMode::Black;
        self.reset_view(self.controls_view);
        let _ = ramp.await;
        self.reset_view(self.keyboard);
        self.flush(LEAVE_SOON);
        self.state.background_mode = background;
    }

    // Indicator LEDs band..keys-band in `color`, the rest cleared
    fn wipe(&mut self, band: usize, color: Rgb) {
        let view = self.controls_view;
        for i in 0..view.keys {
            let rgb = if i >= band && i < view.keys - band {
                color
            } else if i == 0 {
                BLACK
            } else {
                background_color((i * 2) as u8, &self.state)
            };
            view.set(&mut self.frame, view.first_note + i as u8, rgb);
        }
    }

    /// Step the device brightness through `levels`; the receiver fires when done
    fn spawn_brightness_ramp(&self, levels: Vec<u8>) -> oneshot::Receiver<()> {
        let device = self.device.clone();
        let (done, finished) = oneshot::channel();
        tokio::spawn(async move {
            for level in levels {
                device.set_state("bri", json!(level)).await;
                sleep(RAMP_STEP).await;
            }
            let _ = done.send(());
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::device::tests::FakeDevice;
    use crate::engine::EngineSettings;
    use crate::realtime::tests::FakeLink;
    use crate::types::{LightingState, WHITE};

    fn engine() -> (Engine<FakeLink>, FakeLink, FakeDevice) {
        let link = FakeLink::default();
        let device = FakeDevice::powered(true);
        let engine = Engine::new(
            EngineSettings::default(),
            LightingState::default(),
            link.clone(),
            Arc::new(device.clone()),
        );
        (engine, link, device)
    }

    // The 8 indicator LEDs of a datagram
    fn indicators(datagram: &[u8]) -> Vec<Rgb> {
        datagram[2..2 + 8 * 3]
            .chunks(3)
            .map(|c| Rgb::new(c[0], c[1], c[2]))
            .collect()
    }

    #[test]
    fn test_ramp_levels() {
        assert_eq!(ramp_up_levels(127), vec![15, 31, 47, 63, 79, 95, 111]);
        assert_eq!(ramp_up_levels(15), Vec::<u8>::new());
        assert_eq!(ramp_up_levels(255).last(), Some(&239));
        assert_eq!(ramp_down_levels(127), vec![127, 111, 95, 79, 63, 47, 31]);
        assert_eq!(ramp_down_levels(16), vec![16]);
        assert_eq!(ramp_down_levels(8), Vec::<u8>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn test_animate_off_wipes_inwards() {
        let (mut engine, link, device) = engine();
        engine.animate_off().await;

        let frames = link.sent();
        assert_eq!(frames.len(), 5);
        assert!(indicators(&frames[0]).iter().all(|c| *c == RED));
        let last_wipe = indicators(&frames[3]);
        assert_eq!(last_wipe[0], BLACK);
        assert_eq!(last_wipe[2], BLACK);
        assert_eq!(last_wipe[3], RED);
        assert_eq!(last_wipe[4], RED);
        assert_eq!(last_wipe[5], BLACK);

        assert_eq!(frames[4][1], LEAVE_SOON);
        assert!(frames[4][2..].iter().all(|&b| b == 0));

        let levels: Vec<u8> = device
            .writes_to("bri")
            .iter()
            .filter_map(|v| v.as_u64().map(|n| n as u8))
            .collect();
        assert_eq!(levels, ramp_down_levels(127));
    }

    #[tokio::test(start_paused = true)]
    async fn test_animate_on_wipes_outwards() {
        let (mut engine, link, device) = engine();
        engine.state.background_mode = BackgroundMode::Light;
        engine.animate_on().await;

        let frames = link.sent();
        // warm-up frame, four wipe frames, final frame
        assert_eq!(frames.len(), 6);
        assert!(frames[0][2..].iter().all(|&b| b == 0));

        let first_wipe = indicators(&frames[1]);
        assert_eq!(first_wipe[3], GREEN);
        assert_eq!(first_wipe[4], GREEN);
        assert_eq!(first_wipe[0], BLACK);
        // Cleared indicators show the background of the key they sit under
        assert_eq!(first_wipe[1], crate::colors::dimmed_color(WHITE));
        assert!(indicators(&frames[4]).iter().all(|c| *c == GREEN));

        // Background restored on the final frame
        assert_eq!(engine.state.background_mode, BackgroundMode::Light);
        assert_eq!(engine.key_color(60), Some(crate::colors::dimmed_color(WHITE)));
        assert_eq!(frames[5][1], engine.settings.hold_seconds);
        assert_eq!(device.writes_to("bri").len(), ramp_up_levels(127).len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_animation_waits_for_brightness_ramp() {
        let (mut engine, _link, device) = engine();
        engine.state.brightness = 255;
        let start = tokio::time::Instant::now();
        engine.animate_off().await;
        assert!(start.elapsed() >= WIPE_STEP * 4);
        // Every ramp step has landed by the time the animation returns
        assert_eq!(device.writes_to("bri").len(), 15);
        assert_eq!(device.writes_to("bri").last(), Some(&json!(31)));
    }
}
