// Engine Module - Single owner of the lighting state, frame buffer and UDP link
//
// Everything that changes what the strip shows goes through the engine inbox:
// MIDI events, HTTP requests and shutdown. The loop interleaves those with a
// fixed rate ticker that re-renders decaying notes, runs brightness/saturation
// ramps and keeps the device in realtime mode.
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::colors::{background_color, blend, dimmed_color, note_to_color};
use crate::config::PianoConfig;
use crate::controls::{
    color_mode_for, command_for, preset_for, step_brightness, step_saturation, ControlCommand, ControlState,
    BRIGHTNESS_STEPS_PER_SECOND, KEY_TOGGLE_ACTIVE, SATURATION_STEPS_PER_SECOND,
};
use crate::device::{device_is_on, DeviceState};
use crate::leds::{FrameBuffer, LedView};
use crate::midi::{note_number_to_name, MidiEvent, NOTE_A0};
use crate::notes::{NoteLook, NoteTracker};
use crate::realtime::{Link, Transmitter, HOLD_DEFAULT, LEAVE_EARLY, LEAVE_NOW, LEAVE_SOON};
use crate::types::LightingState;

pub const INBOX_CAPACITY: usize = 256;

// Keys lit by the adjustment preview, relative to A0+34 (G3)
const PATTERN_ANCHOR: i16 = NOTE_A0 as i16 + 34;
const PATTERN_OFFSETS: [i16; 12] = [-2, 0, 2, 4, 6, 8, 11, 13, 15, 17, 19, 21];

pub enum EngineCommand {
    Midi(MidiEvent),
    /// Power the device on or off with the matching animation, `done` fires afterwards
    Power { on: bool, done: oneshot::Sender<()> },
    SetBrightness(u8),
    Snapshot(oneshot::Sender<LightingState>),
    /// Power off, blank the strip and stop the loop
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable sender side of the engine inbox
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn channel() -> (EngineHandle, mpsc::Receiver<EngineCommand>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        (EngineHandle { tx }, rx)
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("engine is not running"))
    }

    pub async fn midi(&self, event: MidiEvent) -> Result<()> {
        self.send(EngineCommand::Midi(event)).await
    }

    /// For callers outside the runtime (MIDI input thread)
    pub fn midi_blocking(&self, event: MidiEvent) -> Result<()> {
        self.tx
            .blocking_send(EngineCommand::Midi(event))
            .map_err(|_| anyhow!("engine is not running"))
    }

    pub async fn power(&self, on: bool) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.send(EngineCommand::Power { on, done }).await?;
        wait.await.map_err(|_| anyhow!("engine stopped before power change finished"))
    }

    pub async fn set_brightness(&self, brightness: u8) -> Result<()> {
        self.send(EngineCommand::SetBrightness(brightness)).await
    }

    pub async fn snapshot(&self) -> Result<LightingState> {
        let (reply, wait) = oneshot::channel();
        self.send(EngineCommand::Snapshot(reply)).await?;
        wait.await.map_err(|_| anyhow!("engine stopped before answering"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (ack, wait) = oneshot::channel();
        self.send(EngineCommand::Shutdown(ack)).await?;
        wait.await.map_err(|_| anyhow!("engine stopped before shutdown finished"))
    }
}

/// Geometry and timing, fixed for the lifetime of the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub fps: u32,
    pub hold_seconds: u8,
    pub sustain_window: Duration,
    pub keyboard: LedView,
    pub controls: LedView,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            fps: 50,
            hold_seconds: HOLD_DEFAULT,
            sustain_window: Duration::from_secs(5),
            // 88 keys, two LEDs per key, first LED skipped, first key is A0
            keyboard: LedView::new(88, 2, 1, NOTE_A0),
            // Single LEDs of the on/off indicator area
            controls: LedView::new(8, 1, 0, 0),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &PianoConfig) -> Self {
        EngineSettings {
            fps: config.fps,
            hold_seconds: config.hold_seconds,
            sustain_window: Duration::from_secs_f64(config.sustain_seconds),
            keyboard: LedView::new(config.keys, config.leds_per_key, config.first_led, config.first_note),
            controls: LedView::new(config.control_leds, 1, 0, 0),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    // Ticks between two ramp steps
    fn saturation_period(&self) -> u64 {
        (self.fps / SATURATION_STEPS_PER_SECOND).max(1) as u64
    }

    fn brightness_period(&self) -> u64 {
        (self.fps / BRIGHTNESS_STEPS_PER_SECOND).max(1) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Preview {
    /// Every key in its dimmed note color
    Solid,
    /// A handful of keys in full note color, the rest in background
    Pattern,
}

// Clock for note timestamps; follows tokio's clock so paused-time tests work
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub struct Engine<L: Link> {
    pub(crate) settings: EngineSettings,
    pub(crate) state: LightingState,
    pub(crate) frame: FrameBuffer,
    pub(crate) notes: NoteTracker,
    pub(crate) keyboard: LedView,
    pub(crate) controls_view: LedView,
    pub(crate) controls: ControlState,
    pub(crate) transmitter: Transmitter<L>,
    pub(crate) device: Arc<dyn DeviceState>,
    previewing: bool,
    ticks: u64,
}

impl<L: Link> Engine<L> {
    pub fn new(settings: EngineSettings, state: LightingState, link: L, device: Arc<dyn DeviceState>) -> Self {
        let led_count = settings.keyboard.required_leds().max(settings.controls.required_leds());
        let mut engine = Engine {
            settings,
            state,
            frame: FrameBuffer::new(led_count),
            notes: NoteTracker::new(),
            keyboard: settings.keyboard,
            controls_view: settings.controls,
            controls: ControlState::new(),
            transmitter: Transmitter::new(link),
            device,
            previewing: false,
            ticks: 0,
        };
        engine.reset_view(engine.keyboard);
        engine
    }

    /// Process commands and ticks until shutdown or until every handle is dropped
    pub async fn run(mut self, mut inbox: mpsc::Receiver<EngineCommand>) {
        let mut ticker = interval(self.settings.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "engine running at {} fps, {} LEDs",
            self.settings.fps,
            self.frame.led_count()
        );
        self.flush(self.settings.hold_seconds);

        loop {
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(EngineCommand::Shutdown(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = ticker.tick() => self.on_tick(now()).await,
            }
        }

        info!(
            "engine stopped ({} frames sent, {} dropped)",
            self.transmitter.sent(),
            self.transmitter.dropped()
        );
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Midi(event) => self.handle_midi(event, now()).await,
            EngineCommand::Power { on, done } => {
                self.power(on).await;
                let _ = done.send(());
            }
            EngineCommand::SetBrightness(brightness) => {
                self.state.brightness = brightness;
                self.push_state("bri", json!(brightness));
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.state);
            }
            EngineCommand::Shutdown(ack) => {
                self.shutdown().await;
                let _ = ack.send(());
            }
        }
    }

    pub async fn handle_midi(&mut self, event: MidiEvent, now: Instant) {
        match event {
            MidiEvent::NoteOn { note, velocity } => self.note_on(note, velocity, now).await,
            MidiEvent::NoteOff { note } => self.note_off(note),
            MidiEvent::Sustain { value } => {
                self.notes.pedal(value);
                // Lifting the pedal while holding both modifiers flips sustain mode
                if value == 0 && self.controls.combo_held() {
                    self.state.sustain_mode = !self.state.sustain_mode;
                    info!("sustain mode {}", if self.state.sustain_mode { "on" } else { "off" });
                }
            }
        }

        if self.state.active {
            self.flush(self.settings.hold_seconds);
        }
    }

    async fn note_on(&mut self, note: u8, velocity: u8, now: Instant) {
        trace!("note on {} ({}) vel {}", note_number_to_name(note), note, velocity);
        if self.state.active && self.keyboard.contains(note) {
            let color = note_to_color(note, velocity, &self.state);
            self.keyboard.set(&mut self.frame, note, color);
            self.notes.press(note, now);
        }

        if !self.controls.press(note) {
            return;
        }

        if note == KEY_TOGGLE_ACTIVE && !self.controls.hold_pending() {
            self.toggle_active(now).await;
        }

        if !self.state.active {
            self.select_preset(note);
            return;
        }

        match command_for(note) {
            Some(ControlCommand::ToggleBackground) => {
                self.state.background_mode = self.state.background_mode.next();
                info!("background mode {:?}", self.state.background_mode);
                self.reset_view(self.keyboard);
            }
            Some(ControlCommand::Adjust(adjustment)) => {
                debug!("adjusting {:?}", adjustment);
                self.controls.begin_adjust(adjustment);
                self.preview(Preview::Pattern);
            }
            Some(ControlCommand::ToggleActive) | None => {}
        }

        if let Some(mode) = color_mode_for(note) {
            info!("color mode {:?}", mode);
            self.state.color_mode = mode;
            self.preview(Preview::Solid);
        }
    }

    fn note_off(&mut self, note: u8) {
        trace!("note off {} ({})", note_number_to_name(note), note);
        if self.state.active && self.keyboard.contains(note) {
            let color = background_color(note, &self.state);
            self.keyboard.set(&mut self.frame, note, color);
            self.notes.release(note);
        }

        self.controls.release(note);

        // Quick tap on the power key: leave the hold-to-power-off path
        if note == KEY_TOGGLE_ACTIVE && self.controls.cancel_hold() {
            self.flush(LEAVE_NOW);
        }

        if !self.state.active {
            return;
        }

        let adjustment_done = self.controls.end_adjust(note);
        let mode_key_released = self.previewing && color_mode_for(note) == Some(self.state.color_mode);
        if adjustment_done || mode_key_released {
            self.reset_view(self.keyboard);
            self.flush(self.settings.hold_seconds);
        }
    }

    /// Power key pressed in command mode
    async fn toggle_active(&mut self, now: Instant) {
        let device_on = device_is_on(self.device.as_ref()).await;
        self.state.active = !(self.state.active && device_on);
        info!("lighting {}", if self.state.active { "active" } else { "inactive" });

        if self.state.active {
            if !device_on {
                self.device.set_state("on", json!(true)).await;
                self.animate_on().await;
            }
        } else {
            self.reset_view(self.keyboard);
            self.flush(LEAVE_EARLY);
        }

        // Keep holding to switch the device off
        if device_on {
            self.controls.arm_hold(now);
        }
    }

    /// Command-mode key while lighting is inactive: recall a WLED preset
    /// Power check and recall run in their own task, off the render loop
    fn select_preset(&self, note: u8) {
        let Some(preset) = preset_for(note) else {
            return;
        };
        let device = self.device.clone();
        tokio::spawn(async move {
            if device_is_on(device.as_ref()).await {
                info!("preset {}", preset);
                device.set_state("ps", json!(preset)).await;
            }
        });
    }

    pub async fn on_tick(&mut self, now: Instant) {
        self.ticks = self.ticks.wrapping_add(1);

        if self.controls.hold_expired(now) {
            info!("power key held, switching off");
            self.state.active = false;
            self.animate_off().await;
            self.device.set_state("on", json!(false)).await;
            return;
        }

        self.run_ramps();

        // Nothing lit and nothing playing: let the device time out of realtime mode
        let idle = self.frame.is_blank() && self.notes.is_quiet();
        if !idle && self.state.active {
            self.render(now);
            self.flush(self.settings.hold_seconds);
        }
    }

    fn run_ramps(&mut self) {
        if self.ticks % self.settings.saturation_period() == 0 {
            if let Some(adjustment) = self.controls.saturation_ramp() {
                self.state.saturation = step_saturation(self.state.saturation, adjustment);
                self.preview(Preview::Pattern);
            }
        }

        if self.ticks % self.settings.brightness_period() == 0 {
            if let Some(adjustment) = self.controls.brightness_ramp() {
                self.state.brightness = step_brightness(self.state.brightness, adjustment);
                self.push_state("bri", json!(self.state.brightness));
                self.preview(Preview::Pattern);
            }
        }
    }

    /// Redraw every tracked note for the current time
    fn render(&mut self, now: Instant) {
        let looks = self
            .notes
            .render(now, self.settings.sustain_window, self.state.sustain_mode);
        for (note, look) in looks {
            let background = background_color(note, &self.state);
            let color = match look {
                NoteLook::Lit => note_to_color(note, 127, &self.state),
                NoteLook::Fading(t) => blend(note_to_color(note, 127, &self.state), background, t),
                NoteLook::Cleared => background,
            };
            self.keyboard.set(&mut self.frame, note, color);
        }
    }

    pub(crate) fn preview(&mut self, kind: Preview) {
        let view = self.keyboard;
        for note in view.notes() {
            let color = match kind {
                Preview::Solid => dimmed_color(note_to_color(note, 64, &self.state)),
                Preview::Pattern if PATTERN_OFFSETS.contains(&(note as i16 - PATTERN_ANCHOR)) => {
                    note_to_color(note, 64, &self.state)
                }
                Preview::Pattern => background_color(note, &self.state),
            };
            view.set(&mut self.frame, note, color);
        }
        self.previewing = true;
    }

    /// Paint the background over a whole view and forget its notes
    pub(crate) fn reset_view(&mut self, view: LedView) {
        for note in view.notes() {
            let color = background_color(note, &self.state);
            view.set(&mut self.frame, note, color);
            self.notes.forget(note);
        }
        if view == self.keyboard {
            self.previewing = false;
        }
    }

    pub(crate) fn flush(&mut self, hold: u8) {
        self.transmitter.transmit(hold, self.frame.as_bytes());
    }

    /// Fire-and-forget device update, keeps HTTP latency out of the tick
    pub(crate) fn push_state(&self, field: &'static str, value: serde_json::Value) {
        let device = self.device.clone();
        tokio::spawn(async move {
            device.set_state(field, value).await;
        });
    }

    /// Switch the device on or off; nothing happens if it is already there
    pub async fn power(&mut self, on: bool) {
        let device_on = device_is_on(self.device.as_ref()).await;
        self.state.active = self.state.active && device_on;

        if !self.state.active && on {
            info!("powering on");
            self.state.active = true;
            self.device.set_state("on", json!(true)).await;
            self.animate_on().await;
        } else if self.state.active && !on {
            info!("powering off");
            self.animate_off().await;
            self.device.set_state("on", json!(false)).await;
            self.state.active = false;
        }
    }

    pub async fn shutdown(&mut self) {
        info!("shutting down lights");
        self.power(false).await;
        self.state.active = false;
        self.reset_view(self.keyboard);
        self.flush(LEAVE_SOON);
    }

    #[cfg(test)]
    pub(crate) fn key_color(&self, note: u8) -> Option<crate::types::Rgb> {
        self.keyboard.get(&self.frame, note)
    }
}
