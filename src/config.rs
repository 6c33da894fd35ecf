// Config Module - Configuration management and command-line argument parsing
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::midi::NOTE_A0;
use crate::realtime::HOLD_DEFAULT;
use crate::types::{BackgroundMode, ColorMode, LightingState};

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Light up a WLED strip above a MIDI keyboard as you play",
    long_about = "Listens to a MIDI keyboard and mirrors every key on a WLED LED strip mounted above it.\n\
                  Frames are sent over the WLED realtime UDP protocol (DRGB). Holding A0 and B0 together\n\
                  turns the lowest keys into controls for power, color mode, background, saturation and brightness."
)]
pub struct Args {
    /// WLED realtime UDP address (host:port)
    #[arg(short, long)]
    pub wled: Option<String>,

    /// HTTP server bind address
    #[arg(long)]
    pub http_ip: Option<String>,

    /// HTTP server port
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Disable the HTTP server
    #[arg(long)]
    pub no_http: bool,

    /// MIDI input device name (substring match, first port if not found)
    #[arg(short = 'm', long)]
    pub midi_device: Option<String>,

    /// Open a virtual MIDI input port other software can connect to
    #[arg(long = "virtual")]
    pub virtual_midi: bool,

    /// Realtime frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// List MIDI input ports and exit
    #[arg(long)]
    pub list_midi: bool,

    /// Config file path or name (e.g., --cfg /full/path or --cfg studio for ~/.config/pianolights/studio.conf)
    #[arg(long)]
    pub cfg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PianoConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    // Device
    pub wled_addr: String,
    pub device_timeout_ms: u64,

    // HTTP control surface
    pub http_enabled: bool,
    pub http_ip: String,
    pub http_port: u16,

    // MIDI
    pub midi_device: String,
    pub virtual_midi: bool,

    // Realtime
    pub fps: u32,
    pub hold_seconds: u8,
    pub sustain_seconds: f64,

    // Strip layout
    pub keys: usize,
    pub leds_per_key: usize,
    pub first_led: usize,
    pub first_note: u8,
    pub control_leds: usize,

    // Lighting at startup
    pub brightness: u8,
    pub saturation: u8,
    pub color_mode: ColorMode,
    pub background_mode: BackgroundMode,
    pub sustain_mode: bool,
}

impl Default for PianoConfig {
    fn default() -> Self {
        let lighting = LightingState::default();
        PianoConfig {
            config_path: None,
            wled_addr: "192.168.1.3:21324".to_string(),
            device_timeout_ms: 1000,
            http_enabled: true,
            http_ip: "0.0.0.0".to_string(),
            http_port: 1212,
            midi_device: String::new(),
            virtual_midi: false,
            fps: 50,
            hold_seconds: HOLD_DEFAULT,
            sustain_seconds: 5.0,
            keys: 88,
            leds_per_key: 2,
            first_led: 1,
            first_note: NOTE_A0,
            control_leds: 8,
            brightness: lighting.brightness,
            saturation: lighting.saturation,
            color_mode: lighting.color_mode,
            background_mode: lighting.background_mode,
            sustain_mode: lighting.sustain_mode,
        }
    }
}

impl PianoConfig {
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        // Track if any args were actually provided
        let mut args_provided = false;

        if let Some(ref wled) = args.wled {
            self.wled_addr = wled.clone();
            args_provided = true;
        }

        if let Some(ref http_ip) = args.http_ip {
            self.http_ip = http_ip.clone();
            args_provided = true;
        }

        if let Some(http_port) = args.http_port {
            self.http_port = http_port;
            args_provided = true;
        }

        if args.no_http {
            self.http_enabled = false;
            args_provided = true;
        }

        if let Some(ref midi_device) = args.midi_device {
            self.midi_device = midi_device.clone();
            args_provided = true;
        }

        if args.virtual_midi {
            self.virtual_midi = true;
            args_provided = true;
        }

        if let Some(fps) = args.fps {
            self.fps = fps;
            args_provided = true;
        }

        if args_provided {
            self.sanitize();
        }

        args_provided
    }

    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            // Check if it's an absolute path
            let path = PathBuf::from(cfg);
            if path.is_absolute() {
                return Ok(path);
            }

            // Check if it contains path separators (relative path)
            if cfg.contains('/') || cfg.contains('\\') {
                return Ok(path);
            }

            // Otherwise treat as config name in config directory
            let config_dir = Self::config_dir()?;

            // Add .conf extension if not present
            let filename = if cfg.ends_with(".conf") {
                cfg.to_string()
            } else {
                format!("{}.conf", cfg)
            };

            Ok(config_dir.join(filename))
        } else {
            Ok(Self::config_dir()?.join("config.conf"))
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let config_dir = PathBuf::from(home).join(".config").join("pianolights");
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        Ok(config_dir)
    }

    pub fn load_with_path(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut parsed = Self::from_toml(&contents)?;
        parsed.config_path = Some(path);
        Ok(parsed)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut parsed: Self = toml::from_str(contents)?;
        parsed.sanitize();
        Ok(parsed)
    }

    /// Trim strings and clamp numbers into ranges the engine can work with
    pub fn sanitize(&mut self) {
        // Sanitize string values (trim whitespace)
        self.wled_addr = self.wled_addr.trim().to_string();
        self.http_ip = self.http_ip.trim().to_string();
        self.midi_device = self.midi_device.trim().to_string();

        // Clamp numeric values to reasonable ranges
        self.fps = self.fps.clamp(1, 200);
        self.device_timeout_ms = self.device_timeout_ms.clamp(50, 30000);
        self.http_port = self.http_port.max(1);
        self.sustain_seconds = self.sustain_seconds.clamp(0.1, 60.0);
        self.keys = self.keys.clamp(1, 128);
        self.leds_per_key = self.leds_per_key.clamp(1, 16);
        self.first_led = self.first_led.min(10000);
        // Keep the last key a valid MIDI note
        self.first_note = self.first_note.min(128 - self.keys as u8);
        self.control_leds = self.control_leds.clamp(2, 64);
        self.brightness = self.brightness.max(8);
        self.saturation = self.saturation.max(64);
    }

    /// Lighting state the engine starts with
    pub fn lighting_state(&self) -> LightingState {
        LightingState {
            active: true,
            brightness: self.brightness,
            saturation: self.saturation,
            color_mode: self.color_mode,
            background_mode: self.background_mode,
            sustain_mode: self.sustain_mode,
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::config_path(None)?,
        };

        // Sanitize values before saving
        let mut sanitized = self.clone();
        sanitized.sanitize();

        std::fs::write(&path, sanitized.to_toml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Render the config as TOML with comments for every setting
    pub fn to_toml(&self) -> Result<String> {
        // Quoted snake_case names, valid TOML strings as-is
        let color_mode = serde_json::to_string(&self.color_mode)?;
        let background_mode = serde_json::to_string(&self.background_mode)?;

        // Build TOML with comments manually for better documentation
        Ok(format!(
            r#"# pianolights Configuration File

# WLED realtime UDP address (host:port), the JSON API is reached on port 80 of the same host
wled_addr = "{}"

# Timeout for WLED JSON API requests in milliseconds
device_timeout_ms = {}

# HTTP control server (power, brightness demo, state snapshot)
http_enabled = {}
http_ip = "{}"
http_port = {}

# MIDI input device name, substring match (empty = first available port)
midi_device = "{}"

# Open a virtual input port named "pianolights" instead (not available on Windows)
virtual_midi = {}

# Realtime frames per second (1-200)
fps = {}

# Seconds WLED stays in realtime mode after the last frame
hold_seconds = {}

# Seconds a sustained note takes to fade out
sustain_seconds = {:?}

# Strip layout: number of keys, LEDs per key, index of the LED above the first key,
# MIDI note of the first key
keys = {}
leds_per_key = {}
first_led = {}
first_note = {}

# Number of indicator LEDs used by the power on/off animation
control_leds = {}

# Lighting at startup
# Brightness (8-255) and saturation (64-255)
brightness = {}
saturation = {}

# Color mode
# Options: "none", "rainbow1", "rainbow2", "rainbow3", "rainbow4", "white_warm", "white", "white_cold",
#          "red", "red_yellow", "yellow", "yellow_green", "green", "green_cyan", "cyan", "cyan_blue",
#          "blue", "blue_magenta", "magenta", "magenta_red"
color_mode = {}

# Background of unlit keys
# Options: "black", "dimmed", "light"
background_mode = {}

# Fade out notes held by the sustain pedal
sustain_mode = {}
"#,
            self.wled_addr,
            self.device_timeout_ms,
            self.http_enabled,
            self.http_ip,
            self.http_port,
            self.midi_device,
            self.virtual_midi,
            self.fps,
            self.hold_seconds,
            self.sustain_seconds,
            self.keys,
            self.leds_per_key,
            self.first_led,
            self.first_note,
            self.control_leds,
            self.brightness,
            self.saturation,
            color_mode,
            background_mode,
            self.sustain_mode,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PianoConfig::default();
        assert_eq!(config.wled_addr, "192.168.1.3:21324");
        assert_eq!(config.http_port, 1212);
        assert_eq!(config.fps, 50);
        assert_eq!(config.first_note, 21);
        assert_eq!(config.lighting_state(), LightingState::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = PianoConfig::from_toml("wled_addr = \"10.0.0.7:21324\"\ncolor_mode = \"rainbow2\"\n").unwrap();
        assert_eq!(config.wled_addr, "10.0.0.7:21324");
        assert_eq!(config.color_mode, ColorMode::Rainbow2);
        assert_eq!(config.keys, 88);
        assert_eq!(config.background_mode, BackgroundMode::Black);
    }

    #[test]
    fn test_sanitize_clamps() {
        let config = PianoConfig::from_toml(
            "fps = 0\nbrightness = 1\nsaturation = 3\nwled_addr = \"  1.2.3.4:21324 \"\nsustain_seconds = 0.0\n",
        )
        .unwrap();
        assert_eq!(config.fps, 1);
        assert_eq!(config.brightness, 8);
        assert_eq!(config.saturation, 64);
        assert_eq!(config.wled_addr, "1.2.3.4:21324");
        assert_eq!(config.sustain_seconds, 0.1);

        let config = PianoConfig::from_toml("fps = 5000\nkeys = 88\nfirst_note = 100\n").unwrap();
        assert_eq!(config.fps, 200);
        assert_eq!(config.first_note, 40);
    }

    #[test]
    fn test_generated_file_parses_back() {
        let mut config = PianoConfig::default();
        config.color_mode = ColorMode::BlueMagenta;
        config.background_mode = BackgroundMode::Dimmed;
        config.http_enabled = false;
        let text = config.to_toml().unwrap();
        assert!(text.contains("color_mode = \"blue_magenta\""));

        let parsed = PianoConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.color_mode, ColorMode::BlueMagenta);
        assert_eq!(parsed.background_mode, BackgroundMode::Dimmed);
        assert!(!parsed.http_enabled);
        assert_eq!(parsed.sustain_seconds, 5.0);
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = PianoConfig::default();
        assert!(!config.merge_with_args(&Args::default()));

        let args = Args::parse_from(["pianolights", "--wled", "10.1.1.1:21324", "--fps", "900", "--no-http"]);
        assert!(config.merge_with_args(&args));
        assert_eq!(config.wled_addr, "10.1.1.1:21324");
        assert_eq!(config.fps, 200);
        assert!(!config.http_enabled);
        assert_eq!(config.http_port, 1212);
    }

    #[test]
    fn test_virtual_midi_flag() {
        let mut config = PianoConfig::default();
        assert!(!config.virtual_midi);

        let args = Args::parse_from(["pianolights", "--virtual"]);
        assert!(config.merge_with_args(&args));
        assert!(config.virtual_midi);

        let parsed = PianoConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert!(parsed.virtual_midi);
    }

    #[test]
    fn test_config_path_forms() {
        assert_eq!(
            PianoConfig::config_path(Some("/tmp/piano.conf")).unwrap(),
            PathBuf::from("/tmp/piano.conf")
        );
        assert_eq!(
            PianoConfig::config_path(Some("confs/piano.conf")).unwrap(),
            PathBuf::from("confs/piano.conf")
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir().join(format!("pianolights-test-{}.conf", std::process::id()));
        let mut config = PianoConfig::default();
        config.config_path = Some(path.clone());
        config.midi_device = "Roland".to_string();
        config.save().unwrap();

        let loaded = PianoConfig::load_with_path(path.to_str()).unwrap();
        assert_eq!(loaded.midi_device, "Roland");
        assert_eq!(loaded.config_path, Some(path.clone()));
        std::fs::remove_file(path).unwrap();
    }
}
