// MIDI Module - Keyboard input, message normalization and decoding
use anyhow::{anyhow, Result};
use midir::{Ignore, MidiInput, MidiInputConnection};

pub const CMD_NOTE_OFF: u8 = 0;
pub const CMD_NOTE_ON: u8 = 1;
pub const CMD_CONTROL_CHANGE: u8 = 3;

pub const CC_SUSTAIN: u8 = 64;

pub const NOTE_A0: u8 = 21;
pub const NOTE_C8: u8 = 108;

// Channel every message is rewritten to (what the Roland keyboard sends on)
pub const CHANNEL: u8 = 3;

/// Build a status byte for `command` on the fixed channel
pub fn to_cmd(command: u8) -> u8 {
    ((1 << 3) | command) << 4 | CHANNEL
}

/// Command number (0-7) of a status byte
pub fn from_cmd(status: u8) -> u8 {
    (status >> 4) & 7
}

/// 0.0..1.0 to 0..127
pub fn to_val(x: f64) -> u8 {
    (x * 127.0) as u8
}

/// MIDI Event types we care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    Sustain { value: u8 },
}

/// Force the fixed channel and turn "note on, velocity 0" into a note off
pub fn normalize_midi_message(message: &[u8]) -> Vec<u8> {
    let Some(&status) = message.first() else {
        return Vec::new();
    };

    if from_cmd(status) == CMD_NOTE_ON && message.len() >= 3 && message[2] == 0 {
        return vec![to_cmd(CMD_NOTE_OFF), message[1]];
    }

    let mut normalized = message.to_vec();
    normalized[0] = to_cmd(from_cmd(status));
    normalized
}

/// Parse a normalized MIDI frame into our MidiEvent type
/// Only note on/off and the sustain pedal are of interest, everything else is dropped
pub fn parse_midi_message(message: &[u8]) -> Option<MidiEvent> {
    if message.len() < 2 {
        return None;
    }

    let note = message[1];
    match from_cmd(message[0]) {
        CMD_NOTE_OFF => Some(MidiEvent::NoteOff { note }),
        CMD_NOTE_ON => {
            let velocity = *message.get(2)?;
            if velocity == 0 {
                Some(MidiEvent::NoteOff { note })
            } else {
                Some(MidiEvent::NoteOn { note, velocity })
            }
        }
        CMD_CONTROL_CHANGE if note == CC_SUSTAIN => {
            let value = *message.get(2)?;
            Some(MidiEvent::Sustain { value })
        }
        _ => None,
    }
}

/// Convert MIDI note number to musical note name (e.g., 60 -> "C4")
pub fn note_number_to_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

/// List all available MIDI input ports
/// Returns a vector of port names
pub fn list_midi_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("pianolights")?;
    let ports = midi_in.ports();

    let mut port_names = Vec::new();
    for port in ports.iter() {
        if let Ok(name) = midi_in.port_name(port) {
            port_names.push(name);
        }
    }

    Ok(port_names)
}

/// Find a MIDI input port by name (case-insensitive substring match)
pub fn find_midi_port(midi_in: &MidiInput, port_name: &str) -> Result<usize> {
    let ports = midi_in.ports();

    for (i, port) in ports.iter().enumerate() {
        if let Ok(name) = midi_in.port_name(port) {
            if name.to_lowercase().contains(&port_name.to_lowercase()) {
                return Ok(i);
            }
        }
    }

    Err(anyhow!("MIDI port '{}' not found", port_name))
}

/// Connect to a MIDI input device
/// Falls back to the first port when `device_name` is not found
pub fn connect_midi<F>(device_name: &str, callback: F) -> Result<(String, MidiInputConnection<()>)>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    let mut midi_in = MidiInput::new("pianolights")?;
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(anyhow!("No MIDI input ports available"));
    }

    let port_index = match find_midi_port(&midi_in, device_name) {
        Ok(idx) => idx,
        Err(e) => {
            tracing::warn!("{}, using first available port", e);
            0
        }
    };

    let port = &ports[port_index];
    let port_name = midi_in.port_name(port).unwrap_or_else(|_| "<unknown>".to_string());

    let connection = midi_in
        .connect(port, "pianolights_input", callback, ())
        .map_err(|e| anyhow!("Failed to connect to MIDI port: {}", e))?;

    Ok((port_name, connection))
}

/// Name of the virtual input port, as other MIDI software sees it
pub const VIRTUAL_PORT_NAME: &str = "pianolights";

/// Open a virtual input port that other applications can send notes to
#[cfg(unix)]
pub fn create_virtual_midi<F>(callback: F) -> Result<(String, MidiInputConnection<()>)>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    use midir::os::unix::VirtualInput;

    let mut midi_in = MidiInput::new("pianolights")?;
    midi_in.ignore(Ignore::All);

    let connection = midi_in
        .create_virtual(VIRTUAL_PORT_NAME, callback, ())
        .map_err(|e| anyhow!("Failed to create virtual MIDI port: {}", e))?;

    Ok((VIRTUAL_PORT_NAME.to_string(), connection))
}

#[cfg(not(unix))]
pub fn create_virtual_midi<F>(_callback: F) -> Result<(String, MidiInputConnection<()>)>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    Err(anyhow!("Virtual MIDI ports are not supported on this platform"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_name() {
        assert_eq!(note_number_to_name(0), "C-1");
        assert_eq!(note_number_to_name(21), "A0");
        assert_eq!(note_number_to_name(60), "C4");
        assert_eq!(note_number_to_name(108), "C8");
    }

    #[test]
    fn test_status_bytes() {
        assert_eq!(to_cmd(CMD_NOTE_ON), 0x93);
        assert_eq!(to_cmd(CMD_NOTE_OFF), 0x83);
        assert_eq!(to_cmd(CMD_CONTROL_CHANGE), 0xB3);
        assert_eq!(from_cmd(0x90), CMD_NOTE_ON);
        assert_eq!(from_cmd(0x8F), CMD_NOTE_OFF);
        assert_eq!(from_cmd(0xB0), CMD_CONTROL_CHANGE);
        assert_eq!(to_val(0.5), 63);
    }

    #[test]
    fn test_normalize_forces_channel() {
        assert_eq!(normalize_midi_message(&[0x90, 60, 100]), vec![0x93, 60, 100]);
        assert_eq!(normalize_midi_message(&[0xB0, 64, 127]), vec![0xB3, 64, 127]);
        assert_eq!(normalize_midi_message(&[0x81, 60, 0]), vec![0x83, 60, 0]);
    }

    #[test]
    fn test_normalize_zero_velocity_note_on() {
        assert_eq!(normalize_midi_message(&[0x90, 60, 0]), vec![0x83, 60]);
        assert!(normalize_midi_message(&[]).is_empty());
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            parse_midi_message(&[0x93, 60, 100]),
            Some(MidiEvent::NoteOn { note: 60, velocity: 100 })
        );
        assert_eq!(parse_midi_message(&[0x83, 60]), Some(MidiEvent::NoteOff { note: 60 }));
        assert_eq!(parse_midi_message(&[0x93, 60, 0]), Some(MidiEvent::NoteOff { note: 60 }));
        assert_eq!(
            parse_midi_message(&[0xB3, CC_SUSTAIN, 127]),
            Some(MidiEvent::Sustain { value: 127 })
        );
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        // Bank select, program change, pitch bend, truncated frames
        assert_eq!(parse_midi_message(&[0xB3, 0, 1]), None);
        assert_eq!(parse_midi_message(&[0xC3, 5]), None);
        assert_eq!(parse_midi_message(&[0xE3, 0, 64]), None);
        assert_eq!(parse_midi_message(&[0x93, 60]), None);
        assert_eq!(parse_midi_message(&[0x93]), None);
    }
}
