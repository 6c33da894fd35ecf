// Realtime Module - DRGB frames over UDP to the WLED realtime port
use std::io;
use std::net::UdpSocket;

use thiserror::Error;
use tracing::{debug, warn};

/// WLED realtime protocol ids (1 WARLS, 2 DRGB, 3 DRGBW, 4 DNRGB), only DRGB is sent
pub const PROTOCOL_DRGB: u8 = 2;

/// Seconds the receiver stays in realtime mode after the last packet
pub const HOLD_DEFAULT: u8 = 15;
pub const LEAVE_NOW: u8 = 0;
pub const LEAVE_SOON: u8 = 1;
pub const LEAVE_EARLY: u8 = 2;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] io::Error),
    #[error("failed to connect UDP socket to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("UDP send failed: {0}")]
    Send(#[source] io::Error),
}

/// A datagram sink that can be re-dialled after a failed send
pub trait Link: Send {
    fn send(&mut self, datagram: &[u8]) -> Result<usize, RealtimeError>;
    fn reconnect(&mut self) -> Result<(), RealtimeError>;
}

/// Connected UDP socket towards one WLED device
pub struct UdpLink {
    addr: String,
    socket: UdpSocket,
}

impl UdpLink {
    pub fn dial(addr: &str) -> Result<Self, RealtimeError> {
        let socket = Self::open(addr)?;
        Ok(UdpLink {
            addr: addr.to_string(),
            socket,
        })
    }

    fn open(addr: &str) -> Result<UdpSocket, RealtimeError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(RealtimeError::Bind)?;
        socket.connect(addr).map_err(|source| RealtimeError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        Ok(socket)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Link for UdpLink {
    fn send(&mut self, datagram: &[u8]) -> Result<usize, RealtimeError> {
        self.socket.send(datagram).map_err(RealtimeError::Send)
    }

    fn reconnect(&mut self) -> Result<(), RealtimeError> {
        self.socket = Self::open(&self.addr)?;
        Ok(())
    }
}

/// `[DRGB, hold] ++ rgb bytes`
pub fn encode_drgb(hold: u8, pixels: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(pixels.len() + 2);
    datagram.push(PROTOCOL_DRGB);
    datagram.push(hold);
    datagram.extend_from_slice(pixels);
    datagram
}

/// Owns the link and the send/retry policy
///
/// A failed send is retried exactly once after re-dialling. If that fails
/// too the frame is dropped; stale frames are never queued.
pub struct Transmitter<L: Link> {
    link: L,
    sent: u64,
    dropped: u64,
}

impl<L: Link> Transmitter<L> {
    pub fn new(link: L) -> Self {
        Transmitter {
            link,
            sent: 0,
            dropped: 0,
        }
    }

    /// Send one frame, returns false if it was dropped
    pub fn transmit(&mut self, hold: u8, pixels: &[u8]) -> bool {
        let datagram = encode_drgb(hold, pixels);

        let first_error = match self.link.send(&datagram) {
            Ok(_) => {
                self.sent += 1;
                return true;
            }
            Err(e) => e,
        };
        debug!("{}, redialling", first_error);

        if let Err(e) = self.link.reconnect() {
            warn!("no UDP connection, frame dropped: {}", e);
            self.dropped += 1;
            return false;
        }

        match self.link.send(&datagram) {
            Ok(_) => {
                self.sent += 1;
                true
            }
            Err(e) => {
                warn!("second send attempt failed, frame dropped: {}", e);
                self.dropped += 1;
                false
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
