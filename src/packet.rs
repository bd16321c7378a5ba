//! Message framing on top of the byte primitives in [`crate::link`].
//!
//! A message is a 4-byte header (sender endpoint, command id, little-endian
//! size word), optionally followed by `size` payload bytes and a 16-bit
//! additive checksum, low byte first. A fixed set of command ids never
//! carries payload regardless of the size word.

use log::{debug, warn};

use crate::hal::LinkPort;
use crate::link::Link;
use crate::types::{CommandId, Endpoint, Error};

/// The 4-byte message header.
///
/// The endpoint and command are kept as raw bytes since received values may
/// fall outside the known enumerations; [`MsgHeader::command`] gives the
/// typed view.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MsgHeader {
    pub endpoint: u8,
    pub command: u8,
    pub size: u16,
}

impl MsgHeader {
    /// Header for a message from `endpoint` with `size` payload bytes.
    pub fn new(endpoint: Endpoint, command: CommandId, size: u16) -> MsgHeader {
        MsgHeader {
            endpoint: endpoint as u8,
            command: command as u8,
            size,
        }
    }

    /// The command id, if the raw byte is a known one.
    pub fn command(&self) -> Option<CommandId> {
        CommandId::from_raw(self.command)
    }

    fn to_bytes(self) -> [u8; 4] {
        [
            self.endpoint,
            self.command,
            self.size as u8,
            (self.size >> 8) as u8,
        ]
    }

    fn from_bytes(raw: [u8; 4]) -> MsgHeader {
        MsgHeader {
            endpoint: raw[0],
            command: raw[1],
            size: u16::from(raw[2]) | u16::from(raw[3]) << 8,
        }
    }
}

/// Unknown command bytes are assumed to carry payload; only the fixed
/// no-payload set suppresses the payload phase.
fn payload_follows(raw_command: u8) -> bool {
    CommandId::from_raw(raw_command).map_or(true, CommandId::carries_payload)
}

impl<P: LinkPort> Link<P> {
    /// Transmit one message with its payload taken from a flat buffer.
    ///
    /// The first transport failure is propagated as-is; nothing is
    /// retried.
    pub fn send(&mut self, header: &MsgHeader, payload: &[u8]) -> Result<(), Error> {
        self.send_generated(header, payload.len(), |idx| payload[idx])
    }

    /// Transmit one message whose payload bytes come from a per-index
    /// source, for payloads that are generated rather than materialized.
    pub fn send_generated(
        &mut self,
        header: &MsgHeader,
        length: usize,
        mut source: impl FnMut(usize) -> u8,
    ) -> Result<(), Error> {
        debug!(
            "snd cmd {:#04x} as ep {:#04x} len {}",
            header.command, header.endpoint, length
        );

        for &byte in header.to_bytes().iter() {
            self.send_byte(byte)?;
        }

        if length == 0 || !payload_follows(header.command) {
            return Ok(());
        }

        let mut sum: u16 = 0;
        for idx in 0..length {
            let byte = source(idx);
            self.send_byte(byte)?;
            sum = sum.wrapping_add(u16::from(byte));
        }
        self.send_byte(sum as u8)?;
        self.send_byte((sum >> 8) as u8)
    }

    /// Receive one message, waiting up to the configured enter timeout for
    /// it to start. Returns the header and the payload length written into
    /// `payload`.
    pub fn get(&mut self, payload: &mut [u8]) -> Result<(MsgHeader, usize), Error> {
        let enter_us = self.timeouts().enter_us;
        self.get_within(payload, enter_us)
    }

    /// Like [`Link::get`] with a caller-chosen budget for the message to
    /// start, so pollers can fail fast instead of blocking for the full
    /// enter timeout.
    pub fn get_within(
        &mut self,
        payload: &mut [u8],
        enter_us: u64,
    ) -> Result<(MsgHeader, usize), Error> {
        let mut raw = [0u8; 4];
        raw[0] = self.get_byte_enter(enter_us)?;
        for slot in raw[1..].iter_mut() {
            *slot = self.get_byte()?;
        }
        let header = MsgHeader::from_bytes(raw);
        let length = usize::from(header.size);

        debug!(
            "rcv cmd {:#04x} from ep {:#04x} len {}",
            header.command, header.endpoint, length
        );

        if length == 0 || !payload_follows(header.command) {
            return Ok((header, 0));
        }

        // Reject before reading any payload byte; the caller must treat
        // the link as desynchronized afterwards.
        if length > payload.len() {
            warn!("message overflow: {} > {}", length, payload.len());
            return Err(Error::BufferOverflow);
        }

        let mut sum: u16 = 0;
        for slot in payload[..length].iter_mut() {
            let byte = self.get_byte()?;
            *slot = byte;
            sum = sum.wrapping_add(u16::from(byte));
        }

        let lo = self.get_byte()?;
        let hi = self.get_byte()?;
        if sum != u16::from(lo) | u16::from(hi) << 8 {
            return Err(Error::BadChecksum);
        }

        Ok((header, length))
    }
}
