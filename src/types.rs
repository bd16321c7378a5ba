//! This module defines the wire-level identifiers shared by every protocol
//! layer: link endpoints, command ids, variable types and the per-model
//! format family, plus the crate-wide error type.

use snafu::Snafu;

/// Error type for every fallible operation in this crate.
///
/// All errors are terminal for the current operation; nothing is retried
/// by the protocol layers themselves.
#[derive(Debug, Snafu, PartialEq, Eq, Copy, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Timed out waiting for the peer while receiving a bit.
    #[snafu(display("Read timeout"))]
    ReadTimeout,
    /// Timed out waiting for the peer while sending a bit.
    #[snafu(display("Write timeout"))]
    WriteTimeout,
    /// No message started within the enter timeout.
    #[snafu(display("Timed out waiting for a message to start"))]
    ReadEnterTimeout,
    /// The received checksum disagrees with the payload.
    #[snafu(display("Bad message checksum"))]
    BadChecksum,
    /// The declared payload size exceeds the receive buffer.
    #[snafu(display("Incoming payload larger than the receive buffer"))]
    BufferOverflow,
    /// Unexpected message, or a format this crate does not support.
    #[snafu(display("Invalid message or unsupported format"))]
    Invalid,
    /// The responder has no reply staged for this request.
    #[snafu(display("No reply staged"))]
    NotConfigured,
}

/// An address identifying a logical participant on the link: a calculator
/// model or an accessory role. Transmitted as the first header byte of
/// every message.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum Endpoint {
    /// Computer link software addressing a TI-82.
    Comp82 = 0x02,
    /// Computer link software addressing a TI-83.
    Comp83 = 0x03,
    Comp85 = 0x05,
    Comp86 = 0x06,
    /// Computer link software addressing a TI-89/TI-92.
    Comp89 = 0x09,
    /// CBL/CBL2 answering an 82/83-family calculator.
    Cbl82 = 0x12,
    /// CBL/CBL2 answering an 85/86-family calculator.
    Cbl85 = 0x15,
    Cbl89 = 0x19,
    Comp83p = 0x23,
    /// TI-83+/84+ talking to an attached device.
    Calc83p = 0x73,
    Calc82 = 0x82,
    Calc83 = 0x83,
    Calc85a = 0x85,
    Calc89 = 0x89,
    /// Alternate identifier used by TI-85/86 units.
    Calc85b = 0x95,
}

impl Endpoint {
    /// Look up a received endpoint byte. Returns `None` for identifiers
    /// not in the fixed enumeration.
    pub fn from_raw(raw: u8) -> Option<Endpoint> {
        use Endpoint::*;
        Some(match raw {
            0x02 => Comp82,
            0x03 => Comp83,
            0x05 => Comp85,
            0x06 => Comp86,
            0x09 => Comp89,
            0x12 => Cbl82,
            0x15 => Cbl85,
            0x19 => Cbl89,
            0x23 => Comp83p,
            0x73 => Calc83p,
            0x82 => Calc82,
            0x83 => Calc83,
            0x85 => Calc85a,
            0x89 => Calc89,
            0x95 => Calc85b,
            _ => return None,
        })
    }

    /// The variable format family this endpoint speaks.
    pub fn family(self) -> Family {
        use Endpoint::*;
        match self {
            Comp82 | Comp83 | Cbl82 | Comp83p | Calc83p | Calc82 | Calc83 => Family::Ti82,
            Comp85 | Comp86 | Cbl85 | Calc85a | Calc85b => Family::Ti85,
            Comp89 | Cbl89 | Calc89 => Family::Ti89,
        }
    }
}

/// Coarse format family resolved once per [`Endpoint`]. All family-specific
/// offsets and widths in the variable codec are looked up from this tag.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Family {
    /// TI-82/83/83+ and friends: 9-byte reals, one-byte exponent.
    Ti82,
    /// TI-85/86: 10-byte reals, two-byte exponent.
    Ti85,
    /// TI-89/92. Not implemented; every codec operation fails distinctly.
    Ti89,
}

/// Protocol message type, transmitted as the second header byte.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum CommandId {
    /// Variable header announcement.
    Var = 0x06,
    /// Clear to send.
    Cts = 0x09,
    /// Variable payload.
    Data = 0x15,
    /// Version request.
    Ver = 0x2D,
    Skip = 0x36,
    /// Acknowledge.
    Ack = 0x56,
    Err = 0x5A,
    /// Ready check.
    Rdy = 0x68,
    /// Screenshot request.
    Scr = 0x6D,
    /// Remote keypress.
    Key = 0x87,
    Del = 0x88,
    /// End of transmission.
    Eot = 0x92,
    /// Request a variable.
    Req = 0xA2,
    /// Request to send a variable.
    Rts = 0xC9,
}

impl CommandId {
    /// Look up a received command byte. Returns `None` for identifiers
    /// not in the fixed enumeration.
    pub fn from_raw(raw: u8) -> Option<CommandId> {
        use CommandId::*;
        Some(match raw {
            0x06 => Var,
            0x09 => Cts,
            0x15 => Data,
            0x2D => Ver,
            0x36 => Skip,
            0x56 => Ack,
            0x5A => Err,
            0x68 => Rdy,
            0x6D => Scr,
            0x87 => Key,
            0x88 => Del,
            0x92 => Eot,
            0xA2 => Req,
            0xC9 => Rts,
            _ => return None,
        })
    }

    /// Commands in this fixed set never carry payload or checksum bytes,
    /// whatever the header's size word says.
    pub fn carries_payload(self) -> bool {
        use CommandId::*;
        !matches!(self, Cts | Ver | Ack | Err | Rdy | Scr | Key | Eot)
    }
}

/// Canonical variable type numbering (the TI-82 numbering). Headers from
/// other families are rewritten to this numbering before they reach host
/// callbacks.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum VarType {
    Real = 0x00,
    RealList = 0x01,
    Matrix = 0x02,
    YVar = 0x03,
    String = 0x04,
    Program = 0x05,
    ProtProgram = 0x06,
    Picture = 0x07,
    Gdb = 0x08,
    Window = 0x0B,
    Complex = 0x0C,
}

impl VarType {
    /// Look up a (normalized) type tag byte.
    pub fn from_raw(raw: u8) -> Option<VarType> {
        use VarType::*;
        Some(match raw {
            0x00 => Real,
            0x01 => RealList,
            0x02 => Matrix,
            0x03 => YVar,
            0x04 => String,
            0x05 => Program,
            0x06 => ProtProgram,
            0x07 => Picture,
            0x08 => Gdb,
            0x0B => Window,
            0x0C => Complex,
            _ => return None,
        })
    }
}

/// Read a little-endian 16-bit size word from the first two bytes of `buf`.
pub fn size_word(buf: &[u8]) -> u16 {
    u16::from(buf[0]) | u16::from(buf[1]) << 8
}

/// Pack a little-endian 16-bit size word into the first two bytes of `buf`.
pub fn put_size_word(buf: &mut [u8], value: u16) {
    buf[0] = value as u8;
    buf[1] = (value >> 8) as u8;
}
