//! CBL2-class device emulation (responder role).
//!
//! The whole public surface is [`Device::tick`], meant to be called on
//! every pass of the host's run loop. Each tick receives at most one
//! message and answers it; the strict alternation of the protocol means
//! there is never more than one exchange in flight.

use log::{debug, warn};

use crate::hal::LinkPort;
use crate::link::Link;
use crate::packet::MsgHeader;
use crate::types::{put_size_word, CommandId, Endpoint, Error};
use crate::vars::normalize_var_header;

/// How long a [`Device::tick`] may wait for a message to start.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PollMode {
    /// Wait the full enter timeout for the calculator to speak.
    Wait,
    /// Give up after the bit budget, for hosts that poll tightly.
    Quick,
}

/// What a [`Device::tick`] call accomplished.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Activity {
    /// No message arrived, or none that needed an answer.
    Idle,
    /// An `RTS` announced an incoming variable; handshake sent.
    HeaderReceived,
    /// A variable payload was delivered to the handler.
    DataReceived,
    /// The calculator ended its transfer.
    EndOfTransmission,
    /// A `REQ` was answered with our variable header.
    RequestAnswered,
    /// The staged payload went out in a `DATA` message.
    DataSent,
}

/// Where the payload of the next outgoing `DATA` comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    /// The device's data buffer, as filled by the handler.
    Buffered,
    /// Per-byte generation via [`DeviceHandler::payload_byte`].
    Generated,
}

/// Reply staged by [`DeviceHandler::data_requested`], consumed when the
/// calculator follows up with `CTS`.
#[derive(Debug, Copy, Clone)]
pub struct StagedReply {
    /// Length of the outgoing variable header.
    pub header_len: usize,
    /// Length of the payload announced and later transmitted.
    pub data_len: usize,
    pub payload: ReplyPayload,
}

/// Host-side half of the responder: the engine drives the wire, the
/// handler supplies and consumes variables.
pub trait DeviceHandler {
    /// A variable's payload has arrived in `data`. `header` is the
    /// normalized variable header announced by the earlier `RTS`. The
    /// result is currently ignored by the engine (reserved).
    fn data_received(
        &mut self,
        vartype: u8,
        model: Endpoint,
        header: &[u8],
        data: &[u8],
    ) -> Result<(), Error>;

    /// The calculator asked for a variable. `header` holds the normalized
    /// request header, `header_len` bytes long; rewrite it to describe
    /// the outgoing variable and, for a [`ReplyPayload::Buffered`] reply,
    /// fill `data`. The engine itself rewrites the header's embedded size
    /// word from the staged data length.
    fn data_requested(
        &mut self,
        vartype: u8,
        model: Endpoint,
        header: &mut [u8],
        header_len: usize,
        data: &mut [u8],
    ) -> Result<StagedReply, Error>;

    /// Payload byte `index` for a [`ReplyPayload::Generated`] reply.
    fn payload_byte(&mut self, index: usize) -> u8 {
        let _ = index;
        0
    }
}

/// The local endpoint to answer under, per recognized sender.
fn companion(sender: Endpoint) -> Option<Endpoint> {
    use Endpoint::*;
    match sender {
        Calc82 | Calc83 | Calc83p => Some(Cbl82),
        Calc85a | Calc85b => Some(Cbl85),
        _ => None,
    }
}

/// A CBL2-class device emulator. The variable header and data buffers are
/// owned by the host and borrowed for the device's lifetime; the engine
/// only ever writes within their bounds.
pub struct Device<'b, P: LinkPort> {
    link: Link<P>,
    header: &'b mut [u8],
    data: &'b mut [u8],
    header_len: usize,
    reply: Option<StagedReply>,
}

impl<'b, P: LinkPort> Device<'b, P> {
    pub fn new(link: Link<P>, header: &'b mut [u8], data: &'b mut [u8]) -> Device<'b, P> {
        Device {
            link,
            header,
            data,
            header_len: 0,
            reply: None,
        }
    }

    /// Access the underlying link, e.g. to reset the lines.
    pub fn link_mut(&mut self) -> &mut Link<P> {
        &mut self.link
    }

    /// The variable header from the most recent exchange.
    pub fn var_header(&self) -> &[u8] {
        &self.header[..self.header_len]
    }

    /// Receive and answer at most one message.
    ///
    /// "Nothing arrived" is the normal outcome and reports
    /// `Ok(Activity::Idle)`; errors are only surfaced for failures after
    /// a message was successfully received.
    pub fn tick<H: DeviceHandler>(
        &mut self,
        handler: &mut H,
        poll: PollMode,
    ) -> Result<Activity, Error> {
        let enter_us = match poll {
            PollMode::Wait => self.link.timeouts().enter_us,
            PollMode::Quick => self.link.timeouts().bit_us,
        };

        let (msg, length) = match self.link.get_within(self.data, enter_us) {
            Ok(received) => received,
            Err(err) => {
                debug!("no incoming message: {}", err);
                return Ok(Activity::Idle);
            }
        };

        let (sender, device_ep) = match Endpoint::from_raw(msg.endpoint)
            .and_then(|sender| companion(sender).map(|device_ep| (sender, device_ep)))
        {
            Some(pair) => pair,
            None => {
                warn!("unrecognized sender endpoint {:#04x}", msg.endpoint);
                return Err(Error::Invalid);
            }
        };

        match msg.command() {
            // ACKs are dropped on the floor.
            Some(CommandId::Ack) => Ok(Activity::Idle),

            Some(CommandId::Rts) => {
                if length > self.header.len() {
                    return Err(Error::BufferOverflow);
                }
                self.header[..length].copy_from_slice(&self.data[..length]);
                self.header_len = length;

                self.reply_simple(device_ep, CommandId::Ack)?;
                self.reply_simple(device_ep, CommandId::Cts)?;
                Ok(Activity::HeaderReceived)
            }

            Some(CommandId::Data) => {
                self.reply_simple(device_ep, CommandId::Ack)?;

                normalize_var_header(&mut self.header[..self.header_len], sender);
                let _ = handler.data_received(
                    self.vartype(),
                    sender,
                    &self.header[..self.header_len],
                    &self.data[..length],
                );
                Ok(Activity::DataReceived)
            }

            Some(CommandId::Eot) => {
                self.reply_simple(device_ep, CommandId::Ack)?;
                Ok(Activity::EndOfTransmission)
            }

            Some(CommandId::Req) => {
                if length > self.header.len() {
                    return Err(Error::BufferOverflow);
                }
                self.header[..length].copy_from_slice(&self.data[..length]);
                self.header_len = length;

                self.reply_simple(device_ep, CommandId::Ack)?;

                normalize_var_header(&mut self.header[..self.header_len], sender);
                let vartype = self.vartype();
                let staged =
                    handler.data_requested(vartype, sender, self.header, self.header_len, self.data)?;

                if staged.header_len > self.header.len()
                    || staged.data_len > usize::from(u16::MAX)
                    || (staged.payload == ReplyPayload::Buffered && staged.data_len > self.data.len())
                {
                    warn!("staged reply does not fit the buffers");
                    return Err(Error::Invalid);
                }

                // The engine owns the header's framing bytes: whatever the
                // handler wrote there, the embedded size word reflects the
                // staged data length.
                if staged.header_len >= 2 {
                    put_size_word(self.header, staged.data_len as u16);
                }
                self.header_len = staged.header_len;

                let var = MsgHeader::new(device_ep, CommandId::Var, staged.header_len as u16);
                self.link.send(&var, &self.header[..staged.header_len])?;
                self.reply = Some(staged);
                Ok(Activity::RequestAnswered)
            }

            Some(CommandId::Cts) => {
                self.reply_simple(device_ep, CommandId::Ack)?;

                let staged = self.reply.ok_or(Error::NotConfigured)?;
                let msg = MsgHeader::new(device_ep, CommandId::Data, staged.data_len as u16);
                match staged.payload {
                    ReplyPayload::Buffered => {
                        self.link.send(&msg, &self.data[..staged.data_len])?;
                    }
                    ReplyPayload::Generated => {
                        self.link
                            .send_generated(&msg, staged.data_len, |idx| handler.payload_byte(idx))?;
                    }
                }
                Ok(Activity::DataSent)
            }

            _ => {
                debug!("ignoring cmd {:#04x} from {:#04x}", msg.command, msg.endpoint);
                Ok(Activity::Idle)
            }
        }
    }

    fn vartype(&self) -> u8 {
        if self.header_len > 2 {
            self.header[2]
        } else {
            0
        }
    }

    fn reply_simple(&mut self, endpoint: Endpoint, command: CommandId) -> Result<(), Error> {
        self.link.send(&MsgHeader::new(endpoint, command, 0), &[])
    }
}
