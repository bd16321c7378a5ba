//! Calculator-side (initiator) role: pull a variable from, or push one to,
//! an attached CBL2-class device.
//!
//! Both exchanges run to completion inside a single call; there is no
//! state carried between calls. On any failure the exchange is abandoned
//! and must be restarted from the top.

use log::warn;

use crate::hal::LinkPort;
use crate::link::Link;
use crate::packet::MsgHeader;
use crate::types::{CommandId, Endpoint, Error, VarType};

/// Length of the variable header named in a `REQ` message.
const REQ_HEADER_LEN: usize = 11;

/// Sizes reported by a completed GET exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Received {
    /// Bytes of variable header written by the `VAR` reply.
    pub header_len: usize,
    /// Bytes of variable data written by the `DATA` reply.
    pub data_len: usize,
}

/// List-typed variables are exchanged as a TI-82, everything else under
/// the 0x95 identifier, for the duration of the exchange.
fn endpoint_for(vartype: VarType) -> Endpoint {
    if vartype == VarType::RealList {
        Endpoint::Calc82
    } else {
        Endpoint::Calc85b
    }
}

/// A calculator talking to a CBL2-class device.
pub struct Calc<P: LinkPort> {
    link: Link<P>,
}

impl<P: LinkPort> Calc<P> {
    pub fn new(link: Link<P>) -> Calc<P> {
        Calc { link }
    }

    /// Access the underlying link, e.g. to reset the lines.
    pub fn link_mut(&mut self) -> &mut Link<P> {
        &mut self.link
    }

    pub fn into_link(self) -> Link<P> {
        self.link
    }

    /// Pull a variable from the device.
    ///
    /// The first [`REQ_HEADER_LEN`] bytes of `header` must describe the
    /// variable to fetch; on success the buffer holds the header the
    /// device announced and `data` holds the variable's payload.
    ///
    /// # Errors
    /// Transport failures propagate as-is; any unexpected reply fails the
    /// whole exchange with [`Error::Invalid`] (the log tells the steps
    /// apart, the return value does not).
    pub fn get_var(
        &mut self,
        vartype: VarType,
        header: &mut [u8],
        data: &mut [u8],
    ) -> Result<Received, Error> {
        let ep = endpoint_for(vartype);
        if header.len() < REQ_HEADER_LEN {
            return Err(Error::BufferOverflow);
        }

        let req = MsgHeader::new(ep, CommandId::Req, REQ_HEADER_LEN as u16);
        self.link.send(&req, &header[..REQ_HEADER_LEN])?;
        self.expect(CommandId::Ack)?;
        let header_len = self.expect_into(CommandId::Var, header)?;

        self.link.send(&MsgHeader::new(ep, CommandId::Ack, 0), &[])?;
        self.link.send(&MsgHeader::new(ep, CommandId::Cts, 0), &[])?;
        self.expect(CommandId::Ack)?;
        let data_len = self.expect_into(CommandId::Data, data)?;

        // The final ACK ends our part; EOT after a GET is the peer's job.
        self.link.send(&MsgHeader::new(ep, CommandId::Ack, 0), &[])?;

        Ok(Received {
            header_len,
            data_len,
        })
    }

    /// Push a variable to the device.
    ///
    /// # Errors
    /// Same all-or-nothing contract as [`Calc::get_var`].
    pub fn send_var(&mut self, vartype: VarType, header: &[u8], data: &[u8]) -> Result<(), Error> {
        let ep = endpoint_for(vartype);

        let rts = MsgHeader::new(ep, CommandId::Rts, header.len() as u16);
        self.link.send(&rts, header)?;
        self.expect(CommandId::Ack)?;
        self.expect(CommandId::Cts)?;

        self.link.send(&MsgHeader::new(ep, CommandId::Ack, 0), &[])?;
        let msg = MsgHeader::new(ep, CommandId::Data, data.len() as u16);
        self.link.send(&msg, data)?;
        self.expect(CommandId::Ack)?;

        self.link.send(&MsgHeader::new(ep, CommandId::Eot, 0), &[])?;
        self.expect(CommandId::Ack)
    }

    fn expect(&mut self, want: CommandId) -> Result<(), Error> {
        self.expect_into(want, &mut []).map(drop)
    }

    fn expect_into(&mut self, want: CommandId, payload: &mut [u8]) -> Result<usize, Error> {
        let (header, length) = self.link.get(payload)?;
        if header.command() == Some(want) {
            Ok(length)
        } else {
            warn!("expected {:?}, got cmd {:#04x}", want, header.command);
            Err(Error::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_go_out_as_ti82() {
        assert_eq!(endpoint_for(VarType::RealList), Endpoint::Calc82);
        assert_eq!(endpoint_for(VarType::Real), Endpoint::Calc85b);
        assert_eq!(endpoint_for(VarType::String), Endpoint::Calc85b);
    }
}
