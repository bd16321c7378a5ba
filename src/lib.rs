//! TI graphing-calculator link protocol for microcontrollers.
//!
//! This crate lets a board with two open-collector GPIO lines impersonate
//! either side of a TI link cable: a calculator talking to a CBL2-class
//! data collector ([`Calc`]), or the CBL2-class device itself answering an
//! attached calculator ([`Device`]). Below the protocol roles sit a
//! self-clocked bit-level transport ([`Link`]) and a checksummed message
//! codec ([`MsgHeader`] and friends); alongside them, [`vars`] converts
//! between host values and the calculators' BCD-real and tokenized-string
//! variable records.
//!
//! Boards plug in by implementing [`hal::LinkPort`] for their two pins and
//! a monotonic clock. Nothing here allocates; all buffers belong to the
//! caller.
//!
//! # Example
//!
//! Emulating a device that hands out the number 42:
//!
//! ```no_run
//! use tilink_proto::hal::{Line, LinkPort};
//! use tilink_proto::{
//!     Device, DeviceHandler, Endpoint, Error, Link, PollMode, ReplyPayload, StagedReply,
//! };
//!
//! struct Port; // wraps the board's two GPIO pins
//!
//! impl LinkPort for Port {
//!     fn line_is_low(&mut self, _line: Line) -> bool { false }
//!     fn pull_low(&mut self, _line: Line) {}
//!     fn release_lines(&mut self) {}
//!     fn now_micros(&mut self) -> u64 { 0 }
//! }
//!
//! struct FortyTwo;
//!
//! impl DeviceHandler for FortyTwo {
//!     fn data_received(
//!         &mut self,
//!         vartype: u8,
//!         model: Endpoint,
//!         _header: &[u8],
//!         data: &[u8],
//!     ) -> Result<(), Error> {
//!         println!("got {} bytes of type {:#04x} from {:?}", data.len(), vartype, model);
//!         Ok(())
//!     }
//!
//!     fn data_requested(
//!         &mut self,
//!         _vartype: u8,
//!         model: Endpoint,
//!         _header: &mut [u8],
//!         header_len: usize,
//!         data: &mut [u8],
//!     ) -> Result<StagedReply, Error> {
//!         let data_len = tilink_proto::vars::i64_to_real(42, data, model)?;
//!         Ok(StagedReply { header_len, data_len, payload: ReplyPayload::Buffered })
//!     }
//! }
//!
//! fn main() -> Result<(), Error> {
//!     let mut header = [0u8; 16];
//!     let mut data = [0u8; 64];
//!     let mut device = Device::new(Link::new(Port), &mut header, &mut data);
//!     loop {
//!         device.tick(&mut FortyTwo, PollMode::Quick)?;
//!     }
//! }
//! ```

pub mod calc;
pub mod device;
pub mod hal;
pub mod link;
pub mod packet;
pub mod types;
pub mod vars;

pub use calc::{Calc, Received};
pub use device::{Activity, Device, DeviceHandler, PollMode, ReplyPayload, StagedReply};
pub use link::{Link, Timeouts};
pub use packet::MsgHeader;
pub use types::{CommandId, Endpoint, Error, Family, VarType};
