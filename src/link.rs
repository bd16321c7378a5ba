//! Bit-level transport over the two link lines.
//!
//! Bytes travel least-significant-bit first with a two-phase handshake per
//! bit: the sender pulls one line low to signal the bit value, the
//! receiver acknowledges on the complementary line, the sender releases,
//! the receiver releases. There is no clock line; the handshake itself
//! paces the transfer. Every wait is bounded by a deadline read from the
//! port's monotonic clock, and both lines are returned to idle on every
//! exit path, success or failure.

use log::trace;

use crate::hal::{Line, LinkPort};
use crate::types::Error;

/// Busy-wait budgets for the transport, in microseconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Budget for each intra-byte handshake step.
    pub bit_us: u64,
    /// Budget for the first bit of a message, where the peer may simply
    /// have nothing to say yet.
    pub enter_us: u64,
}

impl Default for Timeouts {
    fn default() -> Timeouts {
        Timeouts {
            bit_us: 1_000,
            enter_us: 1_000_000,
        }
    }
}

/// One end of a two-wire calculator link.
///
/// Wraps a [`LinkPort`] and moves single bytes across it. The packet layer
/// in [`crate::packet`] builds message transfer on top of these
/// primitives.
pub struct Link<P: LinkPort> {
    port: P,
    timeouts: Timeouts,
}

impl<P: LinkPort> Link<P> {
    /// Take ownership of a port and idle both lines.
    pub fn new(port: P) -> Link<P> {
        Link::with_timeouts(port, Timeouts::default())
    }

    /// Like [`Link::new`], with custom wait budgets.
    pub fn with_timeouts(port: P, timeouts: Timeouts) -> Link<P> {
        let mut link = Link { port, timeouts };
        link.reset_lines();
        link
    }

    /// The configured wait budgets.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Unconditionally return both lines to input/pulled-high. The link
    /// must never be left with a line driven low; every send/receive path
    /// ends here whether it succeeded or not.
    pub fn reset_lines(&mut self) {
        self.port.release_lines();
    }

    /// Release the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Send one byte, least-significant bit first.
    pub fn send_byte(&mut self, byte: u8) -> Result<(), Error> {
        let mut bits = byte;
        for _ in 0..8 {
            // A new bit may only go out once the peer has released both
            // lines from the previous handshake.
            self.wait_idle(Error::WriteTimeout)?;

            let line = if bits & 1 != 0 { Line::Ring } else { Line::Tip };
            self.port.pull_low(line);

            // Peer acknowledges on the complementary line, then we both
            // let go.
            self.wait_until_low(line.other(), Error::WriteTimeout)?;
            self.port.release_lines();
            self.wait_until_high(line.other(), Error::WriteTimeout)?;

            bits >>= 1;
        }
        trace!("sent byte {:#04x}", byte);
        Ok(())
    }

    /// Receive one byte, waiting at most `timeouts().bit_us` for it to
    /// start.
    pub fn get_byte(&mut self) -> Result<u8, Error> {
        let first = self.timeouts.bit_us;
        self.get_byte_within(first, Error::ReadTimeout)
    }

    /// Receive the first byte of a message. The wait for the very first
    /// bit is bounded by `enter_us` instead of the bit budget, since the
    /// peer may not have anything to send yet; exceeding it fails with
    /// [`Error::ReadEnterTimeout`].
    pub(crate) fn get_byte_enter(&mut self, enter_us: u64) -> Result<u8, Error> {
        self.get_byte_within(enter_us, Error::ReadEnterTimeout)
    }

    fn get_byte_within(&mut self, first_budget: u64, first_err: Error) -> Result<u8, Error> {
        let mut byte: u8 = 0;
        for bit in 0..8 {
            let (budget, err) = if bit == 0 {
                (first_budget, first_err)
            } else {
                (self.timeouts.bit_us, Error::ReadTimeout)
            };

            // Ring low signals a 1 bit, anything else non-idle a 0 bit.
            let sender = self.wait_for_bit(budget, err)?;
            byte >>= 1;
            if sender == Line::Ring {
                byte |= 0x80;
            }

            // Acknowledge on the complementary line and wait for the
            // sender to let go of theirs.
            self.port.pull_low(sender.other());
            self.wait_until_high(sender, Error::ReadTimeout)?;
            self.port.release_lines();
        }
        trace!("got byte {:#04x}", byte);
        Ok(byte)
    }

    /// Busy-wait until exactly one line reads low, i.e. the peer has
    /// started a bit. Returns the asserted line.
    fn wait_for_bit(&mut self, budget_us: u64, err: Error) -> Result<Line, Error> {
        let start = self.port.now_micros();
        loop {
            if self.port.line_is_low(Line::Tip) {
                return Ok(Line::Tip);
            }
            if self.port.line_is_low(Line::Ring) {
                return Ok(Line::Ring);
            }
            if self.port.now_micros().wrapping_sub(start) > budget_us {
                self.port.release_lines();
                return Err(err);
            }
        }
    }

    fn wait_idle(&mut self, err: Error) -> Result<(), Error> {
        self.wait(err, |port| {
            !port.line_is_low(Line::Tip) && !port.line_is_low(Line::Ring)
        })
    }

    fn wait_until_low(&mut self, line: Line, err: Error) -> Result<(), Error> {
        self.wait(err, |port| port.line_is_low(line))
    }

    fn wait_until_high(&mut self, line: Line, err: Error) -> Result<(), Error> {
        self.wait(err, |port| !port.line_is_low(line))
    }

    /// Spin until `done` holds, bounded by the bit budget. The lines are
    /// reset before reporting a timeout.
    fn wait(&mut self, err: Error, mut done: impl FnMut(&mut P) -> bool) -> Result<(), Error> {
        let budget = self.timeouts.bit_us;
        let start = self.port.now_micros();
        loop {
            if done(&mut self.port) {
                return Ok(());
            }
            if self.port.now_micros().wrapping_sub(start) > budget {
                self.port.release_lines();
                return Err(err);
            }
        }
    }
}
