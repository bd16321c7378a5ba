//! Board abstraction for the two link lines.
//!
//! The link cable's tip and ring conductors are open-collector: a line is
//! either actively driven low or left to the pull-ups. Implement
//! [`LinkPort`] once per board; the same protocol logic then runs on any
//! target.

/// One of the two conductors of the 2.5 mm link cable.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Line {
    /// Tip, conventionally the red wire.
    Tip,
    /// Ring, conventionally the white wire.
    Ring,
}

impl Line {
    /// The complementary conductor, used for per-bit acknowledgement.
    pub(crate) fn other(self) -> Line {
        match self {
            Line::Tip => Line::Ring,
            Line::Ring => Line::Tip,
        }
    }
}

/// GPIO and clock access required by the link transport.
pub trait LinkPort {
    /// Sample a line. `true` means the line currently reads low.
    fn line_is_low(&mut self, line: Line) -> bool;

    /// Actively drive a line low.
    fn pull_low(&mut self, line: Line);

    /// Return both lines to input with pull-ups (idle high).
    fn release_lines(&mut self);

    /// Current monotonic timestamp in microseconds. Only differences are
    /// ever taken, so the epoch is irrelevant; wrap-around is tolerated.
    fn now_micros(&mut self) -> u64;
}
