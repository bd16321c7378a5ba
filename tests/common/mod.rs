#![allow(dead_code)]

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use std::time::Instant;

use tilink_proto::hal::{Line, LinkPort};
use tilink_proto::{Link, Timeouts};

/// A simulated two-wire open-collector link. Each end may drive each line
/// independently; a line reads low when anyone drives it.
#[derive(Default)]
pub struct Wire {
    // driven[line][end]
    driven: [[AtomicBool; 2]; 2],
}

impl Wire {
    pub fn new() -> Arc<Wire> {
        Default::default()
    }

    pub fn port(self: &Arc<Wire>, end: usize) -> SimPort {
        assert!(end < 2, "a link cable has exactly two ends");
        SimPort {
            wire: Arc::clone(self),
            end,
            t0: Instant::now(),
        }
    }

    /// True when nobody is driving either line.
    pub fn lines_idle(&self) -> bool {
        self.driven
            .iter()
            .all(|line| !line[0].load(SeqCst) && !line[1].load(SeqCst))
    }
}

pub struct SimPort {
    wire: Arc<Wire>,
    end: usize,
    t0: Instant,
}

fn index(line: Line) -> usize {
    match line {
        Line::Tip => 0,
        Line::Ring => 1,
    }
}

impl LinkPort for SimPort {
    fn line_is_low(&mut self, line: Line) -> bool {
        // Give the peer thread a chance to run between samples; the
        // protocol code itself never yields.
        std::thread::yield_now();
        let drivers = &self.wire.driven[index(line)];
        drivers[0].load(SeqCst) || drivers[1].load(SeqCst)
    }

    fn pull_low(&mut self, line: Line) {
        self.wire.driven[index(line)][self.end].store(true, SeqCst);
    }

    fn release_lines(&mut self) {
        self.wire.driven[0][self.end].store(false, SeqCst);
        self.wire.driven[1][self.end].store(false, SeqCst);
    }

    fn now_micros(&mut self) -> u64 {
        self.t0.elapsed().as_micros() as u64
    }
}

/// Wait budgets generous enough to ride out thread scheduling jitter.
pub fn test_timeouts() -> Timeouts {
    Timeouts {
        bit_us: 1_000_000,
        enter_us: 5_000_000,
    }
}

pub fn link(wire: &Arc<Wire>, end: usize) -> Link<SimPort> {
    Link::with_timeouts(wire.port(end), test_timeouts())
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
