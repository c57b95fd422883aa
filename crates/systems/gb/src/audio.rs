//! Audio seam. The machine hands each step's elapsed cycles to a sink; sound
//! synthesis and output live entirely behind it.

/// Consumer of elapsed machine cycles; over a frame it sees exactly the
/// cycles the CPU and interrupt dispatch consumed.
pub trait AudioSink: Send {
    fn advance(&mut self, cycles: u32);
}

/// Counts cycles and discards them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleCounter {
    pub total: u64,
}

impl AudioSink for CycleCounter {
    fn advance(&mut self, cycles: u32) {
        self.total += u64::from(cycles);
    }
}
