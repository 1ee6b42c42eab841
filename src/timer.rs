/// Tick-counted one-shot timer.
///
/// Arming replaces any pending deadline, so a detector never holds more than one. Time only
/// moves when the owner calls [`DebounceTimer::advance`], which keeps the detector's tick
/// non-blocking and fully deterministic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceTimer {
    remaining: Option<u32>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule expiry `ticks` advances from now. `0` is treated as `1`.
    pub fn arm(&mut self, ticks: u32) {
        self.remaining = Some(ticks.max(1));
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Ticks left before expiry, if armed.
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// Count down one tick. Returns `true` exactly once, on the tick the timer expires; the
    /// timer is disarmed afterwards.
    pub fn advance(&mut self) -> bool {
        match self.remaining {
            Some(1) => {
                self.remaining = None;
                true
            }
            Some(n) => {
                self.remaining = Some(n - 1);
                false
            }
            None => false,
        }
    }
}
