//! Circular capture buffer shared by every capture device.
//!
//! Devices push samples in as they arrive; the detector only ever asks for the most recent
//! window, so reads copy out of the ring without consuming anything.

/// Fixed-capacity mono sample buffer with a wrapping write cursor.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<f32>,
    // Next slot to write.
    cursor: usize,
    // Total samples accepted since the last reset (saturates at capacity when not looping).
    written: usize,
    looping: bool,
}

impl RingBuffer {
    /// Create a zeroed buffer. A zero `capacity` is bumped to one sample.
    pub fn new(capacity: usize, looping: bool) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            cursor: 0,
            written: 0,
            looping,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current write offset within the buffer, in `1..=capacity` once any sample has arrived.
    ///
    /// `0` is reserved for "nothing written yet": a cursor that has just wrapped reports the
    /// end of the buffer instead.
    pub fn position(&self) -> usize {
        if self.written == 0 {
            return 0;
        }
        // A full non-looping buffer parks at its end.
        if !self.looping && self.written >= self.capacity() {
            return self.capacity();
        }
        if self.cursor == 0 {
            return self.capacity();
        }
        self.cursor
    }

    /// Whether any sample has been written since creation or the last reset.
    pub fn has_data(&self) -> bool {
        self.written > 0
    }

    /// Append samples. A non-looping buffer silently drops input once full.
    pub fn write(&mut self, samples: &[f32]) {
        let cap = self.capacity();

        for &s in samples {
            if !self.looping && self.written >= cap {
                return;
            }
            self.data[self.cursor] = s;
            self.cursor = (self.cursor + 1) % cap;
            self.written = self.written.saturating_add(1);
        }
    }

    /// Copy the most recent `out.len()` samples into `out`, oldest first.
    ///
    /// When fewer samples have been written than requested, the front of `out` is zero-filled.
    pub fn latest(&self, out: &mut [f32]) {
        let cap = self.capacity();
        let available = self.written.min(cap);
        let take = out.len().min(available);
        let pad = out.len() - take;

        out[..pad].fill(0.0);

        // Index just past the newest sample.
        let end = if !self.looping && self.written >= cap {
            cap
        } else {
            self.cursor
        };

        for (i, slot) in out[pad..].iter_mut().enumerate() {
            let idx = (end + cap - take + i) % cap;
            *slot = self.data[idx];
        }
    }

    /// Forget all samples and rewind the cursor.
    pub fn reset(&mut self) {
        self.data.fill(0.0);
        self.cursor = 0;
        self.written = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_reports_zero_position_and_zero_window() {
        let ring = RingBuffer::new(8, true);
        assert_eq!(ring.position(), 0);
        assert!(!ring.has_data());

        let mut out = [1.0; 4];
        ring.latest(&mut out);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn short_history_is_front_padded() {
        let mut ring = RingBuffer::new(8, true);
        ring.write(&[0.1, 0.2]);

        let mut out = [9.0; 4];
        ring.latest(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.1, 0.2]);
        assert_eq!(ring.position(), 2);
    }

    #[test]
    fn looping_buffer_wraps_and_returns_newest_in_order() {
        let mut ring = RingBuffer::new(4, true);
        ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let mut out = [0.0; 3];
        ring.latest(&mut out);
        assert_eq!(out, [4.0, 5.0, 6.0]);
        assert_eq!(ring.position(), 2);
    }

    #[test]
    fn exact_wrap_still_reports_data() {
        let mut ring = RingBuffer::new(4, true);
        ring.write(&[0.5; 4]);
        assert!(ring.has_data());
        assert_eq!(ring.position(), 4);

        ring.write(&[0.25; 4]);
        assert_eq!(ring.position(), 4);

        let mut out = [0.0; 2];
        ring.latest(&mut out);
        assert_eq!(out, [0.25, 0.25]);
    }

    #[test]
    fn window_larger_than_capacity_is_padded() {
        let mut ring = RingBuffer::new(3, true);
        ring.write(&[1.0, 2.0, 3.0, 4.0]);

        let mut out = [0.0; 5];
        ring.latest(&mut out);
        assert_eq!(out, [0.0, 0.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn non_looping_buffer_stops_when_full() {
        let mut ring = RingBuffer::new(3, false);
        ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        let mut out = [0.0; 3];
        ring.latest(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(ring.position(), 3);
    }

    #[test]
    fn reset_forgets_history() {
        let mut ring = RingBuffer::new(4, true);
        ring.write(&[0.5; 6]);
        ring.reset();

        assert_eq!(ring.position(), 0);
        let mut out = [1.0; 2];
        ring.latest(&mut out);
        assert_eq!(out, [0.0, 0.0]);
    }
}
