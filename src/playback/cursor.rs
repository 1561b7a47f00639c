/// Monotonic "next available start time" for scheduled playback, in seconds
/// on the output clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackCursor {
    next_start: f64,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest time the next chunk may begin
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Place a chunk of `duration` seconds and advance past it.
    ///
    /// The chunk starts at the cursor, or at `now + epsilon` if the cursor has
    /// fallen behind the clock. Returns the chosen start time.
    pub fn place(&mut self, now: f64, duration: f64, epsilon: f64) -> f64 {
        let start = self.next_start.max(now + epsilon);
        self.next_start = start + duration.max(0.0);
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_chunk_starts_after_epsilon() {
        let mut cursor = PlaybackCursor::new();
        let start = cursor.place(10.0, 0.5, 0.05);
        assert!((start - 10.05).abs() < 1e-9);
        assert!((cursor.next_start() - 10.55).abs() < 1e-9);
    }

    #[test]
    fn test_back_to_back_when_ahead_of_clock() {
        let mut cursor = PlaybackCursor::new();
        let a = cursor.place(0.0, 1.0, 0.05);
        let b = cursor.place(0.2, 1.0, 0.05);
        assert!((b - (a + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_idle_gap_resyncs_to_clock() {
        let mut cursor = PlaybackCursor::new();
        cursor.place(0.0, 1.0, 0.05);
        // Long silence: the clock has moved far past the cursor.
        let start = cursor.place(30.0, 1.0, 0.05);
        assert!((start - 30.05).abs() < 1e-9);
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let mut cursor = PlaybackCursor::new();
        let mut last = cursor.next_start();
        for (now, dur) in [(0.0, 0.3), (0.1, 0.0), (5.0, 0.2), (4.0, 0.1), (5.1, 0.4)] {
            cursor.place(now, dur, 0.05);
            assert!(cursor.next_start() >= last);
            last = cursor.next_start();
        }
    }
}
