//! Cooperative cancellation and frame pacing
//!
//! Scripts never sleep. A `delay` turns into a number of frames, and the
//! host advances the countdown with one tick per rendered frame. A
//! [`HaltToken`] is polled at every statement boundary and every tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag asking a running script to stop
#[derive(Debug, Clone, Default)]
pub struct HaltToken(Arc<AtomicBool>);

impl HaltToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn halt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Countdown of frames a suspended script still waits for
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    remaining: u32,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames spanned by `seconds` at `frame_rate`; never negative
    pub fn frames_for(seconds: f32, frame_rate: u32) -> u32 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * frame_rate as f32).round() as u32
    }

    pub fn suspend(&mut self, frames: u32) {
        self.remaining = frames;
    }

    /// Count one frame; `true` once the wait is over
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_waiting(&self) -> bool {
        self.remaining > 0
    }

    pub fn cancel(&mut self) {
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_token_is_shared() {
        let token = HaltToken::new();
        let other = token.clone();
        assert!(!token.is_halted());
        other.halt();
        assert!(token.is_halted());
        token.reset();
        assert!(!other.is_halted());
    }

    #[test]
    fn test_frames_for() {
        assert_eq!(FrameScheduler::frames_for(1.0, 30), 30);
        assert_eq!(FrameScheduler::frames_for(0.5, 15), 8);
        assert_eq!(FrameScheduler::frames_for(-1.0, 30), 0);
        assert_eq!(FrameScheduler::frames_for(f32::NAN, 30), 0);
    }

    #[test]
    fn test_countdown() {
        let mut scheduler = FrameScheduler::new();
        scheduler.suspend(3);
        assert!(!scheduler.tick());
        assert!(!scheduler.tick());
        assert!(scheduler.tick());
        assert!(!scheduler.is_waiting());
    }
}
