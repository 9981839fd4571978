//! GSM Frame Clock
//!
//! Tracks the transceiver's frame number and the frame bursts are currently
//! scheduled for, which runs `clock_advance` frames ahead so a burst for
//! frame N leaves the radio before frame N arrives.

use common::types::FRAME_MODULUS;
use tracing::trace;

/// Default scheduling look-ahead in frames
pub const CLOCK_ADVANCE: u32 = 20;

/// Frame counter wrapping at the hyperframe
#[derive(Debug, Clone)]
pub struct FrameClock {
    clock_advance: u32,
    trx_frame: u32,
    current_frame: u32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(CLOCK_ADVANCE)
    }
}

impl FrameClock {
    /// Create a clock with the given look-ahead
    pub fn new(clock_advance: u32) -> Self {
        Self {
            clock_advance: clock_advance % FRAME_MODULUS,
            trx_frame: 0,
            current_frame: 0,
        }
    }

    /// Scheduling look-ahead in frames
    pub fn clock_advance(&self) -> u32 {
        self.clock_advance
    }

    /// Last frame number announced by the transceiver
    pub fn trx_frame(&self) -> u32 {
        self.trx_frame
    }

    /// Frame bursts are currently scheduled for
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// Step the scheduled frame by the look-ahead
    pub fn advance(&mut self) -> u32 {
        self.current_frame = (self.current_frame + self.clock_advance) % FRAME_MODULUS;
        self.current_frame
    }

    /// Step the scheduled frame by one
    pub fn next_frame(&mut self) -> u32 {
        self.current_frame = (self.current_frame + 1) % FRAME_MODULUS;
        self.current_frame
    }

    /// Re-anchor on a heartbeat and return the new scheduled frame
    pub fn on_heartbeat(&mut self, observed: u32) -> u32 {
        self.trx_frame = observed % FRAME_MODULUS;
        self.current_frame = (self.trx_frame + self.clock_advance) % FRAME_MODULUS;
        trace!("Clock {} -> scheduling frame {}", self.trx_frame, self.current_frame);
        self.current_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_schedules_ahead() {
        let mut clock = FrameClock::default();
        let scheduled: Vec<u32> = [100, 101, 102].iter().map(|&c| clock.on_heartbeat(c)).collect();
        assert_eq!(scheduled, vec![120, 121, 122]);
        assert_eq!(clock.trx_frame(), 102);
        assert_eq!(clock.current_frame(), 122);
    }

    #[test]
    fn test_heartbeat_wraps_at_hyperframe() {
        let mut clock = FrameClock::default();
        assert_eq!(clock.on_heartbeat(FRAME_MODULUS - 5), 15);
        assert_eq!(clock.on_heartbeat(FRAME_MODULUS + 3), 23);
        assert_eq!(clock.trx_frame(), 3);
    }

    #[test]
    fn test_advance_cycles_through_hyperframe() {
        let mut clock = FrameClock::default();
        clock.on_heartbeat(1_234_567);
        let start = clock.current_frame();

        for _ in 0..FRAME_MODULUS {
            let frame = clock.advance();
            assert!(frame < FRAME_MODULUS);
        }
        assert_eq!(clock.current_frame(), start);
    }

    #[test]
    fn test_next_frame_steps_by_one() {
        let mut clock = FrameClock::new(20);
        clock.on_heartbeat(FRAME_MODULUS - 22);
        assert_eq!(clock.current_frame(), FRAME_MODULUS - 2);
        assert_eq!(clock.next_frame(), FRAME_MODULUS - 1);
        assert_eq!(clock.next_frame(), 0);
        assert_eq!(clock.advance(), 20);
    }
}
