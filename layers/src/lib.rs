//! Transceiver Control Layers Library
//!
//! This crate implements the timing and control substrate between a GSM PHY
//! and a transceiver process: the frame clock, the control session state
//! machine and the event loop driving it.

pub mod event_loop;
pub mod frame_clock;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use interfaces::InterfaceError;
use thiserror::Error;

pub use event_loop::{PhyHandle, TrxEventLoop};
pub use frame_clock::{FrameClock, CLOCK_ADVANCE};
pub use session::{SessionConfig, SessionState, SessionStats, TrxControlSession};

/// Common errors for the control layers
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Transceiver not available")]
    TransceiverUnavailable,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Interface error: {0}")]
    Interface(#[from] InterfaceError),
}
