//! Transceiver Interfaces Library
//!
//! This crate provides the wire formats and transports used to talk to a GSM
//! transceiver process, and the sample buffering used by the radio front end.

pub mod burst;
pub mod radio;
pub mod sample_buffer;
pub mod trx_link;
pub mod trx_message;

use thiserror::Error;

pub use sample_buffer::SampleBufferError;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Interface not initialized")]
    NotInitialized,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Sample buffer error: {0}")]
    SampleBuffer(#[from] SampleBufferError),
}

/// Malformed traffic from the transceiver. Never fatal: the offending
/// datagram is dropped and the session carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolViolation {
    #[error("Unrecognized clock message {0:?}")]
    MalformedClock(String),

    #[error("Wrong data length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Invalid TN = {0}")]
    InvalidTimeslot(u8),

    #[error("Unrecognized control response {0:?}")]
    MalformedResponse(String),
}
