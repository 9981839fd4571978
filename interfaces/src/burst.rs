//! Burst Datagram Codec
//!
//! Binary layouts of the data channel (all multi-byte fields big-endian):
//!
//! Downlink (to the transceiver), `DATA_SEND_SIZE` bytes:
//! ```text
//! | TN (1) | FN (4) | gain (1) | 148 hard bits, zero padded |
//! ```
//!
//! Uplink (from the transceiver), exactly `DATA_RECV_SIZE` bytes:
//! ```text
//! | TN (1) | FN (4) | -RSSI (1) | TOA * 256 (2, signed) | 148 soft bits | pad (2) |
//! ```
//! Soft bits are sent as `127 - value`; the two trailing bytes are padding.

use crate::{InterfaceError, ProtocolViolation};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use common::types::{Timeslot, BURST_BITS, FRAME_MODULUS};

/// Size of a downlink burst datagram
pub const DATA_SEND_SIZE: usize = DOWNLINK_HEADER_SIZE + BURST_BITS;

/// Size of an uplink burst datagram
pub const DATA_RECV_SIZE: usize = UPLINK_HEADER_SIZE + BURST_BITS + UPLINK_PADDING;

const DOWNLINK_HEADER_SIZE: usize = 6;
const UPLINK_HEADER_SIZE: usize = 8;
const UPLINK_PADDING: usize = 2;

/// GSM dummy burst (3GPP TS 45.002 5.2.6) including tail bits
pub const DUMMY_BURST: [u8; BURST_BITS] = [
    0, 0, 0,
    1, 1, 1, 1, 1, 0, 1, 1, 0, 1, 1, 1, 0, 1, 1, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 1, 1, 1, 0,
    0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 0, 0,
    0, 1, 0, 1, 1, 1, 0, 0, 0, 1, 0, 1, 1, 1, 0, 0, 0, 1, 0, 1, 0, 1, 1, 1, 0, 1, 0, 0, 1, 0, 1, 0,
    0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1, 1, 1, 0, 0, 1, 1, 1, 1, 0, 1, 0, 0, 1, 1, 1, 1, 1, 0, 0, 0, 1,
    0, 0, 1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 0,
    0, 0, 0,
];

/// Burst to be transmitted by the transceiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkBurst {
    /// Timeslot number (0-7)
    pub timeslot: u8,
    /// TDMA frame number
    pub frame_number: u32,
    /// Transmit gain / attenuation
    pub gain: i8,
    /// Hard bits, one per byte, at most 148
    pub bits: Bytes,
}

impl DownlinkBurst {
    /// Dummy burst for the given slot and frame
    pub fn dummy(timeslot: Timeslot, frame_number: u32) -> Self {
        Self {
            timeslot: timeslot.value(),
            frame_number,
            gain: 0,
            bits: Bytes::from_static(&DUMMY_BURST),
        }
    }
}

/// Burst received by the transceiver
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkBurst {
    /// Timeslot the burst was received in
    pub timeslot: Timeslot,
    /// TDMA frame number
    pub frame_number: u32,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Time of arrival in symbol periods
    pub toa: f32,
    /// Soft bits, positive values mean "0", negative "1"
    pub soft_bits: [i8; BURST_BITS],
}

/// Serialize a downlink burst into a `DATA_SEND_SIZE` datagram
pub fn encode_downlink(burst: &DownlinkBurst) -> Result<Bytes, InterfaceError> {
    if Timeslot::new(burst.timeslot).is_none() {
        return Err(InterfaceError::InvalidArgument(format!("TN={}", burst.timeslot)));
    }
    if burst.frame_number >= FRAME_MODULUS {
        return Err(InterfaceError::InvalidArgument(format!("FN={}", burst.frame_number)));
    }
    if burst.bits.len() > BURST_BITS {
        return Err(InterfaceError::InvalidArgument(format!(
            "burst has {} bits, at most {} allowed",
            burst.bits.len(),
            BURST_BITS
        )));
    }

    let mut buf = BytesMut::with_capacity(DATA_SEND_SIZE);
    buf.put_u8(burst.timeslot);
    buf.put_u32(burst.frame_number);
    buf.put_i8(burst.gain);
    buf.put_slice(&burst.bits);
    buf.put_bytes(0, DATA_SEND_SIZE - buf.len());

    Ok(buf.freeze())
}

/// Parse an uplink burst datagram
pub fn decode_uplink(datagram: &[u8]) -> Result<UplinkBurst, ProtocolViolation> {
    if datagram.len() != DATA_RECV_SIZE {
        return Err(ProtocolViolation::WrongLength {
            expected: DATA_RECV_SIZE,
            actual: datagram.len(),
        });
    }

    let mut buf = datagram;
    let tn = buf.get_u8();
    let frame_number = buf.get_u32();
    let rssi = -(buf.get_u8() as i16);
    let toa = buf.get_i16() as f32 / 256.0;
    let timeslot = Timeslot::new(tn).ok_or(ProtocolViolation::InvalidTimeslot(tn))?;

    let mut soft_bits = [0i8; BURST_BITS];
    for (bit, raw) in soft_bits.iter_mut().zip(&buf[..BURST_BITS]) {
        *bit = (127 - *raw as i16) as i8;
    }

    Ok(UplinkBurst {
        timeslot,
        frame_number,
        rssi,
        toa,
        soft_bits,
    })
}
