//! Common Types for the GSM Transceiver Bridge
//!
//! Defines the GSM air-interface primitives shared by the codec, the
//! control session and the binary.

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use std::fmt;

/// Number of TDMA frames in a GSM hyperframe (26 * 51 * 2048)
pub const FRAME_MODULUS: u32 = 2_715_648;

/// Number of timeslots in one TDMA frame
pub const TIMESLOTS_PER_FRAME: u8 = 8;

/// Number of bits carried by one burst
pub const BURST_BITS: usize = 148;

/// GSM symbol rate in symbols per second (1625000 / 6)
pub const GSM_SYMBOL_RATE: f64 = 1_625_000.0 / 6.0;

/// TDMA timeslot number (0-7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timeslot(u8);

impl Timeslot {
    /// Highest valid timeslot number
    pub const MAX: u8 = TIMESLOTS_PER_FRAME - 1;

    /// Create a new timeslot with validation
    pub fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Get the timeslot number
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Iterate over all eight timeslots in order
    pub fn all() -> impl Iterator<Item = Timeslot> {
        (0..TIMESLOTS_PER_FRAME).map(Timeslot)
    }
}

impl fmt::Display for Timeslot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute Radio-Frequency Channel Number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arfcn(pub u16);

/// GSM frequency bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GsmBand {
    /// GSM 450
    Gsm450,
    /// GSM 480
    Gsm480,
    /// GSM 750
    Gsm750,
    /// GSM 850
    Gsm850,
    /// Primary GSM 900
    Gsm900,
    /// Extended GSM 900
    Egsm900,
    /// DCS 1800
    Dcs1800,
    /// PCS 1900
    Pcs1900,
}

impl GsmBand {
    /// Check whether the ARFCN belongs to this band
    pub fn contains(&self, arfcn: Arfcn) -> bool {
        let n = arfcn.0;
        match self {
            GsmBand::Gsm450 => (259..=293).contains(&n),
            GsmBand::Gsm480 => (306..=340).contains(&n),
            GsmBand::Gsm750 => (438..=511).contains(&n),
            GsmBand::Gsm850 => (128..=251).contains(&n),
            GsmBand::Gsm900 => (1..=124).contains(&n),
            GsmBand::Egsm900 => n <= 124 || (975..=1023).contains(&n),
            GsmBand::Dcs1800 => (512..=885).contains(&n),
            GsmBand::Pcs1900 => (512..=810).contains(&n),
        }
    }

    /// Duplex spacing between uplink and downlink in kHz
    pub fn duplex_spacing_khz(&self) -> u32 {
        match self {
            GsmBand::Gsm450 | GsmBand::Gsm480 => 10_000,
            GsmBand::Gsm750 => 30_000,
            GsmBand::Gsm850 | GsmBand::Gsm900 | GsmBand::Egsm900 => 45_000,
            GsmBand::Dcs1800 => 95_000,
            GsmBand::Pcs1900 => 80_000,
        }
    }

    /// Uplink (mobile transmit) carrier frequency in kHz (3GPP TS 45.005 2)
    pub fn uplink_khz(&self, arfcn: Arfcn) -> Option<u32> {
        if !self.contains(arfcn) {
            return None;
        }

        let n = arfcn.0 as i64;
        let khz = match self {
            GsmBand::Gsm450 => 450_600 + 200 * (n - 259),
            GsmBand::Gsm480 => 479_000 + 200 * (n - 306),
            GsmBand::Gsm750 => 747_200 + 200 * (n - 438),
            GsmBand::Gsm850 => 824_200 + 200 * (n - 128),
            GsmBand::Gsm900 => 890_000 + 200 * n,
            GsmBand::Egsm900 if n >= 975 => 890_000 + 200 * (n - 1024),
            GsmBand::Egsm900 => 890_000 + 200 * n,
            GsmBand::Dcs1800 => 1_710_200 + 200 * (n - 512),
            GsmBand::Pcs1900 => 1_850_200 + 200 * (n - 512),
        };

        Some(khz as u32)
    }

    /// Downlink (base station transmit) carrier frequency in kHz
    pub fn downlink_khz(&self, arfcn: Arfcn) -> Option<u32> {
        self.uplink_khz(arfcn).map(|ul| ul + self.duplex_spacing_khz())
    }
}

/// Logical channel combination of a timeslot (3GPP TS 45.002 6.4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum ChannelCombination {
    /// Timeslot not in use
    None = 0,
    /// I: TCH/F + FACCH/F + SACCH/TF
    TchFull = 1,
    /// II: TCH/H(0,1) + FACCH/H(0,1) + SACCH/TH(0,1)
    TchHalf = 2,
    /// III: TCH/H(0) + FACCH/H(0) + SACCH/TH(0) + TCH/H(1)
    TchHalfPlus = 3,
    /// IV: FCCH + SCH + BCCH + CCCH
    Bcch = 4,
    /// V: FCCH + SCH + BCCH + CCCH + SDCCH/4 + SACCH/C4
    BcchSdcch4 = 5,
    /// VI: BCCH + CCCH
    BcchOnly = 6,
    /// VII: SDCCH/8 + SACCH/8
    Sdcch8 = 7,
}

impl ChannelCombination {
    /// Decode a channel combination from its SETSLOT number
    pub fn from_code(code: u8) -> Option<Self> {
        Self::from_u8(code)
    }

    /// SETSLOT number of this combination
    pub fn code(&self) -> u8 {
        self.to_u8().unwrap_or(0)
    }
}

/// Direction of a radio channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Receive path
    Rx,
    /// Transmit path
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeslot_validation() {
        assert!(Timeslot::new(0).is_some());
        assert!(Timeslot::new(7).is_some());
        assert!(Timeslot::new(8).is_none());
        assert_eq!(Timeslot::all().count(), 8);
    }

    #[test]
    fn test_egsm_reference_channel() {
        // ARFCN 1001 is the reference channel of the mobile setup
        let band = GsmBand::Egsm900;
        assert_eq!(band.uplink_khz(Arfcn(1001)), Some(885_400));
        assert_eq!(band.downlink_khz(Arfcn(1001)), Some(930_400));
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(GsmBand::Gsm900.uplink_khz(Arfcn(1)), Some(890_200));
        assert_eq!(GsmBand::Gsm900.uplink_khz(Arfcn(0)), None);
        assert_eq!(GsmBand::Dcs1800.uplink_khz(Arfcn(512)), Some(1_710_200));
        assert_eq!(GsmBand::Dcs1800.downlink_khz(Arfcn(885)), Some(1_879_800));
        assert_eq!(GsmBand::Pcs1900.uplink_khz(Arfcn(811)), None);
        assert_eq!(GsmBand::Gsm850.downlink_khz(Arfcn(128)), Some(869_200));
    }

    #[test]
    fn test_channel_combination_codes() {
        assert_eq!(ChannelCombination::from_code(5), Some(ChannelCombination::BcchSdcch4));
        assert_eq!(ChannelCombination::Sdcch8.code(), 7);
        assert!(ChannelCombination::from_code(8).is_none());
    }
}
