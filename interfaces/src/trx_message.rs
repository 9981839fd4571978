//! TRX Text Messages
//!
//! ASCII messages of the clock and control channels. Every message is a
//! space separated token stream terminated by a NUL byte:
//!
//! - clock:   `IND CLOCK <fn>`
//! - control: `CMD <NAME> [args]` towards the transceiver,
//!   `RSP <NAME> <status> [args]` back from it

use crate::ProtocolViolation;
use bytes::{BufMut, Bytes, BytesMut};
use common::types::{ChannelCombination, Timeslot};
use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map_res, opt, recognize, rest},
    sequence::{pair, preceded, terminated},
    IResult,
};
use std::fmt;

/// Transceiver control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PowerOff,
    RxTune { freq_khz: u32 },
    TxTune { freq_khz: u32 },
    SetTsc(u8),
    SetBsic(u8),
    PowerOn,
    SetRxGain(i32),
    SetPower(i32),
    SetSlot { timeslot: Timeslot, config: ChannelCombination },
}

impl Command {
    /// Command keyword
    pub fn name(&self) -> &'static str {
        match self {
            Command::PowerOff => "POWEROFF",
            Command::RxTune { .. } => "RXTUNE",
            Command::TxTune { .. } => "TXTUNE",
            Command::SetTsc(_) => "SETTSC",
            Command::SetBsic(_) => "SETBSIC",
            Command::PowerOn => "POWERON",
            Command::SetRxGain(_) => "SETRXGAIN",
            Command::SetPower(_) => "SETPOWER",
            Command::SetSlot { .. } => "SETSLOT",
        }
    }

    /// NUL-terminated control datagram
    pub fn encode(&self) -> Bytes {
        let text = self.to_string();
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        buf.put_slice(text.as_bytes());
        buf.put_u8(0);
        buf.freeze()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CMD {}", self.name())?;
        match self {
            Command::PowerOff | Command::PowerOn => Ok(()),
            Command::RxTune { freq_khz } | Command::TxTune { freq_khz } => write!(f, " {}", freq_khz),
            Command::SetTsc(v) | Command::SetBsic(v) => write!(f, " {}", v),
            Command::SetRxGain(db) | Command::SetPower(db) => write!(f, " {}", db),
            Command::SetSlot { timeslot, config } => write!(f, " {} {}", timeslot, config.code()),
        }
    }
}

/// Clock value announced on the clock channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockIndication(pub u32);

/// Response to a control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    /// Command keyword being answered
    pub command: String,
    /// 0 on success
    pub status: i32,
    /// Remaining response arguments
    pub args: String,
}

impl ControlResponse {
    /// Whether the transceiver accepted the command
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Datagram payload as text, without the NUL terminator and anything after it
fn datagram_text(datagram: &[u8]) -> Result<&str, String> {
    let end = datagram.iter().position(|&b| b == 0).unwrap_or(datagram.len());
    std::str::from_utf8(&datagram[..end])
        .map(str::trim_end)
        .map_err(|_| String::from_utf8_lossy(datagram).into_owned())
}

fn clock_indication(input: &str) -> IResult<&str, u32> {
    preceded(tag("IND CLOCK "), terminated(map_res(digit1, str::parse::<u32>), space0))(input)
}

fn control_response(input: &str) -> IResult<&str, (&str, i32, &str)> {
    let (input, _) = tag("RSP ")(input)?;
    let (input, name) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;
    let (input, _) = space1(input)?;
    let (input, status) = map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i32>)(input)?;
    let (input, args) = rest(input)?;
    Ok((input, (name, status, args.trim())))
}

/// Parse an `IND CLOCK <fn>` datagram
pub fn parse_clock_indication(datagram: &[u8]) -> Result<ClockIndication, ProtocolViolation> {
    let text = datagram_text(datagram).map_err(ProtocolViolation::MalformedClock)?;
    all_consuming(clock_indication)(text)
        .map(|(_, clock)| ClockIndication(clock))
        .map_err(|_| ProtocolViolation::MalformedClock(text.to_string()))
}

/// Parse an `RSP <NAME> <status> [args]` datagram
pub fn parse_control_response(datagram: &[u8]) -> Result<ControlResponse, ProtocolViolation> {
    let text = datagram_text(datagram).map_err(ProtocolViolation::MalformedResponse)?;
    all_consuming(control_response)(text)
        .map(|(_, (command, status, args))| ControlResponse {
            command: command.to_string(),
            status,
            args: args.to_string(),
        })
        .map_err(|_| ProtocolViolation::MalformedResponse(text.to_string()))
}
