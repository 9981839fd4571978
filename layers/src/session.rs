//! Transceiver Control Session
//!
//! State machine driven by the three channel callbacks:
//!
//! ```text
//! Unavailable --first heartbeat--> Configuring --setup sent--> Operational
//!      ^                                                            |
//!      +------------------ heartbeat lost (any state) --------------+
//! ```
//!
//! Heartbeat loss is detected by the event loop, which calls
//! [`TrxControlSession::on_idle`] whenever a full polling interval passes
//! without any datagram.

use crate::frame_clock::{FrameClock, CLOCK_ADVANCE};
use crate::LayerError;
use common::types::{ChannelCombination, Timeslot, TIMESLOTS_PER_FRAME};
use common::utils::{bytes_to_hex, hard_bits_to_string, soft_bits_to_string};
use interfaces::burst::{decode_uplink, encode_downlink, DownlinkBurst, UplinkBurst};
use interfaces::trx_link::{DatagramSink, TrxChannel};
use interfaces::trx_message::{parse_clock_indication, parse_control_response, ClockIndication, Command, ControlResponse};
use interfaces::{InterfaceError, ProtocolViolation};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Session parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Transmit (uplink) frequency in kHz
    pub tx_freq_khz: u32,
    /// Receive (downlink) frequency in kHz
    pub rx_freq_khz: u32,
    /// Training sequence code
    pub tsc: u8,
    /// Base station identity code
    pub bsic: u8,
    /// Receive gain in dB
    pub rx_gain_db: i32,
    /// Transmit power reduction in dB
    pub tx_power_db: i32,
    /// Channel combination per timeslot
    pub slots: [ChannelCombination; TIMESLOTS_PER_FRAME as usize],
    /// Scheduling look-ahead in frames
    pub clock_advance: u32,
    /// Minimum time between dummy bursts, zero disables them
    pub filler_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        use ChannelCombination::{BcchSdcch4, Sdcch8, TchFull};

        // E-GSM900 ARFCN 1001
        Self {
            tx_freq_khz: 885_400,
            rx_freq_khz: 930_400,
            tsc: 7,
            bsic: 63,
            rx_gain_db: 10,
            tx_power_db: 0,
            slots: [BcchSdcch4, Sdcch8, TchFull, TchFull, TchFull, TchFull, TchFull, TchFull],
            clock_advance: CLOCK_ADVANCE,
            filler_interval: Duration::from_secs(1),
        }
    }
}

/// Session state derived from availability and setup progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unavailable,
    Configuring,
    Operational,
}

/// Session counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub heartbeats: u64,
    pub heartbeat_losses: u64,
    pub commands_sent: u64,
    pub commands_refused: u64,
    pub bursts_sent: u64,
    pub bursts_received: u64,
    pub malformed_datagrams: u64,
}

/// Control session towards one transceiver
pub struct TrxControlSession<S: DatagramSink> {
    sink: S,
    config: SessionConfig,
    clock: FrameClock,
    available: bool,
    setup_complete: bool,
    last_filler: Option<Instant>,
    uplink_tx: Option<mpsc::Sender<UplinkBurst>>,
    stats: SessionStats,
}

impl<S: DatagramSink> TrxControlSession<S> {
    /// Create a session in the Unavailable state
    pub fn new(sink: S, config: SessionConfig) -> Self {
        Self {
            sink,
            clock: FrameClock::new(config.clock_advance),
            config,
            available: false,
            setup_complete: false,
            last_filler: None,
            uplink_tx: None,
            stats: SessionStats::default(),
        }
    }

    /// Deliver decoded uplink bursts to this queue
    pub fn set_uplink_sender(&mut self, tx: mpsc::Sender<UplinkBurst>) {
        self.uplink_tx = Some(tx);
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn setup_complete(&self) -> bool {
        self.setup_complete
    }

    pub fn state(&self) -> SessionState {
        match (self.available, self.setup_complete) {
            (false, _) => SessionState::Unavailable,
            (true, false) => SessionState::Configuring,
            (true, true) => SessionState::Operational,
        }
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Send a command on the control channel. No response is awaited.
    /// Anything but POWEROFF is refused until the transceiver has announced
    /// itself with a heartbeat.
    pub fn send_command(&mut self, cmd: Command) -> Result<(), LayerError> {
        if !self.available && cmd != Command::PowerOff {
            warn!("Transceiver not available, command '{}' not sent", cmd.name());
            self.stats.commands_refused += 1;
            return Err(LayerError::TransceiverUnavailable);
        }

        debug!("{}", cmd);
        self.sink.send(TrxChannel::Control, &cmd.encode())?;
        self.stats.commands_sent += 1;
        Ok(())
    }

    /// Send a burst on the data channel
    pub fn send_burst(&mut self, burst: &DownlinkBurst) -> Result<(), LayerError> {
        let datagram = match encode_downlink(burst) {
            Ok(datagram) => datagram,
            Err(InterfaceError::InvalidArgument(msg)) => return Err(LayerError::InvalidArgument(msg)),
            Err(e) => return Err(e.into()),
        };

        if !self.available {
            debug!("Transceiver not available, burst TN={} FN={} not sent", burst.timeslot, burst.frame_number);
            return Err(LayerError::TransceiverUnavailable);
        }

        debug!("sendData(tn={}, fn={}, gain={}, bytes={})",
               burst.timeslot, burst.frame_number, burst.gain, datagram.len());
        trace!("Bits: {}", hard_bits_to_string(&burst.bits));
        self.sink.send(TrxChannel::Data, &datagram)?;
        self.stats.bursts_sent += 1;
        Ok(())
    }

    /// Commands issued when the transceiver (re)appears
    pub fn setup_commands(&self) -> Vec<Command> {
        let mut commands = vec![
            Command::PowerOff,
            Command::TxTune { freq_khz: self.config.tx_freq_khz },
            Command::RxTune { freq_khz: self.config.rx_freq_khz },
            Command::SetTsc(self.config.tsc),
            Command::SetBsic(self.config.bsic),
            Command::PowerOn,
            Command::SetRxGain(self.config.rx_gain_db),
            Command::SetPower(self.config.tx_power_db),
        ];
        commands.extend(
            Timeslot::all()
                .zip(self.config.slots)
                .map(|(timeslot, config)| Command::SetSlot { timeslot, config }),
        );
        commands
    }

    /// Handle a datagram from the clock channel
    pub fn on_clock_datagram(&mut self, datagram: &[u8]) -> Result<(), ProtocolViolation> {
        match parse_clock_indication(datagram) {
            Ok(ClockIndication(clock)) => {
                self.handle_clock(clock);
                Ok(())
            }
            Err(e) => {
                self.stats.malformed_datagrams += 1;
                Err(e)
            }
        }
    }

    /// Handle a datagram from the control channel. Responses are only
    /// logged; free text that does not parse is ignored.
    pub fn on_control_datagram(&mut self, datagram: &[u8]) -> Option<ControlResponse> {
        match parse_control_response(datagram) {
            Ok(response) => {
                if response.is_ok() {
                    debug!("Response: {} {} {}", response.command, response.status, response.args);
                } else {
                    warn!("Transceiver rejected {}: status {} {}", response.command, response.status, response.args);
                }
                Some(response)
            }
            Err(_) => {
                debug!("Response: {}", String::from_utf8_lossy(datagram));
                None
            }
        }
    }

    /// Handle a datagram from the data channel
    pub fn on_data_datagram(&mut self, datagram: &[u8]) -> Result<(), ProtocolViolation> {
        let burst = match decode_uplink(datagram) {
            Ok(burst) => burst,
            Err(e) => {
                self.stats.malformed_datagrams += 1;
                trace!("Dropped datagram: {}", bytes_to_hex(datagram));
                return Err(e);
            }
        };

        self.stats.bursts_received += 1;
        debug!("[{} bytes] tn={} fn={} rssi={} toa={:4.2}",
               datagram.len(), burst.timeslot, burst.frame_number, burst.rssi, burst.toa);
        trace!("Data: {}", soft_bits_to_string(&burst.soft_bits));

        if let Some(tx) = &self.uplink_tx {
            match tx.try_send(burst) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(burst)) => {
                    warn!("Uplink queue full, dropping burst FN={}", burst.frame_number);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!("No uplink consumer");
                }
            }
        }
        Ok(())
    }

    /// Called when a whole polling interval passed without any datagram
    pub fn on_idle(&mut self) {
        if self.available {
            warn!("Nothing received (transceiver not available)");
            self.stats.heartbeat_losses += 1;
        }
        self.available = false;
        self.setup_complete = false;
        self.power_off();
    }

    /// Best-effort POWEROFF on the way out
    pub fn shutdown(&mut self) {
        info!("Powering off transceiver");
        self.power_off();
    }

    fn power_off(&mut self) {
        if let Err(e) = self.send_command(Command::PowerOff) {
            debug!("POWEROFF not delivered: {}", e);
        }
    }

    fn handle_clock(&mut self, clock: u32) {
        self.stats.heartbeats += 1;
        if !self.available {
            info!("Transceiver available (clock {})", clock);
            self.available = true;
        }

        debug!("Clock: {}", clock);
        self.clock.on_heartbeat(clock);

        if !self.setup_complete {
            self.setup_trx();
        } else {
            self.send_filler();
        }
    }

    fn setup_trx(&mut self) {
        info!("Configuring transceiver: TX {} kHz, RX {} kHz, TSC {}, BSIC {}",
              self.config.tx_freq_khz, self.config.rx_freq_khz, self.config.tsc, self.config.bsic);
        for cmd in self.setup_commands() {
            if let Err(e) = self.send_command(cmd) {
                warn!("Setup command {} failed: {}", cmd.name(), e);
            }
        }
        self.setup_complete = true;
        info!("Transceiver setup complete");
    }

    /// Dummy bursts on TS0 and TS1 keep the transmit path primed
    fn send_filler(&mut self) {
        if self.config.filler_interval.is_zero() {
            return;
        }

        let now = Instant::now();
        if self.last_filler.is_some_and(|last| now.duration_since(last) < self.config.filler_interval) {
            return;
        }
        self.last_filler = Some(now);

        for timeslot in Timeslot::all().take(2) {
            let burst = DownlinkBurst::dummy(timeslot, self.clock.next_frame());
            if let Err(e) = self.send_burst(&burst) {
                warn!("Dummy burst on TS{} not sent: {}", timeslot, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSink;
    use bytes::{BufMut, Bytes, BytesMut};
    use common::types::{BURST_BITS, FRAME_MODULUS};
    use interfaces::burst::{DATA_RECV_SIZE, DATA_SEND_SIZE, DUMMY_BURST};

    fn session_with(config: SessionConfig) -> (TrxControlSession<FakeSink>, FakeSink) {
        let sink = FakeSink::default();
        (TrxControlSession::new(sink.clone(), config), sink)
    }

    fn session() -> (TrxControlSession<FakeSink>, FakeSink) {
        session_with(SessionConfig {
            filler_interval: Duration::ZERO,
            ..SessionConfig::default()
        })
    }

    fn uplink_datagram(len: usize) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u8(3);
        buf.put_u32(4242);
        buf.put_u8(70);
        buf.put_i16(128);
        buf.put_bytes(127, BURST_BITS);
        buf.put_bytes(0, 2);
        buf.truncate(len);
        buf.to_vec()
    }

    #[test]
    fn test_setup_sequence_order() {
        let (mut session, sink) = session();
        assert_eq!(session.state(), SessionState::Unavailable);

        session.on_clock_datagram(b"IND CLOCK 100\0").unwrap();
        assert_eq!(session.state(), SessionState::Operational);
        assert_eq!(session.clock().current_frame(), 120);

        assert_eq!(sink.commands(), vec![
            "CMD POWEROFF",
            "CMD TXTUNE 885400",
            "CMD RXTUNE 930400",
            "CMD SETTSC 7",
            "CMD SETBSIC 63",
            "CMD POWERON",
            "CMD SETRXGAIN 10",
            "CMD SETPOWER 0",
            "CMD SETSLOT 0 5",
            "CMD SETSLOT 1 7",
            "CMD SETSLOT 2 1",
            "CMD SETSLOT 3 1",
            "CMD SETSLOT 4 1",
            "CMD SETSLOT 5 1",
            "CMD SETSLOT 6 1",
            "CMD SETSLOT 7 1",
        ]);

        // Later heartbeats don't rerun setup
        sink.clear();
        session.on_clock_datagram(b"IND CLOCK 101\0").unwrap();
        session.on_clock_datagram(b"IND CLOCK 102\0").unwrap();
        assert!(sink.sent().is_empty());
        assert_eq!(session.clock().current_frame(), 122);
        assert_eq!(session.stats().heartbeats, 3);
    }

    #[test]
    fn test_commands_refused_while_unavailable() {
        let (mut session, sink) = session();

        assert!(matches!(session.send_command(Command::PowerOn), Err(LayerError::TransceiverUnavailable)));
        assert!(sink.sent().is_empty());
        assert_eq!(session.stats().commands_refused, 1);

        session.send_command(Command::PowerOff).unwrap();
        assert_eq!(sink.commands(), vec!["CMD POWEROFF"]);
    }

    #[test]
    fn test_heartbeat_loss_emits_one_poweroff() {
        let (mut session, sink) = session();
        session.on_clock_datagram(b"IND CLOCK 100\0").unwrap();
        sink.clear();

        session.on_idle();
        assert_eq!(session.state(), SessionState::Unavailable);
        assert!(!session.available());
        assert!(!session.setup_complete());
        assert_eq!(sink.commands(), vec!["CMD POWEROFF"]);

        session.on_idle();
        assert_eq!(sink.commands(), vec!["CMD POWEROFF", "CMD POWEROFF"]);
        assert_eq!(session.stats().heartbeat_losses, 1);

        // The next heartbeat runs the full setup again
        sink.clear();
        session.on_clock_datagram(b"IND CLOCK 500\0").unwrap();
        assert_eq!(sink.commands().len(), 16);
        assert_eq!(session.state(), SessionState::Operational);
    }

    #[test]
    fn test_malformed_clock_is_ignored() {
        let (mut session, sink) = session();
        let result = session.on_clock_datagram(b"IND CLOCK soon\0");
        assert!(matches!(result, Err(ProtocolViolation::MalformedClock(_))));
        assert_eq!(session.state(), SessionState::Unavailable);
        assert!(sink.sent().is_empty());
        assert_eq!(session.stats().malformed_datagrams, 1);
    }

    #[test]
    fn test_short_uplink_burst_is_dropped() {
        let (mut session, _sink) = session();
        session.on_clock_datagram(b"IND CLOCK 100\0").unwrap();

        let result = session.on_data_datagram(&uplink_datagram(DATA_RECV_SIZE - 1));
        assert_eq!(result, Err(ProtocolViolation::WrongLength { expected: 158, actual: 157 }));
        assert!(session.available());
        assert!(session.setup_complete());
        assert_eq!(session.stats().bursts_received, 0);
    }

    #[test]
    fn test_uplink_burst_delivered() {
        let (mut session, _sink) = session();
        let (tx, mut rx) = mpsc::channel(4);
        session.set_uplink_sender(tx);

        session.on_data_datagram(&uplink_datagram(DATA_RECV_SIZE)).unwrap();
        let burst = rx.try_recv().unwrap();
        assert_eq!(burst.timeslot.value(), 3);
        assert_eq!(burst.frame_number, 4242);
        assert_eq!(burst.rssi, -70);
        assert_eq!(burst.toa, 0.5);
        assert!(burst.soft_bits.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_burst_with_invalid_timeslot_rejected() {
        let (mut session, sink) = session();
        session.on_clock_datagram(b"IND CLOCK 100\0").unwrap();
        sink.clear();

        let burst = DownlinkBurst {
            timeslot: 8,
            frame_number: 120,
            gain: 0,
            bits: Bytes::from_static(&DUMMY_BURST),
        };
        assert!(matches!(session.send_burst(&burst), Err(LayerError::InvalidArgument(_))));
        assert!(sink.sent().is_empty());

        let burst = DownlinkBurst {
            frame_number: FRAME_MODULUS,
            timeslot: 0,
            ..burst
        };
        assert!(matches!(session.send_burst(&burst), Err(LayerError::InvalidArgument(_))));
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_burst_refused_while_unavailable() {
        let (mut session, sink) = session();
        let burst = DownlinkBurst::dummy(Timeslot::new(0).unwrap(), 10);
        assert!(matches!(session.send_burst(&burst), Err(LayerError::TransceiverUnavailable)));
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_filler_bursts() {
        let (mut session, sink) = session_with(SessionConfig::default());
        session.on_clock_datagram(b"IND CLOCK 100\0").unwrap();
        assert!(sink.bursts().is_empty());

        session.on_clock_datagram(b"IND CLOCK 101\0").unwrap();
        let bursts = sink.bursts();
        assert_eq!(bursts.len(), 2);
        assert_eq!(bursts[0].len(), DATA_SEND_SIZE);
        assert_eq!(&bursts[0][..6], &[0, 0, 0, 0, 122, 0]);
        assert_eq!(&bursts[1][..6], &[1, 0, 0, 0, 123, 0]);
        assert_eq!(&bursts[1][6..], &DUMMY_BURST[..]);

        // Not again within the filler interval
        session.on_clock_datagram(b"IND CLOCK 102\0").unwrap();
        assert_eq!(sink.bursts().len(), 2);
        assert_eq!(session.stats().bursts_sent, 2);
    }

    #[test]
    fn test_control_responses() {
        let (mut session, _sink) = session();
        let response = session.on_control_datagram(b"RSP SETSLOT -1 2 1\0").unwrap();
        assert!(!response.is_ok());
        assert!(session.on_control_datagram(b"whatever\0").is_none());
        assert_eq!(session.state(), SessionState::Unavailable);
        assert_eq!(session.stats().malformed_datagrams, 0);
    }
}
