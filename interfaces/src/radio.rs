//! Radio Device
//!
//! The radio front end (device discovery, gains, tuning, streaming) is an
//! external collaborator reached through [`RadioFrontEnd`]. [`RadioDevice`]
//! sits on top of it and reconciles the continuous sample stream with
//! timestamp-addressed access through one receive and one transmit
//! [`SampleRingBuffer`] per channel.

use crate::sample_buffer::{ReadOutcome, SampleRingBuffer, WriteOutcome};
use crate::InterfaceError;
use common::types::{Direction, GSM_SYMBOL_RATE};
use num_complex::Complex;
use tracing::{debug, info, trace, warn};

/// Complex sc16 sample
pub type IqSample = Complex<i16>;

/// Sample buffer size in bytes per channel and direction
pub const SAMPLE_BUF_BYTES: usize = 1 << 20;

/// Default receive and transmit samples per symbol
pub const DEFAULT_RX_SPS: u32 = 4;
pub const DEFAULT_TX_SPS: u32 = 4;

/// Radio device configuration
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// Receive samples per symbol
    pub rx_sps: u32,
    /// Transmit samples per symbol
    pub tx_sps: u32,
    /// Ring buffer capacity in samples
    pub buffer_samples: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            rx_sps: DEFAULT_RX_SPS,
            tx_sps: DEFAULT_TX_SPS,
            buffer_samples: SAMPLE_BUF_BYTES / std::mem::size_of::<IqSample>(),
        }
    }
}

impl RadioConfig {
    /// Receive sample rate in Hz
    pub fn rx_rate(&self) -> f64 {
        GSM_SYMBOL_RATE * self.rx_sps as f64
    }

    /// Transmit sample rate in Hz
    pub fn tx_rate(&self) -> f64 {
        GSM_SYMBOL_RATE * self.tx_sps as f64
    }
}

/// Properties reported by an opened front end
#[derive(Debug, Clone)]
pub struct RadioInfo {
    /// Board name
    pub name: String,
    /// Number of channels
    pub channels: usize,
    /// Samples delivered per receive call
    pub samples_per_packet: usize,
}

/// One received packet: `count` samples per channel, the first at `timestamp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxPacket {
    pub timestamp: i64,
    pub count: usize,
}

/// Radio front-end driver
pub trait RadioFrontEnd: Send {
    /// Find and configure the device described by `args`
    fn open(&mut self, args: &str, config: &RadioConfig) -> Result<RadioInfo, InterfaceError>;

    /// Stop streaming and release the device
    fn close(&mut self);

    /// (Re)start continuous receive streaming
    fn restart(&mut self) -> Result<(), InterfaceError>;

    /// Tune one channel of one direction
    fn set_frequency(&mut self, freq_hz: f64, channel: usize, direction: Direction) -> Result<(), InterfaceError>;

    /// Receive one packet into the per-channel windows. `None` on timeout.
    fn receive(&mut self, windows: &mut [Vec<IqSample>]) -> Result<Option<RxPacket>, InterfaceError>;

    /// Transmit the per-channel windows with the first sample at `timestamp`
    fn transmit(&mut self, windows: &[Vec<IqSample>], timestamp: i64) -> Result<usize, InterfaceError>;
}

/// TX/RX statistics
#[derive(Debug, Default, Clone)]
pub struct RfStats {
    pub tx_samples: u64,
    pub rx_samples: u64,
    pub tx_underruns: u64,
    pub rx_overruns: u64,
    pub tx_late_packets: u64,
    pub rx_late_packets: u64,
}

/// Buffers and tuning of an opened device
struct OpenDevice {
    info: RadioInfo,
    rx_buffers: Vec<SampleRingBuffer<IqSample>>,
    tx_buffers: Vec<SampleRingBuffer<IqSample>>,
    rx_packet: Vec<Vec<IqSample>>,
    tx_packet: Vec<Vec<IqSample>>,
    tx_timestamp: i64,
    rx_freq: Vec<Option<f64>>,
    tx_freq: Vec<Option<f64>>,
}

/// Timestamp-addressed access to a radio front end
pub struct RadioDevice<F: RadioFrontEnd> {
    front_end: F,
    config: RadioConfig,
    open: Option<OpenDevice>,
    stats: RfStats,
}

impl<F: RadioFrontEnd> RadioDevice<F> {
    /// Create a closed device
    pub fn new(front_end: F, config: RadioConfig) -> Self {
        Self {
            front_end,
            config,
            open: None,
            stats: RfStats::default(),
        }
    }

    /// Open the front end and allocate the sample buffers
    pub fn open(&mut self, args: &str) -> Result<&RadioInfo, InterfaceError> {
        if self.open.is_some() {
            self.close();
        }

        let info = self.front_end.open(args, &self.config)?;
        if info.channels == 0 {
            return Err(InterfaceError::InitializationFailed("device reports no channels".to_string()));
        }
        if info.samples_per_packet == 0 || info.samples_per_packet >= self.config.buffer_samples {
            return Err(InterfaceError::InvalidConfig(format!(
                "{} samples per packet do not fit a {} sample buffer",
                info.samples_per_packet, self.config.buffer_samples
            )));
        }

        let chans = info.channels;
        let spp = info.samples_per_packet;
        let mut rx_buffers = Vec::with_capacity(chans);
        let mut tx_buffers = Vec::with_capacity(chans);
        for _ in 0..chans {
            rx_buffers.push(SampleRingBuffer::new(self.config.buffer_samples)?);
            tx_buffers.push(SampleRingBuffer::new(self.config.buffer_samples)?);
        }

        info!("Opened radio '{}': {} channel(s), {} samples/packet", info.name, chans, spp);
        info!("RX/TX rate: {:.4}/{:.4} MHz", self.config.rx_rate() / 1e6, self.config.tx_rate() / 1e6);

        self.stats = RfStats::default();
        let open = self.open.insert(OpenDevice {
            info,
            rx_buffers,
            tx_buffers,
            rx_packet: vec![vec![IqSample::default(); spp]; chans],
            tx_packet: vec![vec![IqSample::default(); spp]; chans],
            tx_timestamp: 0,
            rx_freq: vec![None; chans],
            tx_freq: vec![None; chans],
        });

        self.front_end.restart()?;
        Ok(&open.info)
    }

    /// Stop the front end and release the sample buffers
    pub fn close(&mut self) {
        match self.open.take() {
            Some(open) => {
                self.front_end.close();
                info!("Closed radio '{}'", open.info.name);
                info!("  TX samples: {}, RX samples: {}", self.stats.tx_samples, self.stats.rx_samples);
                info!("  TX underruns: {}, RX overruns: {}", self.stats.tx_underruns, self.stats.rx_overruns);
            }
            None => warn!("Radio close requested but the device is not open"),
        }
    }

    /// Whether the device is open
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Properties of the opened device
    pub fn info(&self) -> Option<&RadioInfo> {
        self.open.as_ref().map(|open| &open.info)
    }

    /// RF statistics
    pub fn stats(&self) -> &RfStats {
        &self.stats
    }

    /// Restart receive streaming
    pub fn restart(&mut self) -> Result<(), InterfaceError> {
        if self.open.is_none() {
            return Err(InterfaceError::NotInitialized);
        }
        self.front_end.restart()
    }

    /// Tune a channel
    pub fn set_frequency(&mut self, freq_hz: f64, channel: usize, direction: Direction) -> Result<(), InterfaceError> {
        let open = self.open.as_mut().ok_or(InterfaceError::NotInitialized)?;
        if channel >= open.info.channels {
            return Err(InterfaceError::InvalidArgument(format!("channel {}", channel)));
        }

        debug!("Radio set frequency {:.3} MHz, ch={}, {}", freq_hz / 1e6, channel, direction);
        self.front_end.set_frequency(freq_hz, channel, direction)?;
        match direction {
            Direction::Rx => open.rx_freq[channel] = Some(freq_hz),
            Direction::Tx => open.tx_freq[channel] = Some(freq_hz),
        }
        Ok(())
    }

    /// Current frequency of a channel
    pub fn frequency(&self, channel: usize, direction: Direction) -> Option<f64> {
        let open = self.open.as_ref()?;
        let freqs = match direction {
            Direction::Rx => &open.rx_freq,
            Direction::Tx => &open.tx_freq,
        };
        freqs.get(channel).copied().flatten()
    }

    /// Feed the receive buffers from the front end while the first buffer has
    /// room for more than one packet. Returns the number of packets received.
    pub fn pump_rx(&mut self) -> Result<usize, InterfaceError> {
        let Self { front_end, open, stats, .. } = self;
        let open = open.as_mut().ok_or(InterfaceError::NotInitialized)?;
        let spp = open.info.samples_per_packet;
        let max_packets = open.rx_buffers[0].capacity() / spp + 1;

        trace!("RX wants {} samples", open.rx_buffers[0].space());
        let mut packets = 0;
        while open.rx_buffers[0].space() > spp && packets < max_packets {
            let packet = match front_end.receive(&mut open.rx_packet)? {
                Some(packet) => packet,
                None => {
                    debug!("RX timeout after {} packets", packets);
                    break;
                }
            };
            let count = packet.count.min(spp);

            for (buffer, window) in open.rx_buffers.iter_mut().zip(&open.rx_packet) {
                let outcome = buffer.write(&window[..count], packet.timestamp)?;
                if outcome == WriteOutcome::Stale {
                    stats.rx_late_packets += 1;
                } else if outcome.overflowed() {
                    stats.rx_overruns += 1;
                }
            }

            stats.rx_samples += count as u64;
            packets += 1;
        }

        Ok(packets)
    }

    /// Read received samples of one channel starting at `timestamp`
    pub fn read_rx(&mut self, channel: usize, out: &mut [IqSample], timestamp: i64) -> Result<ReadOutcome, InterfaceError> {
        let open = self.open.as_mut().ok_or(InterfaceError::NotInitialized)?;
        let buffer = open.rx_buffers.get_mut(channel)
            .ok_or_else(|| InterfaceError::InvalidArgument(format!("channel {}", channel)))?;
        Ok(buffer.read(out, timestamp)?)
    }

    /// Queue samples of one channel for transmission at `timestamp`
    pub fn write_tx(&mut self, channel: usize, samples: &[IqSample], timestamp: i64) -> Result<WriteOutcome, InterfaceError> {
        let open = self.open.as_mut().ok_or(InterfaceError::NotInitialized)?;
        let buffer = open.tx_buffers.get_mut(channel)
            .ok_or_else(|| InterfaceError::InvalidArgument(format!("channel {}", channel)))?;
        let outcome = buffer.write(samples, timestamp)?;
        if outcome == WriteOutcome::Stale {
            self.stats.tx_late_packets += 1;
        }
        Ok(outcome)
    }

    /// Timestamp of the next sample handed to the front end
    pub fn tx_timestamp(&self) -> Option<i64> {
        self.open.as_ref().map(|open| open.tx_timestamp)
    }

    /// Align the transmit stream to `timestamp`
    pub fn set_tx_timestamp(&mut self, timestamp: i64) -> Result<(), InterfaceError> {
        let open = self.open.as_mut().ok_or(InterfaceError::NotInitialized)?;
        open.tx_timestamp = timestamp;
        Ok(())
    }

    /// Drain up to one packet of `count` samples per channel from the
    /// transmit buffers and hand it to the front end. Missing samples are
    /// sent as zeros.
    pub fn pump_tx(&mut self, count: usize) -> Result<usize, InterfaceError> {
        let Self { front_end, open, stats, .. } = self;
        let open = open.as_mut().ok_or(InterfaceError::NotInitialized)?;
        let spp = open.info.samples_per_packet;
        if count == 0 || count > spp {
            return Err(InterfaceError::InvalidArgument(format!("{} samples per TX packet (max {})", count, spp)));
        }

        let timestamp = open.tx_timestamp;
        for (buffer, window) in open.tx_buffers.iter_mut().zip(open.tx_packet.iter_mut()) {
            window.resize(count, IqSample::default());
            let got = buffer.read(window, timestamp)?.count();
            if got < count {
                window[got..].fill(IqSample::default());
                stats.tx_underruns += 1;
            }
        }

        let sent = front_end.transmit(&open.tx_packet, timestamp)?;
        open.tx_timestamp += count as i64;
        stats.tx_samples += sent as u64;
        Ok(sent)
    }
}

/// Deterministic front end producing a timestamp-derived sample stream
///
/// Device arguments: `channels=<n>,spp=<samples per packet>,timeout_after=<packets>`
#[derive(Debug)]
pub struct SimulatedFrontEnd {
    channels: usize,
    samples_per_packet: usize,
    timeout_after: Option<u64>,
    next_timestamp: i64,
    received_packets: u64,
    streaming: bool,
    last_tx: Option<(i64, Vec<IqSample>)>,
}

impl Default for SimulatedFrontEnd {
    fn default() -> Self {
        Self {
            channels: 1,
            samples_per_packet: 1000,
            timeout_after: None,
            next_timestamp: 0,
            received_packets: 0,
            streaming: false,
            last_tx: None,
        }
    }
}

impl SimulatedFrontEnd {
    /// Sample the simulated radio produces at `timestamp`
    pub fn sample_at(timestamp: i64) -> IqSample {
        Complex::new(timestamp as i16, (timestamp >> 16) as i16)
    }

    /// Timestamp and channel-0 samples of the last transmit call
    pub fn last_transmit(&self) -> Option<&(i64, Vec<IqSample>)> {
        self.last_tx.as_ref()
    }

    fn parse_args(&mut self, args: &str) -> Result<(), InterfaceError> {
        for pair in args.split(',') {
            let parts: Vec<&str> = pair.trim().split('=').collect();
            if parts.len() != 2 {
                continue;
            }

            let value = parts[1].trim();
            match parts[0].trim() {
                "channels" => {
                    self.channels = value.parse()
                        .map_err(|_| InterfaceError::InvalidConfig("Invalid channels".to_string()))?;
                }
                "spp" => {
                    self.samples_per_packet = value.parse()
                        .map_err(|_| InterfaceError::InvalidConfig("Invalid spp".to_string()))?;
                }
                "timeout_after" => {
                    self.timeout_after = Some(value.parse()
                        .map_err(|_| InterfaceError::InvalidConfig("Invalid timeout_after".to_string()))?);
                }
                other => debug!("Ignoring simulated device argument '{}'", other),
            }
        }
        Ok(())
    }
}

impl RadioFrontEnd for SimulatedFrontEnd {
    fn open(&mut self, args: &str, config: &RadioConfig) -> Result<RadioInfo, InterfaceError> {
        self.parse_args(args)?;
        debug!("Simulated radio at {:.4} MHz sample rate", config.rx_rate() / 1e6);
        self.next_timestamp = 0;
        self.received_packets = 0;
        Ok(RadioInfo {
            name: "simulated".to_string(),
            channels: self.channels,
            samples_per_packet: self.samples_per_packet,
        })
    }

    fn close(&mut self) {
        self.streaming = false;
    }

    fn restart(&mut self) -> Result<(), InterfaceError> {
        self.streaming = true;
        Ok(())
    }

    fn set_frequency(&mut self, _freq_hz: f64, _channel: usize, _direction: Direction) -> Result<(), InterfaceError> {
        Ok(())
    }

    fn receive(&mut self, windows: &mut [Vec<IqSample>]) -> Result<Option<RxPacket>, InterfaceError> {
        if !self.streaming {
            return Err(InterfaceError::NotInitialized);
        }
        if self.timeout_after.is_some_and(|limit| self.received_packets >= limit) {
            return Ok(None);
        }

        let timestamp = self.next_timestamp;
        let count = windows.first().map_or(0, |w| w.len());
        for window in windows.iter_mut() {
            for (i, sample) in window.iter_mut().enumerate() {
                *sample = Self::sample_at(timestamp + i as i64);
            }
        }

        self.next_timestamp += count as i64;
        self.received_packets += 1;
        Ok(Some(RxPacket { timestamp, count }))
    }

    fn transmit(&mut self, windows: &[Vec<IqSample>], timestamp: i64) -> Result<usize, InterfaceError> {
        let first = windows.first().cloned().unwrap_or_default();
        let sent = first.len();
        self.last_tx = Some((timestamp, first));
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated_device(buffer_samples: usize) -> RadioDevice<SimulatedFrontEnd> {
        let config = RadioConfig {
            buffer_samples,
            ..RadioConfig::default()
        };
        RadioDevice::new(SimulatedFrontEnd::default(), config)
    }

    #[test]
    fn test_default_config() {
        let config = RadioConfig::default();
        assert_eq!(config.buffer_samples, 262_144);
        assert!((config.rx_rate() - 1_083_333.333).abs() < 1.0);
    }

    #[test]
    fn test_closed_device_refuses_io() {
        let mut radio = simulated_device(1024);
        let mut out = vec![IqSample::default(); 4];
        assert!(matches!(radio.pump_rx(), Err(InterfaceError::NotInitialized)));
        assert!(matches!(radio.read_rx(0, &mut out, 0), Err(InterfaceError::NotInitialized)));
        assert!(matches!(radio.set_frequency(935e6, 0, Direction::Rx), Err(InterfaceError::NotInitialized)));
        assert!(radio.restart().is_err());
    }

    #[test]
    fn test_open_and_tune() {
        let mut radio = simulated_device(1024);
        let info = radio.open("channels=2,spp=100").unwrap();
        assert_eq!(info.channels, 2);
        assert!(radio.is_open());

        radio.set_frequency(930.4e6, 1, Direction::Rx).unwrap();
        assert_eq!(radio.frequency(1, Direction::Rx), Some(930.4e6));
        assert_eq!(radio.frequency(1, Direction::Tx), None);
        assert!(radio.set_frequency(885.4e6, 2, Direction::Tx).is_err());

        radio.close();
        assert!(!radio.is_open());
        assert!(radio.info().is_none());
    }

    #[test]
    fn test_open_rejects_oversized_packets() {
        let mut radio = simulated_device(100);
        assert!(matches!(radio.open("spp=100"), Err(InterfaceError::InvalidConfig(_))));
    }

    #[test]
    fn test_pump_rx_fills_buffers() {
        let mut radio = simulated_device(1000);
        radio.open("channels=2,spp=100").unwrap();

        // Stops once no more than one packet of room is left
        assert_eq!(radio.pump_rx().unwrap(), 9);
        assert_eq!(radio.stats().rx_samples, 900);

        let mut out = vec![IqSample::default(); 50];
        assert_eq!(radio.read_rx(1, &mut out, 420).unwrap(), ReadOutcome::Read(50));
        assert_eq!(out[0], SimulatedFrontEnd::sample_at(420));
        assert_eq!(out[49], SimulatedFrontEnd::sample_at(469));
        assert_eq!(radio.read_rx(1, &mut out, 0).unwrap(), ReadOutcome::Past);
        assert_eq!(radio.read_rx(0, &mut out, 900).unwrap(), ReadOutcome::NotYet);
    }

    #[test]
    fn test_pump_rx_stops_on_timeout() {
        let mut radio = simulated_device(10_000);
        radio.open("spp=100,timeout_after=3").unwrap();
        assert_eq!(radio.pump_rx().unwrap(), 3);
        assert_eq!(radio.pump_rx().unwrap(), 0);
    }

    #[test]
    fn test_pump_tx_sends_queued_samples_and_zero_fills() {
        let mut radio = simulated_device(1000);
        radio.open("spp=100").unwrap();
        radio.set_tx_timestamp(500).unwrap();

        let burst = vec![IqSample::new(7, -7); 30];
        radio.write_tx(0, &burst, 500).unwrap();
        assert_eq!(radio.pump_tx(40).unwrap(), 40);

        let (timestamp, samples) = radio.front_end.last_transmit().unwrap();
        assert_eq!(*timestamp, 500);
        assert_eq!(&samples[..30], &burst[..]);
        assert!(samples[30..].iter().all(|s| *s == IqSample::default()));
        assert_eq!(radio.stats().tx_underruns, 1);
        assert_eq!(radio.tx_timestamp(), Some(540));

        assert_eq!(radio.write_tx(0, &burst, 100).unwrap(), WriteOutcome::Written { count: 30, evicted: 0 });
        assert!(radio.pump_tx(101).is_err());
    }
}
