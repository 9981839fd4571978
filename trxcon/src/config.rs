//! TOML Configuration
//!
//! Every field has a default, so an empty file (or none at all) gives the
//! reference setup: E-GSM900 ARFCN 1001 against a transceiver on
//! 127.0.0.1:5700.

use anyhow::{anyhow, bail, Context};
use common::types::{Arfcn, ChannelCombination, GsmBand, TIMESLOTS_PER_FRAME};
use interfaces::radio::RadioConfig;
use interfaces::trx_link::TrxLinkConfig;
use layers::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrxconConfig {
    /// Transceiver endpoint
    #[serde(default)]
    pub trx: TrxSection,
    /// Cell and carrier parameters
    #[serde(default)]
    pub cell: CellSection,
    /// Clock and polling
    #[serde(default)]
    pub timing: TimingSection,
    /// Radio front end
    #[serde(default)]
    pub radio: RadioSection,
    /// Logging
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrxSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    5700
}

impl Default for TrxSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: default_base_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellSection {
    #[serde(default = "default_band")]
    pub band: GsmBand,
    #[serde(default = "default_arfcn")]
    pub arfcn: u16,
    /// Training sequence code (0-7)
    #[serde(default = "default_tsc")]
    pub tsc: u8,
    /// Base station identity code (0-63)
    #[serde(default = "default_bsic")]
    pub bsic: u8,
    #[serde(default = "default_rx_gain_db")]
    pub rx_gain_db: i32,
    #[serde(default)]
    pub tx_power_db: i32,
    /// SETSLOT channel combination of each timeslot
    #[serde(default = "default_slots")]
    pub slots: Vec<u8>,
}

fn default_band() -> GsmBand {
    GsmBand::Egsm900
}

fn default_arfcn() -> u16 {
    1001
}

fn default_tsc() -> u8 {
    7
}

fn default_bsic() -> u8 {
    63
}

fn default_rx_gain_db() -> i32 {
    10
}

fn default_slots() -> Vec<u8> {
    vec![5, 7, 1, 1, 1, 1, 1, 1]
}

impl Default for CellSection {
    fn default() -> Self {
        Self {
            band: default_band(),
            arfcn: default_arfcn(),
            tsc: default_tsc(),
            bsic: default_bsic(),
            rx_gain_db: default_rx_gain_db(),
            tx_power_db: 0,
            slots: default_slots(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingSection {
    /// Scheduling look-ahead in frames
    #[serde(default = "default_clock_advance")]
    pub clock_advance: u32,
    /// Heartbeat timeout
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Dummy burst interval, 0 disables
    #[serde(default = "default_filler_interval_ms")]
    pub filler_interval_ms: u64,
}

fn default_clock_advance() -> u32 {
    layers::CLOCK_ADVANCE
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_filler_interval_ms() -> u64 {
    1000
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            clock_advance: default_clock_advance(),
            poll_interval_ms: default_poll_interval_ms(),
            filler_interval_ms: default_filler_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RadioSection {
    #[serde(default)]
    pub device_args: String,
    #[serde(default = "default_sps")]
    pub rx_sps: u32,
    #[serde(default = "default_sps")]
    pub tx_sps: u32,
    /// Sample buffer size per channel and direction
    #[serde(default = "default_buffer_samples")]
    pub buffer_samples: usize,
}

fn default_sps() -> u32 {
    4
}

fn default_buffer_samples() -> usize {
    RadioConfig::default().buffer_samples
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            device_args: String::new(),
            rx_sps: default_sps(),
            tx_sps: default_sps(),
            buffer_samples: default_buffer_samples(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TrxconConfig {
    /// Load configuration from a TOML file, `None` if the file does not exist
    pub fn load(path: &str) -> anyhow::Result<Option<Self>> {
        if !Path::new(path).exists() {
            return Ok(None);
        }
        Self::from_toml_file(path).map(Some)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path))?;
        let config: TrxconConfig = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path))?;
        Ok(config)
    }

    /// Transceiver endpoint
    pub fn link_config(&self) -> TrxLinkConfig {
        TrxLinkConfig {
            host: self.trx.host.clone(),
            base_port: self.trx.base_port,
        }
    }

    /// Heartbeat polling interval
    pub fn poll_interval(&self) -> anyhow::Result<Duration> {
        if self.timing.poll_interval_ms == 0 {
            bail!("timing.poll_interval_ms must be positive");
        }
        Ok(Duration::from_millis(self.timing.poll_interval_ms))
    }

    /// Validate the cell parameters into session parameters
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let cell = &self.cell;
        let arfcn = Arfcn(cell.arfcn);
        let tx_freq_khz = cell.band.uplink_khz(arfcn)
            .ok_or_else(|| anyhow!("ARFCN {} is not in band {:?}", cell.arfcn, cell.band))?;
        let rx_freq_khz = cell.band.downlink_khz(arfcn)
            .ok_or_else(|| anyhow!("ARFCN {} is not in band {:?}", cell.arfcn, cell.band))?;

        if cell.tsc > 7 {
            bail!("Invalid TSC: {}", cell.tsc);
        }
        if cell.bsic > 63 {
            bail!("Invalid BSIC: {}", cell.bsic);
        }
        if cell.slots.len() != TIMESLOTS_PER_FRAME as usize {
            bail!("Expected {} slot configurations, got {}", TIMESLOTS_PER_FRAME, cell.slots.len());
        }

        let mut slots = [ChannelCombination::None; TIMESLOTS_PER_FRAME as usize];
        for (tn, (slot, &code)) in slots.iter_mut().zip(&cell.slots).enumerate() {
            *slot = ChannelCombination::from_code(code)
                .ok_or_else(|| anyhow!("Invalid channel combination {} for TS{}", code, tn))?;
        }

        Ok(SessionConfig {
            tx_freq_khz,
            rx_freq_khz,
            tsc: cell.tsc,
            bsic: cell.bsic,
            rx_gain_db: cell.rx_gain_db,
            tx_power_db: cell.tx_power_db,
            slots,
            clock_advance: self.timing.clock_advance,
            filler_interval: Duration::from_millis(self.timing.filler_interval_ms),
        })
    }

    /// Radio sample rates and buffering
    pub fn radio_config(&self) -> anyhow::Result<RadioConfig> {
        let radio = &self.radio;
        if radio.rx_sps == 0 || radio.tx_sps == 0 {
            bail!("Samples per symbol must be positive");
        }
        if radio.buffer_samples == 0 {
            bail!("radio.buffer_samples must be positive");
        }
        Ok(RadioConfig {
            rx_sps: radio.rx_sps,
            tx_sps: radio.tx_sps,
            buffer_samples: radio.buffer_samples,
        })
    }
}
