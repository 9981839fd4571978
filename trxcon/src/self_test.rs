//! Radio Buffer Self-Test
//!
//! Streams ten 100-sample segments through the transmit and receive sample
//! buffers of a simulated radio and checks every step.

use interfaces::radio::{IqSample, RadioConfig, RadioDevice, SimulatedFrontEnd};
use interfaces::sample_buffer::{ReadOutcome, WriteOutcome};
use tracing::{debug, error, info};

/// Samples per segment
pub const SEGMENT_LEN: usize = 100;

/// Segments per direction
pub const SEGMENTS: usize = 10;

/// First segment timestamp
const START_TIMESTAMP: i64 = 121;

/// Outcome of a self-test run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelfTestReport {
    pub steps: usize,
    pub failures: usize,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.failures == 0
    }

    fn check(&mut self, ok: bool) {
        self.steps += 1;
        if !ok {
            self.failures += 1;
        }
    }
}

/// Run the self-test against a simulated radio with `config`. Extra device
/// arguments are passed through to the simulated front end.
pub fn run(config: RadioConfig, device_args: &str) -> anyhow::Result<SelfTestReport> {
    let mut radio = RadioDevice::new(SimulatedFrontEnd::default(), config);
    let info = radio.open(&format!("{},channels=1,spp={}", device_args, SEGMENT_LEN))?;
    info!("Self-test on '{}' radio", info.name);

    let mut report = SelfTestReport::default();
    let segment = vec![IqSample::new(1, -1); SEGMENT_LEN];

    // Transmit: queue all segments, then drain them
    radio.set_tx_timestamp(START_TIMESTAMP)?;
    for i in 0..SEGMENTS {
        let timestamp = START_TIMESTAMP + (i * SEGMENT_LEN) as i64;
        let outcome = radio.write_tx(0, &segment, timestamp)?;
        debug!("Wrote segment len={} at {} = {:?}", SEGMENT_LEN, timestamp, outcome);
        let ok = matches!(outcome, WriteOutcome::Written { count, evicted: 0 } if count == SEGMENT_LEN);
        if !ok {
            error!("can't write segment at {}: {:?}", timestamp, outcome);
        }
        report.check(ok);
    }
    for _ in 0..SEGMENTS {
        let underruns = radio.stats().tx_underruns;
        let sent = radio.pump_tx(SEGMENT_LEN)?;
        let ok = sent == SEGMENT_LEN && radio.stats().tx_underruns == underruns;
        if !ok {
            error!("TX segment incomplete at {:?}", radio.tx_timestamp());
        }
        report.check(ok);
    }

    // Receive: fill from the simulated stream, then read back in order
    radio.pump_rx()?;
    let mut out = vec![IqSample::default(); SEGMENT_LEN];
    for i in 0..SEGMENTS {
        let timestamp = START_TIMESTAMP + (i * SEGMENT_LEN) as i64;
        let outcome = radio.read_rx(0, &mut out, timestamp)?;
        debug!("Read segment len={} at {} = {:?}", SEGMENT_LEN, timestamp, outcome);
        let ok = outcome == ReadOutcome::Read(SEGMENT_LEN)
            && out[0] == SimulatedFrontEnd::sample_at(timestamp);
        if !ok {
            error!("can't read segment at {}: {:?}", timestamp, outcome);
        }
        report.check(ok);
    }

    radio.close();
    info!("Self-test: {} steps, {} failures", report.steps, report.failures);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_test_passes_with_defaults() {
        let report = run(RadioConfig::default(), "").unwrap();
        assert_eq!(report.steps, 3 * SEGMENTS);
        assert!(report.passed());
    }

    #[test]
    fn test_self_test_detects_small_buffer() {
        let config = RadioConfig {
            buffer_samples: 500,
            ..RadioConfig::default()
        };
        let report = run(config, "").unwrap();
        assert!(!report.passed());
    }
}
