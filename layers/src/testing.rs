//! Fake transceiver channels for unit tests

use async_trait::async_trait;
use bytes::Bytes;
use interfaces::trx_link::{DatagramSink, InboundDatagram, Readiness, ReadinessMultiplexer, TrxChannel};
use interfaces::InterfaceError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// Records every datagram sent
#[derive(Clone, Default)]
pub struct FakeSink {
    sent: Arc<Mutex<Vec<(TrxChannel, Vec<u8>)>>>,
}

impl FakeSink {
    pub fn sent(&self) -> Vec<(TrxChannel, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Control datagrams as text, without the NUL terminator
    pub fn commands(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(channel, _)| *channel == TrxChannel::Control)
            .map(|(_, bytes)| String::from_utf8_lossy(bytes.strip_suffix(&[0]).unwrap_or(&bytes[..])).into_owned())
            .collect()
    }

    pub fn bursts(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter(|(channel, _)| *channel == TrxChannel::Data)
            .map(|(_, bytes)| bytes)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl DatagramSink for FakeSink {
    fn send(&self, channel: TrxChannel, datagram: &[u8]) -> Result<usize, InterfaceError> {
        self.sent.lock().unwrap().push((channel, datagram.to_vec()));
        Ok(datagram.len())
    }
}

/// One scripted outcome of `wait`
pub enum Step {
    Datagrams(Vec<InboundDatagram>),
    Idle,
    Pause(Duration),
    Fail,
}

impl Step {
    pub fn clock(value: u32) -> Self {
        Step::Datagrams(vec![datagram(TrxChannel::Clock, format!("IND CLOCK {}\0", value).as_bytes())])
    }
}

pub fn datagram(channel: TrxChannel, payload: &[u8]) -> InboundDatagram {
    InboundDatagram {
        channel,
        payload: Bytes::copy_from_slice(payload),
    }
}

/// Plays back a script, then clears the run flag
pub struct ScriptedMultiplexer {
    steps: VecDeque<Step>,
    running: Arc<RwLock<bool>>,
}

impl ScriptedMultiplexer {
    pub fn new(steps: Vec<Step>, running: Arc<RwLock<bool>>) -> Self {
        Self {
            steps: steps.into(),
            running,
        }
    }
}

#[async_trait]
impl ReadinessMultiplexer for ScriptedMultiplexer {
    async fn wait(&mut self, _timeout: Duration) -> Result<Readiness, InterfaceError> {
        match self.steps.pop_front() {
            Some(Step::Datagrams(datagrams)) => Ok(Readiness::Ready(datagrams)),
            Some(Step::Idle) => Ok(Readiness::Idle),
            Some(Step::Pause(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(Readiness::Ready(Vec::new()))
            }
            Some(Step::Fail) => Err(InterfaceError::Io(std::io::Error::other("readiness wait failed"))),
            None => {
                *self.running.write().await = false;
                Ok(Readiness::Ready(Vec::new()))
            }
        }
    }
}
