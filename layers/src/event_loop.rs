//! TRX Event Loop
//!
//! Single task multiplexing the three transceiver channels and the downlink
//! queue of the PHY. All session state is owned by the loop. The heartbeat
//! deadline is re-armed only when a datagram actually arrives; if it passes
//! the session is told the transceiver went silent.

use crate::session::TrxControlSession;
use crate::LayerError;
use interfaces::burst::{DownlinkBurst, UplinkBurst};
use interfaces::trx_link::{DatagramSink, InboundDatagram, Readiness, ReadinessMultiplexer, TrxChannel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Depth of the PHY burst queues
pub const PHY_QUEUE_DEPTH: usize = 64;

/// Default heartbeat polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// PHY side of the loop
pub struct PhyHandle {
    /// Bursts to transmit
    pub downlink: mpsc::Sender<DownlinkBurst>,
    /// Bursts received
    pub uplink: mpsc::Receiver<UplinkBurst>,
}

/// Event loop owning a control session and its channels
pub struct TrxEventLoop<S: DatagramSink, M: ReadinessMultiplexer> {
    session: TrxControlSession<S>,
    mux: M,
    downlink_rx: mpsc::Receiver<DownlinkBurst>,
    poll_interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl<S: DatagramSink, M: ReadinessMultiplexer> TrxEventLoop<S, M> {
    /// Wire a session to its channels. The loop runs while `running` is set.
    pub fn new(
        mut session: TrxControlSession<S>,
        mux: M,
        poll_interval: Duration,
        running: Arc<RwLock<bool>>,
    ) -> (Self, PhyHandle) {
        let (downlink_tx, downlink_rx) = mpsc::channel(PHY_QUEUE_DEPTH);
        let (uplink_tx, uplink_rx) = mpsc::channel(PHY_QUEUE_DEPTH);
        session.set_uplink_sender(uplink_tx);

        let event_loop = Self {
            session,
            mux,
            downlink_rx,
            poll_interval,
            running,
        };
        let handle = PhyHandle {
            downlink: downlink_tx,
            uplink: uplink_rx,
        };
        (event_loop, handle)
    }

    pub fn session(&self) -> &TrxControlSession<S> {
        &self.session
    }

    /// Run until the run flag is cleared. Only a failing readiness wait
    /// ends the loop with an error.
    pub async fn run(&mut self) -> Result<(), LayerError> {
        info!("TRX event loop started (poll interval {:?})", self.poll_interval);

        let mut deadline = Instant::now() + self.poll_interval;
        let mut downlink_open = true;

        while *self.running.read().await {
            let timeout = deadline.saturating_duration_since(Instant::now());

            tokio::select! {
                readiness = self.mux.wait(timeout) => {
                    match readiness? {
                        Readiness::Idle => {
                            self.session.on_idle();
                            deadline = Instant::now() + self.poll_interval;
                        }
                        Readiness::Ready(datagrams) => {
                            if !datagrams.is_empty() {
                                deadline = Instant::now() + self.poll_interval;
                            }
                            for datagram in datagrams {
                                self.dispatch(datagram);
                            }
                        }
                    }
                }
                burst = self.downlink_rx.recv(), if downlink_open => {
                    match burst {
                        Some(burst) => {
                            if let Err(e) = self.session.send_burst(&burst) {
                                warn!("Downlink burst TN={} FN={} refused: {}", burst.timeslot, burst.frame_number, e);
                            }
                        }
                        None => {
                            debug!("Downlink queue closed");
                            downlink_open = false;
                        }
                    }
                }
            }
        }

        self.session.shutdown();

        let stats = self.session.stats();
        info!("Final session stats:");
        info!("  Heartbeats: {}, lost: {}", stats.heartbeats, stats.heartbeat_losses);
        info!("  Commands sent: {}, refused: {}", stats.commands_sent, stats.commands_refused);
        info!("  Bursts sent: {}, received: {}", stats.bursts_sent, stats.bursts_received);
        info!("  Malformed datagrams: {}", stats.malformed_datagrams);
        Ok(())
    }

    fn dispatch(&mut self, datagram: InboundDatagram) {
        let result = match datagram.channel {
            TrxChannel::Clock => self.session.on_clock_datagram(&datagram.payload),
            TrxChannel::Control => {
                self.session.on_control_datagram(&datagram.payload);
                Ok(())
            }
            TrxChannel::Data => self.session.on_data_datagram(&datagram.payload),
        };

        if let Err(violation) = result {
            warn!("{:?} channel: {}", datagram.channel, violation);
        }
    }
}
