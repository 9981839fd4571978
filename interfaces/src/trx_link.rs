//! UDP Link to the Transceiver Process
//!
//! Three independent UDP associations to the transceiver at base port P:
//!
//! | Channel | Remote port | Local port |
//! |---------|-------------|------------|
//! | clock   | P           | P+100      |
//! | control | P+1         | P+101      |
//! | data    | P+2         | P+102      |
//!
//! Receiving goes through [`ReadinessMultiplexer`], sending through
//! [`DatagramSink`], so the session and its event loop can run against fake
//! channels.

use crate::InterfaceError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

/// Offset between the remote port of a channel and our local bind port
pub const LOCAL_PORT_OFFSET: u16 = 100;

/// Largest datagram accepted on any channel
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Logical channel to the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrxChannel {
    /// Clock indications
    Clock,
    /// Commands and responses
    Control,
    /// Burst data
    Data,
}

impl TrxChannel {
    /// All channels in dispatch order
    pub const ALL: [TrxChannel; 3] = [TrxChannel::Clock, TrxChannel::Control, TrxChannel::Data];

    /// Offset of this channel's port from the base port
    pub fn port_offset(&self) -> u16 {
        match self {
            TrxChannel::Clock => 0,
            TrxChannel::Control => 1,
            TrxChannel::Data => 2,
        }
    }
}

/// Datagram received on one of the channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    pub channel: TrxChannel,
    pub payload: Bytes,
}

/// Outcome of waiting on the channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Nothing arrived within the timeout
    Idle,
    /// Datagrams read from the channels that became ready. May be empty after
    /// a spurious wakeup.
    Ready(Vec<InboundDatagram>),
}

/// Outgoing half of the link
pub trait DatagramSink: Send {
    /// Send one datagram without blocking
    fn send(&self, channel: TrxChannel, datagram: &[u8]) -> Result<usize, InterfaceError>;
}

/// Incoming half of the link
#[async_trait]
pub trait ReadinessMultiplexer: Send {
    /// Wait until at least one channel is readable or `timeout` elapses.
    /// An error here is a transport fault and is fatal to the caller.
    async fn wait(&mut self, timeout: Duration) -> Result<Readiness, InterfaceError>;
}

/// Transceiver endpoint
#[derive(Debug, Clone)]
pub struct TrxLinkConfig {
    /// Transceiver host
    pub host: String,
    /// Base port P of the transceiver
    pub base_port: u16,
}

#[derive(Debug)]
struct ChannelSockets {
    clock: UdpSocket,
    control: UdpSocket,
    data: UdpSocket,
}

impl ChannelSockets {
    fn get(&self, channel: TrxChannel) -> &UdpSocket {
        match channel {
            TrxChannel::Clock => &self.clock,
            TrxChannel::Control => &self.control,
            TrxChannel::Data => &self.data,
        }
    }
}

/// Bind and connect one channel socket
async fn setup_channel(host: &str, port: u16) -> Result<UdpSocket, InterfaceError> {
    let local_port = port.checked_add(LOCAL_PORT_OFFSET).ok_or_else(|| {
        InterfaceError::InvalidConfig(format!("port {} leaves no room for the local offset", port))
    })?;

    let socket = UdpSocket::bind((host, local_port)).await?;
    socket.connect((host, port)).await?;
    debug!("Channel bound to {} and connected to {}:{}", socket.local_addr()?, host, port);
    Ok(socket)
}

/// Receiving half of the UDP link
pub struct UdpMultiplexer {
    sockets: Arc<ChannelSockets>,
    recv_buf: Vec<u8>,
}

/// Sending half of the UDP link
#[derive(Clone)]
pub struct UdpSink {
    sockets: Arc<ChannelSockets>,
}

/// Open the three channels to the transceiver
pub async fn connect(config: &TrxLinkConfig) -> Result<(UdpMultiplexer, UdpSink), InterfaceError> {
    let base = config.base_port;
    let port = |channel: TrxChannel| {
        base.checked_add(channel.port_offset())
            .ok_or_else(|| InterfaceError::InvalidConfig(format!("invalid base port {}", base)))
    };

    info!("Connecting to transceiver at {}:{}", config.host, base);
    let sockets = Arc::new(ChannelSockets {
        clock: setup_channel(&config.host, port(TrxChannel::Clock)?).await?,
        control: setup_channel(&config.host, port(TrxChannel::Control)?).await?,
        data: setup_channel(&config.host, port(TrxChannel::Data)?).await?,
    });
    info!("Transceiver channels ready (clock/control/data on local ports {}-{})",
          base as u32 + LOCAL_PORT_OFFSET as u32, base as u32 + LOCAL_PORT_OFFSET as u32 + 2);

    Ok((
        UdpMultiplexer {
            sockets: sockets.clone(),
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
        },
        UdpSink { sockets },
    ))
}

impl UdpMultiplexer {
    /// Local address of a channel
    pub fn local_addr(&self, channel: TrxChannel) -> Result<SocketAddr, InterfaceError> {
        Ok(self.sockets.get(channel).local_addr()?)
    }
}

#[async_trait]
impl ReadinessMultiplexer for UdpMultiplexer {
    async fn wait(&mut self, timeout: Duration) -> Result<Readiness, InterfaceError> {
        let sockets = &self.sockets;
        let ready = tokio::time::timeout(timeout, async {
            tokio::select! {
                r = sockets.clock.readable() => r,
                r = sockets.control.readable() => r,
                r = sockets.data.readable() => r,
            }
        })
        .await;

        match ready {
            Err(_) => return Ok(Readiness::Idle),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(())) => {}
        }

        let mut datagrams = Vec::new();
        for channel in TrxChannel::ALL {
            match self.sockets.get(channel).try_recv(&mut self.recv_buf) {
                Ok(n) => {
                    trace!("Received {} bytes on {:?} channel", n, channel);
                    datagrams.push(InboundDatagram {
                        channel,
                        payload: Bytes::copy_from_slice(&self.recv_buf[..n]),
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    // ICMP port unreachable for an earlier send, the peer is not running
                    debug!("{:?} channel: transceiver port unreachable", channel);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Readiness::Ready(datagrams))
    }
}

impl DatagramSink for UdpSink {
    fn send(&self, channel: TrxChannel, datagram: &[u8]) -> Result<usize, InterfaceError> {
        let sent = self.sockets.get(channel).try_send(datagram)?;
        trace!("Sent {} bytes on {:?} channel", sent, channel);
        Ok(sent)
    }
}
