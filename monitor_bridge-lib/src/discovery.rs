//! Learn a monitor's data address from its UDP admission broadcast.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::frame::extract_frames;
use crate::hl7;
use crate::message::{ConnectIndication, Message};

/// Port the monitors broadcast admission messages to.
pub const DEFAULT_DISCOVERY_PORT: u16 = 4600;

const DATAGRAM_SIZE: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub port: u16,
    /// Pause before retrying a failed bind.
    pub rebind_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            rebind_delay: Duration::from_secs(3),
        }
    }
}

/// Where to dial a monitor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorAddress {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for MonitorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl MonitorAddress {
    /// The address announced by an admission message, if it carries one.
    pub fn from_indication(ci: &ConnectIndication) -> Option<Self> {
        let ip = ci.ip.as_deref().filter(|ip| !ip.is_empty())?;
        Some(Self { ip: ip.to_owned(), port: ci.port })
    }
}

/// Decode one admission datagram, framed or bare.
pub fn parse_datagram(datagram: &[u8]) -> Option<MonitorAddress> {
    let mut framed = None;
    extract_frames(datagram, datagram.len(), |payload| {
        framed.get_or_insert_with(|| payload.to_vec());
    });
    let payload = framed.as_deref().unwrap_or(datagram);

    match hl7::decode(payload) {
        Some(Message::Connect(ci)) => MonitorAddress::from_indication(&ci),
        Some(other) => {
            debug!(
                "ignoring {} datagram with control id {} stamped {}",
                other.message_type(),
                other.control_id(),
                other.timestamp()
            );
            None
        }
        None => None,
    }
}

/// Listen until an admission broadcast announces a monitor address.
/// Returns `None` when cancelled first.
pub async fn discover(config: DiscoveryConfig, shutdown: CancellationToken) -> Option<MonitorAddress> {
    loop {
        let bound = tokio::select! {
            () = shutdown.cancelled() => return None,
            res = UdpSocket::bind(("0.0.0.0", config.port)) => res,
        };
        let socket = match bound {
            Ok(socket) => socket,
            Err(e) => {
                warn!("binding discovery port {} failed: {}; retrying in {:?}", config.port, e, config.rebind_delay);
                tokio::select! {
                    () = shutdown.cancelled() => return None,
                    () = sleep(config.rebind_delay) => continue,
                }
            }
        };
        info!("listening for monitor admission broadcasts on udp/{}", config.port);

        match listen(&socket, &shutdown).await {
            Ok(found) => return found,
            Err(e) => warn!("discovery socket failed: {}", e),
        }
    }
}

async fn listen(socket: &UdpSocket, shutdown: &CancellationToken) -> Result<Option<MonitorAddress>, SessionError> {
    let mut buf = [0u8; DATAGRAM_SIZE];
    loop {
        let (len, from) = tokio::select! {
            () = shutdown.cancelled() => return Ok(None),
            res = socket.recv_from(&mut buf) => res?,
        };
        debug!("admission datagram of {} bytes from {}", len, from);

        if let Some(address) = parse_datagram(&buf[..len]) {
            info!("monitor announced at {} (from {})", address, from);
            return Ok(Some(address));
        }
    }
}
