//! The datagram service a transfer runs on.
//!
//! Everything a transfer learns about the outside world arrives as an
//! [`Event`] from one queue: datagrams for a registered local port, expiry of
//! the retransmission timer and stop requests.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;

use crate::packet::MAX_BLOCK_SIZE;
use crate::MIN_PORT_NUMBER;

/// Random ports tried before [`register_random_port`] gives up.
const MAX_PORT_ATTEMPTS: usize = 64;

#[cfg(test)]
pub(crate) mod mock;
mod udp;

pub use udp::UdpTransport;

/// Identifies one arming of the retransmission timer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimerToken(pub u64);

/// A datagram delivered to a registered local port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datagram {
    /// Address and port of the sender.
    pub source: SocketAddr,

    /// The registered port the datagram arrived on.
    pub local_port: u16,

    /// The raw datagram.
    pub payload: Vec<u8>,
}

/// Something a transfer or server has to react to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A datagram arrived.
    Datagram(Datagram),

    /// The timer armed with this token expired.
    Timeout(TimerToken),

    /// Someone asked the server loop to stop.
    Stop,
}

/// Sends datagrams, delivers incoming ones and keeps the single
/// retransmission timer of the transfer currently running on it.
pub trait Transport {
    /// Starts delivering datagrams sent to `port`. Port 0 lets the transport
    /// pick one. Returns the registered port, or `AddrInUse` if it is taken.
    fn register(&mut self, port: u16) -> io::Result<u16>;

    /// Stops delivering datagrams sent to `port`.
    fn unregister(&mut self, port: u16);

    /// Whether datagrams sent to `port` are being delivered.
    fn is_registered(&self, port: u16) -> bool;

    /// Sends `bytes` from the registered `local_port` to `peer`.
    fn send_to(&mut self, local_port: u16, peer: SocketAddr, bytes: &[u8]) -> io::Result<()>;

    /// Arms the timer, replacing any pending one.
    fn set_timer(&mut self, delay: Duration) -> TimerToken;

    /// Disarms the timer. A token already handed out never fires.
    fn cancel_timer(&mut self);

    /// Blocks until the next event is available.
    fn next_event(&mut self) -> io::Result<Event>;

    /// Largest block size that fits one datagram on this transport.
    fn max_block_size(&self) -> u16 {
        MAX_BLOCK_SIZE
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn register(&mut self, port: u16) -> io::Result<u16> {
        (**self).register(port)
    }

    fn unregister(&mut self, port: u16) {
        (**self).unregister(port)
    }

    fn is_registered(&self, port: u16) -> bool {
        (**self).is_registered(port)
    }

    fn send_to(&mut self, local_port: u16, peer: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        (**self).send_to(local_port, peer, bytes)
    }

    fn set_timer(&mut self, delay: Duration) -> TimerToken {
        (**self).set_timer(delay)
    }

    fn cancel_timer(&mut self) {
        (**self).cancel_timer()
    }

    fn next_event(&mut self) -> io::Result<Event> {
        (**self).next_event()
    }

    fn max_block_size(&self) -> u16 {
        (**self).max_block_size()
    }
}

/// Registers a random unused port in `[MIN_PORT_NUMBER, u16::MAX)` for the
/// local end of a transfer.
pub fn register_random_port<T: Transport + ?Sized>(transport: &mut T) -> io::Result<u16> {
    let mut rng = rand::thread_rng();

    for _ in 0..MAX_PORT_ATTEMPTS {
        let port: u16 = rng.gen_range(MIN_PORT_NUMBER, u16::MAX);
        if transport.is_registered(port) {
            continue;
        }

        match transport.register(port) {
            Ok(port) => return Ok(port),
            Err(e) if matches!(e.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied) => {
                tracing::debug!("port {} unavailable: {}", port, e)
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        ErrorKind::AddrInUse,
        "no free port for the transfer",
    ))
}
