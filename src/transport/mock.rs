//! A scripted in-memory transport for exercising transfers without sockets.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Result};
use std::net::SocketAddr;
use std::time::Duration;

use super::{Datagram, Event, TimerToken, Transport};
use crate::bytes::FromBytes;
use crate::packet::Packet;

/// Addresses a scripted datagram to whichever port was registered last,
/// for ports picked at random.
pub const ANY_PORT: u16 = 0;

#[derive(Default)]
pub struct MockTransport {
    pub registered: Vec<u16>,
    /// Every datagram sent: local port, destination, decoded packet.
    pub sent: Vec<(u16, SocketAddr, Packet)>,
    /// Delay of every timer armed, in order.
    pub armed: Vec<Duration>,
    pub timer: Option<TimerToken>,
    pub events: VecDeque<Event>,
    /// Datagrams for ports nobody has registered yet.
    pub parked: Vec<Datagram>,
    pub fail_sends: bool,
    pub max_block_size: Option<u16>,
    next_token: u64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_datagram(&mut self, source: SocketAddr, local_port: u16, packet: Packet) {
        use crate::bytes::IntoBytes;

        self.events.push_back(Event::Datagram(Datagram {
            source,
            local_port,
            payload: packet.into_bytes(),
        }));
    }

    /// Takes everything sent so far.
    pub fn drain_sent(&mut self) -> Vec<(u16, SocketAddr, Packet)> {
        std::mem::take(&mut self.sent)
    }

    pub fn last_sent(&self) -> Option<&Packet> {
        self.sent.last().map(|(_, _, p)| p)
    }
}

impl Transport for MockTransport {
    fn register(&mut self, port: u16) -> Result<u16> {
        if self.registered.contains(&port) {
            return Err(ErrorKind::AddrInUse.into());
        }
        self.registered.push(port);

        // Anything waiting for this port can be seen now.
        let (ready, waiting): (Vec<_>, Vec<_>) =
            self.parked
                .drain(..)
                .partition(|d| d.local_port == port || d.local_port == ANY_PORT);
        self.parked = waiting;
        for datagram in ready {
            self.events.push_back(Event::Datagram(datagram));
        }

        Ok(port)
    }

    fn unregister(&mut self, port: u16) {
        self.registered.retain(|p| *p != port);
    }

    fn is_registered(&self, port: u16) -> bool {
        self.registered.contains(&port)
    }

    fn send_to(&mut self, local_port: u16, peer: SocketAddr, bytes: &[u8]) -> Result<()> {
        if self.fail_sends {
            return Err(io::Error::new(ErrorKind::Other, "link down"));
        }
        if !self.is_registered(local_port) {
            return Err(ErrorKind::NotConnected.into());
        }

        let packet = Packet::from_bytes(bytes)?;
        self.sent.push((local_port, peer, packet));
        Ok(())
    }

    fn set_timer(&mut self, delay: Duration) -> TimerToken {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.armed.push(delay);
        self.timer = Some(token);
        token
    }

    fn cancel_timer(&mut self) {
        self.timer = None;
    }

    /// Plays the scripted events, then lets the armed timer expire.
    fn next_event(&mut self) -> Result<Event> {
        while let Some(event) = self.events.pop_front() {
            match event {
                Event::Datagram(mut d) => {
                    if d.local_port == ANY_PORT {
                        match self.registered.last() {
                            Some(port) => d.local_port = *port,
                            None => {
                                self.parked.push(d);
                                continue;
                            }
                        }
                    }

                    if self.is_registered(d.local_port) {
                        return Ok(Event::Datagram(d));
                    }
                    self.parked.push(d);
                }
                event => return Ok(event),
            }
        }

        match self.timer.take() {
            Some(token) => Ok(Event::Timeout(token)),
            None => Err(io::Error::new(ErrorKind::TimedOut, "script exhausted")),
        }
    }

    fn max_block_size(&self) -> u16 {
        self.max_block_size.unwrap_or(crate::packet::MAX_BLOCK_SIZE)
    }
}
