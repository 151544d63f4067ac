//! [`Transport`](super::Transport) over std UDP sockets.

use std::cmp;
use std::io::{self, ErrorKind, Result};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use super::{Datagram, Event, TimerToken, Transport};

/// How long a single receive may block before the stop channel and the
/// timer are looked at again.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Large enough for any UDP payload, so oversized packets are seen whole.
const RECV_BUFFER_SIZE: usize = 65_536;

/// A [`Transport`] over std UDP sockets, one per registered port, all bound
/// to the same local address.
pub struct UdpTransport {
    ip: IpAddr,
    sockets: Vec<(u16, UdpSocket)>,
    next_socket: usize,
    timer: Option<(Instant, TimerToken)>,
    next_token: u64,
    stop: Option<Receiver<()>>,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Creates a transport binding its ports on `ip`.
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            sockets: Vec::new(),
            next_socket: 0,
            timer: None,
            next_token: 0,
            stop: None,
            buf: vec![0; RECV_BUFFER_SIZE],
        }
    }

    /// Returns a sender that makes [`Transport::next_event`] yield
    /// [`Event::Stop`]. Dropping every sender has the same effect.
    pub fn stop_channel(&mut self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.stop = Some(rx);
        tx
    }

    /// The address a registered port is bound to.
    pub fn local_addr(&self, port: u16) -> Option<SocketAddr> {
        self.socket(port).and_then(|s| s.local_addr().ok())
    }

    fn socket(&self, port: u16) -> Option<&UdpSocket> {
        self.sockets.iter().find(|(p, _)| *p == port).map(|(_, s)| s)
    }

    fn stop_requested(&mut self) -> bool {
        let requested = match &self.stop {
            Some(rx) => match rx.try_recv() {
                Ok(()) => true,
                Err(TryRecvError::Empty) => false,
                Err(TryRecvError::Disconnected) => true,
            },
            None => false,
        };

        if requested {
            // One stop is enough; later calls block on sockets again.
            self.stop = None;
        }

        requested
    }

    /// Tries every socket once, sharing `wait` between them.
    fn poll_sockets(&mut self, wait: Duration) -> Result<Option<Datagram>> {
        let count = self.sockets.len() as u32;
        let slice = cmp::max(wait / count, Duration::from_millis(1));

        for _ in 0..self.sockets.len() {
            let idx = self.next_socket % self.sockets.len();
            self.next_socket = idx + 1;

            let (port, socket) = &self.sockets[idx];
            socket.set_read_timeout(Some(slice))?;

            match socket.recv_from(&mut self.buf) {
                Ok((n, source)) => {
                    return Ok(Some(Datagram {
                        source,
                        local_port: *port,
                        payload: self.buf[..n].to_vec(),
                    }));
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                // ICMP errors for earlier sends surface here on some platforms.
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
                    ) =>
                {
                    tracing::debug!("ignoring {} on port {}", e, port);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }
}

impl Transport for UdpTransport {
    fn register(&mut self, port: u16) -> Result<u16> {
        if port != 0 && self.is_registered(port) {
            return Err(ErrorKind::AddrInUse.into());
        }

        let socket = UdpSocket::bind((self.ip, port))?;
        let port = socket.local_addr()?.port();
        tracing::debug!("registered {}:{}", self.ip, port);
        self.sockets.push((port, socket));

        Ok(port)
    }

    fn unregister(&mut self, port: u16) {
        let before = self.sockets.len();
        self.sockets.retain(|(p, _)| *p != port);

        if self.sockets.len() != before {
            tracing::debug!("unregistered {}:{}", self.ip, port);
        }
    }

    fn is_registered(&self, port: u16) -> bool {
        self.socket(port).is_some()
    }

    fn send_to(&mut self, local_port: u16, peer: SocketAddr, bytes: &[u8]) -> Result<()> {
        let socket = match self.socket(local_port) {
            Some(socket) => socket,
            None => {
                return Err(io::Error::new(
                    ErrorKind::NotConnected,
                    format!("port {} is not registered", local_port),
                ))
            }
        };

        socket.send_to(bytes, peer)?;
        Ok(())
    }

    fn set_timer(&mut self, delay: Duration) -> TimerToken {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.timer = Some((Instant::now() + delay, token));
        token
    }

    fn cancel_timer(&mut self) {
        self.timer = None;
    }

    fn next_event(&mut self) -> Result<Event> {
        loop {
            if self.stop_requested() {
                return Ok(Event::Stop);
            }

            let now = Instant::now();
            let mut wait = POLL_INTERVAL;
            if let Some((deadline, token)) = self.timer {
                if deadline <= now {
                    self.timer = None;
                    return Ok(Event::Timeout(token));
                }
                wait = cmp::min(wait, deadline - now);
            }

            if self.sockets.is_empty() {
                thread::sleep(wait);
                continue;
            }

            if let Some(datagram) = self.poll_sockets(wait)? {
                return Ok(Event::Datagram(datagram));
            }
        }
    }
}
