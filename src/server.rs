//! A TFTP server that answers one request at a time.
//!
//! The server listens on its well-known port. When a request arrives it
//! stops listening, serves the transfer from a random private port and only
//! then listens again: requests that arrive in the meantime are left to the
//! transport (the UDP transport drops them, clients retransmit).

use std::io::{self, ErrorKind, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::context::Context;
use crate::handler::{Handler, Status};
use crate::packet::Opcode;
use crate::transfer::{peek_opcode, Transfer};
use crate::transport::{register_random_port, Datagram, Event, Transport, UdpTransport};
use crate::Config;

/// Serves requests with a single [`Handler`].
pub struct Server<H, T = UdpTransport> {
    transport: T,
    handler: H,
    config: Config,
    port: u16,
    stop_requested: bool,
}

impl<H: Handler> Server<H, UdpTransport> {
    /// Listens on `addr` over UDP. Port 0 picks a free port.
    pub fn bind<A: ToSocketAddrs>(addr: A, handler: H, config: Config) -> Result<Self> {
        let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, "no address to bind to")
        })?;

        Self::new(
            UdpTransport::new(addr.ip()),
            handler,
            config.with_server_port(addr.port()),
        )
    }

    /// The address the server listens on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr(self.port)
    }
}

impl<H: Handler + Send + 'static> Server<H, UdpTransport> {
    /// Runs [`Server::serve`] on its own thread.
    pub fn spawn(mut self) -> Result<ServerHandle<H>> {
        let local_addr = self.local_addr();
        let stop = self.transport.stop_channel();
        let thread = thread::Builder::new()
            .name("tftp-server".to_string())
            .spawn(move || self.serve())?;

        Ok(ServerHandle {
            stop,
            thread,
            local_addr,
        })
    }
}

impl<H: Handler, T: Transport> Server<H, T> {
    /// Starts listening on `config.server_port` of `transport`.
    pub fn new(mut transport: T, handler: H, config: Config) -> Result<Self> {
        let port = transport.register(config.server_port)?;
        info!("listening on port {}", port);

        Ok(Self {
            transport,
            handler,
            config,
            port,
            stop_requested: false,
        })
    }

    /// The listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The handler serving the transfers.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The transport requests arrive on.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Serves requests until a stop event arrives, then returns the handler.
    pub fn serve(mut self) -> Result<H> {
        while let Some(status) = self.serve_one()? {
            debug!("transfer ended: {}", status);
        }

        self.transport.unregister(self.port);
        info!("stopped listening on port {}", self.port);
        Ok(self.handler)
    }

    /// Waits for one request and serves it. Returns `None` once a stop
    /// event arrived.
    pub fn serve_one(&mut self) -> Result<Option<Status>> {
        while !self.stop_requested {
            let datagram = match self.transport.next_event()? {
                Event::Stop => {
                    self.stop_requested = true;
                    break;
                }
                Event::Timeout(_) => continue,
                Event::Datagram(datagram) => datagram,
            };

            if datagram.local_port != self.port {
                debug!("dropping late datagram for port {}", datagram.local_port);
                continue;
            }

            match peek_opcode(&datagram.payload) {
                Some(Opcode::Rrq) | Some(Opcode::Wrq) => {}
                _ => {
                    warn!("ignoring non-request datagram from {}", datagram.source);
                    continue;
                }
            }

            self.transport.unregister(self.port);
            let status = self.transfer(datagram);
            self.transport.register(self.port)?;

            return status.map(Some);
        }

        Ok(None)
    }

    fn transfer(&mut self, request: Datagram) -> Result<Status> {
        let local_port = register_random_port(&mut self.transport)?;
        let ctx = Context::server(
            &self.config,
            self.port,
            local_port,
            self.transport.max_block_size(),
        );

        let mut transfer = Transfer::new(ctx, &mut self.handler);
        transfer.handle(Event::Datagram(request), &mut self.transport);
        let result = transfer.run(&mut self.transport);
        if transfer.stop_requested() {
            self.stop_requested = true;
        }

        self.transport.cancel_timer();
        self.transport.unregister(local_port);
        result
    }
}

/// A server running on its own thread.
pub struct ServerHandle<H> {
    stop: Sender<()>,
    thread: JoinHandle<Result<H>>,
    local_addr: Option<SocketAddr>,
}

impl<H> ServerHandle<H> {
    /// The address the server listens on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Asks the server to stop once the running transfer ends, and waits
    /// for it.
    pub fn stop(self) -> Result<H> {
        let _ = self.stop.send(());
        self.thread
            .join()
            .map_err(|_| io::Error::new(ErrorKind::Other, "server thread panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::SocketAddr;

    use super::*;
    use crate::bytes::IntoBytes;
    use crate::handler::Payload;
    use crate::packet::{Block, Mode, Options, Packet};
    use crate::transport::mock::{MockTransport, ANY_PORT};

    /// Serves the same few bytes under every name.
    #[derive(Default)]
    struct Fixed {
        served: Vec<String>,
    }

    impl Handler for Fixed {
        fn start(
            &mut self,
            _action: crate::Operation,
            _mode: Mode,
            file_name: &str,
            _transfer_size: &mut u64,
        ) -> bool {
            self.served.push(file_name.to_string());
            true
        }

        fn data(&mut self, offset: u64, payload: Payload<'_>) -> io::Result<usize> {
            match payload {
                Payload::Fill(buf) if offset == 0 => {
                    buf[..3].copy_from_slice(b"abc");
                    Ok(3)
                }
                Payload::Fill(_) => Ok(0),
                Payload::Received(bytes) => Ok(bytes.len()),
            }
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn server() -> Server<Fixed, MockTransport> {
        Server::new(
            MockTransport::new(),
            Fixed::default(),
            Config::default().with_options(false),
        )
        .unwrap()
    }

    #[test]
    fn test_requests_are_served_one_at_a_time() {
        let mut server = server();
        let first = addr("10.0.0.2:4000");
        let second = addr("10.0.0.3:5000");

        server.transport.push_datagram(first, 69, Packet::rrq("a", Mode::Octet, Options::default()));
        server.transport.push_datagram(second, 69, Packet::rrq("b", Mode::Octet, Options::default()));
        server.transport.push_datagram(first, ANY_PORT, Packet::ack(Block::new(1)));

        assert_eq!(server.serve_one().unwrap(), Some(Status::Success));
        assert!(server.transport.parked.is_empty());
        assert_eq!(server.transport.registered, vec![69]);

        server.transport.push_datagram(second, ANY_PORT, Packet::ack(Block::new(1)));
        assert_eq!(server.serve_one().unwrap(), Some(Status::Success));

        let sent = server.transport.drain_sent();
        let peers: Vec<_> = sent.iter().map(|(_, to, _)| *to).collect();
        assert_eq!(peers, vec![first, second]);
        assert!(sent.iter().all(|(port, _, _)| *port != 69));
        assert_eq!(server.handler().served, vec!["a", "b"]);
    }

    #[test]
    fn test_non_requests_are_ignored() {
        let mut server = server();
        let stranger = addr("10.0.0.9:1234");
        server.transport.push_datagram(stranger, 69, Packet::ack(Block::new(1)));
        server.transport.events.push_back(Event::Datagram(Datagram {
            source: stranger,
            local_port: 69,
            payload: vec![0, 99],
        }));
        server.transport.events.push_back(Event::Stop);

        assert_eq!(server.serve_one().unwrap(), None);
        assert!(server.transport.sent.is_empty());
    }

    #[test]
    fn test_stop_during_transfer_ends_serve() {
        let mut server = server();
        let client = addr("10.0.0.2:4000");
        server.transport.push_datagram(client, 69, Packet::wrq("up", Mode::Octet, Options::default()));
        server.transport.events.push_back(Event::Stop);
        server.transport.push_datagram(client, ANY_PORT, Packet::data(Block::new(1), b"xyz"));
        server
            .transport
            .push_datagram(client, 69, Packet::rrq("never", Mode::Octet, Options::default()));

        let handler = server.serve().unwrap();
        assert_eq!(handler.served, vec!["up"]);
    }

    #[test]
    fn test_malformed_request_is_answered() {
        let mut server = server();
        let client = addr("10.0.0.2:4000");
        let mut payload = Packet::rrq("f", Mode::Octet, Options::default()).into_bytes();
        payload.pop();
        server.transport.events.push_back(Event::Datagram(Datagram {
            source: client,
            local_port: 69,
            payload,
        }));

        assert_eq!(server.serve_one().unwrap(), Some(Status::InternalError));
        let (_, to, packet) = server.transport.sent.last().unwrap();
        assert_eq!(*to, client);
        assert_eq!(packet.opcode(), Opcode::Error);
    }
}
