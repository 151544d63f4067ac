//! A client-side connection to a TFTP server. Implementors can use this
//! to build a more fully-featured client application.

use std::io::{self, ErrorKind, Read, Result, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use crate::context::{ClientRequest, Context};
use crate::handler::{Handler, Sink, Source, Status};
use crate::packet::Mode;
use crate::transfer::Transfer;
use crate::transport::{register_random_port, Transport, UdpTransport};
use crate::Config;

/// The initial state for building a `Client`.
pub struct New(());

/// An intermediate state for building a `Client`.
///
/// At this point, the `Builder` has all the information
/// it needs to construct a client.
pub struct ConnectTo {
    server: SocketAddr,
}

/// Builds a `Client`.
pub struct Builder<T> {
    data: T,
    config: Config,
    bind: Option<IpAddr>,
}

/// Talks to one TFTP server. Every transfer runs from a fresh random port.
pub struct Client<T = UdpTransport> {
    server: SocketAddr,
    config: Config,
    transport: T,
}

impl Builder<New> {
    /// Starts building a client with the default [`Config`].
    pub fn new() -> Self {
        Builder {
            data: New(()),
            config: Config::default(),
            bind: None,
        }
    }

    /// Stores the address of the server to connect to. A port of 0 stands
    /// for the configured server port.
    pub fn connect_to<A: ToSocketAddrs>(self, server: A) -> Result<Builder<ConnectTo>> {
        let server = server.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, "no address to connect to")
        })?;

        Ok(Builder {
            data: ConnectTo { server },
            config: self.config,
            bind: self.bind,
        })
    }
}

impl Default for Builder<New> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Builder<T> {
    /// Set the future client's configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Binds the client's ports on `ip` instead of the unspecified address.
    pub fn bind(mut self, ip: IpAddr) -> Self {
        self.bind = Some(ip);
        self
    }
}

impl Builder<ConnectTo> {
    /// Constructs a client over UDP.
    pub fn build(self) -> Client<UdpTransport> {
        let ip = match (self.bind, self.data.server) {
            (Some(ip), _) => ip,
            (None, SocketAddr::V4(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            (None, SocketAddr::V6(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        self.build_with(UdpTransport::new(ip))
    }

    /// Constructs a client over any transport.
    pub fn build_with<T: Transport>(self, transport: T) -> Client<T> {
        let mut server = self.data.server;
        if server.port() == 0 {
            server.set_port(self.config.server_port);
        }

        Client {
            server,
            config: self.config,
            transport,
        }
    }
}

impl<T: Transport> Client<T> {
    /// The address requests are sent to.
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// The transport transfers run on.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consumes the client, returning its transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Reads a file from the server into `handler`.
    pub fn read<S: AsRef<str>, H: Handler>(
        &mut self,
        file: S,
        mode: Mode,
        handler: H,
    ) -> Result<Status> {
        let transfer = self.transfer(ClientRequest::read(file.as_ref(), mode), handler)?;
        Ok(status(&transfer))
    }

    /// Writes a file of `size` bytes produced by `handler` to the server.
    pub fn write<S: AsRef<str>, H: Handler>(
        &mut self,
        file: S,
        mode: Mode,
        size: u64,
        handler: H,
    ) -> Result<Status> {
        let transfer = self.transfer(ClientRequest::write(file.as_ref(), mode, size), handler)?;
        Ok(status(&transfer))
    }

    /// Retrieves a file from the remote server.
    pub fn get<S: AsRef<str>, W: Write>(&mut self, file: S, mode: Mode, writer: W) -> Result<W> {
        let request = ClientRequest::read(file.as_ref(), mode);
        let transfer = self.transfer(request, Sink::new(writer))?;
        outcome(&transfer)?;
        Ok(transfer.into_handler().into_inner())
    }

    /// Stores a file on the remote server. `size` is announced through the
    /// `tsize` option.
    pub fn put<S: AsRef<str>, R: Read>(
        &mut self,
        file: S,
        mode: Mode,
        reader: R,
        size: u64,
    ) -> Result<()> {
        let request = ClientRequest::write(file.as_ref(), mode, size);
        let transfer = self.transfer(request, Source::new(reader))?;
        outcome(&transfer)
    }

    fn transfer<H: Handler>(&mut self, request: ClientRequest, handler: H) -> Result<Transfer<H>> {
        if request.file_name.len() + 1 >= self.config.max_filename_len {
            let longest = self.config.max_filename_len.saturating_sub(2);
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("file name longer than {} bytes", longest),
            ));
        }

        let local_port = register_random_port(&mut self.transport)?;
        let ctx = Context::client(
            &self.config,
            request,
            self.server,
            local_port,
            self.transport.max_block_size(),
        );

        let mut transfer = Transfer::new(ctx, handler);
        let result = transfer.run(&mut self.transport);
        self.transport.cancel_timer();
        self.transport.unregister(local_port);

        result.map(|_| transfer)
    }
}

fn status<H: Handler>(transfer: &Transfer<H>) -> Status {
    transfer.status().unwrap_or(Status::InternalError)
}

/// Turns an unsuccessful transfer into the error that ended it.
fn outcome<H: Handler>(transfer: &Transfer<H>) -> Result<()> {
    if status(transfer).is_success() {
        return Ok(());
    }

    Err(match transfer.context().error() {
        Some(err) => err.clone().into(),
        None => io::Error::new(ErrorKind::Other, "transfer failed"),
    })
}
