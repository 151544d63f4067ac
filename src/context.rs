//! The per-transfer state record.

use std::cmp;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::packet::{Block, Error, Mode, Options, DEFAULT_BLOCK_SIZE, HEADER_SIZE};
use crate::transport::TimerToken;
use crate::Config;

/// Which end of the transfer this context drives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Sent the request.
    Client,

    /// Answers requests on the well-known port.
    Server,
}

/// The direction data flows, named after the request that started it:
/// `Read` moves the file from server to client, `Write` from client to
/// server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// RRQ
    Read,

    /// WRQ
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
        }
    }
}

/// Where a transfer stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Nothing exchanged yet.
    Start,

    /// The request went out (or came in); waiting for the first real reply.
    Negotiate,

    /// Steady DATA/ACK exchange.
    Transfer,

    /// Finished successfully.
    Done,

    /// Aborted.
    Failed,
}

impl State {
    /// `Done` or `Failed`: no event changes the transfer any more.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }
}

/// What a client asks the server for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientRequest {
    /// RRQ or WRQ.
    pub operation: Operation,

    /// Name of the file on the server.
    pub file_name: String,

    /// Transfer mode.
    pub mode: Mode,

    /// Size announced through `tsize`: the real size on writes, 0 on reads.
    pub transfer_size: u64,
}

impl ClientRequest {
    /// Asks for `file_name` from the server.
    pub fn read<S: Into<String>>(file_name: S, mode: Mode) -> Self {
        Self {
            operation: Operation::Read,
            file_name: file_name.into(),
            mode,
            transfer_size: 0,
        }
    }

    /// Offers `transfer_size` bytes to be stored as `file_name`.
    pub fn write<S: Into<String>>(file_name: S, mode: Mode, transfer_size: u64) -> Self {
        Self {
            operation: Operation::Write,
            file_name: file_name.into(),
            mode,
            transfer_size,
        }
    }
}

/// Converts a timeout to the whole seconds carried by the `timeout` option.
pub(crate) fn wire_seconds(timeout: Duration) -> u8 {
    cmp::min(cmp::max(timeout.as_secs(), 1), u8::MAX as u64) as u8
}

/// Everything one transfer knows about itself. Owned by the [`Transfer`]
/// driving it.
///
/// [`Transfer`]: crate::transfer::Transfer
#[derive(Debug)]
pub struct Context {
    pub(crate) role: Role,
    pub(crate) operation: Operation,
    pub(crate) state: State,
    pub(crate) file_name: String,
    pub(crate) mode: Mode,

    pub(crate) peer: IpAddr,
    pub(crate) local_port: u16,
    pub(crate) remote_port: u16,
    /// Port requests are addressed to.
    pub(crate) server_port: u16,

    pub(crate) block: Block,
    /// Bytes of the file before the current block.
    pub(crate) offset: u64,
    /// Length of the DATA block awaiting its ACK.
    pub(crate) pending_len: usize,

    pub(crate) block_size: u16,
    pub(crate) timeout: Duration,
    pub(crate) transfer_size: u64,

    pub(crate) retry_count: usize,
    pub(crate) block_timeout: Duration,
    pub(crate) use_options: bool,
    pub(crate) write_finished: bool,

    /// What a client put in its request.
    pub(crate) proposed: Options,
    pub(crate) timer: Option<TimerToken>,
    /// Last packet sent, resent verbatim on timeout.
    pub(crate) last_packet: Vec<u8>,
    pub(crate) error: Option<Error>,

    pub(crate) config_timeout: Duration,
    pub(crate) max_retries: usize,
    pub(crate) max_block_size: u16,
    pub(crate) enable_options: bool,
    pub(crate) max_filename_len: usize,
}

impl Context {
    fn new(role: Role, operation: Operation, config: &Config, max_block_size: u16) -> Self {
        let timeout = config.retransmission.timeout();

        Self {
            role,
            operation,
            state: State::Start,
            file_name: String::new(),
            mode: Mode::default(),
            peer: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: 0,
            remote_port: config.server_port,
            server_port: config.server_port,
            block: Block::new(0),
            offset: 0,
            pending_len: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            timeout,
            transfer_size: 0,
            retry_count: 0,
            block_timeout: timeout,
            use_options: false,
            write_finished: false,
            proposed: Options::default(),
            timer: None,
            last_packet: Vec::new(),
            error: None,
            config_timeout: timeout,
            max_retries: config.retransmission.max_retransmissions(),
            max_block_size: cmp::min(config.block_size, max_block_size),
            enable_options: config.enable_options,
            max_filename_len: config.max_filename_len,
        }
    }

    /// A context for a transfer this side requests from `server`. The
    /// options are proposed only if `config` enables them.
    pub fn client(
        config: &Config,
        request: ClientRequest,
        server: SocketAddr,
        local_port: u16,
        max_block_size: u16,
    ) -> Self {
        let mut ctx = Self::new(Role::Client, request.operation, config, max_block_size);
        ctx.peer = server.ip();
        ctx.remote_port = server.port();
        ctx.server_port = server.port();
        ctx.local_port = local_port;
        ctx.file_name = request.file_name;
        ctx.mode = request.mode;

        if ctx.enable_options {
            ctx.set_options(ctx.max_block_size, ctx.config_timeout, request.transfer_size);
        } else {
            ctx.set_default_options();
            ctx.transfer_size = request.transfer_size;
        }

        ctx
    }

    /// A context waiting for a request on `server_port`, to be served from
    /// `local_port`.
    pub fn server(config: &Config, server_port: u16, local_port: u16, max_block_size: u16) -> Self {
        let mut ctx = Self::new(Role::Server, Operation::Read, config, max_block_size);
        ctx.server_port = server_port;
        ctx.remote_port = server_port;
        ctx.local_port = local_port;
        ctx
    }

    /// Points a server context at the client that sent a request.
    pub(crate) fn reseed(&mut self, operation: Operation, client: SocketAddr) {
        self.operation = operation;
        self.peer = client.ip();
        self.remote_port = client.port();
        self.block = Block::new(0);
        self.offset = 0;
        self.retry_count = 0;
        self.write_finished = false;
        self.set_default_options();
    }

    pub(crate) fn set_default_options(&mut self) {
        self.block_size = DEFAULT_BLOCK_SIZE;
        self.timeout = self.config_timeout;
        self.block_timeout = self.config_timeout;
        self.transfer_size = 0;
        self.use_options = false;
    }

    pub(crate) fn set_options(&mut self, block_size: u16, timeout: Duration, transfer_size: u64) {
        self.block_size = block_size;
        self.timeout = timeout;
        self.block_timeout = timeout;
        self.transfer_size = transfer_size;
        self.use_options = true;
    }

    /// Whether this side produces the DATA packets.
    pub(crate) fn sends_data(&self) -> bool {
        matches!(
            (self.role, self.operation),
            (Role::Client, Operation::Write) | (Role::Server, Operation::Read)
        )
    }

    /// Largest datagram this context may send.
    pub(crate) fn max_packet_size(&self) -> usize {
        HEADER_SIZE + cmp::max(self.max_block_size, DEFAULT_BLOCK_SIZE) as usize
    }

    /// Which end this context drives.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Direction of the transfer.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Where the transfer stands.
    pub fn state(&self) -> State {
        self.state
    }

    /// The requested file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The requested mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Address and current port of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        SocketAddr::new(self.peer, self.remote_port)
    }

    /// Port this end sends from.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Last block sent or received.
    pub fn block(&self) -> Block {
        self.block
    }

    /// Negotiated block size.
    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    /// Negotiated retransmission timeout, before any back-off.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Announced file size, 0 if unknown.
    pub fn transfer_size(&self) -> u64 {
        self.transfer_size
    }

    /// Retransmissions of the current packet so far.
    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    /// Wait armed with the last packet. Zero means no timer.
    pub fn block_timeout(&self) -> Duration {
        self.block_timeout
    }

    /// Whether the options were negotiated.
    pub fn use_options(&self) -> bool {
        self.use_options
    }

    /// The ERROR that ended the transfer, received or sent.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::MAX_BLOCK_SIZE;

    fn server_addr() -> SocketAddr {
        "10.0.0.1:69".parse().unwrap()
    }

    #[test]
    fn test_client_proposes_options_when_enabled() {
        let config = Config::default();
        let request = ClientRequest::write("a.bin", Mode::Octet, 1234);
        let ctx = Context::client(&config, request, server_addr(), 4000, MAX_BLOCK_SIZE);

        assert_eq!(ctx.state(), State::Start);
        assert!(ctx.use_options());
        assert_eq!(ctx.block_size(), MAX_BLOCK_SIZE);
        assert_eq!(ctx.transfer_size(), 1234);
        assert_eq!(ctx.peer_addr(), server_addr());
        assert!(ctx.sends_data());
    }

    #[test]
    fn test_client_without_options_uses_defaults() {
        let config = Config::default().with_options(false);
        let request = ClientRequest::read("a.bin", Mode::Octet);
        let ctx = Context::client(&config, request, server_addr(), 4000, 600);

        assert!(!ctx.use_options());
        assert_eq!(ctx.block_size(), DEFAULT_BLOCK_SIZE);
        assert!(!ctx.sends_data());
    }

    #[test]
    fn test_transport_limits_block_size() {
        let config = Config::default();
        let ctx = Context::server(&config, 69, 4000, 600);
        assert_eq!(ctx.max_block_size, 600);
        assert_eq!(ctx.max_packet_size(), 604);
    }

    #[test]
    fn test_reseed_points_at_client() {
        let config = Config::default();
        let mut ctx = Context::server(&config, 69, 4000, MAX_BLOCK_SIZE);
        let client: SocketAddr = "10.0.0.2:3456".parse().unwrap();
        ctx.reseed(Operation::Write, client);

        assert_eq!(ctx.peer_addr(), client);
        assert_eq!(ctx.operation(), Operation::Write);
        assert!(!ctx.sends_data());
    }

    #[test]
    fn test_wire_seconds() {
        assert_eq!(wire_seconds(Duration::from_millis(200)), 1);
        assert_eq!(wire_seconds(Duration::from_secs(3)), 3);
        assert_eq!(wire_seconds(Duration::from_secs(1000)), 255);
    }
}
