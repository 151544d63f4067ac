//! The event-driven state machine that moves one file.
//!
//! A [`Transfer`] owns its [`Context`] and its [`Handler`] and reacts to one
//! [`Event`] at a time. It never blocks and never owns a socket: every packet
//! goes out through the [`Transport`] passed to the call that produced it.
//!
//! The side sending DATA keeps `block` at the last block it sent and waits
//! for the matching ACK. The side receiving DATA keeps `block` at the last
//! block it accepted and waits for the one after it. Anything else from the
//! peer is dropped and left to the retransmission timer.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bytes::{Bytes, FromBytes, IntoBytes};
use crate::context::{wire_seconds, Context, Operation, Role, State};
use crate::handler::{Handler, Payload, Status};
use crate::packet::{
    self, Ack, Block, Data, ErrorCode, Opcode, Options, Packet, Request, DEFAULT_BLOCK_SIZE,
};
use crate::transport::{Datagram, Event, Transport};

const NO_TIMER: Duration = Duration::from_secs(0);

/// Reads the opcode of a datagram without decoding the rest.
pub(crate) fn peek_opcode(payload: &[u8]) -> Option<Opcode> {
    let (code, _) = Bytes::<u16>::take(payload).ok()?;
    Opcode::from_u16(code.into_inner()).ok()
}

/// One file transfer, client or server side.
pub struct Transfer<H> {
    ctx: Context,
    handler: H,
    status: Option<Status>,
    stop_requested: bool,
}

impl<H: Handler> Transfer<H> {
    /// Wraps a fresh context. Nothing is sent until [`Transfer::begin`] or
    /// the first event.
    pub fn new(ctx: Context, handler: H) -> Self {
        Self {
            ctx,
            handler,
            status: None,
            stop_requested: false,
        }
    }

    /// The transfer's state record.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Shorthand for `context().state()`.
    pub fn state(&self) -> State {
        self.ctx.state
    }

    /// How the transfer ended, once it has.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Whether a [`Event::Stop`] arrived while the transfer was running.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// The handler moving the file contents.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the transfer, returning its handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Sends the request of a client transfer. Does nothing for a server or
    /// for a transfer that already started.
    pub fn begin<T: Transport>(&mut self, transport: &mut T) -> State {
        if self.ctx.role != Role::Client || self.ctx.state != State::Start {
            return self.ctx.state;
        }

        if self.ctx.file_name.len() + 1 >= self.ctx.max_filename_len {
            self.fail("Filename too long", transport);
            return self.ctx.state;
        }

        let options = if self.ctx.use_options {
            Options {
                block_size: Some(self.ctx.block_size),
                timeout: Some(wire_seconds(self.ctx.timeout)),
                transfer_size: Some(self.ctx.transfer_size),
            }
        } else {
            Options::default()
        };
        self.ctx.proposed = options;

        let request = Request::new(&self.ctx.file_name, self.ctx.mode).with_options(options);
        let packet = match self.ctx.operation {
            Operation::Read => Packet::Rrq(request),
            Operation::Write => Packet::Wrq(request),
        };

        info!(
            "requesting {} of {:?} from {}",
            self.ctx.operation,
            self.ctx.file_name,
            self.ctx.peer_addr()
        );

        self.ctx.state = State::Negotiate;
        self.ctx.block_timeout = self.ctx.timeout;
        self.send(packet, transport);

        self.ctx.state
    }

    /// Feeds one event to the transfer and returns the state it is in
    /// afterwards.
    pub fn handle<T: Transport>(&mut self, event: Event, transport: &mut T) -> State {
        match event {
            Event::Stop => self.stop_requested = true,
            _ if self.ctx.state.is_terminal() => {}
            Event::Timeout(token) if self.ctx.timer == Some(token) => self.on_timeout(transport),
            Event::Timeout(token) => debug!("ignoring stale timer {:?}", token),
            Event::Datagram(datagram) => self.on_datagram(datagram, transport),
        }

        self.ctx.state
    }

    /// Drives the transfer to a terminal state with events from `transport`.
    ///
    /// The local port must already be registered. A server transfer must
    /// have been handed its request through [`Transfer::handle`] first.
    pub fn run<T: Transport>(&mut self, transport: &mut T) -> io::Result<Status> {
        self.begin(transport);

        while !self.ctx.state.is_terminal() {
            let event = match transport.next_event() {
                Ok(event) => event,
                Err(e) => {
                    self.fail(&format!("transport failed: {}", e), transport);
                    return Err(e);
                }
            };

            self.handle(event, transport);
        }

        Ok(self.status.unwrap_or(Status::InternalError))
    }

    fn on_datagram<T: Transport>(&mut self, datagram: Datagram, transport: &mut T) {
        match (self.ctx.role, self.ctx.state) {
            (Role::Server, State::Start) => return self.on_request(datagram, transport),
            (Role::Client, State::Start) => {
                debug!("dropping datagram from {} before the request", datagram.source);
                return;
            }
            _ => {}
        }

        if datagram.local_port != self.ctx.local_port {
            debug!("dropping datagram for port {}", datagram.local_port);
            return;
        }

        if !self.from_peer(&datagram, transport) {
            return;
        }

        let packet = match Packet::from_bytes(&datagram.payload) {
            Ok(packet) => packet,
            // An ERROR is never answered, even one cut short before its code.
            Err(_) if peek_opcode(&datagram.payload) == Some(Opcode::Error) => {
                self.adopt_peer(datagram.source);
                let err = packet::Error::new(ErrorCode::NotDefined, "");
                return self.on_peer_error(err, transport);
            }
            Err(e) if peek_opcode(&datagram.payload).is_some() => {
                self.adopt_peer(datagram.source);
                let message = format!("malformed packet: {}", e);
                return self.abort(ErrorCode::IllegalOperation, message, transport);
            }
            Err(_) => {
                debug!("dropping datagram with unknown opcode from {}", datagram.source);
                return;
            }
        };

        let negotiating = self.ctx.role == Role::Client && self.ctx.state == State::Negotiate;
        match packet {
            Packet::Error(err) => self.on_peer_error(err, transport),
            Packet::OAck(options) if negotiating => {
                self.on_oack(options, datagram.source, transport)
            }
            Packet::Data(data) if !self.ctx.sends_data() => {
                self.on_data(data, datagram.source, transport)
            }
            Packet::Ack(ack) if self.ctx.sends_data() => {
                self.on_ack(ack, datagram.source, transport)
            }
            other => debug!(
                "dropping unexpected {} while in {:?}",
                other.opcode(),
                self.ctx.state
            ),
        }
    }

    /// Checks the transfer ID of a datagram. Until a client hears back from
    /// the server any source is accepted.
    fn from_peer<T: Transport>(&mut self, datagram: &Datagram, transport: &mut T) -> bool {
        if self.ctx.role == Role::Client && self.ctx.state == State::Negotiate {
            return true;
        }

        if datagram.source == self.ctx.peer_addr() {
            return true;
        }

        warn!("datagram from unknown transfer id {}", datagram.source);
        let reply = Packet::error(ErrorCode::UnknownTid, ErrorCode::UnknownTid.as_str());
        if let Err(e) = transport.send_to(self.ctx.local_port, datagram.source, &reply.into_bytes())
        {
            debug!("failed to reject {}: {}", datagram.source, e);
        }

        false
    }

    fn adopt_peer(&mut self, source: SocketAddr) {
        if self.ctx.role == Role::Client && self.ctx.state == State::Negotiate {
            self.ctx.peer = source.ip();
            self.ctx.remote_port = source.port();
        }
    }

    /// A client heard back without an OACK: the server ignored the options.
    fn settle_without_options(&mut self, source: SocketAddr) {
        if self.ctx.role != Role::Client || self.ctx.state != State::Negotiate {
            return;
        }

        self.adopt_peer(source);
        if self.ctx.use_options {
            debug!("{} ignored the options, using defaults", source);
            let transfer_size = self.ctx.transfer_size;
            self.ctx.set_default_options();
            if self.ctx.operation == Operation::Write {
                self.ctx.transfer_size = transfer_size;
            }
        }
    }

    fn on_request<T: Transport>(&mut self, datagram: Datagram, transport: &mut T) {
        if datagram.local_port != self.ctx.server_port {
            debug!("dropping datagram for port {}", datagram.local_port);
            return;
        }

        let operation = match peek_opcode(&datagram.payload) {
            Some(Opcode::Rrq) => Operation::Read,
            Some(Opcode::Wrq) => Operation::Write,
            _ => {
                debug!("dropping non-request datagram from {}", datagram.source);
                return;
            }
        };
        self.ctx.reseed(operation, datagram.source);

        let request = match Packet::from_bytes(&datagram.payload) {
            Ok(Packet::Rrq(request)) | Ok(Packet::Wrq(request)) => request,
            Ok(_) => return,
            Err(e) => {
                let message = format!("malformed request: {}", e);
                return self.abort(ErrorCode::IllegalOperation, message, transport);
            }
        };

        if request.filename.len() + 1 >= self.ctx.max_filename_len {
            self.ctx.file_name = request.filename;
            return self.abort(
                ErrorCode::IllegalOperation,
                "Filename too long".to_string(),
                transport,
            );
        }

        self.ctx.file_name = request.filename;
        self.ctx.mode = request.mode;

        let offered = self.ctx.enable_options && !request.options.is_empty();
        let mut reply = Options::default();
        if offered {
            let mut block_size = DEFAULT_BLOCK_SIZE;
            if let Some(size) = request.options.block_size {
                block_size = size.min(self.ctx.max_block_size);
                reply.block_size = Some(block_size);
            }

            let mut timeout = self.ctx.config_timeout;
            if let Some(secs) = request.options.timeout {
                timeout = Duration::from_secs(secs.into());
                reply.timeout = Some(secs);
            }

            let transfer_size = request.options.transfer_size.unwrap_or(0);
            self.ctx.set_options(block_size, timeout, transfer_size);
        }

        let mut transfer_size = self.ctx.transfer_size;
        let accepted = self.handler.start(
            operation,
            self.ctx.mode,
            &self.ctx.file_name,
            &mut transfer_size,
        );
        if !accepted {
            return self.abort(
                ErrorCode::AccessViolation,
                "Blocked by user application".to_string(),
                transport,
            );
        }
        self.ctx.transfer_size = transfer_size;
        if offered && request.options.transfer_size.is_some() {
            reply.transfer_size = Some(transfer_size);
        }

        info!(
            "serving {} of {:?} to {}",
            operation,
            self.ctx.file_name,
            self.ctx.peer_addr()
        );

        self.ctx.state = State::Negotiate;
        self.ctx.block_timeout = self.ctx.timeout;
        if offered {
            self.send(Packet::oack(reply), transport);
        } else if operation == Operation::Read {
            self.ctx.block = Block::new(1);
            self.send_block(transport);
        } else {
            self.send(Packet::ack(Block::new(0)), transport);
        }
    }

    fn on_oack<T: Transport>(&mut self, options: Options, source: SocketAddr, transport: &mut T) {
        self.adopt_peer(source);
        let proposed = self.ctx.proposed;

        let block_size = match options.block_size {
            Some(size) if proposed.block_size.map_or(true, |max| size > max) => {
                let message = format!("unexpected blksize {}", size);
                return self.abort(ErrorCode::OptionNegotiation, message, transport);
            }
            Some(size) => size,
            None => DEFAULT_BLOCK_SIZE,
        };

        // Our own timeout may be finer than the whole seconds sent for it.
        let timeout = match options.timeout {
            Some(secs) if Some(secs) != proposed.timeout => Duration::from_secs(secs.into()),
            _ => self.ctx.config_timeout,
        };

        let transfer_size = match (self.ctx.operation, options.transfer_size) {
            (_, Some(size)) => size,
            (Operation::Write, None) => self.ctx.transfer_size,
            (Operation::Read, None) => 0,
        };

        self.ctx.set_options(block_size, timeout, transfer_size);
        debug!("negotiated {:?} with {}", options, source);

        if self.ctx.operation == Operation::Read && options.transfer_size.is_some() {
            let mut size = transfer_size;
            let accepted = self.handler.start(
                Operation::Read,
                self.ctx.mode,
                &self.ctx.file_name,
                &mut size,
            );
            if !accepted {
                return self.abort(
                    ErrorCode::AccessViolation,
                    "Blocked by user application".to_string(),
                    transport,
                );
            }
        }

        self.ctx.state = State::Transfer;
        self.ctx.retry_count = 0;
        match self.ctx.operation {
            Operation::Write => {
                self.ctx.block = Block::new(1);
                self.send_block(transport);
            }
            Operation::Read => {
                self.ctx.block_timeout = self.ctx.timeout;
                self.send(Packet::ack(Block::new(0)), transport);
            }
        }
    }

    fn on_data<T: Transport>(&mut self, data: Data, source: SocketAddr, transport: &mut T) {
        let expected = self.ctx.block.next();
        if data.block != expected {
            debug!("dropping DATA {} while expecting {}", data.block, expected);
            return;
        }

        self.settle_without_options(source);

        let len = data.data.len();
        if len > self.ctx.block_size as usize {
            let message = format!(
                "DATA of {} bytes exceeds the block size of {}",
                len, self.ctx.block_size
            );
            return self.abort(ErrorCode::IllegalOperation, message, transport);
        }

        if let Err(e) = self.handler.data(self.ctx.offset, Payload::Received(&data.data)) {
            return self.abort(e.kind().into(), e.to_string(), transport);
        }

        self.ctx.block = data.block;
        self.ctx.offset += len as u64;
        self.ctx.retry_count = 0;
        self.ctx.state = State::Transfer;

        if len < self.ctx.block_size as usize {
            // Nothing follows the final ACK, so it is never retransmitted.
            self.ctx.block_timeout = NO_TIMER;
            if self.send(Packet::ack(data.block), transport) {
                self.finish(Status::Success, None, transport);
            }
        } else {
            self.ctx.block_timeout = self.ctx.timeout;
            self.send(Packet::ack(data.block), transport);
        }
    }

    fn on_ack<T: Transport>(&mut self, ack: Ack, source: SocketAddr, transport: &mut T) {
        if ack.block != self.ctx.block {
            debug!("dropping ACK {} while expecting {}", ack.block, self.ctx.block);
            return;
        }

        self.settle_without_options(source);
        self.ctx.retry_count = 0;
        self.ctx.offset += self.ctx.pending_len as u64;
        self.ctx.pending_len = 0;

        if self.ctx.write_finished {
            return self.finish(Status::Success, None, transport);
        }

        self.ctx.block = self.ctx.block.next();
        self.ctx.state = State::Transfer;
        self.send_block(transport);
    }

    fn on_peer_error<T: Transport>(&mut self, err: packet::Error, transport: &mut T) {
        warn!("{} aborted the transfer: {}", self.ctx.peer_addr(), err);
        let message = err.message.clone();
        self.ctx.error = Some(err);
        self.finish(Status::PeerError, Some(&message), transport);
    }

    fn on_timeout<T: Transport>(&mut self, transport: &mut T) {
        self.ctx.timer = None;
        self.ctx.retry_count += 1;

        if self.ctx.retry_count > self.ctx.max_retries {
            // The server's transfer id is unknown until it answers.
            if self.ctx.state != State::Negotiate || self.ctx.role == Role::Server {
                let bye = Packet::error(ErrorCode::NotDefined, "exceeded max retransmissions");
                let peer = self.ctx.peer_addr();
                if let Err(e) = transport.send_to(self.ctx.local_port, peer, &bye.into_bytes()) {
                    debug!("failed to tell {} the transfer is over: {}", peer, e);
                }
            }
            return self.fail("peer lost", transport);
        }

        self.ctx.block_timeout = self
            .ctx
            .block_timeout
            .checked_mul(2)
            .unwrap_or(self.ctx.block_timeout);

        debug!(
            "retransmitting to {} ({}/{})",
            self.ctx.peer_addr(),
            self.ctx.retry_count,
            self.ctx.max_retries
        );

        let sent = transport.send_to(
            self.ctx.local_port,
            self.ctx.peer_addr(),
            &self.ctx.last_packet,
        );
        match sent {
            Ok(()) => self.arm(transport),
            Err(e) => self.fail(&format!("send failed: {}", e), transport),
        }
    }

    /// Asks the handler for the block at the current offset and sends it.
    fn send_block<T: Transport>(&mut self, transport: &mut T) {
        let block_size = self.ctx.block_size as usize;
        let mut buf = vec![0; block_size];

        let len = match self.handler.data(self.ctx.offset, Payload::Fill(&mut buf)) {
            Ok(len) if len <= block_size => len,
            Ok(len) => {
                let message = format!("{} bytes do not fit a block of {}", len, block_size);
                return self.abort(ErrorCode::NotDefined, message, transport);
            }
            Err(e) => return self.abort(e.kind().into(), e.to_string(), transport),
        };
        buf.truncate(len);

        self.ctx.pending_len = len;
        self.ctx.write_finished = len < block_size;
        self.ctx.block_timeout = self.ctx.timeout;
        self.send(Packet::data(self.ctx.block, buf), transport);
    }

    /// Sends a packet to the peer and remembers it for retransmission.
    /// Returns `false` if the transfer failed instead.
    fn send<T: Transport>(&mut self, packet: Packet, transport: &mut T) -> bool {
        let bytes = packet.into_bytes();
        if bytes.len() > self.ctx.max_packet_size() {
            self.fail("packet does not fit the transfer buffer", transport);
            return false;
        }

        if let Err(e) = transport.send_to(self.ctx.local_port, self.ctx.peer_addr(), &bytes) {
            self.fail(&format!("send failed: {}", e), transport);
            return false;
        }

        self.ctx.last_packet = bytes;
        self.arm(transport);
        true
    }

    fn arm<T: Transport>(&mut self, transport: &mut T) {
        if self.ctx.block_timeout == NO_TIMER {
            transport.cancel_timer();
            self.ctx.timer = None;
        } else {
            self.ctx.timer = Some(transport.set_timer(self.ctx.block_timeout));
        }
    }

    /// Tells the peer why the transfer ends, then ends it.
    fn abort<T: Transport>(&mut self, code: ErrorCode, message: String, transport: &mut T) {
        let err = packet::Error::new(code, message);
        let bytes = Packet::Error(err.clone()).into_bytes();
        if let Err(e) = transport.send_to(self.ctx.local_port, self.ctx.peer_addr(), &bytes) {
            debug!("failed to send {}: {}", err, e);
        }

        self.ctx.block_timeout = NO_TIMER;
        let message = err.message.clone();
        self.ctx.error = Some(err);
        self.finish(Status::InternalError, Some(&message), transport);
    }

    /// Ends the transfer without telling the peer.
    fn fail<T: Transport>(&mut self, message: &str, transport: &mut T) {
        self.ctx.error = Some(packet::Error::new(ErrorCode::NotDefined, message));
        self.finish(Status::InternalError, Some(message), transport);
    }

    fn finish<T: Transport>(&mut self, status: Status, message: Option<&str>, transport: &mut T) {
        if self.status.is_some() {
            return;
        }

        transport.cancel_timer();
        self.ctx.timer = None;
        self.ctx.state = if status.is_success() {
            State::Done
        } else {
            State::Failed
        };
        self.status = Some(status);

        match message {
            None => info!(
                "{} of {:?} finished: {} bytes",
                self.ctx.operation, self.ctx.file_name, self.ctx.offset
            ),
            Some(message) => warn!(
                "{} of {:?} failed ({}): {}",
                self.ctx.operation, self.ctx.file_name, status, message
            ),
        }

        self.handler.stop(status, message);
    }
}
