//! The `tftp` crate provides an event-driven implementation of the Trivial
//! File Transfer Protocol (RFC 1350) with the option extension (RFC 2347)
//! and the `blksize`, `timeout` and `tsize` options (RFC 2348, RFC 2349):
//!
//! * The protocol: types that represent TFTP packets and their encoding.
//! * A transfer state machine that reacts to one datagram or timer expiry
//!   at a time and never owns a socket.
//! * A client
//! * A server that serves one transfer at a time
//!
//! File contents flow through a [`Handler`]; datagrams and timers through a
//! [`Transport`](transport::Transport). [`UdpTransport`] puts both on std
//! UDP sockets.
//!
//! For more information, please see [THE TFTP PROTOCOL (REVISION 2)](
//! https://tools.ietf.org/html/rfc1350).
//!
//! ## Try it out
//!
//! In one terminal window, start up the server:
//!
//! ```console
//! $ cargo run --example server -- 127.0.0.1:6655 ./artifacts
//! ```
//!
//! Then in another window:
//!
//! ```console
//! $ cargo run --example client -- 127.0.0.1:6655 get alice-in-wonderland.txt
//! ```
//!
//! Alternatively, you may connect to your server from another host.

#![deny(missing_docs)]

use std::time::Duration;

/// The well-known port requests are sent to.
pub const DEFAULT_SERVER_PORT: u16 = 69;

/// How long to wait for a reply before retransmitting, unless negotiated.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// How many times the last packet is retransmitted before giving up.
pub const DEFAULT_MAX_RETRANSMISSIONS: usize = 5;

/// Lowest port picked for the local end of a transfer.
pub const MIN_PORT_NUMBER: u16 = 1001;

/// Longest file name accepted in a request, counting its terminator.
pub const DEFAULT_MAX_FILENAME_LEN: usize = 64;

/// POD struct representing the configuration of the retransmission of packets
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct RetransmissionConfig {
    /// How long should we wait for a reply before retransmitting the last packet?
    /// Doubles with every retransmission of the same packet.
    timeout: Duration,

    /// How many times should we retransmit the last packet?
    ///
    /// Note that this is the number of *retransmissions*, not transmissions, so
    /// setting this to `0` means that the packet will still be sent once.
    max_retransmissions: usize,
}

impl RetransmissionConfig {
    /// Creates a config. A zero `timeout` is raised to one millisecond.
    pub fn new(timeout: Duration, max_retransmissions: usize) -> Self {
        Self {
            timeout: timeout.max(Duration::from_millis(1)),
            max_retransmissions,
        }
    }

    /// Initial wait for a reply.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retransmissions of one packet before the peer is considered lost.
    pub fn max_retransmissions(&self) -> usize {
        self.max_retransmissions
    }
}

impl Default for RetransmissionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_RETRANSMISSIONS)
    }
}

/// Settings shared by clients and servers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// Port the server listens on and clients send requests to.
    pub server_port: u16,

    /// Largest block size proposed or accepted through `blksize`. Never
    /// exceeds what the transport can carry.
    pub block_size: u16,

    /// Retransmission timing.
    pub retransmission: RetransmissionConfig,

    /// Whether to use the option extension at all.
    pub enable_options: bool,

    /// Longest acceptable file name, counting its terminator.
    pub max_filename_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            block_size: packet::MAX_BLOCK_SIZE,
            retransmission: RetransmissionConfig::default(),
            enable_options: true,
            max_filename_len: DEFAULT_MAX_FILENAME_LEN,
        }
    }
}

impl Config {
    /// Sets the listening port.
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// Sets the largest negotiated block size, kept within
    /// `MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE`.
    pub fn with_block_size(mut self, block_size: u16) -> Self {
        self.block_size = block_size.max(packet::MIN_BLOCK_SIZE).min(packet::MAX_BLOCK_SIZE);
        self
    }

    /// Sets the retransmission timing.
    pub fn with_retransmission(mut self, retransmission: RetransmissionConfig) -> Self {
        self.retransmission = retransmission;
        self
    }

    /// Turns the option extension on or off.
    pub fn with_options(mut self, enable: bool) -> Self {
        self.enable_options = enable;
        self
    }

    /// Sets the longest acceptable file name.
    pub fn with_max_filename_len(mut self, len: usize) -> Self {
        self.max_filename_len = len;
        self
    }
}

mod bytes;
pub mod client;
pub mod context;
mod directory;
pub mod handler;
pub mod packet;
pub mod server;
pub mod transfer;
pub mod transport;
mod util;

pub use client::Client;
pub use context::{ClientRequest, Context, Operation, Role, State};
pub use directory::Directory;
pub use handler::{Handler, Payload, Sink, Source, Status};
pub use server::{Server, ServerHandle};
pub use transfer::Transfer;
pub use transport::UdpTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.server_port, 69);
        assert_eq!(config.block_size, 1428);
        assert_eq!(config.retransmission.timeout(), Duration::from_secs(1));
        assert_eq!(config.retransmission.max_retransmissions(), 5);
        assert!(config.enable_options);
    }

    #[test]
    fn test_block_size_is_clamped() {
        assert_eq!(Config::default().with_block_size(1).block_size, 8);
        assert_eq!(Config::default().with_block_size(9000).block_size, 1428);
        assert_eq!(Config::default().with_block_size(600).block_size, 600);
    }
}
