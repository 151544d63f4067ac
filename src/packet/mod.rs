//! Types that represent TFTP packets and their wire encoding.
//!
//! Every datagram starts with a big-endian 16-bit [`Opcode`]; decoding
//! dispatches on it alone and yields one variant of [`Packet`].

use std::fmt;
use std::io::{self, Result};

use crate::bytes::{Bytes, FromBytes, IntoBytes};

mod ack;
mod data;
mod error;
mod mode;
mod opcode;
mod options;
mod request;

pub use ack::Ack;
pub use data::Data;
pub use error::{Error, ErrorCode};
pub use mode::Mode;
pub use opcode::Opcode;
pub use options::Options;
pub use request::Request;

/// Block size used when no `blksize` option was negotiated.
pub const DEFAULT_BLOCK_SIZE: u16 = 512;

/// Smallest block size accepted in a `blksize` option (RFC 2348).
pub const MIN_BLOCK_SIZE: u16 = 8;

/// Largest block size this implementation negotiates. Fits an Ethernet
/// frame once IP, UDP and TFTP headers are added.
pub const MAX_BLOCK_SIZE: u16 = 1428;

/// Opcode plus block number.
pub const HEADER_SIZE: usize = 4;

/// Upper bound for any datagram this implementation sends or expects.
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_BLOCK_SIZE as usize;

/// A 16-bit block number. Arithmetic wraps silently past 65535.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Block(u16);

impl Block {
    /// Block number `n`.
    pub const fn new(n: u16) -> Self {
        Self(n)
    }

    /// The raw number.
    pub fn get(self) -> u16 {
        self.0
    }

    /// The block following this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromBytes for Block {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        Ok(Self(Bytes::<u16>::from_bytes(bytes)?.into_inner()))
    }
}

impl IntoBytes for Block {
    fn into_bytes(self) -> Vec<u8> {
        Bytes::new(self.0).into_bytes()
    }
}

/// A decoded TFTP datagram.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Packet {
    /// Read request.
    Rrq(Request),

    /// Write request.
    Wrq(Request),

    /// A block of file data.
    Data(Data),

    /// Acknowledgement of a block.
    Ack(Ack),

    /// Terminates the transfer.
    Error(Error),

    /// Acknowledges the options of a request.
    OAck(Options),
}

impl Packet {
    /// A read request.
    pub fn rrq<S: AsRef<str>>(file: S, mode: Mode, options: Options) -> Self {
        Packet::Rrq(Request::new(file, mode).with_options(options))
    }

    /// A write request.
    pub fn wrq<S: AsRef<str>>(file: S, mode: Mode, options: Options) -> Self {
        Packet::Wrq(Request::new(file, mode).with_options(options))
    }

    /// A DATA packet.
    pub fn data<T: AsRef<[u8]>>(block: Block, data: T) -> Self {
        Packet::Data(Data::new(block, data))
    }

    /// An ACK packet.
    pub fn ack(block: Block) -> Self {
        Packet::Ack(Ack { block })
    }

    /// An ERROR packet.
    pub fn error<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Packet::Error(Error::new(code, message))
    }

    /// An OACK packet.
    pub fn oack(options: Options) -> Self {
        Packet::OAck(options)
    }

    /// The opcode this packet is encoded with.
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Rrq(_) => Opcode::Rrq,
            Packet::Wrq(_) => Opcode::Wrq,
            Packet::Data(_) => Opcode::Data,
            Packet::Ack(_) => Opcode::Ack,
            Packet::Error(_) => Opcode::Error,
            Packet::OAck(_) => Opcode::Oack,
        }
    }
}

impl FromBytes for Packet {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let (opcode, body) = Bytes::<u16>::take(bytes.as_ref())?;

        Ok(match Opcode::from_u16(opcode.into_inner())? {
            Opcode::Rrq => Packet::Rrq(Request::from_bytes(body)?),
            Opcode::Wrq => Packet::Wrq(Request::from_bytes(body)?),
            Opcode::Data => Packet::Data(Data::from_bytes(body)?),
            Opcode::Ack => Packet::Ack(Ack::from_bytes(body)?),
            Opcode::Error => Packet::Error(Error::from_bytes(body)?),
            Opcode::Oack => Packet::OAck(Options::from_bytes(body)?),
        })
    }
}

impl IntoBytes for Packet {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.opcode().into_bytes();
        let mut body = match self {
            Packet::Rrq(rq) | Packet::Wrq(rq) => rq.into_bytes(),
            Packet::Data(data) => data.into_bytes(),
            Packet::Ack(ack) => ack.into_bytes(),
            Packet::Error(err) => err.into_bytes(),
            Packet::OAck(options) => options.into_bytes(),
        };
        bytes.append(&mut body);
        bytes
    }
}
