//! The ACK packet.

use std::io::{self, ErrorKind, Result};

use super::Block;
use crate::bytes::{Bytes, FromBytes, IntoBytes};

/// Acknowledges the block with the same number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ack {
    /// The block being acknowledged. Block 0 answers a write request.
    pub block: Block,
}

impl FromBytes for Ack {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let (block, rest) = Bytes::<u16>::take(bytes.as_ref())?;

        if !rest.is_empty() {
            return Err(ErrorKind::InvalidInput.into());
        }

        Ok(Self {
            block: Block::new(block.into_inner()),
        })
    }
}

impl IntoBytes for Ack {
    fn into_bytes(self) -> Vec<u8> {
        self.block.into_bytes()
    }
}
