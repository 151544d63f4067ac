//! The DATA packet.

use std::io::{self, Result};

use super::Block;
use crate::bytes::{Bytes, FromBytes, IntoBytes};

/// One numbered block of the transferred file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Data {
    /// Position of the block in the file, counting from 1.
    pub block: Block,

    /// Up to one block size of file contents. A shorter block is the last.
    pub data: Vec<u8>,
}

impl Data {
    /// Copies `data` into a new block.
    pub fn new<T: AsRef<[u8]>>(block: Block, data: T) -> Self {
        Self {
            block,
            data: data.as_ref().to_vec(),
        }
    }
}

impl FromBytes for Data {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let (block, data) = Bytes::<u16>::take(bytes.as_ref())?;

        Ok(Self {
            block: Block::new(block.into_inner()),
            data: data.to_vec(),
        })
    }
}

impl IntoBytes for Data {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.block.into_bytes();
        let mut data = self.data;
        bytes.append(&mut data);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let input = vec![0x00, 0x01, b'p', b'o', b't', b'a', b't', b'o'];
        let actual = Data::from_bytes(&input[..]).unwrap();

        assert_eq!(actual.block, Block::new(1));
        assert_eq!(actual.data, b"potato");

        let actual = Data::from_bytes(&[0, 2]).unwrap();

        assert_eq!(actual.block, Block::new(2));
        assert!(actual.data.is_empty());

        assert!(Data::from_bytes(&[0]).is_err());
    }

    #[test]
    fn test_into_bytes() {
        let data = Data::new(Block::new(0x0132), &[1, 2, 3]);
        assert_eq!(&data.into_bytes()[..], &[0x01, 0x32, 1, 2, 3]);
    }
}
