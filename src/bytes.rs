use std::convert::AsRef;
use std::io::{self, ErrorKind};
use std::mem::size_of;

use crate::util::FirstNul;

pub trait FromBytes: Sized {
    type Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, Self::Error>;
}

pub trait IntoBytes {
    fn into_bytes(self) -> Vec<u8>;
}

#[derive(Debug)]
pub struct Bytes<T>(T);

impl<T> Bytes<T> {
    pub fn new(val: T) -> Self {
        Self(val)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Bytes<u16> {
    /// Reads a big-endian `u16` off the front of `bytes`, returning the rest.
    pub fn take(bytes: &[u8]) -> io::Result<(Self, &[u8])> {
        if bytes.len() < size_of::<u16>() {
            return Err(ErrorKind::UnexpectedEof.into());
        }

        let (head, rest) = bytes.split_at(size_of::<u16>());
        Ok((Self::from_bytes(head)?, rest))
    }
}

impl FromBytes for Bytes<u16> {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> io::Result<Self> {
        let bytes = bytes.as_ref();

        if bytes.len() != size_of::<u16>() {
            return Err(ErrorKind::InvalidInput.into());
        }

        let mut bs = [0u8; size_of::<u16>()];
        bs.copy_from_slice(bytes);
        let be = u16::from_be_bytes(bs);

        Ok(Self(be))
    }
}

impl IntoBytes for Bytes<u16> {
    fn into_bytes(self) -> Vec<u8> {
        let bytes = self.0.to_be_bytes();
        bytes.to_vec()
    }
}

impl Bytes<String> {
    /// Reads a NUL-terminated string off the front of `bytes`, returning the
    /// bytes following the terminator.
    pub fn take(bytes: &[u8]) -> io::Result<(Self, &[u8])> {
        let nul = match bytes.first_nul_idx() {
            Some(idx) => idx,
            None => return Err(ErrorKind::InvalidInput.into()),
        };

        let (s, rest) = bytes.split_at(nul + 1);
        Ok((Self::from_bytes(s)?, rest))
    }
}

impl FromBytes for Bytes<String> {
    type Error = io::Error;

    /// Expects exactly one NUL byte, at the very end.
    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> io::Result<Self> {
        let bytes = bytes.as_ref();

        match bytes.first_nul_idx() {
            Some(idx) if idx + 1 == bytes.len() => {}
            _ => return Err(ErrorKind::InvalidInput.into()),
        }

        let s = String::from_utf8(bytes[..bytes.len() - 1].to_vec())
            .map_err(|_| io::Error::from(ErrorKind::InvalidInput))?;

        Ok(Self(s))
    }
}

impl IntoBytes for Bytes<String> {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.0.into_bytes();
        bytes.push(0);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_is_big_endian() {
        assert_eq!(Bytes::new(0x0102u16).into_bytes(), vec![0x01, 0x02]);
        assert_eq!(Bytes::<u16>::from_bytes(&[0x01, 0x02]).unwrap().into_inner(), 0x0102);
        assert!(Bytes::<u16>::from_bytes(&[0x01]).is_err());
        assert!(Bytes::<u16>::from_bytes(&[0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn test_take_u16_leaves_the_rest() {
        let (val, rest) = Bytes::<u16>::take(&[0, 7, 9, 9]).unwrap();
        assert_eq!(val.into_inner(), 7);
        assert_eq!(rest, &[9, 9]);

        assert_eq!(
            Bytes::<u16>::take(&[0]).unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_strings_are_nul_terminated() {
        assert_eq!(Bytes::new("hi".to_string()).into_bytes(), b"hi\0".to_vec());
        assert_eq!(Bytes::<String>::from_bytes(b"hi\0").unwrap().into_inner(), "hi");
        assert!(Bytes::<String>::from_bytes(b"hi").is_err());
        assert!(Bytes::<String>::from_bytes(b"h\0i\0").is_err());

        let (s, rest) = Bytes::<String>::take(b"a.txt\0octet\0").unwrap();
        assert_eq!(s.into_inner(), "a.txt");
        assert_eq!(rest, b"octet\0");
        assert!(Bytes::<String>::take(b"no terminator").is_err());
    }
}
