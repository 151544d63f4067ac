//! The body shared by read and write requests.

use std::io::{self, Result};
use std::str::FromStr;

use super::mode::Mode;
use super::options::Options;
use crate::bytes::{Bytes, FromBytes, IntoBytes};

/// A read or write request: `filename\0mode\0[options...]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    /// The file the peer wants to read or write.
    pub filename: String,

    /// The transfer mode.
    pub mode: Mode,

    /// Options proposed by the requester, if any.
    pub options: Options,
}

impl Request {
    /// Creates a request without options.
    pub fn new<T: AsRef<str>>(filename: T, mode: Mode) -> Self {
        Self {
            filename: filename.as_ref().to_string(),
            mode,
            options: Options::default(),
        }
    }

    /// Attaches options to the request.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

impl FromBytes for Request {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let (filename, rest) = Bytes::<String>::take(bytes.as_ref())?;
        let (mode, rest) = Bytes::<String>::take(rest)?;
        let mode = Mode::from_str(&mode.into_inner())?;
        let options = Options::from_bytes(rest)?;

        Ok(Self {
            filename: filename.into_inner(),
            mode,
            options,
        })
    }
}

impl IntoBytes for Request {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Bytes::new(self.filename).into_bytes();
        bytes.append(&mut self.mode.into_bytes());
        bytes.append(&mut self.options.into_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_bytes() {
        let rq = Request::from_bytes(b"hi.txt\0NETASCII\0").unwrap();
        assert_eq!(rq.filename, "hi.txt");
        assert_eq!(rq.mode, Mode::NetAscii);
        assert!(rq.options.is_empty());

        let rq = Request::from_bytes(b"boot.img\0octet\0tsize\x000\x00").unwrap();
        assert_eq!(rq.options.transfer_size, Some(0));
    }

    #[test]
    fn test_request_to_bytes() {
        let rq = Request::new("bye.txt", Mode::Mail);
        assert_eq!(rq.into_bytes(), b"bye.txt\0mail\0".to_vec());
    }

    #[test]
    fn test_malformed_requests() {
        assert!(Request::from_bytes(b"").is_err());
        assert!(Request::from_bytes(b"file.txt").is_err());
        assert!(Request::from_bytes(b"file.txt\0octet").is_err());
        assert!(Request::from_bytes(b"file.txt\0binary\0").is_err());
        assert!(Request::from_bytes(b"file.txt\0octet\0blksize\0").is_err());
    }
}
