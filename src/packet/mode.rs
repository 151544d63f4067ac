//! Describes the modes of operation for TFTP.
//!
//! The engine moves opaque bytes; the mode is only carried to the handler.

use std::fmt;
use std::io::{self, ErrorKind, Result};
use std::str::FromStr;

use crate::bytes::{Bytes, FromBytes, IntoBytes};

/// The modes of operation for TFTP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// 8-bit ASCII with CR/LF line endings.
    NetAscii,

    /// 8-bit binary.
    Octet,

    /// Obsolete, accepted on the wire for completeness.
    Mail,
}

impl Mode {
    /// The name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::NetAscii => "netascii",
            Mode::Octet => "octet",
            Mode::Mail => "mail",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Octet
    }
}

impl IntoBytes for Mode {
    fn into_bytes(self) -> Vec<u8> {
        Bytes::new(self.as_str().to_string()).into_bytes()
    }
}

impl FromBytes for Mode {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let s = Bytes::<String>::from_bytes(bytes)?;
        Mode::from_str(&s.into_inner())
    }
}

impl FromStr for Mode {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "netascii" => Mode::NetAscii,
            "octet" => Mode::Octet,
            "mail" => Mode::Mail,
            _ => return Err(ErrorKind::InvalidInput.into()),
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
