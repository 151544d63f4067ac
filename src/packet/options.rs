//! The option extension of RFC 2347 together with the `blksize` (RFC 2348),
//! `timeout` and `tsize` (RFC 2349) options.
//!
//! Options trail a request or make up the body of an OACK as a sequence of
//! `name\0value\0` pairs. Unknown names are skipped so that peers speaking
//! newer extensions can still talk to us.

use std::cmp;
use std::io::{self, Result};

use crate::bytes::{Bytes, FromBytes, IntoBytes};
use crate::packet::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

const BLKSIZE: &str = "blksize";
const TIMEOUT: &str = "timeout";
const TSIZE: &str = "tsize";

/// The recognized options. `None` means the option is absent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Options {
    /// Negotiated block size in bytes, within `MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE`.
    pub block_size: Option<u16>,

    /// Retransmission timeout in whole seconds, never zero.
    pub timeout: Option<u8>,

    /// Total size of the transferred file in bytes.
    pub transfer_size: Option<u64>,
}

impl Options {
    /// Returns `true` if no option is set.
    pub fn is_empty(&self) -> bool {
        self.block_size.is_none() && self.timeout.is_none() && self.transfer_size.is_none()
    }

    fn set(&mut self, name: &str, value: &str) {
        match name.to_ascii_lowercase().as_str() {
            BLKSIZE => self.block_size = parse_block_size(value),
            TIMEOUT => self.timeout = value.parse::<u8>().ok().filter(|t| *t > 0),
            TSIZE => self.transfer_size = Some(value.parse::<u64>().unwrap_or(0)),
            other => tracing::debug!("ignoring unknown option '{}'", other),
        }
    }
}

/// Out-of-range sizes are clamped, garbage drops the option altogether.
fn parse_block_size(value: &str) -> Option<u16> {
    let size = value.parse::<u64>().ok()?;
    let size = cmp::min(cmp::max(size, MIN_BLOCK_SIZE as u64), MAX_BLOCK_SIZE as u64);
    Some(size as u16)
}

fn push_pair(bytes: &mut Vec<u8>, name: &str, value: String) {
    bytes.append(&mut Bytes::new(name.to_string()).into_bytes());
    bytes.append(&mut Bytes::new(value).into_bytes());
}

impl FromBytes for Options {
    type Error = io::Error;

    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let mut rest = bytes.as_ref();
        let mut options = Options::default();

        while !rest.is_empty() {
            let (name, after_name) = Bytes::<String>::take(rest)?;
            let (value, after_value) = Bytes::<String>::take(after_name)?;
            options.set(&name.into_inner(), &value.into_inner());
            rest = after_value;
        }

        Ok(options)
    }
}

impl IntoBytes for Options {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = vec![];

        if let Some(size) = self.block_size {
            push_pair(&mut bytes, BLKSIZE, size.to_string());
        }
        if let Some(timeout) = self.timeout {
            push_pair(&mut bytes, TIMEOUT, timeout.to_string());
        }
        if let Some(tsize) = self.transfer_size {
            push_pair(&mut bytes, TSIZE, tsize.to_string());
        }

        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_round_trip() {
        let options = Options {
            block_size: Some(1024),
            timeout: Some(3),
            transfer_size: Some(123_456),
        };

        let bytes = options.into_bytes();
        assert_eq!(&bytes[..], &b"blksize\x001024\x00timeout\x003\x00tsize\x00123456\x00"[..]);
        assert_eq!(Options::from_bytes(&bytes).unwrap(), options);

        assert!(Options::default().into_bytes().is_empty());
        assert_eq!(Options::from_bytes(&[]).unwrap(), Options::default());
    }

    #[test]
    fn test_unknown_options_are_ignored() {
        let bytes = b"windowsize\x004\x00BLKSIZE\x00600\x00";
        let options = Options::from_bytes(&bytes[..]).unwrap();

        assert_eq!(options.block_size, Some(600));
        assert_eq!(options.timeout, None);
        assert_eq!(options.transfer_size, None);
    }

    #[test]
    fn test_malformed_values_are_clamped_or_dropped() {
        let options = Options::from_bytes(&b"blksize\x0065464\x00timeout\x000\x00"[..]).unwrap();
        assert_eq!(options.block_size, Some(MAX_BLOCK_SIZE));
        assert_eq!(options.timeout, None);

        let options = Options::from_bytes(&b"blksize\x001\x00tsize\x00lots\x00"[..]).unwrap();
        assert_eq!(options.block_size, Some(MIN_BLOCK_SIZE));
        assert_eq!(options.transfer_size, Some(0));

        let options = Options::from_bytes(&b"blksize\x00big\x00timeout\x00999\x00"[..]).unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn test_truncated_pairs_are_rejected() {
        assert!(Options::from_bytes(&b"blksize\x00"[..]).is_err());
        assert!(Options::from_bytes(&b"blksize\x00512"[..]).is_err());
        assert!(Options::from_bytes(&b"blksize"[..]).is_err());
    }
}
