//! The ERROR packet and its codes.

use std::convert::TryFrom;
use std::fmt;
use std::io::{self, ErrorKind, Result};

use crate::bytes::{Bytes, FromBytes, IntoBytes};
use crate::util::FirstNul;

/// `ErrorCode` represents the error conditions that can be reached during
/// a regular TFTP operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Not defined, see error message (if any).
    NotDefined = 0,

    /// File not found.
    FileNotFound = 1,

    /// Access violation.
    AccessViolation = 2,

    /// Disk full or allocation exceeded.
    DiskFull = 3,

    /// Illegal TFTP operation.
    IllegalOperation = 4,

    /// Unknown transfer ID.
    UnknownTid = 5,

    /// File already exists.
    FileAlreadyExists = 6,

    /// No such user.
    NoSuchUser = 7,

    /// The requester refused the options in an OACK (RFC 2347).
    OptionNegotiation = 8,
}

impl ErrorCode {
    /// The canonical RFC wording for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotDefined => "Not defined",
            ErrorCode::FileNotFound => "File not found",
            ErrorCode::AccessViolation => "Access violation",
            ErrorCode::DiskFull => "Disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "Illegal TFTP operation",
            ErrorCode::UnknownTid => "Unknown transfer ID",
            ErrorCode::FileAlreadyExists => "File already exists",
            ErrorCode::NoSuchUser => "No such user",
            ErrorCode::OptionNegotiation => "Option negotiation failed",
        }
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = io::Error;

    fn try_from(val: u16) -> Result<ErrorCode> {
        Ok(match val {
            0 => ErrorCode::NotDefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTid,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            8 => ErrorCode::OptionNegotiation,
            _ => return Err(ErrorKind::InvalidInput.into()),
        })
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> ErrorCode {
        match kind {
            ErrorKind::NotFound => ErrorCode::FileNotFound,
            ErrorKind::PermissionDenied => ErrorCode::AccessViolation,
            ErrorKind::AlreadyExists => ErrorCode::FileAlreadyExists,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => ErrorCode::IllegalOperation,
            _ => ErrorCode::NotDefined,
        }
    }
}

impl From<ErrorCode> for ErrorKind {
    fn from(code: ErrorCode) -> ErrorKind {
        match code {
            ErrorCode::FileNotFound => ErrorKind::NotFound,
            ErrorCode::AccessViolation => ErrorKind::PermissionDenied,
            ErrorCode::FileAlreadyExists => ErrorKind::AlreadyExists,
            ErrorCode::IllegalOperation | ErrorCode::OptionNegotiation => ErrorKind::InvalidData,
            _ => ErrorKind::Other,
        }
    }
}

/// An `Error` packet is a courtesy packet that is sent prior to terminating
/// the TFTP connection due to an unrecoverable error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    /// An integer code that describes the error.
    pub code: ErrorCode,

    /// A human readable description of the error.
    pub message: String,
}

impl Error {
    /// Builds an error packet body.
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code.as_str(), self.code as u16, self.message)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        io::Error::new(err.code.into(), err.message)
    }
}

impl FromBytes for Error {
    type Error = io::Error;

    /// Only the code is required. Codes beyond the RFC set are read as
    /// `NotDefined`. The message runs up to the first NUL or the end of the
    /// buffer, and invalid UTF-8 in it is replaced.
    fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let (code, rest) = Bytes::<u16>::take(bytes.as_ref())?;
        let end = rest.first_nul_idx().unwrap_or_else(|| rest.len());
        let code = ErrorCode::try_from(code.into_inner()).unwrap_or(ErrorCode::NotDefined);

        Ok(Self {
            code,
            message: String::from_utf8_lossy(&rest[..end]).into_owned(),
        })
    }
}

impl IntoBytes for Error {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Bytes::new(self.code as u16).into_bytes();
        bytes.append(&mut Bytes::new(self.message).into_bytes());
        bytes
    }
}
