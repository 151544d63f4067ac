//! The interface between a transfer and whatever produces or consumes the
//! file contents.
//!
//! A transfer never touches files itself. It asks its [`Handler`] whether a
//! request is acceptable, hands it every block it receives (or asks it to
//! fill every block it sends) and tells it once how the transfer ended.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};

use crate::context::Operation;
use crate::packet::Mode;

/// How a transfer ended, reported once through [`Handler::stop`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// The last block was delivered and acknowledged.
    Success,

    /// The peer sent an ERROR packet.
    PeerError,

    /// The transfer was aborted locally: a protocol violation, a handler
    /// refusal, a transport failure or an unresponsive peer.
    InternalError,
}

impl Status {
    /// Whether the transfer completed.
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::PeerError => "peer error",
            Status::InternalError => "internal error",
        };

        f.write_str(s)
    }
}

/// The block a [`Handler::data`] call is about.
#[derive(Debug)]
pub enum Payload<'a> {
    /// A block received from the peer, to be consumed.
    Received(&'a [u8]),

    /// A block about to be sent, to be filled. Returning fewer bytes than
    /// the buffer holds marks the end of the file.
    Fill(&'a mut [u8]),
}

/// Supplies and consumes file data for a transfer.
pub trait Handler {
    /// Decides whether to serve a request. `transfer_size` carries the `tsize`
    /// option: a handler serving a read should set it to the file size.
    ///
    /// A server calls this for every request; a reading client calls it when
    /// the server announces a size.
    fn start(
        &mut self,
        action: Operation,
        mode: Mode,
        file_name: &str,
        transfer_size: &mut u64,
    ) -> bool {
        let _ = (action, mode, file_name, transfer_size);
        true
    }

    /// Consumes or produces the block at byte `offset`, returning the number
    /// of bytes handled. An error rejects the block and aborts the transfer.
    fn data(&mut self, offset: u64, payload: Payload<'_>) -> io::Result<usize>;

    /// Called exactly once when the transfer reaches a terminal state.
    fn stop(&mut self, status: Status, message: Option<&str>) {
        let _ = (status, message);
    }
}

impl<H: Handler + ?Sized> Handler for &mut H {
    fn start(
        &mut self,
        action: Operation,
        mode: Mode,
        file_name: &str,
        transfer_size: &mut u64,
    ) -> bool {
        (**self).start(action, mode, file_name, transfer_size)
    }

    fn data(&mut self, offset: u64, payload: Payload<'_>) -> io::Result<usize> {
        (**self).data(offset, payload)
    }

    fn stop(&mut self, status: Status, message: Option<&str>) {
        (**self).stop(status, message)
    }
}

/// Fills `buf` from `reader`. A short read is only the end of the file when
/// the reader says so.
pub(crate) fn read_block<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// Sends whatever a reader yields.
pub struct Source<R> {
    reader: R,
    position: u64,
}

impl<R: Read> Source<R> {
    /// Sends `reader` from its current position to its end.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
        }
    }

    /// Gives the reader back.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Handler for Source<R> {
    fn data(&mut self, offset: u64, payload: Payload<'_>) -> io::Result<usize> {
        let buf = match payload {
            Payload::Fill(buf) => buf,
            Payload::Received(_) => return Err(ErrorKind::InvalidInput.into()),
        };

        if offset != self.position {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("out of order read at {} (expected {})", offset, self.position),
            ));
        }

        let filled = read_block(&mut self.reader, buf)?;
        self.position += filled as u64;
        Ok(filled)
    }
}

/// Writes every received block into a writer.
pub struct Sink<W> {
    writer: W,
}

impl<W: Write> Sink<W> {
    /// Writes received blocks into `writer` in order.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Gives the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Handler for Sink<W> {
    fn data(&mut self, _offset: u64, payload: Payload<'_>) -> io::Result<usize> {
        match payload {
            Payload::Received(bytes) => {
                self.writer.write_all(bytes)?;
                Ok(bytes.len())
            }
            Payload::Fill(_) => Err(ErrorKind::InvalidInput.into()),
        }
    }

    fn stop(&mut self, status: Status, _message: Option<&str>) {
        if status.is_success() {
            if let Err(e) = self.writer.flush() {
                tracing::warn!("failed to flush received data: {}", e);
            }
        }
    }
}
