use std::io::{self, BufRead, Read};

use capnp::{message, serialize_packed};

use crate::types::*;
use crate::ReaderOptions;

/// Parse a single frame from the reader.
///
/// Reads one complete packed message and decodes every event in it.
/// Returns `ParseError::EndOfStream` when the reader is exhausted before the
/// frame starts; running out of input inside the frame is
/// `ParseError::TruncatedFrame`. On success the reader is positioned at the
/// start of the next frame.
pub fn parse_frame<S: Schema>(
    reader: &mut impl BufRead,
    options: &ReaderOptions,
) -> Result<Frame<S>, ParseError> {
    if reader.fill_buf()?.is_empty() {
        return Err(ParseError::EndOfStream);
    }

    let mut source = FrameSource::new(reader);
    let msg = match serialize_packed::read_message(&mut source, options.to_capnp()) {
        Ok(msg) => msg,
        Err(e) => return Err(source.into_error(e)),
    };
    let events = S::decode_events(&msg)?;
    log::trace!(events = events.len(); "decoded message");
    Ok(Frame::new(events))
}

/// Decode a buffer holding exactly one frame.
pub fn decode_frame<S: Schema>(
    bytes: &[u8],
    options: &ReaderOptions,
) -> Result<Frame<S>, ParseError> {
    let mut src = bytes;
    let frame = match parse_frame(&mut src, options) {
        Err(ParseError::EndOfStream) => return Err(ParseError::TruncatedFrame),
        other => other?,
    };
    if !src.is_empty() {
        return Err(ParseError::invalid(format!(
            "{} trailing bytes after frame",
            src.len()
        )));
    }
    Ok(frame)
}

impl ReaderOptions {
    pub(crate) fn to_capnp(self) -> message::ReaderOptions {
        message::ReaderOptions {
            // A limit beyond the address space cannot be reached.
            traversal_limit_in_words: usize::try_from(self.traversal_limit_in_words).ok(),
            nesting_limit: i32::try_from(self.nesting_limit).unwrap_or(i32::MAX),
        }
    }
}

/// The byte source of one frame. Keeps what the message reader cannot
/// report itself: the source's own error, and whether input ran out.
struct FrameSource<'a, R> {
    inner: &'a mut R,
    at_eof: bool,
    failure: Option<io::Error>,
}

impl<'a, R: BufRead> FrameSource<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            at_eof: false,
            failure: None,
        }
    }

    fn into_error(self, err: capnp::Error) -> ParseError {
        if let Some(e) = self.failure {
            return ParseError::Io(e);
        }
        match ParseError::from(err) {
            ParseError::InvalidData(_) if self.at_eof => ParseError::TruncatedFrame,
            other => other,
        }
    }
}

impl<R: BufRead> Read for FrameSource<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.at_eof = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                let kind = e.kind();
                self.failure = Some(e);
                Err(io::Error::from(kind))
            }
        }
    }
}

impl<R: BufRead> BufRead for FrameSource<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self.inner.fill_buf() {
            Ok(buf) => {
                if buf.is_empty() {
                    self.at_eof = true;
                }
                Ok(buf)
            }
            Err(e) => {
                let kind = e.kind();
                self.failure = Some(e);
                Err(io::Error::from(kind))
            }
        }
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}
