use std::io::{BufRead, BufReader, Read};
use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::parser::parse_frame;
use crate::types::*;
use crate::ReaderOptions;

/// Lifecycle of a [`StreamReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No frame has been requested yet.
    Open,
    /// At least one frame has been decoded and more may follow.
    Reading,
    /// The source ended cleanly between frames.
    Closed,
    /// Decoding or reading failed. No further frames are produced.
    Errored,
}

impl StreamState {
    /// True once the reader has released its source.
    pub fn is_finished(&self) -> bool {
        matches!(self, StreamState::Closed | StreamState::Errored)
    }
}

/// Reads frames of schema `S` from a byte source until it is exhausted.
///
/// The reader owns the source and drops it as soon as the stream closes or
/// fails. Each call to `next` decodes exactly one frame. A decode or I/O
/// failure is yielded once, after which the iterator is finished.
///
/// ```
/// use stgen_trace::{Event, FrameBuilder, Marker, StreamReader, StreamState, Uncompressed};
///
/// let mut frame = FrameBuilder::<Uncompressed>::new();
/// frame.push(Event::Marker(Marker { instruction_count: 1000 }));
/// let bytes = frame.finish().unwrap();
///
/// let mut stream = StreamReader::<Uncompressed, _>::new(&bytes[..]);
/// let frame = stream.next().unwrap().unwrap();
/// assert_eq!(frame.events[0].marker().unwrap().instruction_count, 1000);
/// assert!(stream.next().is_none());
/// assert_eq!(stream.state(), StreamState::Closed);
/// ```
pub struct StreamReader<S: Schema, R: BufRead> {
    source: Option<R>,
    options: ReaderOptions,
    state: StreamState,
    frames_read: u64,
    events_read: u64,
    _schema: PhantomData<S>,
}

impl<S: Schema, R: BufRead> StreamReader<S, R> {
    pub fn new(source: R) -> Self {
        Self::with_options(source, ReaderOptions::default())
    }

    pub fn with_options(source: R, options: ReaderOptions) -> Self {
        log::trace!(schema = S::NAME; "opening trace stream");
        Self {
            source: Some(source),
            options,
            state: StreamState::Open,
            frames_read: 0,
            events_read: 0,
            _schema: PhantomData,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Number of frames decoded so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Number of events in the frames decoded so far.
    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    /// Flatten the remaining frames into a sequence of events.
    pub fn events(self) -> Events<S, R> {
        Events {
            frames: self,
            current: Vec::new().into_iter(),
        }
    }

    fn finish(&mut self, state: StreamState) {
        self.source = None;
        self.state = state;
    }
}

impl<S: Schema, T: Read> StreamReader<S, BufReader<T>> {
    /// Wrap an unbuffered source, such as a file or a decompressor.
    pub fn from_read(source: T) -> Self {
        Self::new(BufReader::new(source))
    }

    pub fn from_read_with_options(source: T, options: ReaderOptions) -> Self {
        Self::with_options(BufReader::new(source), options)
    }
}

impl<S: Schema, R: BufRead> Iterator for StreamReader<S, R> {
    type Item = Result<Frame<S>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.source.as_mut()?;
        match parse_frame::<S>(source, &self.options) {
            Ok(frame) => {
                self.state = StreamState::Reading;
                self.frames_read += 1;
                self.events_read += frame.len() as u64;
                log::debug!(frame = self.frames_read, events = frame.len(); "decoded frame");
                Some(Ok(frame))
            }
            Err(ParseError::EndOfStream) => {
                log::debug!(frames = self.frames_read, events = self.events_read; "trace stream closed");
                self.finish(StreamState::Closed);
                None
            }
            Err(e) => {
                log::warn!(frame = self.frames_read + 1; "trace stream failed: {}", e);
                self.finish(StreamState::Errored);
                Some(Err(e))
            }
        }
    }
}

impl<S: Schema, R: BufRead> FusedIterator for StreamReader<S, R> {}

/// Events of a stream, in order, across frame boundaries.
pub struct Events<S: Schema, R: BufRead> {
    frames: StreamReader<S, R>,
    current: std::vec::IntoIter<Event<S>>,
}

impl<S: Schema, R: BufRead> Events<S, R> {
    /// The underlying frame reader.
    pub fn stream(&self) -> &StreamReader<S, R> {
        &self.frames
    }
}

impl<S: Schema, R: BufRead> Iterator for Events<S, R> {
    type Item = Result<Event<S>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ev) = self.current.next() {
                return Some(Ok(ev));
            }
            match self.frames.next()? {
                Ok(frame) => self.current = frame.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<S: Schema, R: BufRead> FusedIterator for Events<S, R> {}
