use bytes::Bytes;
use capnp::{message, serialize_packed};

use crate::types::{Event, Frame, ParseError, Schema};

/// Encode events as one packed frame.
///
/// Empty lists are left as null pointers, so the output depends only on the
/// events: decoding it and encoding again yields the same bytes.
pub fn encode_frame<S: Schema>(events: &[Event<S>]) -> Result<Bytes, ParseError> {
    let mut msg = message::Builder::new_default();
    S::encode_events(&mut msg, events)?;

    let mut out = Vec::new();
    serialize_packed::write_message(&mut out, &msg)?;
    Ok(Bytes::from(out))
}

impl<S: Schema> Frame<S> {
    /// Encode this frame; see [`encode_frame`].
    pub fn to_bytes(&self) -> Result<Bytes, ParseError> {
        encode_frame(&self.events)
    }
}

/// Collects events and encodes them as a single frame.
#[derive(Debug, Clone)]
pub struct FrameBuilder<S: Schema> {
    events: Vec<Event<S>>,
}

impl<S: Schema> Default for FrameBuilder<S> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<S: Schema> FrameBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event<S>) -> &mut Self {
        self.events.push(event);
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn finish(&self) -> Result<Bytes, ParseError> {
        encode_frame(&self.events)
    }
}
