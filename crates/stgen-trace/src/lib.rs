//! Reader for SynchroTrace event streams.
//!
//! A trace is a sequence of frames, each one a packed message holding a list
//! of per-thread events: computation, inter-thread communication,
//! synchronization and progress markers. Two schemas share this model and
//! differ in density; the caller picks one per stream with a type parameter
//! ([`Uncompressed`] or [`Compressed`]).
//!
//! # Protocol
//!
//! Each frame is one Cap'n Proto message in the standard packed encoding.
//! The schemas live in `schema/`:
//!
//! | Schema                            | Root                      |
//! |-----------------------------------|---------------------------|
//! | `STEventTraceUncompressed.capnp`  | `EventStreamUncompressed` |
//! | `STEventTraceCompressed.capnp`    | `EventStreamCompressed`   |
//!
//! The root's only field is the list of events, each a union of `comp`,
//! `comm`, `sync` and `marker` groups. Frames follow one another with no
//! other delimiter; a clean end of input between frames ends the stream.
//!
//! # Usage
//!
//! ```no_run
//! use stgen_trace::{Event, StreamReader, Uncompressed};
//!
//! let file = std::fs::File::open("sigil.events-1.bin").unwrap();
//! let stream = StreamReader::<Uncompressed, _>::from_read(file);
//!
//! for frame in stream {
//!     match frame {
//!         Ok(frame) => {
//!             for event in frame {
//!                 if let Event::Sync(sync) = event {
//!                     println!("{} {:?}", sync.kind(), sync.id());
//!                 }
//!             }
//!         }
//!         Err(e) => eprintln!("parse error: {}", e),
//!     }
//! }
//! ```
//!
//! For a single frame already in memory, use [`decode_frame`]; for low-level
//! control over the source, [`parse_frame`] returns
//! [`ParseError::EndOfStream`] at a clean end of input.

pub mod types;
mod encode;
mod options;
mod parser;
mod schema;
pub mod stats;
mod stream;

#[allow(non_snake_case, dead_code, unused, clippy::all)]
mod STEventTraceUncompressed_capnp {
    include!(concat!(env!("OUT_DIR"), "/STEventTraceUncompressed_capnp.rs"));
}

#[allow(non_snake_case, dead_code, unused, clippy::all)]
mod STEventTraceCompressed_capnp {
    include!(concat!(env!("OUT_DIR"), "/STEventTraceCompressed_capnp.rs"));
}

pub use encode::{encode_frame, FrameBuilder};
pub use options::{ReaderOptions, DEFAULT_NESTING_LIMIT, DEFAULT_TRAVERSAL_LIMIT_IN_WORDS};
pub use parser::{decode_frame, parse_frame};
pub use stats::{collect_stats, TraceStats};
pub use stream::{Events, StreamReader, StreamState};
pub use types::{
    Addr, AddrRange, CommAccess, CommBatch, CommEdge, CompBatch, Compressed, Event, EventId,
    EventKind, Frame, Marker, MemAccess, MemKind, ParseError, Schema, SyncEvent, SyncKind,
    ThreadId, Uncompressed,
};
