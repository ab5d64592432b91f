use std::fmt;

use crate::schema::SchemaCodec;
use crate::stats::{CommCounts, CompCounts};

// === Error types ===

/// Errors that can occur while decoding a trace stream.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Reached end of input at a clean frame boundary (no more frames).
    #[error("end of stream")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown {field} tag: {raw}")]
    UnknownVariantTag { field: &'static str, raw: u16 },

    #[error("accessed {expected} payload of a {found} event")]
    WrongVariantAccess {
        expected: EventKind,
        found: EventKind,
    },

    #[error("unhandled sync kind: {0}")]
    UnhandledSyncKind(u16),

    #[error("sync {kind} takes {expected} argument(s), found {found}")]
    SyncArityMismatch {
        kind: SyncKind,
        expected: usize,
        found: usize,
    },

    #[error("traversal limit exceeded")]
    TraversalLimitExceeded,

    #[error("nesting limit exceeded")]
    NestingLimitExceeded,

    /// The input ended inside a frame.
    #[error("truncated frame")]
    TruncatedFrame,

    #[error("invalid address range: start {start:#x} > end {end:#x}")]
    InvalidAddrRange { start: u64, end: u64 },

    #[error("invalid frame data: {0}")]
    InvalidData(String),
}

impl ParseError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ParseError::InvalidData(msg.into())
    }

    /// Reports whether the error came from the byte source rather than the data.
    pub fn is_io(&self) -> bool {
        matches!(self, ParseError::Io(_))
    }
}

impl From<capnp::Error> for ParseError {
    fn from(err: capnp::Error) -> Self {
        match err.kind {
            capnp::ErrorKind::ReadLimitExceeded | capnp::ErrorKind::MessageTooLarge(_) => {
                ParseError::TraversalLimitExceeded
            }
            capnp::ErrorKind::MessageIsTooDeeplyNested => ParseError::NestingLimitExceeded,
            capnp::ErrorKind::PrematureEndOfPackedInput
            | capnp::ErrorKind::PrematureEndOfFile
            | capnp::ErrorKind::MessageEndsPrematurely(..) => ParseError::TruncatedFrame,
            _ => ParseError::InvalidData(err.to_string()),
        }
    }
}

// === Basic types ===

/// A memory address in the traced program.
pub type Addr = u64;

/// Identifies a thread of the traced program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ThreadId(pub u32);

/// Logical position of an event within its thread's trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inclusive range of addresses, `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddrRange {
    start: Addr,
    end: Addr,
}

impl AddrRange {
    pub fn new(start: Addr, end: Addr) -> Result<Self, ParseError> {
        if start > end {
            return Err(ParseError::InvalidAddrRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single address.
    pub fn single(addr: Addr) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    pub fn start(&self) -> Addr {
        self.start
    }

    pub fn end(&self) -> Addr {
        self.end
    }

    /// Number of addresses covered. Saturates for the full address space.
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.start <= addr && addr <= self.end
    }

    pub fn overlaps(&self, other: &AddrRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}-{:#x}", self.start, self.end)
    }
}

// === Event kinds ===

/// The four top-level event variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Comp,
    Comm,
    Sync,
    Marker,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comp => "comp",
            Self::Comm => "comm",
            Self::Sync => "sync",
            Self::Marker => "marker",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === Schemas ===

/// One of the two trace encodings. A stream uses a single schema, chosen by
/// the caller; it is never detected from the data.
pub trait Schema:
    SchemaCodec + fmt::Debug + Clone + Copy + PartialEq + Eq + Send + Sync + 'static
{
    /// Payload of a `comp` event.
    type Comp: CompCounts + fmt::Debug + Clone + PartialEq + Send;
    /// Payload of a `comm` event.
    type Comm: CommCounts + fmt::Debug + Clone + PartialEq + Send;

    const NAME: &'static str;
}

/// One event per memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uncompressed;

/// Accesses aggregated into address-range lists between sync points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Compressed;

impl Schema for Uncompressed {
    type Comp = MemAccess;
    type Comm = CommAccess;
    const NAME: &'static str = "uncompressed";
}

impl Schema for Compressed {
    type Comp = CompBatch;
    type Comm = CommBatch;
    const NAME: &'static str = "compressed";
}

// === Events ===

/// A decoded trace event. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<S: Schema> {
    Comp(S::Comp),
    Comm(S::Comm),
    Sync(SyncEvent),
    Marker(Marker),
}

impl<S: Schema> Event<S> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Comp(_) => EventKind::Comp,
            Event::Comm(_) => EventKind::Comm,
            Event::Sync(_) => EventKind::Sync,
            Event::Marker(_) => EventKind::Marker,
        }
    }

    pub fn comp(&self) -> Result<&S::Comp, ParseError> {
        match self {
            Event::Comp(c) => Ok(c),
            other => Err(other.wrong_variant(EventKind::Comp)),
        }
    }

    pub fn comm(&self) -> Result<&S::Comm, ParseError> {
        match self {
            Event::Comm(c) => Ok(c),
            other => Err(other.wrong_variant(EventKind::Comm)),
        }
    }

    pub fn sync(&self) -> Result<&SyncEvent, ParseError> {
        match self {
            Event::Sync(s) => Ok(s),
            other => Err(other.wrong_variant(EventKind::Sync)),
        }
    }

    pub fn marker(&self) -> Result<&Marker, ParseError> {
        match self {
            Event::Marker(m) => Ok(m),
            other => Err(other.wrong_variant(EventKind::Marker)),
        }
    }

    fn wrong_variant(&self, expected: EventKind) -> ParseError {
        ParseError::WrongVariantAccess {
            expected,
            found: self.kind(),
        }
    }
}

// === Uncompressed payloads ===

/// Whether an uncompressed computation event read or wrote its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemKind {
    Read,
    Write,
}

/// A single memory access, with the operations retired since the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct MemAccess {
    pub kind: MemKind,
    pub iops: u64,
    pub flops: u64,
    pub range: AddrRange,
}

/// A read of memory last written by another thread.
#[derive(Debug, Clone, PartialEq)]
pub struct CommAccess {
    pub producer_thread: ThreadId,
    pub producer_event: EventId,
    pub range: AddrRange,
}

// === Compressed payloads ===

/// Computation aggregated since the last aggregation point.
///
/// `write_count` and `read_count` count individual accesses; they are not
/// tied to the number of ranges, since adjacent accesses are merged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompBatch {
    pub iops: u64,
    pub flops: u64,
    pub write_count: u64,
    pub read_count: u64,
    pub write_addrs: Vec<AddrRange>,
    pub read_addrs: Vec<AddrRange>,
}

/// All communication edges of one aggregated event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommBatch {
    pub edges: Vec<CommEdge>,
}

/// A data dependency on addresses last written by `producer_thread` at
/// `producer_event`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommEdge {
    pub producer_thread: ThreadId,
    pub producer_event: EventId,
    pub addrs: Vec<AddrRange>,
}

// === Synchronization ===

/// Synchronization actions, with their wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SyncKind {
    Spawn = 0,
    Join = 1,
    Barrier = 2,
    Sync = 3,
    Lock = 4,
    Unlock = 5,
    CondWait = 6,
    CondSignal = 7,
    CondBroadcast = 8,
    SpinLock = 9,
    SpinUnlock = 10,
}

impl SyncKind {
    pub const ALL: [SyncKind; 11] = [
        Self::Spawn,
        Self::Join,
        Self::Barrier,
        Self::Sync,
        Self::Lock,
        Self::Unlock,
        Self::CondWait,
        Self::CondSignal,
        Self::CondBroadcast,
        Self::SpinLock,
        Self::SpinUnlock,
    ];

    /// Position of this kind in [`SyncKind::ALL`], which is also its wire value.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Number of arguments an event of this kind carries.
    pub fn arity(&self) -> usize {
        match self {
            Self::Sync => 0,
            Self::Spawn
            | Self::Join
            | Self::Barrier
            | Self::Lock
            | Self::Unlock
            | Self::CondWait
            | Self::CondSignal
            | Self::CondBroadcast
            | Self::SpinLock
            | Self::SpinUnlock => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Join => "join",
            Self::Barrier => "barrier",
            Self::Sync => "sync",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::CondWait => "condWait",
            Self::CondSignal => "condSignal",
            Self::CondBroadcast => "condBroadcast",
            Self::SpinLock => "spinLock",
            Self::SpinUnlock => "spinUnlock",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synchronization event. The argument count always matches the kind's arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    kind: SyncKind,
    args: Vec<u64>,
}

impl SyncEvent {
    pub const MAX_ARGS: usize = 2;

    pub fn new(kind: SyncKind, args: Vec<u64>) -> Result<Self, ParseError> {
        let expected = kind.arity();
        if args.len() != expected {
            return Err(ParseError::SyncArityMismatch {
                kind,
                expected,
                found: args.len(),
            });
        }
        Ok(Self { kind, args })
    }

    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    pub fn args(&self) -> &[u64] {
        &self.args
    }

    /// The operand of the action: the thread, barrier, mutex, condition
    /// variable or spin lock it refers to. `None` for a plain `sync`.
    pub fn id(&self) -> Option<u64> {
        self.args.first().copied()
    }
}

/// Progress marker: instructions retired since the previous marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub instruction_count: u64,
}

// === Frames ===

/// The events of one packed message, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<S: Schema> {
    pub events: Vec<Event<S>>,
}

impl<S: Schema> Frame<S> {
    pub fn new(events: Vec<Event<S>>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event<S>> {
        self.events.iter()
    }
}

impl<S: Schema> IntoIterator for Frame<S> {
    type Item = Event<S>;
    type IntoIter = std::vec::IntoIter<Event<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a, S: Schema> IntoIterator for &'a Frame<S> {
    type Item = &'a Event<S>;
    type IntoIter = std::slice::Iter<'a, Event<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
