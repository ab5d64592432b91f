//! Mapping between the generated Cap'n Proto types of the two trace schemas
//! and the owned event model.
//!
//! Both schemas share the `events :List(Event)` root and the `sync` and
//! `marker` groups. They differ in the `comp` and `comm` payloads:
//!
//! | Group  | Uncompressed                             | Compressed                                   |
//! |--------|------------------------------------------|----------------------------------------------|
//! | comp   | iops, flops, mem, startAddr, endAddr     | iops, flops, writes, reads, writeAddrs, readAddrs |
//! | comm   | producerThread, producerEvent, startAddr, endAddr | edges: List(Edge)                   |
//! | sync   | type, args: List(UInt64)                 | type, args: List(UInt64)                     |
//! | marker | count                                    | count                                        |

use capnp::message::{self, HeapAllocator};
use capnp::serialize::OwnedSegments;
use capnp::{primitive_list, struct_list};

use crate::types::*;
use crate::STEventTraceCompressed_capnp::event_stream_compressed::{
    self, addr_range, event as c_event, event::SyncType as CSyncType,
};
use crate::STEventTraceUncompressed_capnp::event_stream_uncompressed::{
    self, event as u_event, event::SyncType as USyncType,
};

/// Largest element count a list pointer can carry.
pub(crate) const MAX_LIST_LEN: usize = (1 << 29) - 1;

/// Per-schema event codec. Not nameable outside the crate, which keeps
/// `Schema` closed to the two encodings defined here.
pub trait SchemaCodec: Sized {
    fn decode_events(msg: &message::Reader<OwnedSegments>) -> Result<Vec<Event<Self>>, ParseError>
    where
        Self: Schema;

    fn encode_events(
        msg: &mut message::Builder<HeapAllocator>,
        events: &[Event<Self>],
    ) -> Result<(), ParseError>
    where
        Self: Schema;
}

impl SchemaCodec for Uncompressed {
    fn decode_events(msg: &message::Reader<OwnedSegments>) -> Result<Vec<Event<Self>>, ParseError> {
        let root = msg.get_root::<event_stream_uncompressed::Reader>()?;
        root.get_events()?.iter().map(decode_uncompressed).collect()
    }

    fn encode_events(
        msg: &mut message::Builder<HeapAllocator>,
        events: &[Event<Self>],
    ) -> Result<(), ParseError> {
        let root = msg.init_root::<event_stream_uncompressed::Builder>();
        if events.is_empty() {
            return Ok(());
        }
        let mut list = root.init_events(list_len(events.len())?);
        for (i, ev) in (0..).zip(events) {
            encode_uncompressed(list.reborrow().get(i), ev)?;
        }
        Ok(())
    }
}

impl SchemaCodec for Compressed {
    fn decode_events(msg: &message::Reader<OwnedSegments>) -> Result<Vec<Event<Self>>, ParseError> {
        let root = msg.get_root::<event_stream_compressed::Reader>()?;
        root.get_events()?.iter().map(decode_compressed).collect()
    }

    fn encode_events(
        msg: &mut message::Builder<HeapAllocator>,
        events: &[Event<Self>],
    ) -> Result<(), ParseError> {
        let root = msg.init_root::<event_stream_compressed::Builder>();
        if events.is_empty() {
            return Ok(());
        }
        let mut list = root.init_events(list_len(events.len())?);
        for (i, ev) in (0..).zip(events) {
            encode_compressed(list.reborrow().get(i), ev)?;
        }
        Ok(())
    }
}

// === Uncompressed ===

fn decode_uncompressed(ev: u_event::Reader<'_>) -> Result<Event<Uncompressed>, ParseError> {
    Ok(match ev.which().map_err(unknown_event)? {
        u_event::Which::Comp(comp) => Event::Comp(MemAccess {
            kind: mem_kind(comp.get_mem())?,
            iops: comp.get_iops(),
            flops: comp.get_flops(),
            range: AddrRange::new(comp.get_start_addr(), comp.get_end_addr())?,
        }),
        u_event::Which::Comm(comm) => Event::Comm(CommAccess {
            producer_thread: ThreadId(comm.get_producer_thread()),
            producer_event: EventId(comm.get_producer_event()),
            range: AddrRange::new(comm.get_start_addr(), comm.get_end_addr())?,
        }),
        u_event::Which::Sync(sync) => Event::Sync(decode_sync(sync.get_type(), sync.get_args()?)?),
        u_event::Which::Marker(marker) => Event::Marker(Marker {
            instruction_count: marker.get_count(),
        }),
    })
}

fn encode_uncompressed(b: u_event::Builder<'_>, ev: &Event<Uncompressed>) -> Result<(), ParseError> {
    match ev {
        Event::Comp(c) => {
            let mut comp = b.init_comp();
            comp.set_iops(c.iops);
            comp.set_flops(c.flops);
            comp.set_mem(match c.kind {
                MemKind::Read => u_event::MemType::Read,
                MemKind::Write => u_event::MemType::Write,
            });
            comp.set_start_addr(c.range.start());
            comp.set_end_addr(c.range.end());
        }
        Event::Comm(c) => {
            let mut comm = b.init_comm();
            comm.set_producer_thread(c.producer_thread.0);
            comm.set_producer_event(c.producer_event.0);
            comm.set_start_addr(c.range.start());
            comm.set_end_addr(c.range.end());
        }
        Event::Sync(s) => {
            let mut sync = b.init_sync();
            sync.set_type(s.kind().into());
            if !s.args().is_empty() {
                encode_args(sync.init_args(list_len(s.args().len())?), s.args());
            }
        }
        Event::Marker(m) => b.init_marker().set_count(m.instruction_count),
    }
    Ok(())
}

fn mem_kind(raw: Result<u_event::MemType, capnp::NotInSchema>) -> Result<MemKind, ParseError> {
    match raw {
        Ok(u_event::MemType::Read) => Ok(MemKind::Read),
        Ok(u_event::MemType::Write) => Ok(MemKind::Write),
        Ok(u_event::MemType::None) => Err(ParseError::invalid("comp event without a memory access")),
        Err(capnp::NotInSchema(raw)) => Err(ParseError::UnknownVariantTag { field: "mem", raw }),
    }
}

// === Compressed ===

fn decode_compressed(ev: c_event::Reader<'_>) -> Result<Event<Compressed>, ParseError> {
    Ok(match ev.which().map_err(unknown_event)? {
        c_event::Which::Comp(comp) => Event::Comp(CompBatch {
            iops: comp.get_iops(),
            flops: comp.get_flops(),
            write_count: comp.get_writes(),
            read_count: comp.get_reads(),
            write_addrs: decode_ranges(comp.get_write_addrs()?)?,
            read_addrs: decode_ranges(comp.get_read_addrs()?)?,
        }),
        c_event::Which::Comm(comm) => {
            let edges = comm
                .get_edges()?
                .iter()
                .map(|edge| -> Result<CommEdge, ParseError> {
                    Ok(CommEdge {
                        producer_thread: ThreadId(edge.get_producer_thread()),
                        producer_event: EventId(edge.get_producer_event()),
                        addrs: decode_ranges(edge.get_addrs()?)?,
                    })
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            Event::Comm(CommBatch { edges })
        }
        c_event::Which::Sync(sync) => Event::Sync(decode_sync(sync.get_type(), sync.get_args()?)?),
        c_event::Which::Marker(marker) => Event::Marker(Marker {
            instruction_count: marker.get_count(),
        }),
    })
}

fn encode_compressed(b: c_event::Builder<'_>, ev: &Event<Compressed>) -> Result<(), ParseError> {
    match ev {
        Event::Comp(c) => {
            let mut comp = b.init_comp();
            comp.set_iops(c.iops);
            comp.set_flops(c.flops);
            comp.set_writes(c.write_count);
            comp.set_reads(c.read_count);
            if !c.write_addrs.is_empty() {
                let list = comp.reborrow().init_write_addrs(list_len(c.write_addrs.len())?);
                encode_ranges(list, &c.write_addrs);
            }
            if !c.read_addrs.is_empty() {
                let list = comp.init_read_addrs(list_len(c.read_addrs.len())?);
                encode_ranges(list, &c.read_addrs);
            }
        }
        Event::Comm(c) => {
            let comm = b.init_comm();
            if c.edges.is_empty() {
                return Ok(());
            }
            let mut edges = comm.init_edges(list_len(c.edges.len())?);
            for (i, edge) in (0..).zip(&c.edges) {
                let mut e = edges.reborrow().get(i);
                e.set_producer_thread(edge.producer_thread.0);
                e.set_producer_event(edge.producer_event.0);
                if !edge.addrs.is_empty() {
                    encode_ranges(e.init_addrs(list_len(edge.addrs.len())?), &edge.addrs);
                }
            }
        }
        Event::Sync(s) => {
            let mut sync = b.init_sync();
            sync.set_type(s.kind().into());
            if !s.args().is_empty() {
                encode_args(sync.init_args(list_len(s.args().len())?), s.args());
            }
        }
        Event::Marker(m) => b.init_marker().set_count(m.instruction_count),
    }
    Ok(())
}

fn decode_ranges(
    list: struct_list::Reader<'_, addr_range::Owned>,
) -> Result<Vec<AddrRange>, ParseError> {
    list.iter()
        .map(|r| AddrRange::new(r.get_start(), r.get_end()))
        .collect()
}

fn encode_ranges(mut list: struct_list::Builder<'_, addr_range::Owned>, ranges: &[AddrRange]) {
    for (i, range) in (0..).zip(ranges) {
        let mut r = list.reborrow().get(i);
        r.set_start(range.start());
        r.set_end(range.end());
    }
}

// === Shared ===

fn unknown_event(capnp::NotInSchema(raw): capnp::NotInSchema) -> ParseError {
    ParseError::UnknownVariantTag {
        field: "event",
        raw,
    }
}

fn decode_sync<T: Into<SyncKind>>(
    kind: Result<T, capnp::NotInSchema>,
    args: primitive_list::Reader<'_, u64>,
) -> Result<SyncEvent, ParseError> {
    let kind = kind
        .map_err(|capnp::NotInSchema(raw)| ParseError::UnhandledSyncKind(raw))?
        .into();
    SyncEvent::new(kind, args.iter().collect())
}

fn encode_args(mut list: primitive_list::Builder<'_, u64>, args: &[u64]) {
    for (i, arg) in (0..).zip(args) {
        list.set(i, *arg);
    }
}

/// Element count of a list about to be built.
fn list_len(len: usize) -> Result<u32, ParseError> {
    if len > MAX_LIST_LEN {
        return Err(ParseError::invalid(format!(
            "list of {} elements exceeds the {} element limit",
            len, MAX_LIST_LEN
        )));
    }
    u32::try_from(len).map_err(|_| ParseError::invalid("list length overflows u32"))
}

// Both schemas declare the same sync enumerants, in the same order.
macro_rules! sync_type_conversions {
    ($ty:ident) => {
        impl From<$ty> for SyncKind {
            fn from(ty: $ty) -> Self {
                match ty {
                    $ty::Spawn => SyncKind::Spawn,
                    $ty::Join => SyncKind::Join,
                    $ty::Barrier => SyncKind::Barrier,
                    $ty::Sync => SyncKind::Sync,
                    $ty::Lock => SyncKind::Lock,
                    $ty::Unlock => SyncKind::Unlock,
                    $ty::CondWait => SyncKind::CondWait,
                    $ty::CondSignal => SyncKind::CondSignal,
                    $ty::CondBroadcast => SyncKind::CondBroadcast,
                    $ty::SpinLock => SyncKind::SpinLock,
                    $ty::SpinUnlock => SyncKind::SpinUnlock,
                }
            }
        }

        impl From<SyncKind> for $ty {
            fn from(kind: SyncKind) -> Self {
                match kind {
                    SyncKind::Spawn => $ty::Spawn,
                    SyncKind::Join => $ty::Join,
                    SyncKind::Barrier => $ty::Barrier,
                    SyncKind::Sync => $ty::Sync,
                    SyncKind::Lock => $ty::Lock,
                    SyncKind::Unlock => $ty::Unlock,
                    SyncKind::CondWait => $ty::CondWait,
                    SyncKind::CondSignal => $ty::CondSignal,
                    SyncKind::CondBroadcast => $ty::CondBroadcast,
                    SyncKind::SpinLock => $ty::SpinLock,
                    SyncKind::SpinUnlock => $ty::SpinUnlock,
                }
            }
        }
    };
}

sync_type_conversions!(USyncType);
sync_type_conversions!(CSyncType);
