//! Event counters over frames and whole streams.

use std::io::BufRead;

use serde::Serialize;

use crate::stream::StreamReader;
use crate::types::*;

/// Operation and access counts carried by a computation payload.
pub trait CompCounts {
    fn iops(&self) -> u64;
    fn flops(&self) -> u64;
    fn reads(&self) -> u64;
    fn writes(&self) -> u64;
}

/// Dependency counts carried by a communication payload.
pub trait CommCounts {
    /// Number of producer edges.
    fn edges(&self) -> u64;
}

impl CompCounts for MemAccess {
    fn iops(&self) -> u64 {
        self.iops
    }

    fn flops(&self) -> u64 {
        self.flops
    }

    fn reads(&self) -> u64 {
        (self.kind == MemKind::Read) as u64
    }

    fn writes(&self) -> u64 {
        (self.kind == MemKind::Write) as u64
    }
}

impl CompCounts for CompBatch {
    fn iops(&self) -> u64 {
        self.iops
    }

    fn flops(&self) -> u64 {
        self.flops
    }

    fn reads(&self) -> u64 {
        self.read_count
    }

    fn writes(&self) -> u64 {
        self.write_count
    }
}

impl CommCounts for CommAccess {
    fn edges(&self) -> u64 {
        1
    }
}

impl CommCounts for CommBatch {
    fn edges(&self) -> u64 {
        self.edges.len() as u64
    }
}

/// Totals over a set of decoded events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraceStats {
    pub frames: u64,
    pub comp: u64,
    pub comm: u64,
    pub sync: u64,
    pub markers: u64,
    /// Sync events per kind, indexed by `SyncKind::index`.
    pub sync_by_kind: [u64; 11],
    pub comm_edges: u64,
    pub reads: u64,
    pub writes: u64,
    pub iops: u64,
    pub flops: u64,
    /// Sum of marker instruction counts.
    pub instructions: u64,
}

impl TraceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame<S: Schema>(&mut self, frame: &Frame<S>) {
        self.frames = self.frames.saturating_add(1);
        for ev in frame {
            self.record_event(ev);
        }
    }

    /// Counters saturate at `u64::MAX` instead of wrapping.
    pub fn record_event<S: Schema>(&mut self, event: &Event<S>) {
        match event {
            Event::Comp(c) => {
                self.comp = self.comp.saturating_add(1);
                self.iops = self.iops.saturating_add(c.iops());
                self.flops = self.flops.saturating_add(c.flops());
                self.reads = self.reads.saturating_add(c.reads());
                self.writes = self.writes.saturating_add(c.writes());
            }
            Event::Comm(c) => {
                self.comm = self.comm.saturating_add(1);
                self.comm_edges = self.comm_edges.saturating_add(c.edges());
            }
            Event::Sync(s) => {
                self.sync = self.sync.saturating_add(1);
                let n = &mut self.sync_by_kind[s.kind().index()];
                *n = n.saturating_add(1);
            }
            Event::Marker(m) => {
                self.markers = self.markers.saturating_add(1);
                self.instructions = self.instructions.saturating_add(m.instruction_count);
            }
        }
    }

    pub fn sync_count(&self, kind: SyncKind) -> u64 {
        self.sync_by_kind[kind.index()]
    }

    pub fn total_events(&self) -> u64 {
        self.comp
            .saturating_add(self.comm)
            .saturating_add(self.sync)
            .saturating_add(self.markers)
    }

    /// Add another set of totals, e.g. from a different thread's trace.
    pub fn merge(&mut self, other: &TraceStats) {
        self.frames = self.frames.saturating_add(other.frames);
        self.comp = self.comp.saturating_add(other.comp);
        self.comm = self.comm.saturating_add(other.comm);
        self.sync = self.sync.saturating_add(other.sync);
        self.markers = self.markers.saturating_add(other.markers);
        for (a, b) in self.sync_by_kind.iter_mut().zip(other.sync_by_kind) {
            *a = a.saturating_add(b);
        }
        self.comm_edges = self.comm_edges.saturating_add(other.comm_edges);
        self.reads = self.reads.saturating_add(other.reads);
        self.writes = self.writes.saturating_add(other.writes);
        self.iops = self.iops.saturating_add(other.iops);
        self.flops = self.flops.saturating_add(other.flops);
        self.instructions = self.instructions.saturating_add(other.instructions);
    }
}

/// Read a stream to the end and total its events.
pub fn collect_stats<S: Schema, R: BufRead>(
    stream: StreamReader<S, R>,
) -> Result<TraceStats, ParseError> {
    let mut stats = TraceStats::new();
    for frame in stream {
        stats.record_frame(&frame?);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameBuilder;
    use assert_matches::assert_matches;

    fn range(start: u64, end: u64) -> AddrRange {
        AddrRange::new(start, end).unwrap()
    }

    #[test]
    fn test_uncompressed_counts() {
        let frame: Frame<Uncompressed> = Frame::new(vec![
            Event::Comp(MemAccess {
                kind: MemKind::Read,
                iops: 3,
                flops: 1,
                range: range(0, 7),
            }),
            Event::Comp(MemAccess {
                kind: MemKind::Write,
                iops: 2,
                flops: 0,
                range: range(8, 15),
            }),
            Event::Comm(CommAccess {
                producer_thread: ThreadId(1),
                producer_event: EventId(4),
                range: range(16, 23),
            }),
            Event::Sync(SyncEvent::new(SyncKind::Lock, vec![9]).unwrap()),
            Event::Marker(Marker {
                instruction_count: 100,
            }),
        ]);
        let mut stats = TraceStats::new();
        stats.record_frame(&frame);

        assert_eq!(stats.frames, 1);
        assert_eq!(stats.total_events(), 5);
        assert_eq!((stats.reads, stats.writes), (1, 1));
        assert_eq!((stats.iops, stats.flops), (5, 1));
        assert_eq!(stats.comm_edges, 1);
        assert_eq!(stats.sync_count(SyncKind::Lock), 1);
        assert_eq!(stats.sync_count(SyncKind::Unlock), 0);
        assert_eq!(stats.instructions, 100);
    }

    #[test]
    fn test_compressed_counts_use_counters() {
        let ev: Event<Compressed> = Event::Comp(CompBatch {
            iops: 5,
            flops: 2,
            write_count: 3,
            read_count: 10,
            write_addrs: vec![range(10, 20)],
            read_addrs: vec![range(100, 110)],
        });
        let mut stats = TraceStats::new();
        stats.record_event(&ev);
        assert_eq!((stats.reads, stats.writes), (10, 3));
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn test_collect_and_merge() {
        let mut b = FrameBuilder::<Compressed>::new();
        b.push(Event::Comm(CommBatch {
            edges: vec![
                CommEdge {
                    producer_thread: ThreadId(0),
                    producer_event: EventId(1),
                    addrs: vec![range(0, 3)],
                },
                CommEdge {
                    producer_thread: ThreadId(2),
                    producer_event: EventId(5),
                    addrs: vec![],
                },
            ],
        }))
        .push(Event::Sync(SyncEvent::new(SyncKind::Sync, vec![]).unwrap()));
        let mut data = b.finish().unwrap().to_vec();
        data.extend_from_slice(&b.finish().unwrap());

        let stats = collect_stats(StreamReader::<Compressed, _>::new(&data[..])).unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.comm, 2);
        assert_eq!(stats.comm_edges, 4);
        assert_eq!(stats.sync_count(SyncKind::Sync), 2);

        let mut total = stats;
        total.merge(&stats);
        assert_eq!(total.frames, 4);
        assert_eq!(total.sync_count(SyncKind::Sync), 4);
        assert_eq!(total.total_events(), 8);
    }

    #[test]
    fn test_collect_propagates_errors() {
        let data = [0x10, 0x05];
        assert_matches!(
            collect_stats(StreamReader::<Uncompressed, _>::new(&data[..])),
            Err(ParseError::TruncatedFrame)
        );
    }

    #[test]
    fn test_counters_saturate() {
        let mut b = FrameBuilder::<Compressed>::new();
        for _ in 0..2 {
            b.push(Event::Comp(CompBatch {
                iops: u64::MAX,
                flops: u64::MAX - 1,
                ..CompBatch::default()
            }));
        }
        let data = b.finish().unwrap();

        let stats = collect_stats(StreamReader::<Compressed, _>::new(&data[..])).unwrap();
        assert_eq!(stats.iops, u64::MAX);
        assert_eq!(stats.flops, u64::MAX);
        assert_eq!(stats.comp, 2);

        let mut total = stats;
        total.merge(&stats);
        assert_eq!(total.iops, u64::MAX);
        assert_eq!(total.comp, 4);

        let full = TraceStats {
            markers: u64::MAX,
            comp: 1,
            ..TraceStats::default()
        };
        assert_eq!(full.total_events(), u64::MAX);
    }
}
