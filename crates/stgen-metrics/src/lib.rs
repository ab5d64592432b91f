//! Memory access metrics over SynchroTrace event streams.
//!
//! Counts every read and write address across one or more thread traces and
//! reports how concentrated the accesses are: unique addresses, how many of
//! them make up 90% of all accesses, and the entropy of the address
//! distribution at byte and at 1 KiB granularity.

use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;

use serde::Serialize;
use stgen_trace::{Addr, Compressed, Event, ParseError, Schema, StreamReader, Uncompressed};

pub mod config;

/// Address bits dropped when computing local entropy.
pub const LOCAL_ENTROPY_SKIP_BITS: u32 = 10;

/// Share of all accesses covered by the `ninety_percent_unique` count.
const NINETY_PERCENT: f64 = 0.9;

/// Times each address was accessed.
#[derive(Debug, Clone, Default)]
pub struct AccessCounter {
    total: u64,
    counts: HashMap<Addr, u64>,
}

impl AccessCounter {
    pub fn record(&mut self, addr: Addr) {
        self.total += 1;
        *self.counts.entry(addr).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn unique(&self) -> u64 {
        self.counts.len() as u64
    }

    /// `(address, count)` pairs, most accessed first.
    fn sorted(&self) -> Vec<(Addr, u64)> {
        let mut v: Vec<_> = self.counts.iter().map(|(&a, &c)| (a, c)).collect();
        v.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        v
    }

    /// Number of most-accessed addresses whose accesses stay within 90% of the total.
    pub fn ninety_percent_unique(&self) -> u64 {
        let threshold = (NINETY_PERCENT * self.total as f64) as u64;
        let mut running = 0;
        let mut unique = 0;
        for (_, count) in self.sorted() {
            running += count;
            if running > threshold {
                break;
            }
            unique += 1;
        }
        unique
    }

    /// Shannon entropy, in bits, of the per-address access distribution.
    pub fn global_entropy(&self) -> f64 {
        entropy(self.counts.values().copied(), self.total)
    }

    /// Entropy after dropping the low `LOCAL_ENTROPY_SKIP_BITS` address bits.
    pub fn local_entropy(&self) -> f64 {
        let mut local: HashMap<Addr, u64> = HashMap::new();
        for (&addr, &count) in &self.counts {
            *local.entry(addr >> LOCAL_ENTROPY_SKIP_BITS).or_insert(0) += count;
        }
        entropy(local.into_values(), self.total)
    }

    pub fn summary(&self) -> AccessSummary {
        AccessSummary {
            total: self.total,
            unique: self.unique(),
            ninety_percent_unique: self.ninety_percent_unique(),
            global_entropy: self.global_entropy(),
            local_entropy: self.local_entropy(),
        }
    }
}

fn entropy(counts: impl Iterator<Item = u64>, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    counts
        .map(|count| {
            let p = count as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Read and write counters for a set of traces.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetrics {
    pub reads: AccessCounter,
    pub writes: AccessCounter,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event<S: MemorySchema>(&mut self, event: &Event<S>) {
        S::record(self, event);
    }

    /// Consume a stream, recording every event in it.
    pub fn record_stream<S: MemorySchema, R: BufRead>(
        &mut self,
        stream: StreamReader<S, R>,
    ) -> Result<u64, ParseError> {
        let mut events = 0;
        for frame in stream {
            for event in &frame? {
                self.record_event(event);
                events += 1;
            }
        }
        Ok(events)
    }

    pub fn report(&self) -> MemoryReport {
        MemoryReport {
            reads: self.reads.summary(),
            writes: self.writes.summary(),
        }
    }
}

/// How a schema's events map to memory accesses.
///
/// Communication counts as a read by the consuming thread. Only the first
/// address of each range is counted.
pub trait MemorySchema: Schema {
    fn record(metrics: &mut MemoryMetrics, event: &Event<Self>);
}

impl MemorySchema for Uncompressed {
    fn record(metrics: &mut MemoryMetrics, event: &Event<Self>) {
        match event {
            Event::Comp(c) => match c.kind {
                stgen_trace::MemKind::Read => metrics.reads.record(c.range.start()),
                stgen_trace::MemKind::Write => metrics.writes.record(c.range.start()),
            },
            Event::Comm(c) => metrics.reads.record(c.range.start()),
            Event::Sync(_) | Event::Marker(_) => {}
        }
    }
}

impl MemorySchema for Compressed {
    fn record(metrics: &mut MemoryMetrics, event: &Event<Self>) {
        match event {
            Event::Comp(c) => {
                for r in &c.write_addrs {
                    metrics.writes.record(r.start());
                }
                for r in &c.read_addrs {
                    metrics.reads.record(r.start());
                }
            }
            Event::Comm(c) => {
                for r in c.edges.iter().flat_map(|e| &e.addrs) {
                    metrics.reads.record(r.start());
                }
            }
            Event::Sync(_) | Event::Marker(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccessSummary {
    pub total: u64,
    pub unique: u64,
    pub ninety_percent_unique: u64,
    pub global_entropy: f64,
    pub local_entropy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryReport {
    pub reads: AccessSummary,
    pub writes: AccessSummary,
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, s) in [("Reads", &self.reads), ("Writes", &self.writes)] {
            writeln!(f, "Total Num.  {:<7}: {}", label, s.total)?;
            writeln!(f, "Total Uniq. {:<7}: {}", label, s.unique)?;
            writeln!(f, "90%   Uniq. {:<7}: {}", label, s.ninety_percent_unique)?;
            writeln!(f, "Glob  Ent.  {:<7}: {}", label, s.global_entropy)?;
            writeln!(f, "Local Ent.  {:<7}: {}", label, s.local_entropy)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stgen_trace::*;

    fn counter(addrs: &[Addr]) -> AccessCounter {
        let mut c = AccessCounter::default();
        for &a in addrs {
            c.record(a);
        }
        c
    }

    #[test]
    fn test_counts() {
        let c = counter(&[1, 2, 2, 3, 3, 3]);
        assert_eq!(c.total(), 6);
        assert_eq!(c.unique(), 3);
        assert_eq!(c.sorted(), vec![(3, 3), (2, 2), (1, 1)]);
    }

    #[test]
    fn test_ninety_percent() {
        // 9 of 10 accesses hit one address.
        let mut addrs = vec![0x100; 9];
        addrs.push(0x200);
        assert_eq!(counter(&addrs).ninety_percent_unique(), 1);

        // Uniform over ten addresses: nine of them reach 90%.
        let addrs: Vec<Addr> = (0..10).collect();
        assert_eq!(counter(&addrs).ninety_percent_unique(), 9);

        assert_eq!(counter(&[]).ninety_percent_unique(), 0);
    }

    #[test]
    fn test_entropy() {
        assert_eq!(counter(&[5, 5, 5]).global_entropy(), 0.0);
        assert_eq!(counter(&[]).global_entropy(), 0.0);

        let c = counter(&[0, 1, 2, 3]);
        assert!((c.global_entropy() - 2.0).abs() < 1e-12);
        // All four addresses share one 1 KiB block.
        assert_eq!(c.local_entropy(), 0.0);

        let c = counter(&[0, 1 << LOCAL_ENTROPY_SKIP_BITS]);
        assert!((c.local_entropy() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_uncompressed_accesses() {
        let mut m = MemoryMetrics::new();
        let events: Vec<Event<Uncompressed>> = vec![
            Event::Comp(MemAccess {
                kind: MemKind::Read,
                iops: 0,
                flops: 0,
                range: AddrRange::new(0x10, 0x17).unwrap(),
            }),
            Event::Comp(MemAccess {
                kind: MemKind::Write,
                iops: 0,
                flops: 0,
                range: AddrRange::single(0x20),
            }),
            Event::Comm(CommAccess {
                producer_thread: ThreadId(1),
                producer_event: EventId(2),
                range: AddrRange::single(0x10),
            }),
            Event::Marker(Marker {
                instruction_count: 9,
            }),
        ];
        for ev in &events {
            m.record_event(ev);
        }
        assert_eq!((m.reads.total(), m.reads.unique()), (2, 1));
        assert_eq!((m.writes.total(), m.writes.unique()), (1, 1));
    }

    #[test]
    fn test_compressed_accesses_use_read_ranges() {
        let mut m = MemoryMetrics::new();
        let ev: Event<Compressed> = Event::Comp(CompBatch {
            iops: 0,
            flops: 0,
            write_count: 2,
            read_count: 1,
            write_addrs: vec![AddrRange::single(1), AddrRange::single(2)],
            read_addrs: vec![AddrRange::new(100, 110).unwrap()],
        });
        m.record_event(&ev);
        assert_eq!(m.writes.total(), 2);
        assert_eq!(m.reads.total(), 1);
        assert_eq!(m.reads.sorted(), vec![(100, 1)]);
    }

    #[test]
    fn test_report_format() {
        let mut m = MemoryMetrics::new();
        m.writes.record(1);
        let text = m.report().to_string();
        assert!(text.contains("Total Num.  Reads  : 0"), "{text}");
        assert!(text.contains("Total Uniq. Writes : 1"), "{text}");
        assert_eq!(text.lines().count(), 10);
    }
}
