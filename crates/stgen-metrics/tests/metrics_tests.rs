use std::fs;
use std::io::Write;
use std::path::PathBuf;

use flate2::write::GzEncoder;
use flate2::Compression;
use stgen_metrics::config::{self, TraceFormat};
use stgen_metrics::MemoryMetrics;
use stgen_trace::*;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stgen-metrics-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn access(kind: MemKind, addr: Addr) -> Event<Uncompressed> {
    Event::Comp(MemAccess {
        kind,
        iops: 1,
        flops: 0,
        range: AddrRange::single(addr),
    })
}

fn thread_trace(first: Addr) -> Vec<u8> {
    let mut data = encode_frame(&[
        access(MemKind::Read, first),
        access(MemKind::Read, first),
        access(MemKind::Write, first + 8),
    ])
    .unwrap()
    .to_vec();
    data.extend_from_slice(
        &encode_frame(&[Event::<Uncompressed>::Comm(CommAccess {
            producer_thread: ThreadId(0),
            producer_event: EventId(1),
            range: AddrRange::single(first + 16),
        })])
        .unwrap(),
    );
    data
}

#[test]
fn test_metrics_over_directory() {
    let dir = scratch_dir("dir");
    fs::write(dir.join("sigil.events-1.bin"), thread_trace(0x1000)).unwrap();
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&thread_trace(0x1000)).unwrap();
    fs::write(dir.join("sigil.events-2.bin.gz"), gz.finish().unwrap()).unwrap();
    fs::write(dir.join("sigil.pthread.out"), b"not a trace").unwrap();

    let files = config::trace_files(&[dir.clone()]).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(
        TraceFormat::from_path(&files[1]),
        Some(TraceFormat::Gzip)
    );

    let mut metrics = MemoryMetrics::new();
    for path in &files {
        let stream = StreamReader::<Uncompressed, _>::from_read(config::open_trace(path).unwrap());
        assert_eq!(metrics.record_stream(stream).unwrap(), 4);
    }

    let report = metrics.report();
    // Two reads and one comm per thread.
    assert_eq!(report.reads.total, 6);
    assert_eq!(report.reads.unique, 2);
    assert_eq!(report.writes.total, 2);
    assert_eq!(report.writes.unique, 1);
    assert_eq!(report.writes.global_entropy, 0.0);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_truncated_trace_is_an_error() {
    let dir = scratch_dir("truncated");
    let mut data = thread_trace(0x2000);
    data.truncate(data.len() - 3);
    let path = dir.join("sigil.events-1.bin");
    fs::write(&path, data).unwrap();

    let stream = StreamReader::<Uncompressed, _>::from_read(config::open_trace(&path).unwrap());
    let err = MemoryMetrics::new().record_stream(stream).unwrap_err();
    assert!(matches!(err, ParseError::TruncatedFrame), "{err}");

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_options_from_config_file() {
    let dir = scratch_dir("config");
    let path = dir.join("opts.json");
    fs::write(&path, r#"{"nesting_limit": 8}"#).unwrap();
    let opts = config::load_reader_options(Some(&path)).unwrap();
    assert_eq!(opts.nesting_limit, 8);
    assert_eq!(
        opts.traversal_limit_in_words,
        DEFAULT_TRAVERSAL_LIMIT_IN_WORDS
    );

    fs::write(&path, "{").unwrap();
    assert!(config::load_reader_options(Some(&path)).is_err());

    fs::remove_dir_all(&dir).unwrap();
}
