use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use stgen_metrics::config::{self, Args};
use stgen_metrics::{MemoryMetrics, MemorySchema};
use stgen_trace::{Compressed, ReaderOptions, StreamReader, Uncompressed};

fn main() -> Result<()> {
    env_logger::init();

    let args = config::parse_args(env::args().skip(1))?;
    let options = config::load_reader_options(args.config.as_deref())?;
    let files = config::trace_files(&args.paths)?;
    log::info!(files = files.len(), compressed = args.compressed; "reading traces");

    let metrics = if args.compressed {
        collect::<Compressed>(&files, options)?
    } else {
        collect::<Uncompressed>(&files, options)?
    };

    print_report(&args, &metrics)
}

fn collect<S: MemorySchema>(
    files: &[std::path::PathBuf],
    options: ReaderOptions,
) -> Result<MemoryMetrics> {
    let mut metrics = MemoryMetrics::new();
    for path in files {
        let events = record_file::<S>(&mut metrics, path, options)
            .with_context(|| format!("failed to read trace {}", path.display()))?;
        log::debug!(events = events; "read {}", path.display());
    }
    Ok(metrics)
}

fn record_file<S: MemorySchema>(
    metrics: &mut MemoryMetrics,
    path: &Path,
    options: ReaderOptions,
) -> Result<u64> {
    let source = config::open_trace(path)?;
    let stream = StreamReader::<S, _>::from_read_with_options(source, options);
    Ok(metrics.record_stream(stream)?)
}

fn print_report(args: &Args, metrics: &MemoryMetrics) -> Result<()> {
    let report = metrics.report();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}
