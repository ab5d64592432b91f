use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use stgen_trace::ReaderOptions;

pub const USAGE: &str = "usage: stgen-metrics [-c <config.json>] [--compressed] [--json] <trace file or dir>...";

/// Command line of the metrics tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Args {
    /// JSON file holding `ReaderOptions`.
    pub config: Option<PathBuf>,
    pub compressed: bool,
    pub json: bool,
    pub paths: Vec<PathBuf>,
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" => {
                let path = args.next().context("-c requires a config path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--compressed" => parsed.compressed = true,
            "--json" => parsed.json = true,
            other if other.starts_with('-') => bail!("unknown flag {}\n{}", other, USAGE),
            path => parsed.paths.push(PathBuf::from(path)),
        }
    }
    if parsed.paths.is_empty() {
        bail!("missing trace path\n{}", USAGE);
    }
    Ok(parsed)
}

// loads reader options from a JSON file, defaulting every field not present
pub fn load_reader_options(path: Option<&Path>) -> Result<ReaderOptions> {
    let Some(path) = path else {
        return Ok(ReaderOptions::default());
    };
    let mut file =
        File::open(path).with_context(|| format!("failed to open config {}", path.display()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

/// Expands directories into the trace files they contain, sorted by name.
pub fn trace_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in fs::read_dir(path)
                .with_context(|| format!("failed to list {}", path.display()))?
            {
                let p = entry?.path();
                if TraceFormat::from_path(&p).is_some() {
                    found.push(p);
                }
            }
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// Container of a trace file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    Raw,
    Gzip,
}

impl TraceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "bin" => Some(Self::Raw),
            "gz" => Some(Self::Gzip),
            _ => None,
        }
    }
}

/// Opens a trace file, decompressing it if needed.
pub fn open_trace(path: &Path) -> Result<Box<dyn Read>> {
    let Some(format) = TraceFormat::from_path(path) else {
        bail!("unexpected extension for trace file {}", path.display());
    };
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(match format {
        TraceFormat::Raw => Box::new(file),
        TraceFormat::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let a = args(&["-c", "opts.json", "--compressed", "t0.bin.gz", "traces/"]).unwrap();
        assert_eq!(a.config, Some(PathBuf::from("opts.json")));
        assert!(a.compressed);
        assert!(!a.json);
        assert_eq!(
            a.paths,
            vec![PathBuf::from("t0.bin.gz"), PathBuf::from("traces/")]
        );
    }

    #[test]
    fn test_parse_args_errors() {
        assert_matches!(args(&[]), Err(_));
        assert_matches!(args(&["-c"]), Err(_));
        assert_matches!(args(&["--verbose", "x.bin"]), Err(_));
    }

    #[test]
    fn test_trace_format() {
        assert_eq!(
            TraceFormat::from_path(Path::new("sigil.events-1.bin.gz")),
            Some(TraceFormat::Gzip)
        );
        assert_eq!(
            TraceFormat::from_path(Path::new("sigil.events-1.bin")),
            Some(TraceFormat::Raw)
        );
        assert_eq!(TraceFormat::from_path(Path::new("sigil.pthread.out")), None);
        assert_eq!(TraceFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_default_options_without_config() {
        assert_eq!(load_reader_options(None).unwrap(), ReaderOptions::default());
    }
}
