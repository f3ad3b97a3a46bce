//! Input discovery and line decoding
//!
//! Inputs are enumerated once up front: a single file is taken as-is, a
//! directory is walked recursively. Files can be filtered by modification
//! time. Decoding is line-oriented with transparent gzip decompression
//! for `.gz`-suffixed files.

use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Enumerate input files under `input`, filtered by modification time
///
/// Results are sorted so repeated runs over the same corpus enumerate
/// files in a stable order.
pub fn discover(
    input: &Path,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> io::Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(input)?;

    let mut paths = Vec::new();
    if metadata.is_file() {
        if accepts(input, since, until)? {
            paths.push(input.to_path_buf());
        }
    } else {
        walk(input, since, until, &mut paths)?;
        paths.sort();
    }

    Ok(paths)
}

fn walk(
    dir: &Path,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    out: &mut Vec<PathBuf>,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(&path, since, until, out)?;
        } else if accepts(&path, since, until)? {
            debug!(path = %path.display(), "discovered input file");
            out.push(path);
        }
    }
    Ok(())
}

fn accepts(
    path: &Path,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> io::Result<bool> {
    if since.is_none() && until.is_none() {
        return Ok(true);
    }

    let modified: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();
    if let Some(since) = since {
        if modified < since {
            return Ok(false);
        }
    }
    if let Some(until) = until {
        if modified > until {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Open an input file as a buffered line source
///
/// `.gz`-suffixed files are decompressed transparently; multi-member gzip
/// streams (the usual shape of rotated logs) are handled.
pub fn open_lines(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;

    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Shard database path for an input file
///
/// Shards are named from the input's stem plus a fresh UUID, so inputs
/// with identical names in different directories never collide.
pub fn shard_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "shard".to_string());
    output_dir.join(format!("{}-{}.db", stem, Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_discover_single_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.ndjson");
        std::fs::write(&file, "{}\n").unwrap();

        let paths = discover(&file, None, None).unwrap();
        assert_eq!(paths, vec![file]);
    }

    #[test]
    fn test_discover_walks_directories_sorted() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.ndjson"), "{}\n").unwrap();
        std::fs::write(dir.path().join("nested/a.ndjson"), "{}\n").unwrap();

        let paths = discover(dir.path(), None, None).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("b.ndjson"));
        assert!(paths[1].ends_with("nested/a.ndjson"));
    }

    #[test]
    fn test_discover_time_filters() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ndjson"), "{}\n").unwrap();

        let future = Utc::now() + Duration::hours(1);
        let past = Utc::now() - Duration::hours(1);

        assert!(discover(dir.path(), Some(future), None).unwrap().is_empty());
        assert!(discover(dir.path(), None, Some(past)).unwrap().is_empty());
        assert_eq!(discover(dir.path(), Some(past), Some(future)).unwrap().len(), 1);
    }

    #[test]
    fn test_open_lines_plain_and_gzip() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("a.ndjson");
        std::fs::write(&plain, "one\ntwo\n").unwrap();

        let gz = dir.path().join("a.ndjson.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"one\ntwo\n").unwrap();
        encoder.finish().unwrap();

        for path in [&plain, &gz] {
            let lines: Vec<String> = open_lines(path)
                .unwrap()
                .lines()
                .collect::<io::Result<_>>()
                .unwrap();
            assert_eq!(lines, vec!["one", "two"]);
        }
    }

    #[test]
    fn test_shard_path_unique_per_call() {
        let out = Path::new("/out");
        let a = shard_path(Path::new("/in/app.ndjson"), out);
        let b = shard_path(Path::new("/in/app.ndjson"), out);
        assert_ne!(a, b);
        assert!(a.to_string_lossy().contains("app-"));
        assert!(a.to_string_lossy().ends_with(".db"));
    }
}
