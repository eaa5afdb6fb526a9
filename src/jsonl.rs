//! Line-oriented JSON persistence shared by the ledger, the tracker and the journal.
//!
//! Files are append-only during a run. Deleting records means rewriting the whole
//! file, which goes through a temporary sibling and an atomic rename so a crash
//! never leaves a half-written log behind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{ArchiverError, ArchiverResult};

/// Records read from a log, plus how many lines could not be decoded.
#[derive(Debug)]
pub struct LoadedLines<T> {
    pub records: Vec<T>,
    pub malformed: usize,
}

/// Read every decodable record. A missing file reads as empty.
///
/// Malformed lines (including a torn trailing line left by an interrupted
/// append) are logged and skipped.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> ArchiverResult<LoadedLines<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LoadedLines {
                records: Vec::new(),
                malformed: 0,
            })
        }
        Err(e) => return Err(ArchiverError::io(path, e)),
    };

    let mut records = Vec::new();
    let mut malformed = 0;
    // raw bytes: an append torn inside a multibyte character is not valid UTF-8
    for (idx, line) in BufReader::new(file).split(b'\n').enumerate() {
        let bytes = line.map_err(|e| ArchiverError::io(path, e))?;
        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text,
            Err(e) => {
                malformed += 1;
                warn!("Skipping malformed line {} in {:?}: {}", idx + 1, path, e);
                continue;
            }
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                malformed += 1;
                warn!(
                    "Skipping malformed line {} in {:?}: {}",
                    idx + 1,
                    path,
                    e
                );
            }
        }
    }

    Ok(LoadedLines { records, malformed })
}

/// Append one record as a single line, creating the file and its parents.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> ArchiverResult<()> {
    let mut line = serde_json::to_string(record).map_err(|e| ArchiverError::Encode {
        path: path.to_path_buf(),
        source: e,
    })?;
    line.push('\n');

    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ArchiverError::io(path, e))?;
    file.write_all(line.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| ArchiverError::io(path, e))
}

/// Replace the file contents with exactly `records`, atomically.
pub fn rewrite_records<'a, T, I>(path: &Path, records: I) -> ArchiverResult<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let dir = ensure_parent(path)?;
    let tmp = tempfile::Builder::new()
        .prefix(".rewrite-")
        .tempfile_in(&dir)
        .map_err(|e| ArchiverError::io(&dir, e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        for record in records {
            serde_json::to_writer(&mut writer, record).map_err(|e| ArchiverError::Encode {
                path: path.to_path_buf(),
                source: e,
            })?;
            writer
                .write_all(b"\n")
                .map_err(|e| ArchiverError::io(tmp.path(), e))?;
        }
        writer.flush().map_err(|e| ArchiverError::io(tmp.path(), e))?;
    }

    tmp.persist(path)
        .map_err(|e| ArchiverError::io(path, e.error))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> ArchiverResult<std::path::PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| ArchiverError::io(&dir, e))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Line {
        id: u32,
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let loaded: LoadedLines<Line> = read_records(&dir.path().join("nope.jsonl")).unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.malformed, 0);
    }

    #[test]
    fn test_append_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/log.jsonl");
        append_record(&path, &Line { id: 1 }).unwrap();
        append_record(&path, &Line { id: 2 }).unwrap();

        let loaded: LoadedLines<Line> = read_records(&path).unwrap();
        assert_eq!(loaded.records, vec![Line { id: 1 }, Line { id: 2 }]);
    }

    #[test]
    fn test_torn_trailing_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "{\"id\":1}\n\n{\"id\":2}\n{\"id\":").unwrap();

        let loaded: LoadedLines<Line> = read_records(&path).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.malformed, 1);
    }

    #[test]
    fn test_torn_multibyte_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut content = b"{\"id\":1}\n{\"id\":2,\"name\":\"".to_vec();
        // first two bytes of a three-byte character
        content.extend_from_slice(&"\u{3042}".as_bytes()[..2]);
        fs::write(&path, content).unwrap();

        let loaded: LoadedLines<Line> = read_records(&path).unwrap();
        assert_eq!(loaded.records, vec![Line { id: 1 }]);
        assert_eq!(loaded.malformed, 1);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        for id in 0..5 {
            append_record(&path, &Line { id }).unwrap();
        }

        let keep = vec![Line { id: 3 }];
        rewrite_records(&path, &keep).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"id\":3}\n");
        // no stray temp files left next to the log
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
