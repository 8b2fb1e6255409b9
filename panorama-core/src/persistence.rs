//! File persistence helpers: atomic JSON snapshots and append-only JSONL.
//!
//! Session snapshots use the write-to-tmp-then-rename pattern so a crash
//! mid-write never leaves a corrupt file. Checkpoint records use plain
//! append-mode writes because that log is append-only and each record is a
//! self-contained line.

use std::io::{self, Write};
use std::path::Path;

/// Atomically write pretty-printed JSON to a file.
///
/// Writes to a `.tmp` sibling, then renames onto the target path.
/// Creates parent directories if they don't exist.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Append one record as a JSON line to a file, creating it if needed.
///
/// Existing content is never touched; each call writes exactly one line.
pub fn append_jsonl<T: serde::Serialize>(path: &Path, record: &T) -> io::Result<()> {
    let json = serde_json::to_string(record).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Read every record from a JSONL file, in file order.
///
/// Returns `Ok(vec![])` if the file doesn't exist.
pub fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in data.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        label: String,
        value: u32,
    }

    #[test]
    fn test_json_atomic_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        let record = Record {
            label: "state".into(),
            value: 7,
        };
        write_json_atomic(&path, &record).unwrap();

        let loaded: Option<Record> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(record));

        // No .tmp sibling left behind.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_json_atomic_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("snapshot.json");
        write_json_atomic(&path, &"nested").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_read_json_missing_file() {
        let loaded: Option<Record> = read_json(Path::new("/nonexistent/snapshot.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_jsonl_append_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");

        for i in 0..3 {
            append_jsonl(
                &path,
                &Record {
                    label: format!("r{}", i),
                    value: i,
                },
            )
            .unwrap();
        }

        let records: Vec<Record> = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].label, "r0");
        assert_eq!(records[2].label, "r2");
    }

    #[test]
    fn test_jsonl_read_missing_file_is_empty() {
        let records: Vec<Record> = read_jsonl(Path::new("/nonexistent/log.jsonl")).unwrap();
        assert!(records.is_empty());
    }
}
