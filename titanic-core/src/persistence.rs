//! File persistence helpers: atomic writes plus JSON load/list.
//!
//! Feature-store records, the feature-group registry and pipeline executions are all
//! small JSON documents written through these helpers.

use std::io;
use std::path::Path;

/// Serialize `data` as pretty JSON and write it atomically to `path`.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Write `data` to a `.tmp` sibling of `path` and rename it into place.
///
/// Parent directories are created on demand.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a JSON document, returning `Ok(None)` when the file does not exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Load every `*.json` document in `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn load_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> io::Result<Vec<T>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        if let Some(value) = load_json(&path)? {
            out.push(value);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Passenger {
        passenger_id: u32,
        sex: String,
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records").join("1.json");

        let record = Passenger {
            passenger_id: 1,
            sex: "male".into(),
        };

        atomic_write_json(&path, &record).unwrap();
        let loaded: Option<Passenger> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(record));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_json_missing_file() {
        let loaded: Option<Passenger> = load_json(Path::new("/nonexistent/record.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_invalid_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_json::<Passenger>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_load_json_dir_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for id in [3u32, 1, 2] {
            let record = Passenger {
                passenger_id: id,
                sex: "female".into(),
            };
            atomic_write_json(&dir.path().join(format!("{id}.json")), &record).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded: Vec<Passenger> = load_json_dir(dir.path()).unwrap();
        let ids: Vec<u32> = loaded.iter().map(|p| p.passenger_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_load_json_dir_missing() {
        let loaded: Vec<Passenger> = load_json_dir(Path::new("/nonexistent/dir")).unwrap();
        assert!(loaded.is_empty());
    }
}
