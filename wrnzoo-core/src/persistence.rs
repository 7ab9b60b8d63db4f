//! Whole-file writes for exported artifacts.
//!
//! Result files are written to a `.tmp` sibling and renamed into place, so a
//! batch job killed mid-export never leaves a truncated file behind.

use crate::error::ZooError;
use std::path::Path;

/// Serialize `data` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, data: &T) -> Result<(), ZooError> {
    let json = serde_json::to_vec_pretty(data)?;
    write_atomic(path, &json)
}

/// Write bytes atomically, creating parent directories as needed.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ZooError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON artifact; `Ok(None)` when the file does not exist.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ZooError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    Ok(Some(serde_json::from_slice(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_write_json_atomic_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings").join("test_embeds.json");

        let mut data = BTreeMap::new();
        data.insert(3usize, vec![0.5f32, -1.0]);
        write_json_atomic(&path, &data).unwrap();

        let loaded: Option<BTreeMap<usize, Vec<f32>>> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_read_json_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Vec<u8>> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_json_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        write_atomic(&path, b"{not json").unwrap();
        assert!(matches!(read_json::<Vec<u8>>(&path), Err(ZooError::Serde(_))));
    }
}
