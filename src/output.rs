use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// File names in the output directory that are never cycle products and
/// must survive stale-output cleanup.
const RESERVED_FILES: [&str; 2] = ["activity_tracker.json", "unconfirmed_opportunities.json"];

/// Serialize to a temp file in the target directory, then rename over the
/// destination. One retry on failure; a second failure is logged and the
/// cycle carries on.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;

    let mut last_err = None;
    for _ in 0..2 {
        match try_write(path, &json) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    let err = last_err.unwrap();
    tracing::warn!(path = %path.display(), error = %err, "write failed after retry");
    Err(err)
}

fn try_write(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Read a JSON cache, treating a missing or unreadable file as empty.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache unreadable, starting empty");
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache corrupt, starting empty");
            T::default()
        }
    }
}

/// Remove country files from a previous run that this cycle did not
/// regenerate. Cache files and subdirectories are left alone.
pub fn cleanup_stale_outputs(dir: &Path, generated: &BTreeSet<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !name.to_lowercase().ends_with(".json") {
            continue;
        }
        if RESERVED_FILES.contains(&name) || generated.contains(name) {
            continue;
        }
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove stale output");
        } else {
            tracing::debug!(path = %path.display(), "removed stale output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("oddscout_output_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_atomic_write_roundtrip() {
        let dir = temp_dir("roundtrip");
        let path = dir.join("nested").join("cache.json");
        let data: BTreeMap<String, u32> = [("a".to_string(), 1)].into_iter().collect();
        write_json_atomic(&path, &data).unwrap();
        let back: BTreeMap<String, u32> = load_json_or_default(&path);
        assert_eq!(back, data);
        assert!(!path.with_extension("json.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_cache_is_empty() {
        let dir = temp_dir("missing");
        let loaded: BTreeMap<String, u32> = load_json_or_default(&dir.join("absent.json"));
        assert!(loaded.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_cache_is_empty() {
        let dir = temp_dir("corrupt");
        let path = dir.join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let loaded: BTreeMap<String, u32> = load_json_or_default(&path);
        assert!(loaded.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cleanup_spares_reserved_and_generated() {
        let dir = temp_dir("cleanup");
        for name in ["england.json", "spain.json", "activity_tracker.json"] {
            std::fs::write(dir.join(name), "[]").unwrap();
        }
        std::fs::create_dir_all(dir.join("_cache")).unwrap();
        std::fs::write(dir.join("_cache").join("x.json"), "{}").unwrap();

        let generated: BTreeSet<String> = ["england.json".to_string()].into_iter().collect();
        cleanup_stale_outputs(&dir, &generated);

        assert!(dir.join("england.json").exists());
        assert!(dir.join("activity_tracker.json").exists());
        assert!(dir.join("_cache").join("x.json").exists());
        assert!(!dir.join("spain.json").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
