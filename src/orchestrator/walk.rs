//! Directory traversal for the expansion step. Adapted from the agent's
//! walker: same walkdir-based recursion, swapped delta/manifest output for
//! the flat `NewFileStat` rows the State Store wants.

use std::path::Path;

use glob::Pattern;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::store::file::NewFileStat;

/// Walks `root` recursively and returns one stat per regular file whose
/// relative path matches `pattern` (or every file, if `pattern` is `None`).
/// Symlinks are not followed; broken links and directories are skipped.
pub fn scan(root: &Path, pattern: Option<&str>) -> Result<Vec<NewFileStat>> {
    let compiled = pattern
        .map(Pattern::new)
        .transpose()
        .map_err(|e| EngineError::Source(format!("invalid pattern {pattern:?}: {e}")))?;

    if !root.is_dir() {
        return Err(EngineError::Source(format!(
            "source folder does not exist or is not a directory: {}",
            root.display()
        )));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = entry.map_err(|e| EngineError::Source(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(root) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let relative_str = relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");

        if let Some(pattern) = &compiled {
            if !pattern.matches(&relative_str) {
                continue;
            }
        }

        let metadata = entry.metadata().map_err(|e| EngineError::Source(e.to_string()))?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        out.push(NewFileStat {
            path: relative_str,
            mtime,
            size: metadata.len() as i64,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_respects_pattern() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        fs::write(dir.path().join("b.log"), b"hi").unwrap();

        let all = scan(dir.path(), None).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = scan(dir.path(), Some("*.txt")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].path, "a.txt");
    }

    #[test]
    fn scan_missing_root_is_a_source_error() {
        let err = scan(Path::new("/no/such/dir/anywhere"), None).unwrap_err();
        assert!(matches!(err, EngineError::Source(_)));
    }
}
