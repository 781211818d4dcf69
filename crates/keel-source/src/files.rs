//! Working tree file listing

use std::path::Path;

use glob::Pattern;
use walkdir::WalkDir;

use crate::error::{Result, SourceError};

/// Compile a glob, reporting the offending pattern on failure.
pub fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| SourceError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Files under `root` whose `/`-separated relative path matches `pattern`.
///
/// `*` crosses directory separators. VCS metadata is skipped. The result is
/// sorted; a missing root yields nothing.
pub fn list_matching(root: &Path, pattern: &str) -> Result<Vec<String>> {
    let pattern = compile_pattern(pattern)?;
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| SourceError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if pattern.matches(&relative) {
            files.push(relative);
        }
    }

    files.sort();
    Ok(files)
}
