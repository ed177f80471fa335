//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the assistant core:
//! - No sleep() calls in production code; timers are awaited deadlines
//! - No blocking I/O outside configuration loading
//! - No panicking shortcuts in the streaming pipeline
//!
//! The helpers here walk the core sources and yield production lines only:
//! scanning a file stops at its `#[cfg(test)]` module.

use std::fs;
use std::path::{Path, PathBuf};

/// One line of production source
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line belongs to
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.code.trim())
    }
}

/// Root of the assistant core sources
#[must_use]
pub fn core_src() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assistant/core/src")
}

/// Production lines of every `.rs` file under `dir`
#[must_use]
pub fn production_lines(dir: &Path) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
    {
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        lines.extend(production_part(entry.path(), &content));
    }
    lines
}

/// Lines of `content` before its test module, comments stripped
#[must_use]
pub fn production_part(path: &Path, content: &str) -> Vec<SourceLine> {
    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
        .enumerate()
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (!code.trim().is_empty()).then(|| SourceLine {
                path: path.to_path_buf(),
                number: idx + 1,
                code: code.to_string(),
            })
        })
        .collect()
}

/// Whether `line` sits under one of `dirs` (relative to the core sources)
#[must_use]
pub fn is_under(line: &SourceLine, dirs: &[&str]) -> bool {
    let root = core_src();
    let Ok(relative) = line.path.strip_prefix(&root) else {
        return false;
    };
    dirs.iter().any(|dir| relative.starts_with(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_module_is_excluded() {
        let source = "fn a() {}\n// note\nfn b() { x.unwrap(); }\n#[cfg(test)]\nmod tests { fn c() {} }\n";
        let lines = production_part(Path::new("x.rs"), source);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].number, 3);
    }

    #[test]
    fn test_trailing_comment_is_stripped() {
        let lines = production_part(Path::new("x.rs"), "let a = 1; // sleep(1)\n");
        assert_eq!(lines[0].code.trim(), "let a = 1;");
    }
}
