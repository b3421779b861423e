//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code outside the timer module
//! - No blocking I/O inside async functions
//!
//! The helpers below scan source text line by line. They are deliberately
//! simple: test modules are expected at the end of a file, after
//! `#[cfg(test)]`, which is how every crate in this workspace lays them out.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by every rule
pub const PRODUCTION_DIRS: &[&str] = &["courier/core/src", "courier/cli/src"];

/// Workspace root, resolved from this crate's manifest
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under a workspace-relative directory
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// One line of production code with comments stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// Code before any `//`
    pub code: String,
    /// Whether the nearest enclosing `fn` is async
    pub in_async_fn: bool,
}

/// Production lines of a file: everything before its `#[cfg(test)]` module
pub fn production_lines(content: &str) -> Vec<CodeLine> {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = line.split("//").next().unwrap_or(line);
        if code.trim().is_empty() {
            continue;
        }
        out.push(CodeLine {
            number: idx + 1,
            code: code.to_string(),
            in_async_fn: is_in_async_function(&lines, idx),
        });
    }
    out
}

/// Read a file's production lines, or nothing if it cannot be read
pub fn production_lines_of(path: &Path) -> Vec<CodeLine> {
    fs::read_to_string(path)
        .map(|content| production_lines(&content))
        .unwrap_or_default()
}

/// Check if line is inside an async function
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..=current_idx).rev() {
        let line = lines[i].trim();

        if line.contains("async fn ") || line.contains("async move") {
            return true;
        }

        if is_fn_signature(line) {
            return false;
        }

        // Stop at module/impl boundaries
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

fn is_fn_signature(line: &str) -> bool {
    line.starts_with("fn ")
        || line.starts_with("pub fn ")
        || line.starts_with("pub(crate) fn ")
        || line.starts_with("const fn ")
}

/// Format a violation for the report
pub fn violation(path: &Path, line: &CodeLine, what: &str) -> String {
    let shown = path
        .strip_prefix(workspace_root())
        .unwrap_or(path)
        .display()
        .to_string();
    format!("{shown}:{} - {what}: {}", line.number, line.code.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_module_is_excluded() {
        let src = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { sleep(); }\n}\n";
        let lines = production_lines(src);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 1);
    }

    #[test]
    fn test_comments_are_stripped() {
        let lines = production_lines("let x = 1; // std::fs::read\n// whole line\n");
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].code.contains("std::fs"));
    }

    #[test]
    fn test_async_detection() {
        let src = vec![
            "pub async fn load() {",
            "    let s = read();",
            "}",
            "pub fn sync_load() {",
            "    let s = read();",
            "}",
        ];
        assert!(is_in_async_function(&src, 1));
        assert!(!is_in_async_function(&src, 4));
    }

    #[test]
    fn test_async_block_counts_as_async() {
        let src = vec!["fn spawn_it() {", "    tokio::spawn(async move {", "        read();"];
        assert!(is_in_async_function(&src, 2));
    }
}
