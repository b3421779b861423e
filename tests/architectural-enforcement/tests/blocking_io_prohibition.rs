//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O.
//! **Required**: `tokio::io`, `tokio::net`, async `reqwest`.
//! **Acceptable**: blocking calls in plain functions that run before the
//! runtime does work (loading the config file), and test code.

use architectural_enforcement::{production_lines_of, rust_files, violation, PRODUCTION_DIRS};

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN blocking I/O:");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("  - std::fs and std::io::stdin() inside async code");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::io::stdin() with AsyncBufReadExt");
        eprintln!("  - reqwest::Client");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all blocking I/O calls in production code
fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(dir) {
            for line in production_lines_of(&path) {
                let code = &line.code;

                if code.contains("std::net::") || code.contains("use std::net") {
                    violations.push(violation(&path, &line, "Blocking network I/O"));
                }

                if code.contains("std::process::Command") {
                    violations.push(violation(&path, &line, "Blocking process I/O"));
                }

                if code.contains("reqwest::blocking") {
                    violations.push(violation(&path, &line, "Blocking HTTP client"));
                }

                if line.in_async_fn && code.contains("std::fs::") {
                    violations.push(violation(&path, &line, "Blocking file I/O in async"));
                }

                if line.in_async_fn && code.contains("std::io::stdin()") {
                    violations.push(violation(&path, &line, "Blocking stdin in async"));
                }
            }
        }
    }

    violations
}
