//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. Waiting is done on I/O, on
//! channels, or on timers owned by `schedule.rs`.
//! **Exceptions**: `courier/core/src/schedule.rs` (the timer module), test code.

use architectural_enforcement::{production_lines_of, rust_files, violation, PRODUCTION_DIRS};

/// The one file allowed to call `tokio::time::sleep`
const TIMER_MODULE: &str = "schedule.rs";

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - schedule::after / schedule::every / schedule::delay");
        eprintln!("  - tokio::time::interval() in a polling loop");
        eprintln!("  - Test code (#[cfg(test)] modules, tests/ directories)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - std::thread::sleep anywhere");
        eprintln!("  - tokio::time::sleep outside schedule.rs");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The timer module itself must still never block a thread
#[test]
fn test_no_thread_sleep_anywhere() {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for path in rust_files(dir) {
            for line in production_lines_of(&path) {
                if line.code.contains("thread::sleep") {
                    violations.push(violation(&path, &line, "Thread sleep"));
                }
            }
        }
    }
    assert!(violations.is_empty(), "thread sleeps: {violations:#?}");
}

#[test]
fn test_production_sources_found() {
    for dir in PRODUCTION_DIRS {
        assert!(!rust_files(dir).is_empty(), "no sources under {dir}");
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(dir) {
            if path.file_name().and_then(|n| n.to_str()) == Some(TIMER_MODULE) {
                continue;
            }
            for line in production_lines_of(&path) {
                if line.code.contains("::sleep(") || line.code.contains(".sleep(") {
                    violations.push(violation(&path, &line, "Sleep"));
                }
            }
        }
    }

    violations
}
