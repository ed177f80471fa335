//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Production code in the assistant core MUST NOT use blocking I/O.
//! **Exception**: `config/`, which reads one small file before the runtime
//! does any streaming work.

use architectural_enforcement::{core_src, is_under, production_lines};

const FORBIDDEN: &[&str] = &[
    "std::fs",
    "std::net",
    "std::process::Command",
    "reqwest::blocking",
    "std::thread::sleep",
];

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations: Vec<_> = production_lines(&core_src())
        .into_iter()
        .filter(|line| !is_under(line, &["config"]))
        .filter(|line| FORBIDDEN.iter().any(|pattern| line.code.contains(pattern)))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs, tokio::net");
        eprintln!("  - reqwest async client");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
