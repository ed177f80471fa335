//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the assistant core MUST NOT call sleep.
//! The reveal cadence awaits absolute deadlines (`sleep_until`) raced
//! against the cancellation token; a relative sleep would drift and could
//! not be cancelled mid-wait.

use architectural_enforcement::{core_src, production_lines};

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<_> = production_lines(&core_src())
        .into_iter()
        .filter(|line| line.code.contains("::sleep(") || line.code.contains(".sleep("))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use tokio::time::sleep_until inside tokio::select! with the session token");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_core_sources_are_found() {
    assert!(
        !production_lines(&core_src()).is_empty(),
        "no sources under {}",
        core_src().display()
    );
}
