//! Integration Test: Panic Prohibition in the Streaming Pipeline
//!
//! **Policy**: Everything between the transport and the published snapshot
//! runs inside spawned tasks or under the controller lock. A panic there
//! poisons nothing but silently kills the session, so errors are propagated
//! or turned into events instead.

use architectural_enforcement::{core_src, is_under, production_lines};

const PIPELINE: &[&str] = &[
    "controller",
    "transport",
    "reveal",
    "events.rs",
    "conversation.rs",
    "session.rs",
];

const FORBIDDEN: &[&str] = &[".unwrap()", ".expect(", "panic!(", "unreachable!("];

#[test]
fn test_no_panics_in_streaming_pipeline() {
    let violations: Vec<_> = production_lines(&core_src())
        .into_iter()
        .filter(|line| is_under(line, PIPELINE))
        .filter(|line| FORBIDDEN.iter().any(|pattern| line.code.contains(pattern)))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Panicking calls found in the streaming pipeline!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        panic!(
            "\nFound {} panic violation(s).\nPropagate the error or emit an error event instead.",
            violations.len()
        );
    }
}
