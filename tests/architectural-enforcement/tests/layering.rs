//! Integration Test: Layering Rules
//!
//! **Policy**:
//! - The headless core must build without any terminal crate, so every
//!   presentation concern stays in the `tui` crate.
//! - Production code never blocks a thread with `std::thread::sleep`; waits
//!   go through tokio timers or I/O.
//! - The connector never spawns tasks. Events reach the sink in wire order
//!   through one producer and one consumer.

use std::fs;

use architectural_enforcement::{
    manifest_dependencies, production_lines, rust_files, workspace_root,
};

const TERMINAL_CRATES: &[&str] = &["ratatui", "crossterm"];

const PRODUCTION_DIRS: &[&str] = &["pipeline/core/src", "tui/src"];

#[test]
fn test_core_manifest_has_no_terminal_crates() {
    let manifest = fs::read_to_string(workspace_root().join("pipeline/core/Cargo.toml"))
        .expect("core manifest must exist");
    let deps = manifest_dependencies(&manifest);

    let offending: Vec<_> = deps
        .iter()
        .filter(|dep| TERMINAL_CRATES.contains(&dep.as_str()))
        .collect();
    assert!(
        offending.is_empty(),
        "flowwatch-core must not depend on {offending:?}"
    );
}

#[test]
fn test_core_sources_never_import_terminal_crates() {
    let mut violations = Vec::new();
    for path in rust_files("pipeline/core/src") {
        for (line_number, code) in production_lines(&path) {
            if TERMINAL_CRATES
                .iter()
                .any(|name| code.contains(&format!("{name}::")))
            {
                violations.push(format!("{}:{} - {}", path.display(), line_number, code.trim()));
            }
        }
    }

    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        panic!("Found {} terminal import(s) in flowwatch-core", violations.len());
    }
}

#[test]
fn test_no_thread_sleep_in_production_code() {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        let files = rust_files(dir);
        assert!(!files.is_empty(), "no sources found under {dir}");
        for path in files {
            for (line_number, code) in production_lines(&path) {
                if code.contains("thread::sleep(") {
                    violations.push(format!("{}:{} - {}", path.display(), line_number, code.trim()));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking sleep found in production code!");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use tokio::time::sleep_until / interval, or wait on I/O");
        panic!("Found {} sleep violation(s)", violations.len());
    }
}

#[test]
fn test_connector_never_spawns_tasks() {
    let path = workspace_root().join("pipeline/core/src/connector.rs");
    let lines = production_lines(&path);
    assert!(!lines.is_empty(), "connector source must exist");

    let spawns: Vec<_> = lines
        .iter()
        .filter(|(_, code)| code.contains("spawn(") || code.contains("spawn_blocking("))
        .map(|(n, code)| format!("{}:{} - {}", path.display(), n, code.trim()))
        .collect();
    assert!(
        spawns.is_empty(),
        "connector must hand events on in order without spawning: {spawns:#?}"
    );
}
