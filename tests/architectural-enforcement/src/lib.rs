//! Architectural Enforcement Integration Tests
//!
//! Source-tree checks for the layering rules of the workspace:
//! - `flowwatch-core` never depends on terminal crates
//! - No `std::thread::sleep` in production code
//! - The connector never spawns a task per event
//!
//! Helpers here are shared by the tests under `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root (two levels above this crate)
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under `dir`, relative to the workspace root
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Code lines of a source file that belong to production code
///
/// Comments are stripped, and scanning stops at the first `#[cfg(test)]`
/// since test modules sit at the bottom of each file. Returns
/// `(line_number, code)` pairs.
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    production_lines_of(&content)
}

/// [`production_lines`] over source text
pub fn production_lines_of(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = line.split("//").next().unwrap_or(line);
        if !code.trim().is_empty() {
            lines.push((idx + 1, code.to_string()));
        }
    }
    lines
}

/// Names of the crates listed in the dependency tables of a manifest
///
/// Dev-dependencies are excluded; they never ship in the library.
pub fn manifest_dependencies(manifest: &str) -> Vec<String> {
    let mut in_deps = false;
    let mut deps = Vec::new();
    for line in manifest.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_deps = line == "[dependencies]"
                || (line.starts_with("[target.") && line.ends_with(".dependencies]"));
            continue;
        }
        if !in_deps || line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, _)) = line.split_once('=') {
            deps.push(name.trim().to_string());
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// comment only\nlet x = 1; // trailing\n#[cfg(test)]\nfn b() {}\n";
        let lines = production_lines_of(source);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], (3, "let x = 1; ".to_string()));
    }

    #[test]
    fn test_manifest_dependencies_skip_dev_deps() {
        let manifest = "[package]\nname = \"x\"\n\n[dependencies]\ntokio = \"1\"\n# note\nserde = { version = \"1\" }\n\n[dev-dependencies]\nratatui = \"0.29\"\n";
        assert_eq!(manifest_dependencies(manifest), ["tokio", "serde"]);
    }
}
