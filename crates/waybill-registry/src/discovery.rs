//! Static discovery of agent declarations on disk.
//!
//! Discovery never loads, compiles, or executes the files it scans. It
//! walks a path with `ignore::WalkBuilder` (honoring `.gitignore`/`.ignore`
//! like any other tool in this ecosystem) and inspects each file's text for
//! a declaration marker. It is an additive convenience for locating modules
//! to load; `AgentRegistry::register` remains the only way an agent
//! actually becomes callable.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::RegistryError;

/// A marker found while scanning a file's text.
///
/// `// waybill:agent name="echo" module="agents::echo"` or the `#`-comment
/// equivalent in non-Rust files both parse to the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAgent {
    /// The declared agent name, as it must later be passed to `register`.
    pub agent_name: String,
    /// The declared module hint, forwarded into the registered deps blob.
    pub module_hint: String,
    /// File the declaration was found in.
    pub path: PathBuf,
}

const MARKER: &str = "waybill:agent";

/// Walk `root`, returning every agent declaration found in its files.
///
/// Errors only on I/O failure walking the tree; a file with no marker is
/// silently skipped, and a malformed marker line is skipped with a
/// `tracing::warn!` rather than aborting the whole walk.
pub fn discover(root: &Path) -> Result<Vec<DiscoveredAgent>, RegistryError> {
    let mut found = Vec::new();
    for entry in WalkBuilder::new(root).build() {
        let entry = entry.map_err(|e| RegistryError::Discovery(e.to_string()))?;
        if !entry.file_type().map_or(false, |ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let Ok(text) = std::fs::read_to_string(path) else {
            // Binary or unreadable file; discovery never executes it either way.
            continue;
        };
        for line in text.lines() {
            if let Some(marker) = parse_marker(line) {
                found.push(DiscoveredAgent {
                    agent_name: marker.0,
                    module_hint: marker.1,
                    path: path.to_path_buf(),
                });
            }
        }
    }
    Ok(found)
}

/// Parse one `waybill:agent name="..." module="..."` line, in either `//`
/// or `#` comment form. Returns `None` for any line without the marker or
/// missing the required `name` attribute.
fn parse_marker(line: &str) -> Option<(String, String)> {
    let idx = line.find(MARKER)?;
    let rest = &line[idx + MARKER.len()..];
    let name = extract_attr(rest, "name")?;
    let module = extract_attr(rest, "module").unwrap_or_else(|| "unknown".to_string());
    Some((name, module))
}

fn extract_attr(text: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=\"");
    let start = text.find(&needle)? + needle.len();
    let end = text[start..].find('"')? + start;
    Some(text[start..end].to_string())
}
