use std::fs;
use std::path::{Path, PathBuf};

/// Resolves a configuration path into the ordered list of configuration
/// units to run servers for.
///
/// A directory containing `*.conf` files yields one unit per file, sorted by
/// name so the group order is deterministic. Anything else — a plain file, a
/// directory with no matches, or an unreadable path — is treated as a single
/// unit and left for the server factory to reject if it is unusable.
pub fn resolve_config_units(path: &Path) -> Vec<PathBuf> {
    let mut units: Vec<PathBuf> = match fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "conf"))
            .collect(),
        Err(_) => Vec::new(),
    };

    if units.is_empty() {
        return vec![path.to_path_buf()];
    }

    units.sort();
    units
}
