//! Candidate port discovery.
//!
//! Configured entries are either literal paths or glob patterns. With no
//! configuration the platform defaults are used: USB serial and CDC-ACM
//! nodes on Unix, the first few COM ports on Windows.

use glob::Pattern;

/// Default patterns on Unix-like systems.
#[cfg(not(target_os = "windows"))]
pub fn default_patterns() -> Vec<String> {
    vec!["/dev/ttyUSB*".to_string(), "/dev/ttyACM*".to_string()]
}

/// Windows has no device nodes to glob; probe COM1..COM5.
#[cfg(target_os = "windows")]
pub fn default_patterns() -> Vec<String> {
    (1..=5).map(|i| format!("COM{}", i)).collect()
}

/// True if `entry` contains glob metacharacters.
pub fn is_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Expand one glob pattern into existing paths, sorted.
pub fn expand(pattern: &str) -> Vec<String> {
    if let Err(e) = Pattern::new(pattern) {
        log::warn!("ignoring invalid port pattern {:?}: {}", pattern, e);
        return Vec::new();
    }
    let mut paths: Vec<String> = match glob::glob(pattern) {
        Ok(entries) => entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path.to_string_lossy().into_owned()),
                Err(e) => {
                    log::debug!("skipping unreadable port path: {}", e);
                    None
                }
            })
            .collect(),
        Err(e) => {
            log::warn!("ignoring invalid port pattern {:?}: {}", pattern, e);
            Vec::new()
        }
    };
    paths.sort();
    paths
}

/// Resolve the configured list (or the defaults) into candidate paths.
/// Literal entries pass through even if they do not exist; patterns only
/// yield existing paths. Order is preserved and duplicates are dropped.
pub fn candidate_ports(configured: &[String]) -> Vec<String> {
    let entries = if configured.is_empty() {
        default_patterns()
    } else {
        configured.to_vec()
    };

    let mut out: Vec<String> = Vec::new();
    for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        let resolved = if is_pattern(entry) {
            expand(entry)
        } else {
            vec![entry.to_string()]
        };
        for path in resolved {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    log::debug!("candidate ports: {:?}", out);
    out
}
