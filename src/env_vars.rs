//! Environment variable handling for gantry and the host module path.

use std::env;

/// Registry source URL override (`GANTRY_SOURCE`).
pub fn source() -> Option<String> {
    env::var("GANTRY_SOURCE").ok().filter(|s| !s.is_empty())
}

/// Destination module tree override (`GANTRY_DESTINATION`).
pub fn destination() -> Option<String> {
    env::var("GANTRY_DESTINATION")
        .ok()
        .filter(|s| !s.is_empty())
}

/// Archive cache directory override (`GANTRY_CACHE_DIR`).
pub fn cache_dir() -> Option<String> {
    env::var("GANTRY_CACHE_DIR").ok().filter(|s| !s.is_empty())
}

/// Request timeout in seconds (`GANTRY_TIMEOUT`), ignored when unparseable.
pub fn timeout() -> Option<u64> {
    env::var("GANTRY_TIMEOUT").ok().and_then(|s| s.parse().ok())
}

/// The host's module search path (`PSModulePath`), a platform-separator
/// delimited directory list.
pub fn module_path() -> Option<String> {
    env::var("PSModulePath")
        .or_else(|_| env::var("PSMODULEPATH"))
        .ok()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_ignores_garbage() {
        // Not set in the test environment; parse failures map to None the
        // same way.
        assert!("not-a-number".parse::<u64>().is_err());
        let _ = timeout();
    }
}
