//! Host platform utility functions

use std::path::PathBuf;

/// Environment variable pointing at the root of the mast software tree, which holds the
/// `params` and `sessions` directories.
pub const SW_ROOT_ENV_VAR: &str = "MAST_SW_ROOT";

/// Get the software root directory.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}

/// Name of the host machine, or `"unknown"` if it cannot be determined.
pub fn get_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| String::from("unknown"))
}
