// crates/command/src/paths.rs
use std::env;
use std::path::PathBuf;

/// State directory holding the daemon cookie.
///
/// `FORKER_STATE_DIR` wins, then the user runtime dir, then a dotdir
/// under `HOME`, then the system temp dir.
pub fn default_state_dir() -> PathBuf {
    if let Some(dir) = env::var_os("FORKER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = env::var_os("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir).join("forker");
    }
    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".forker");
    }
    env::temp_dir().join("forker")
}

/// Cookie file path inside a state directory.
pub fn cookie_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("forker.cookie")
}
