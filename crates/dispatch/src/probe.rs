// crates/dispatch/src/probe.rs
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// How long a failed reachability probe suppresses further attempts.
const NEGATIVE_TTL: Duration = Duration::from_secs(5);

fn cache() -> &'static Mutex<HashMap<u16, Instant>> {
    static CACHE: OnceLock<Mutex<HashMap<u16, Instant>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Whether this port failed a probe within the negative-cache window.
pub(crate) fn recently_unreachable(port: u16) -> bool {
    let cache = cache().lock().expect("probe cache lock");
    cache
        .get(&port)
        .is_some_and(|failed_at| failed_at.elapsed() < NEGATIVE_TTL)
}

pub(crate) fn note_unreachable(port: u16) {
    cache()
        .lock()
        .expect("probe cache lock")
        .insert(port, Instant::now());
}

pub(crate) fn note_reachable(port: u16) {
    cache().lock().expect("probe cache lock").remove(&port);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_results_are_cached_then_cleared() {
        let port = 49999;
        assert!(!recently_unreachable(port));
        note_unreachable(port);
        assert!(recently_unreachable(port));
        note_reachable(port);
        assert!(!recently_unreachable(port));
    }
}
