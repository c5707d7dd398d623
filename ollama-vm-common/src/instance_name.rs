//! Instance names are `ollama-vm-<epoch millis>`.
//!
//! The millisecond suffix is bumped past the last one handed out in this
//! process, so two calls within the same millisecond still get distinct names.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

pub const INSTANCE_NAME_PREFIX: &str = "ollama-vm-";

static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(0);

pub fn generate() -> String {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_ISSUED_MS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_ISSUED_MS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return format!("{}{}", INSTANCE_NAME_PREFIX, next),
            Err(actual) => prev = actual,
        }
    }
}

/// True for names this module could have produced.
pub fn is_generated(name: &str) -> bool {
    name.strip_prefix(INSTANCE_NAME_PREFIX)
        .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_in_a_tight_loop() {
        let names: HashSet<String> = (0..500).map(|_| generate()).collect();
        assert_eq!(names.len(), 500);
        assert!(names.iter().all(|n| is_generated(n)));
    }

    #[test]
    fn recognises_pattern() {
        assert!(is_generated("ollama-vm-1714564800000"));
        assert!(!is_generated("ollama-vm-"));
        assert!(!is_generated("ollama-vm-12a"));
        assert!(!is_generated("inventory-1"));
    }
}
