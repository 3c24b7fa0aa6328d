//! Idempotent admission of external channel messages
//!
//! Delivery retries from the channel re-send the same message id; the guard
//! admits each id at most once so the pipeline's side effects stay
//! at-most-once per external message.

use std::collections::HashSet;
use std::sync::Mutex;

/// Outcome of admitting a message id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting; process the message
    Accepted,
    /// Already processed; acknowledge without re-running the pipeline
    Duplicate,
}

/// Append-only set of admitted message identifiers
#[derive(Debug, Default)]
pub struct IdempotencyGuard {
    seen: Mutex<HashSet<String>>,
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a message id, recording it on first sight
    pub fn admit(&self, message_id: &str) -> Admission {
        let mut seen = self.seen.lock().expect("guard lock poisoned");
        if seen.insert(message_id.to_string()) {
            Admission::Accepted
        } else {
            Admission::Duplicate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_admission_accepted_then_duplicate() {
        let guard = IdempotencyGuard::new();
        assert_eq!(guard.admit("wamid.1"), Admission::Accepted);
        assert_eq!(guard.admit("wamid.1"), Admission::Duplicate);
    }

    #[test]
    fn test_distinct_ids_are_independent() {
        let guard = IdempotencyGuard::new();
        assert_eq!(guard.admit("wamid.1"), Admission::Accepted);
        assert_eq!(guard.admit("wamid.2"), Admission::Accepted);
    }
}
