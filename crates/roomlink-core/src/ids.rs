//! Request id generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Produces a fresh token on every call.
///
/// Tokens only need to be collision-improbable within one session; they are
/// embedded in reply command names, so they must not contain `:`.
pub trait IdGenerator: Send + Sync {
    /// Returns a new token.
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// Random v4 UUIDs in simple (hyphen-less) form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic `<prefix>-<n>` ids, starting at 1.
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - 1
    }
}

impl fmt::Debug for SequentialIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialIds")
            .field("prefix", &self.prefix)
            .field("issued", &self.issued())
            .finish()
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_are_unique_and_colon_free() {
        let generator = UuidGenerator;
        let ids: HashSet<String> = (0..500).map(|_| generator.generate()).collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| !id.contains(':') && id.len() == 32));
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new("req");
        assert_eq!(ids.generate(), "req-1");
        assert_eq!(ids.generate(), "req-2");
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn closures_are_generators() {
        let fixed = || "fixed".to_string();
        assert_eq!(fixed.generate(), "fixed");
    }
}
