//! In-process migration locks.
//!
//! At most one migration may hold a table name at a time. Acquisition never
//! waits: a second request for a held name fails with `MigrationInFlight`.

use crate::error::MigrationError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Shared registry of table names with a migration in flight.
#[derive(Debug, Clone, Default)]
pub struct MigrationLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl MigrationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every name, or none of them.
    ///
    /// Duplicate names in `names` are claimed once.
    pub fn try_acquire<S: AsRef<str>>(&self, names: &[S]) -> Result<MigrationGuard, MigrationError> {
        let mut held = self.registry();

        let mut claimed: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if held.contains(name) {
                return Err(MigrationError::MigrationInFlight(name.to_string()));
            }
            if !claimed.iter().any(|c| c == name) {
                claimed.push(name.to_string());
            }
        }
        held.extend(claimed.iter().cloned());
        debug!(tables = ?claimed, "Migration lock acquired");

        Ok(MigrationGuard {
            locks: self.clone(),
            names: claimed,
        })
    }

    /// Whether a migration currently holds `name`.
    pub fn is_locked(&self, name: &str) -> bool {
        self.registry().contains(name)
    }

    fn registry(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its table names when dropped.
#[derive(Debug)]
pub struct MigrationGuard {
    locks: MigrationLocks,
    names: Vec<String>,
}

impl MigrationGuard {
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Drop for MigrationGuard {
    fn drop(&mut self) {
        let mut held = self.locks.registry();
        for name in &self.names {
            held.remove(name);
        }
        debug!(tables = ?self.names, "Migration lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_of_same_table_is_rejected() {
        let locks = MigrationLocks::new();
        let _guard = locks.try_acquire(&["orders"]).unwrap();

        let err = locks.try_acquire(&["orders"]).unwrap_err();
        assert!(matches!(err, MigrationError::MigrationInFlight(name) if name == "orders"));
    }

    #[test]
    fn guard_drop_releases_names() {
        let locks = MigrationLocks::new();
        {
            let guard = locks.try_acquire(&["a", "b"]).unwrap();
            assert_eq!(guard.names(), ["a".to_string(), "b".to_string()]);
            assert!(locks.is_locked("a"));
        }
        assert!(!locks.is_locked("a"));
        assert!(!locks.is_locked("b"));
        assert!(locks.try_acquire(&["a"]).is_ok());
    }

    #[test]
    fn acquisition_is_all_or_nothing() {
        let locks = MigrationLocks::new();
        let _held = locks.try_acquire(&["b"]).unwrap();

        assert!(locks.try_acquire(&["a", "b"]).is_err());
        assert!(!locks.is_locked("a"));
    }

    #[test]
    fn clones_share_one_registry() {
        let locks = MigrationLocks::new();
        let other = locks.clone();
        let _guard = locks.try_acquire(&["t", "t"]).unwrap();

        assert!(other.try_acquire(&["t"]).is_err());
        assert!(other.try_acquire(&["u"]).is_ok());
    }

    #[test]
    fn locks_work_across_threads() {
        let locks = MigrationLocks::new();
        let guard = locks.try_acquire(&["shared"]).unwrap();

        let remote = locks.clone();
        let rejected = std::thread::spawn(move || remote.try_acquire(&["shared"]).is_err())
            .join()
            .unwrap();
        assert!(rejected);

        drop(guard);
        let remote = locks.clone();
        let accepted = std::thread::spawn(move || remote.try_acquire(&["shared"]).is_ok())
            .join()
            .unwrap();
        assert!(accepted);
    }
}
