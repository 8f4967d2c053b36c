//! In-memory counter storage.

use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

use super::{CounterStorage, StorageError};

#[derive(Debug)]
struct Counter {
    value: u64,
    /// `None` means the counter never expires.
    expires_at: Option<Instant>,
}

impl Counter {
    fn new(value: u64, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory counter storage.
///
/// Counters only live in this process, so limits are enforced per instance.
/// Expiry follows the tokio clock; expired counters behave as absent and are
/// replaced on their next write.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    counters: DashMap<String, Counter>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a live counter.
    pub fn value(&self, key: &str) -> Option<u64> {
        let now = Instant::now();

        self.counters
            .get(key)
            .filter(|counter| counter.is_live(now))
            .map(|counter| counter.value)
    }

    /// Time left before a live counter expires. `None` for missing counters.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();

        self.counters
            .get(key)
            .filter(|counter| counter.is_live(now))
            .and_then(|counter| counter.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

impl CounterStorage for InMemoryStorage {
    async fn set_if_not_exists(&self, key: &str, value: u64, ttl: Duration) -> Result<bool, StorageError> {
        let now = Instant::now();

        let created = match self.counters.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_live(now) => false,
            Entry::Occupied(mut entry) => {
                entry.insert(Counter::new(value, now, ttl));
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Counter::new(value, now, ttl));
                true
            }
        };

        Ok(created)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StorageError> {
        let now = Instant::now();

        let value = match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let counter = entry.get_mut();

                if !counter.is_live(now) {
                    *counter = Counter::new(0, now, ttl);
                }

                if counter.expires_at.is_none() {
                    log::debug!("Counter '{key}' had no expiry, applying {ttl:?}");
                    counter.expires_at = now.checked_add(ttl);
                }

                counter.value += 1;
                counter.value
            }
            Entry::Vacant(entry) => entry.insert(Counter::new(1, now, ttl)).value,
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn set_if_not_exists_only_creates_once() {
        let storage = InMemoryStorage::new();

        assert!(storage.set_if_not_exists("route", 0, WINDOW).await.unwrap());
        assert_eq!(storage.increment("route", WINDOW).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(20)).await;

        assert!(!storage.set_if_not_exists("route", 0, WINDOW).await.unwrap());
        assert_eq!(storage.value("route"), Some(1));
        assert_eq!(storage.remaining_ttl("route"), Some(Duration::from_secs(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_counter_is_recreated() {
        let storage = InMemoryStorage::new();

        storage.set_if_not_exists("route", 0, WINDOW).await.unwrap();
        storage.increment("route", WINDOW).await.unwrap();
        storage.increment("route", WINDOW).await.unwrap();

        tokio::time::advance(WINDOW).await;

        assert_eq!(storage.value("route"), None);
        assert!(storage.set_if_not_exists("route", 0, WINDOW).await.unwrap());
        assert_eq!(storage.increment("route", WINDOW).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn increment_of_missing_key_gets_an_expiry() {
        let storage = InMemoryStorage::new();

        assert_eq!(storage.increment("route", WINDOW).await.unwrap(), 1);
        assert_eq!(storage.remaining_ttl("route"), Some(WINDOW));

        tokio::time::advance(WINDOW).await;

        assert_eq!(storage.increment("route", WINDOW).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn increment_keeps_existing_expiry() {
        let storage = InMemoryStorage::new();
        storage.set_if_not_exists("route", 0, WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        storage.increment("route", Duration::from_secs(3600)).await.unwrap();

        assert_eq!(storage.remaining_ttl("route"), Some(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let storage = InMemoryStorage::new();

        storage.increment("a", WINDOW).await.unwrap();
        storage.increment("a", WINDOW).await.unwrap();
        storage.increment("b", WINDOW).await.unwrap();

        assert_eq!(storage.value("a"), Some(2));
        assert_eq!(storage.value("b"), Some(1));
    }
}
