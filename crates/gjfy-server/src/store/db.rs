use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::id::derive_id;
use super::model::{Endpoints, HiddenEntryInfo, SecretRecord, StoreEntryInfo};

/// Validity window applied when a secret is created with `valid_for == 0`.
pub const DEFAULT_VALID_FOR_DAYS: u32 = 7;

/// Longest validity window a secret can be given, in days.
pub const MAX_VALID_FOR_DAYS: u32 = 36_500;

/// Thread-safe handle to the in-memory secret table.
///
/// Clones share the same table. Every operation touches a single id and
/// runs under that id's shard guard; nothing blocks on I/O while a guard is
/// held. Readers only ever get copies of records.
#[derive(Clone)]
pub struct SecretStore {
    records: Arc<DashMap<String, SecretRecord>>,
    clock: Arc<dyn Clock>,
    default_valid_for: u32,
}

impl SecretStore {
    /// Create an empty store on the system clock.
    pub fn new(default_valid_for: u32) -> Self {
        Self::with_clock(default_valid_for, Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(default_valid_for: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            clock,
            default_valid_for: default_valid_for.clamp(1, MAX_VALID_FOR_DAYS),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store a new secret and return its id.
    ///
    /// An empty `id` is replaced by one derived from the complete record,
    /// creation time included. A `valid_for` of 0 falls back to the store
    /// default, larger values are capped at [`MAX_VALID_FOR_DAYS`] and a
    /// `max_clicks` of 0 allows a single click. An explicit `id` must be
    /// URL-safe since it ends up in links unescaped. An existing record under
    /// the same id is overwritten.
    pub fn create(&self, secret: &str, max_clicks: u32, valid_for: u32, id: &str) -> String {
        let valid_for = match valid_for {
            0 => self.default_valid_for,
            days => days.min(MAX_VALID_FOR_DAYS),
        };
        let max_clicks = max_clicks.max(1);
        let record = SecretRecord {
            secret: secret.to_owned(),
            max_clicks,
            clicks: 0,
            date_added: self.clock.now(),
            valid_for,
        };
        let now = record.date_added;

        let id = if id.is_empty() {
            derive_id(&record)
        } else {
            id.to_owned()
        };

        if let Some(previous) = self.records.insert(id.clone(), record) {
            if !previous.is_expired(now) && !previous.is_exhausted() {
                warn!(id = %id, "overwrote a live secret with the same id");
            }
        }

        debug!(id = %id, max_clicks, valid_for, "stored secret");
        id
    }

    /// Look up a secret without counting a click.
    /// Returns `None` if the id is unknown or its validity window has closed.
    pub fn read(&self, id: &str) -> Option<SecretRecord> {
        let now = self.clock.now();
        self.records
            .get(id)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value().clone())
    }

    /// Retrieve a secret and count one click against its quota.
    ///
    /// The click that uses up the quota still returns the record, which is
    /// removed in the same critical section. Expired records found here are
    /// evicted and reported as absent.
    pub fn consume(&self, id: &str) -> Option<SecretRecord> {
        let now = self.clock.now();

        match self.records.entry(id.to_owned()) {
            Entry::Vacant(_) => None,
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    slot.remove();
                    debug!(id = %id, "lazy-evicted expired secret");
                    return None;
                }

                let record = slot.get_mut();
                assert!(
                    !record.is_exhausted(),
                    "secret {id} still stored after {} of {} clicks",
                    record.clicks,
                    record.max_clicks
                );
                record.clicks += 1;

                if record.is_exhausted() {
                    let (_, burned) = slot.remove_entry();
                    debug!(id = %id, "burned after final click");
                    Some(burned)
                } else {
                    Some(record.clone())
                }
            }
        }
    }

    /// Remove a secret. Returns whether it existed; absent ids are not an error.
    pub fn delete(&self, id: &str) -> bool {
        let existed = self.records.remove(id).is_some();
        if existed {
            debug!(id = %id, "deleted secret");
        }
        existed
    }

    /// Remove every record whose validity window has closed at `now`.
    /// Returns the ids that were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut removed = Vec::new();
        self.records.retain(|id, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        removed
    }

    /// Full view of a secret with its links, without counting a click.
    pub fn info(&self, id: &str, endpoints: &Endpoints) -> Option<StoreEntryInfo> {
        self.read(id)
            .map(|record| StoreEntryInfo::new(id, record, endpoints))
    }

    /// Metadata-only view of a secret, without counting a click.
    pub fn info_hidden(&self, id: &str, endpoints: &Endpoints) -> Option<HiddenEntryInfo> {
        self.info(id, endpoints).map(StoreEntryInfo::hidden)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use chrono::Duration;

    use super::*;
    use crate::store::clock::ManualClock;
    use crate::store::model::HIDDEN_SECRET;

    fn make_store() -> (SecretStore, ManualClock) {
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let store = SecretStore::with_clock(DEFAULT_VALID_FOR_DAYS, Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn validity_is_capped_at_creation() {
        let (s, _clock) = make_store();
        let id = s.create("v", 1, u32::MAX, "");
        let record = s.read(&id).unwrap();
        assert_eq!(record.valid_for, MAX_VALID_FOR_DAYS);
        assert!(s.consume(&id).is_some());
        assert!(s.read(&id).is_none());

        let s = SecretStore::with_clock(u32::MAX, Arc::new(ManualClock::new(s.now())));
        let id = s.create("v", 1, 0, "");
        assert_eq!(s.read(&id).unwrap().valid_for, MAX_VALID_FOR_DAYS);
    }

    #[test]
    fn sweep_survives_out_of_range_validity() {
        let (s, clock) = make_store();
        s.records.insert(
            "huge".into(),
            SecretRecord {
                secret: "v".into(),
                max_clicks: 1,
                clicks: 0,
                date_added: clock.now(),
                valid_for: u32::MAX,
            },
        );
        s.create("old", 1, 1, "old");

        let removed = s.sweep_expired(clock.now() + Duration::days(400_000));
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(s.read("old").is_none());
        assert!(s.read("huge").is_some());
        assert!(s.consume("huge").is_some());
        assert!(s.is_empty());
    }

    #[test]
    fn create_read_delete() {
        let (s, _clock) = make_store();
        let id = s.create("my-value", 5, 1, "");
        let record = s.read(&id).unwrap();
        assert_eq!(record.secret, "my-value");
        assert_eq!(record.clicks, 0);
        assert!(s.delete(&id));
        assert!(s.read(&id).is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let (s, _clock) = make_store();
        assert!(!s.delete("nope"));
        let id = s.create("v", 1, 1, "");
        assert!(s.delete(&id));
        assert!(!s.delete(&id));
    }

    #[test]
    fn explicit_id_is_used_verbatim() {
        let (s, _clock) = make_store();
        assert_eq!(s.create("v", 1, 1, "my-id"), "my-id");
        assert_eq!(s.read("my-id").unwrap().secret, "v");
    }

    #[test]
    fn explicit_id_overwrites() {
        let (s, _clock) = make_store();
        s.create("old", 3, 1, "dup");
        s.create("new", 3, 1, "dup");
        assert_eq!(s.read("dup").unwrap().secret, "new");
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn zero_validity_uses_default() {
        let (s, _clock) = make_store();
        let id = s.create("v", 1, 0, "");
        assert_eq!(s.read(&id).unwrap().valid_for, DEFAULT_VALID_FOR_DAYS);
    }

    #[test]
    fn read_does_not_count_clicks() {
        let (s, _clock) = make_store();
        let id = s.create("v", 1, 1, "");
        for _ in 0..3 {
            assert_eq!(s.read(&id).unwrap().clicks, 0);
        }
        assert!(s.consume(&id).is_some());
    }

    #[test]
    fn scenario_two_clicks() {
        let (s, _clock) = make_store();
        let id = s.create("hunter2", 2, 1, "");

        let first = s.consume(&id).unwrap();
        assert_eq!(first.secret, "hunter2");
        assert_eq!(first.remaining_clicks(), 1);

        let second = s.consume(&id).unwrap();
        assert_eq!(second.secret, "hunter2");
        assert_eq!(second.clicks, 2);

        assert!(s.read(&id).is_none());
        assert!(s.consume(&id).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn quota_is_exact_for_any_max() {
        let (s, _clock) = make_store();
        for max in 1..=6u32 {
            let id = s.create("v", max, 1, &format!("id-{max}"));
            for _ in 0..max {
                assert_eq!(s.consume(&id).unwrap().secret, "v");
            }
            assert!(s.consume(&id).is_none());
            assert!(s.read(&id).is_none());
        }
    }

    #[test]
    fn single_click_burns_on_first_consume() {
        let (s, _clock) = make_store();
        let id = s.create("once", 1, 1, "");
        assert_eq!(s.consume(&id).unwrap().secret, "once");
        assert!(s.read(&id).is_none());
        assert!(s.consume(&id).is_none());
    }

    #[test]
    fn zero_max_clicks_behaves_like_one() {
        let (s, _clock) = make_store();
        let id = s.create("once", 0, 1, "");
        assert_eq!(s.read(&id).unwrap().max_clicks, 1);
        assert_eq!(s.consume(&id).unwrap().secret, "once");
        assert!(s.consume(&id).is_none());
    }

    #[test]
    fn time_expiry_ignores_remaining_quota() {
        let (s, clock) = make_store();
        let created = clock.now();
        let id = s.create("v", 100, 1, "");

        clock.set(created + Duration::days(1) - Duration::seconds(1));
        assert!(s.read(&id).is_some());
        assert!(s.consume(&id).is_some());

        clock.set(created + Duration::days(1) + Duration::seconds(1));
        assert!(s.read(&id).is_none());
        assert!(s.consume(&id).is_none());
        // consume evicts what it finds expired
        assert!(s.is_empty());
    }

    #[test]
    fn sweep_removes_only_time_expired() {
        let (s, clock) = make_store();
        let created = clock.now();
        let short = s.create("short", 5, 1, "short");
        let long = s.create("long", 5, 3, "long");

        assert!(s.sweep_expired(created + Duration::hours(23)).is_empty());

        let removed = s.sweep_expired(created + Duration::days(1));
        assert_eq!(removed, vec![short.clone()]);
        assert!(s.read(&long).is_some());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn derived_id_is_deterministic() {
        let (s, clock) = make_store();
        let a = s.create("same", 2, 1, "");
        let b = s.create("same", 2, 1, "");
        assert_eq!(a, b);
        assert_eq!(s.len(), 1);

        let c = s.create("other", 2, 1, "");
        assert_ne!(a, c);

        clock.advance(Duration::nanoseconds(1));
        let d = s.create("same", 2, 1, "");
        assert_ne!(a, d);
    }

    #[test]
    fn concurrent_consumers_get_exactly_one_delivery() {
        const N: usize = 16;
        let (s, _clock) = make_store();
        let id = s.create("race", 1, 1, "");
        let barrier = Barrier::new(N);

        let hits = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..N)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        s.consume(&id).is_some()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|hit| *hit)
                .count()
        });

        assert_eq!(hits, 1);
        assert!(s.read(&id).is_none());
    }

    #[test]
    fn concurrent_consumers_respect_larger_quota() {
        const N: usize = 32;
        let (s, _clock) = make_store();
        let id = s.create("race", 5, 1, "");
        let barrier = Barrier::new(N);

        let hits = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..N)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        s.consume(&id).is_some()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|hit| *hit)
                .count()
        });

        assert_eq!(hits, 5);
    }

    #[test]
    fn info_views_share_everything_but_the_secret() {
        let (s, _clock) = make_store();
        let ep = Endpoints::new("http://localhost:9154");
        let id = s.create("hunter2", 2, 1, "");

        let full = s.info(&id, &ep).unwrap();
        let hidden = s.info_hidden(&id, &ep).unwrap();

        assert_eq!(full.entry.secret, "hunter2");
        assert_eq!(hidden.entry.secret, HIDDEN_SECRET);
        assert_eq!(hidden.id, full.id);
        assert_eq!(hidden.url, full.url);
        assert_eq!(hidden.api_url, full.api_url);
        assert_eq!(hidden.entry.date_added, full.entry.date_added);
        // neither view counts a click
        assert_eq!(s.read(&id).unwrap().clicks, 0);
    }

    #[test]
    fn info_of_missing_is_none() {
        let (s, _clock) = make_store();
        let ep = Endpoints::new("http://localhost:9154");
        assert!(s.info("missing", &ep).is_none());
        assert!(s.info_hidden("missing", &ep).is_none());
    }
}
