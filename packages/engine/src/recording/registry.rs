// packages/engine/src/recording/registry.rs
//! Exchange registry
//!
//! Insertion-ordered, in-memory collection of completed exchanges for the
//! current session, with full-snapshot publish/subscribe.
//!
//! Mutations and their publication are serialized by a separate publish
//! lock, so subscribers see snapshots in mutation order. The collection lock
//! is released before any callback runs: a subscriber may read the registry,
//! subscribe, or even `clear()` it from inside its callback.

use crate::recording::body_store::BodyStore;
use crate::recording::content_type::ShortType;
use crate::recording::exchange::ExchangeRecord;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Observer callback, handed the full collection after every change
pub type Subscriber = Arc<dyn Fn(&[Arc<ExchangeRecord>]) + Send + Sync>;

/// Handle returned by [`ExchangeRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Status-class filter chosen in the viewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Success,
    Redirect,
    Error,
    #[default]
    All,
}

/// Sort order chosen in the viewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Desc,
    Asc,
    #[default]
    Clear,
}

/// Viewer preferences, stored and handed back without interpretation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub status: StatusFilter,
    pub sort_by_start_time: SortOrder,
    pub sort_by_finish_time: SortOrder,
    pub sort_by_duration: SortOrder,
    pub ignored_domains: BTreeSet<String>,
    pub short_types: BTreeMap<ShortType, bool>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            status: StatusFilter::default(),
            sort_by_start_time: SortOrder::default(),
            sort_by_finish_time: SortOrder::default(),
            sort_by_duration: SortOrder::default(),
            ignored_domains: BTreeSet::new(),
            short_types: ShortType::ALL.iter().map(|t| (*t, true)).collect(),
        }
    }
}

/// Thread-safe registry of completed exchanges
pub struct ExchangeRegistry {
    publishing: ReentrantMutex<()>,
    records: Mutex<Vec<Arc<ExchangeRecord>>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    preferences: RwLock<Preferences>,
    body_store: Option<Arc<BodyStore>>,
}

impl ExchangeRegistry {
    /// Registry without body storage; `clear` only drops records
    pub fn new() -> Self {
        Self {
            publishing: ReentrantMutex::new(()),
            records: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            preferences: RwLock::new(Preferences::default()),
            body_store: None,
        }
    }

    /// Registry whose `clear` also deletes the session's stored bodies
    pub fn with_body_store(body_store: Arc<BodyStore>) -> Self {
        Self {
            body_store: Some(body_store),
            ..Self::new()
        }
    }

    /// Append a completed exchange and publish the new collection
    pub fn add(&self, record: ExchangeRecord) -> Arc<ExchangeRecord> {
        let record = Arc::new(record);
        let _publishing = self.publishing.lock();

        let snapshot = {
            let mut records = self.records.lock();
            records.push(Arc::clone(&record));
            records.clone()
        };
        debug!("Registered exchange {} ({} total)", record.id, snapshot.len());

        self.publish(&snapshot);
        record
    }

    /// Drop every record, delete stored bodies and publish the empty collection
    pub fn clear(&self) {
        let _publishing = self.publishing.lock();

        self.records.lock().clear();
        if let Some(store) = &self.body_store {
            store.clear();
        }
        debug!("Cleared exchange registry");

        self.publish(&[]);
    }

    fn publish(&self, records: &[Arc<ExchangeRecord>]) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            callback(records);
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[Arc<ExchangeRecord>]) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` if the handle was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    /// Snapshot of the current collection in insertion order
    pub fn records(&self) -> Vec<Arc<ExchangeRecord>> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences.read().clone()
    }

    pub fn set_preferences(&self, preferences: Preferences) {
        *self.preferences.write() = preferences;
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::body_store::Direction;
    use crate::recording::exchange::{CachePolicy, RequestFacet};
    use hyper::Request;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn record(url: &str) -> ExchangeRecord {
        let (parts, _) = Request::get(url).body(()).unwrap().into_parts();
        ExchangeRecord::new(RequestFacet::from_parts(
            &parts,
            b"",
            CachePolicy::default(),
            Duration::from_secs(60),
        ))
    }

    #[test]
    fn test_add_publishes_full_snapshot() {
        let registry = ExchangeRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        registry.subscribe(move |records| sink.lock().push(records.len()));

        registry.add(record("http://a/1"));
        registry.add(record("http://a/2"));

        assert_eq!(*seen.lock(), vec![1, 2]);
        let urls: Vec<_> = registry.records().iter().map(|r| r.request.url.clone()).collect();
        assert_eq!(urls, vec!["http://a/1", "http://a/2"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = ExchangeRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let id = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.add(record("http://a/1"));

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(!registry.has_subscribers());

        registry.add(record("http://a/2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_deletes_bodies_and_publishes_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BodyStore::new(dir.path()).unwrap());
        let registry = ExchangeRegistry::with_body_store(Arc::clone(&store));

        let rec = record("http://a/1");
        let handle = store.write(&rec.id, Direction::Response, "body").unwrap();
        registry.add(rec);

        let last = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last);
        registry.subscribe(move |records| *sink.lock() = Some(records.len()));

        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(*last.lock(), Some(0));
        assert!(!handle.path().exists());
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let registry = Arc::new(ExchangeRegistry::new());
        let last_seen = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&last_seen);
        registry.subscribe(move |records| sink.store(records.len(), Ordering::SeqCst));

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.add(record(&format!("http://host/{}", i)));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 100);
        assert_eq!(last_seen.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_subscriber_may_read_and_clear_registry() {
        let registry = Arc::new(ExchangeRegistry::new());
        let observed = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&registry);
        let sink = Arc::clone(&observed);
        registry.subscribe(move |records| {
            let Some(registry) = weak.upgrade() else { return };
            sink.lock().push((records.len(), registry.len()));
            if registry.len() == 2 {
                registry.clear();
            }
        });

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&registry);
        std::thread::spawn(move || {
            worker.add(record("http://a/1"));
            worker.add(record("http://a/2"));
            tx.send(worker.records().len()).unwrap();
        });

        let remaining = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(remaining, 0);
        assert_eq!(*observed.lock(), vec![(1, 1), (2, 2), (0, 0)]);
    }

    #[test]
    fn test_preferences_pass_through() {
        let registry = ExchangeRegistry::new();
        assert_eq!(registry.preferences().status, StatusFilter::All);
        assert_eq!(registry.preferences().short_types.len(), 5);

        let mut prefs = registry.preferences();
        prefs.status = StatusFilter::Error;
        prefs.sort_by_duration = SortOrder::Desc;
        prefs.ignored_domains.insert("ads.example.com".to_string());
        registry.set_preferences(prefs.clone());

        assert_eq!(registry.preferences(), prefs);
    }
}
