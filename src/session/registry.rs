//! Result-set registry with time-based eviction.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Result, XystonError};
use crate::query::ResultSetLookup;

/// Registered result sets keyed by id. Every executed search is stored
/// here so a later query can refer back to it by `cql.resultSetId`.
/// Entries expire after the configured TTL; eviction happens on access,
/// and an expired or unknown id is a structured error rather than an
/// empty result.
pub struct ResultSetRegistry {
    ttl: Duration,
    entries: RwLock<AHashMap<String, Entry>>,
}

struct Entry {
    native_query: String,
    registered_at: Instant,
}

impl ResultSetRegistry {
    pub fn new(ttl: Duration) -> Self {
        ResultSetRegistry {
            ttl,
            entries: RwLock::new(AHashMap::new()),
        }
    }

    /// Store a native query and return the id assigned to it.
    pub fn register<S: Into<String>>(&self, native_query: S) -> String {
        let id = Uuid::new_v4().to_string();
        let mut entries = self.entries.write();
        evict_expired(&mut entries, self.ttl);
        entries.insert(
            id.clone(),
            Entry {
                native_query: native_query.into(),
                registered_at: Instant::now(),
            },
        );
        debug!("registered result set {id}");
        id
    }

    /// Look up the native query registered under `id`.
    pub fn lookup(&self, id: &str) -> Result<String> {
        let mut entries = self.entries.write();
        evict_expired(&mut entries, self.ttl);
        entries
            .get(id)
            .map(|entry| entry.native_query.clone())
            .ok_or_else(|| XystonError::result_set_not_found(id))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.write();
        evict_expired(&mut entries, self.ttl);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSetLookup for ResultSetRegistry {
    fn native_query(&self, id: &str) -> Option<String> {
        self.lookup(id).ok()
    }
}

fn evict_expired(entries: &mut AHashMap<String, Entry>, ttl: Duration) {
    entries.retain(|id, entry| {
        let live = entry.registered_at.elapsed() <= ttl;
        if !live {
            debug!("evicting expired result set {id}");
        }
        live
    });
}
