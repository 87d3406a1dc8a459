use crate::{
    sync::{Lock, LockEx},
    DynSvc,
};
use std::collections::HashMap;

/// The state of a name in one of the injector's caches. A name with no entry
/// has never been requested.
#[derive(Clone)]
pub(crate) enum CacheEntry {
    /// The value is currently being constructed.
    InProgress,
    /// The value has been constructed. Undefined values are cached too.
    Ready(Option<DynSvc>),
}

/// A cache of resolved values. The lock is only held for the duration of a
/// single operation, never while user code runs.
pub(crate) struct Cache {
    entries: Lock<HashMap<String, CacheEntry>>,
}

impl Cache {
    pub fn new() -> Self {
        Cache {
            entries: Lock::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<CacheEntry> {
        self.entries.with_inner(|entries| entries.get(name).cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.with_inner(|entries| entries.contains_key(name))
    }

    pub fn insert(&self, name: impl Into<String>, value: Option<DynSvc>) {
        let name = name.into();
        self.entries.with_inner_mut(|entries| {
            entries.insert(name, CacheEntry::Ready(value));
        });
    }

    pub fn begin(&self, name: &str) {
        self.entries.with_inner_mut(|entries| {
            entries.insert(name.to_owned(), CacheEntry::InProgress);
        });
    }

    /// Removes the entry for a failed construction. Entries that were
    /// replaced while the construction ran are kept.
    pub fn abandon(&self, name: &str) {
        self.entries.with_inner_mut(|entries| {
            if let Some(CacheEntry::InProgress) = entries.get(name) {
                entries.remove(name);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dyn_svc;

    #[test]
    fn abandon_only_removes_in_progress_entries() {
        let cache = Cache::new();
        cache.begin("a");
        cache.abandon("a");
        assert!(!cache.contains("a"));

        cache.insert("b", Some(dyn_svc(1i32)));
        cache.abandon("b");
        assert!(matches!(cache.lookup("b"), Some(CacheEntry::Ready(Some(_)))));
    }

    #[test]
    fn undefined_values_are_cached() {
        let cache = Cache::new();
        cache.insert("a", None);
        assert!(cache.contains("a"));
        assert!(matches!(cache.lookup("a"), Some(CacheEntry::Ready(None))));
    }
}
