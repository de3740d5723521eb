//! Single-slot Stat Cache and ID (ETag) Cache.

use crate::resource::FileStat;

/// Holds the most recently produced `FileStat`, keyed by basename.
#[derive(Debug, Default)]
pub struct StatCache {
    slot: Option<FileStat>,
}

impl StatCache {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn get(&self, name: &str) -> Option<&FileStat> {
        self.slot.as_ref().filter(|s| s.name == name)
    }

    pub fn store(&mut self, stat: FileStat) {
        self.slot = Some(stat);
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

/// Holds the most recently observed ETag, keyed by the URI it was served for.
#[derive(Debug, Default)]
pub struct IdCache {
    slot: Option<(String, String)>,
}

impl IdCache {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn get(&self, uri: &str) -> Option<&str> {
        self.slot
            .as_ref()
            .filter(|(cached_uri, _)| cached_uri == uri)
            .map(|(_, etag)| etag.as_str())
    }

    pub fn store(&mut self, uri: String, etag: String) {
        self.slot = Some((uri, etag));
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(name: &str) -> FileStat {
        FileStat {
            name: name.to_string(),
            is_dir: false,
            mode: 0o644,
            size: 1,
            mtime: 0,
            etag: None,
        }
    }

    #[test]
    fn stat_cache_hits_on_matching_name_only() {
        let mut cache = StatCache::new();
        cache.store(stat("a.txt"));
        assert!(cache.get("a.txt").is_some());
        assert!(cache.get("b.txt").is_none());
    }

    #[test]
    fn stat_cache_invalidate_clears_slot() {
        let mut cache = StatCache::new();
        cache.store(stat("a.txt"));
        cache.invalidate();
        assert!(cache.get("a.txt").is_none());
    }

    #[test]
    fn id_cache_hits_on_matching_uri_only() {
        let mut cache = IdCache::new();
        cache.store("/files/a.txt".to_string(), "abc123".to_string());
        assert_eq!(cache.get("/files/a.txt"), Some("abc123"));
        assert!(cache.get("/files/b.txt").is_none());
    }

    #[test]
    fn id_cache_invalidate_clears_slot() {
        let mut cache = IdCache::new();
        cache.store("/files/a.txt".to_string(), "abc123".to_string());
        cache.invalidate();
        assert!(cache.get("/files/a.txt").is_none());
    }
}
