use std::collections::HashMap;
use std::path::Path;
use std::time::{Instant, SystemTime};

use crate::FileType;

/// Cap on the number of parent directories the resolver remembers (spec
/// §4.2). On overflow the oldest quarter (by last access) is evicted in
/// one batch rather than evicting one-in-one-out, the same amortization
/// tradeoff the avatar/background caches make (spec §4.8/§4.9).
pub(crate) const MAX_ENTRIES: usize = 1000;

/// One directory's case-insensitive filename index.
pub(crate) struct DirectoryCacheEntry {
    /// lower-cased filename -> (true on-disk casing, file type)
    pub(crate) children: HashMap<String, (String, FileType)>,
    pub(crate) last_access_time: Instant,
    pub(crate) last_mtime: SystemTime,
}

pub(crate) struct DirectoryCache {
    entries: HashMap<String, DirectoryCacheEntry>,
}

impl DirectoryCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the cached entry for `parent` if its mtime still matches
    /// the directory on disk, touching its access time. A stale or absent
    /// entry is removed (if present) so the caller re-scans and re-inserts.
    pub(crate) fn get_fresh(&mut self, parent: &str) -> Option<&DirectoryCacheEntry> {
        let current_mtime = std::fs::metadata(parent).ok()?.modified().ok()?;

        let fresh = match self.entries.get(parent) {
            Some(entry) => entry.last_mtime == current_mtime,
            None => false,
        };

        if !fresh {
            self.entries.remove(parent);
            return None;
        }

        let entry = self.entries.get_mut(parent).unwrap();
        entry.last_access_time = Instant::now();
        Some(&*entry)
    }

    pub(crate) fn insert(&mut self, parent: String, entry: DirectoryCacheEntry) {
        if self.entries.len() >= MAX_ENTRIES && !self.entries.contains_key(&parent) {
            self.evict_oldest_quarter();
        }
        self.entries.insert(parent, entry);
    }

    fn evict_oldest_quarter(&mut self) {
        let evict_count = (self.entries.len() / 4).max(1);

        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.last_access_time))
            .collect();
        by_age.sort_by_key(|(_, access)| *access);

        for (path, _) in by_age.into_iter().take(evict_count) {
            self.entries.remove(&path);
        }
    }
}

/// Scans `dir`'s immediate children, producing the case-insensitive index
/// used by [`DirectoryCache`].
pub(crate) fn scan_directory(dir: &Path) -> std::io::Result<DirectoryCacheEntry> {
    let mtime = std::fs::metadata(dir)?.modified()?;
    let mut children = HashMap::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = if entry.file_type()?.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };
        children.insert(name.to_lowercase(), (name, file_type));
    }

    Ok(DirectoryCacheEntry {
        children,
        last_access_time: Instant::now(),
        last_mtime: mtime,
    })
}
