//! Resolves mixed-case paths to their actual on-disk casing (spec §4.2),
//! so that beatmap content referencing e.g. `BG.JPG` still resolves on a
//! case-sensitive filesystem when the file is really named `bg.jpg`.
//!
//! A single stat is tried first; only on a miss does the resolver fall
//! back to its per-parent-directory cache, amortizing the cost of a full
//! directory scan across every lookup in that directory until its mtime
//! changes.

mod cache;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use cache::{scan_directory, DirectoryCache, DirectoryCacheEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

/// Thread-safe case-insensitive path resolver with one shared directory
/// cache. Cheap to clone: all state lives behind an `Arc`-free `Mutex`
/// shared by reference, matching how the original resolver is a single
/// engine-wide instance rather than one per caller.
pub struct PathResolver {
    cache: Mutex<DirectoryCache>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(DirectoryCache::new()),
        }
    }

    /// Number of parent directories currently cached. Exposed for tests
    /// and diagnostics only.
    pub fn cached_directory_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Resolves `path` to its actual on-disk casing. Returns `None` if no
    /// case-insensitive match exists in the parent directory either.
    pub fn resolve(&self, path: &str) -> Option<(String, FileType)> {
        if let Some(file_type) = stat_file_type(path) {
            return Some((path.to_string(), file_type));
        }

        let p = Path::new(path);
        let parent = p.parent()?;
        let file_name = p.file_name()?.to_string_lossy().into_owned();
        let parent_str = parent.to_string_lossy().into_owned();
        let lower_name = file_name.to_lowercase();

        let mut cache = self.cache.lock();

        if cache.get_fresh(&parent_str).is_none() {
            match scan_directory(parent) {
                Ok(entry) => cache.insert(parent_str.clone(), entry),
                Err(e) => {
                    debug!(parent = %parent_str, error = %e, "failed to scan directory for case-insensitive lookup");
                    return None;
                }
            }
        }

        let entry: &DirectoryCacheEntry = cache.get_fresh(&parent_str)?;
        let (actual_name, file_type) = entry.children.get(&lower_name)?;

        let mut resolved = PathBuf::from(&parent_str);
        resolved.push(actual_name);

        Some((resolved.to_string_lossy().into_owned(), *file_type))
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn stat_file_type(path: &str) -> Option<FileType> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(if metadata.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn exact_path_resolves_without_touching_cache() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("Song.osu");
        fs::write(&file_path, b"data").unwrap();

        let resolver = PathResolver::new();
        let (resolved, file_type) = resolver
            .resolve(file_path.to_str().unwrap())
            .expect("exact path should resolve");

        assert_eq!(resolved, file_path.to_string_lossy());
        assert_eq!(file_type, FileType::File);
        assert_eq!(resolver.cached_directory_count(), 0);
    }

    #[test]
    fn mixed_case_path_resolves_via_directory_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Background.jpg"), b"data").unwrap();

        let resolver = PathResolver::new();
        let lookup = dir.path().join("BACKGROUND.JPG");
        let (resolved, file_type) = resolver
            .resolve(lookup.to_str().unwrap())
            .expect("case-insensitive match should be found");

        assert!(resolved.ends_with("Background.jpg"));
        assert_eq!(file_type, FileType::File);
        assert_eq!(resolver.cached_directory_count(), 1);
    }

    #[test]
    fn second_lookup_in_same_directory_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Hitsound.wav"), b"data").unwrap();
        fs::write(dir.path().join("Other.wav"), b"data").unwrap();

        let resolver = PathResolver::new();
        resolver.resolve(dir.path().join("HITSOUND.WAV").to_str().unwrap());
        resolver.resolve(dir.path().join("OTHER.WAV").to_str().unwrap());

        assert_eq!(resolver.cached_directory_count(), 1);
    }

    #[test]
    fn missing_file_with_no_case_insensitive_match_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Real.txt"), b"data").unwrap();

        let resolver = PathResolver::new();
        let lookup = dir.path().join("Nonexistent.txt");
        assert!(resolver.resolve(lookup.to_str().unwrap()).is_none());
    }

    #[test]
    fn stale_cache_entry_rescans_after_directory_changes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("First.txt"), b"data").unwrap();

        let resolver = PathResolver::new();
        resolver.resolve(dir.path().join("FIRST.TXT").to_str().unwrap());

        // mtime resolution on some filesystems is coarse; sleeping a tick
        // keeps this test meaningful without flaking on fast filesystems
        // that otherwise report an unchanged mtime within the same instant.
        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(dir.path().join("Second.txt"), b"data").unwrap();

        let (resolved, _) = resolver
            .resolve(dir.path().join("SECOND.TXT").to_str().unwrap())
            .expect("newly created file should resolve after rescan");
        assert!(resolved.ends_with("Second.txt"));
    }
}
