use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, trace};

use ba_async_io::AsyncIoEngine;
use ba_image::{GpuContext, Image};
use ba_network::{HttpRequest, NetworkClient};
use ba_resource::{DestroyMode, Handle, ResourceManager};

/// On-disk avatar/thumbnail files are trusted for this long before the
/// cache re-downloads them (spec §4.8; exact window pinned by `original_source/`
/// `AvatarManager.cpp`/`ThumbnailManager.cpp`, both `mtime + 7 days >= now`).
const DISK_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Batch size for [`IdentifierImageCache::update`]'s per-tick drain (spec
/// §4.8: "process up to 4 items starting at the checked index").
const ELEMS_PER_TICK: usize = 4;

struct Entry {
    file_path: PathBuf,
    image: Option<Handle<Image>>,
    last_access_time: f64,
}

/// What the cache knows about an in-flight or finished download for a
/// given identifier, tracked so a second `update` tick against the same
/// id doesn't re-issue the request while one is already outstanding (spec
/// §4.8 "Download coalescing").
enum DownloadState {
    InFlight,
    Succeeded(Vec<u8>),
    Failed,
}

#[derive(Default)]
struct State<K> {
    entries: HashMap<K, Entry>,
    refcounts: HashMap<K, u32>,
    load_queue: Vec<K>,
    blacklist: HashSet<K>,
    downloads: HashMap<K, DownloadState>,
    last_checked_index: usize,
}

/// The shared template behind both the avatar cache and the thumbnail
/// cache (spec §4.8: "both follow the same template"; SPEC_FULL §C.7).
/// Generic over the identifier type `K`; `path_of`/`url_of` are supplied
/// by the specific cache ([`crate::AvatarCache`], [`crate::ThumbnailCache`])
/// to derive a disk path and a download URL from an identifier.
pub struct IdentifierImageCache<K> {
    max_loaded: usize,
    path_of: Arc<dyn Fn(&K) -> PathBuf + Send + Sync>,
    url_of: Arc<dyn Fn(&K) -> String + Send + Sync>,
    gpu: GpuContext,
    state: Arc<Mutex<State<K>>>,
}

impl<K> IdentifierImageCache<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(
        max_loaded: usize,
        gpu: GpuContext,
        path_of: impl Fn(&K) -> PathBuf + Send + Sync + 'static,
        url_of: impl Fn(&K) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_loaded,
            path_of: Arc::new(path_of),
            url_of: Arc::new(url_of),
            gpu,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Increments the identifier's refcount (spec §4.8 `request`). Only on
    /// the transition from 0 to 1, and only if the id is neither blacklisted
    /// nor already cached, is it appended to the load queue (deduplicated).
    pub fn request(&self, id: K) {
        let mut state = self.state.lock();
        let count = state.refcounts.entry(id.clone()).or_insert(0);
        *count += 1;
        let current = *count;

        if current > 1 {
            trace!("refcount > 1, not enqueueing");
            return;
        }
        if state.blacklist.contains(&id) || state.entries.contains_key(&id) {
            return;
        }
        if !state.load_queue.contains(&id) {
            state.load_queue.push(id);
        }
    }

    /// Decrements the refcount (spec §4.8 `discard`); at zero, removes the
    /// id from the load queue if it never finished loading. Already-loaded
    /// entries are never evicted here — only age-based pruning touches them.
    pub fn discard(&self, id: &K) {
        let mut state = self.state.lock();
        let Some(count) = state.refcounts.get_mut(id) else {
            return;
        };
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            if let Some(pos) = state.load_queue.iter().position(|q| q == id) {
                state.load_queue.remove(pos);
            }
        }
    }

    /// Non-blocking lookup (spec §4.8 `try_get`): touches the entry's
    /// last-access time, lazily enqueues its image load with the resource
    /// manager if not already in memory, and returns the image only once
    /// it is both present and `ready`.
    pub fn try_get(&self, id: &K, now: f64, resource_manager: &ResourceManager) -> Option<Handle<Image>> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(id)?;
        entry.last_access_time = now;

        if entry.image.is_none() {
            let path = entry.file_path.clone();
            let gpu = self.gpu.clone();
            let name = path.to_string_lossy().into_owned();
            resource_manager.request_priority_hint();
            let handle = resource_manager.request(name, move || Image::from_file(path, gpu));
            entry.image = Some(handle);
        }

        entry.image.as_ref().filter(|h| h.ready()).cloned()
    }

    /// Destroys every loaded image and resets all bookkeeping (spec §4.8
    /// `clear`).
    pub fn clear(&self, resource_manager: &ResourceManager) {
        let mut state = self.state.lock();
        for (_, entry) in state.entries.drain() {
            if let Some(image) = entry.image {
                resource_manager.destroy(&image.as_untyped(), DestroyMode::Normal);
            }
        }
        state.load_queue.clear();
        state.blacklist.clear();
        state.downloads.clear();
        state.refcounts.clear();
        state.last_checked_index = 0;
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().load_queue.len()
    }

    pub fn is_blacklisted(&self, id: &K) -> bool {
        self.state.lock().blacklist.contains(id)
    }

    /// Per-tick drain (spec §4.8 `update`): prunes aged-out loaded entries,
    /// then advances up to [`ELEMS_PER_TICK`] load-queue items — checking
    /// disk first, falling back to a coalesced download and an async
    /// write-through otherwise.
    pub fn update(&self, now: f64, resource_manager: &ResourceManager, io: &AsyncIoEngine, network: &NetworkClient) {
        if self.state.lock().load_queue.is_empty() {
            return;
        }

        self.prune(resource_manager);

        let mut state = self.state.lock();
        let queue_len = state.load_queue.len();
        if queue_len == 0 {
            return;
        }
        state.last_checked_index %= queue_len;

        let mut to_remove: Vec<K> = Vec::new();
        let mut i = state.last_checked_index;
        let mut checked = 0;

        while checked < ELEMS_PER_TICK && i < state.load_queue.len() {
            let id = state.load_queue[i].clone();
            checked += 1;
            i += 1;
            state.last_checked_index = i;

            let path = (self.path_of)(&id);

            if path_is_fresh(&path) {
                state.entries.insert(
                    id.clone(),
                    Entry {
                        file_path: path,
                        image: None,
                        last_access_time: 0.0,
                    },
                );
                to_remove.push(id);
                continue;
            }

            match state.downloads.remove(&id) {
                None => {
                    state.downloads.insert(id.clone(), DownloadState::InFlight);
                    let url = (self.url_of)(&id);
                    let state_arc = Arc::clone(&self.state);
                    let id_for_cb = id.clone();
                    debug!(%url, "starting download");
                    network.request_async(
                        HttpRequest::get(url),
                        Box::new(move |response| {
                            let mut state = state_arc.lock();
                            let outcome = if response.success && !response.body.is_empty() {
                                DownloadState::Succeeded(response.body)
                            } else {
                                DownloadState::Failed
                            };
                            state.downloads.insert(id_for_cb, outcome);
                        }),
                        None,
                    );
                }
                Some(DownloadState::InFlight) => {
                    state.downloads.insert(id.clone(), DownloadState::InFlight);
                }
                Some(DownloadState::Succeeded(data)) => {
                    let state_arc = Arc::clone(&self.state);
                    let id_for_cb = id.clone();
                    let path_for_write = path.clone();
                    io.write(
                        path.to_string_lossy().into_owned(),
                        data,
                        Some(Box::new(move |success| {
                            if success {
                                let mut state = state_arc.lock();
                                state.entries.insert(
                                    id_for_cb,
                                    Entry {
                                        file_path: path_for_write,
                                        image: None,
                                        last_access_time: 0.0,
                                    },
                                );
                            }
                        })),
                    );
                    to_remove.push(id);
                }
                Some(DownloadState::Failed) => {
                    state.blacklist.insert(id.clone());
                    to_remove.push(id);
                }
            }
        }

        state.load_queue.retain(|id| !to_remove.contains(id));
    }

    /// Quarter-batch LRU eviction of *loaded* entries once their count
    /// exceeds `max_loaded` (spec §4.8). Unloaded/queued entries don't
    /// count against the bound and are never touched here.
    fn prune(&self, resource_manager: &ResourceManager) {
        let mut state = self.state.lock();

        // Mirrors the original's early-out: don't even scan unless we're
        // close to the limit.
        if state.entries.len() <= self.max_loaded * 7 / 8 {
            return;
        }

        let mut loaded: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, e)| e.image.as_ref().is_some_and(Handle::ready))
            .map(|(k, _)| k.clone())
            .collect();

        if loaded.len() <= self.max_loaded {
            return;
        }

        loaded.sort_by(|a, b| {
            let ta = state.entries[a].last_access_time;
            let tb = state.entries[b].last_access_time;
            ta.total_cmp(&tb)
        });

        let to_unload = (self.max_loaded / 4).min(loaded.len() / 2);
        for key in loaded.into_iter().take(to_unload) {
            if let Some(entry) = state.entries.get_mut(&key) {
                if let Some(image) = entry.image.take() {
                    resource_manager.destroy(&image.as_untyped(), DestroyMode::Normal);
                }
            }
        }
    }
}

fn path_is_fresh(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age <= DISK_CACHE_TTL,
        // mtime in the future (clock skew) — treat as fresh rather than
        // perpetually re-downloading.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ba_gpu_upload::{GpuUploader, NullGpuDevice};

    fn gpu() -> GpuContext {
        let device: Arc<dyn ba_gpu_upload::GpuDevice> = Arc::new(NullGpuDevice::new());
        GpuContext {
            uploader: Some(Arc::new(GpuUploader::new(Arc::clone(&device)))),
            device,
        }
    }

    fn cache(max_loaded: usize) -> IdentifierImageCache<u64> {
        IdentifierImageCache::new(
            max_loaded,
            gpu(),
            |id: &u64| PathBuf::from(format!("/tmp/ba-test-{id}.png")),
            |id: &u64| format!("https://example.invalid/{id}"),
        )
    }

    #[test]
    fn request_then_discard_below_threshold_dequeues() {
        let cache = cache(4);
        cache.request(1);
        cache.request(1);
        cache.request(1);
        assert_eq!(cache.queue_len(), 1);

        cache.discard(&1);
        cache.discard(&1);
        assert_eq!(cache.queue_len(), 1);
        cache.discard(&1);
        assert_eq!(cache.queue_len(), 0);
    }

    #[test]
    fn duplicate_requests_do_not_duplicate_queue_entries() {
        let cache = cache(4);
        cache.request(7);
        cache.request(7);
        assert_eq!(cache.queue_len(), 1);
    }

    #[test]
    fn try_get_on_unknown_id_returns_none() {
        let cache = cache(4);
        let manager = ResourceManager::new();
        assert!(cache.try_get(&99, 0.0, &manager).is_none());
    }
}
