use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

use ba_image::{GpuContext, Image};
use ba_resource::{CancellationToken, DestroyMode, Handle, ResourceBody, ResourceManager};

/// A `Resource` whose only job is to find a beatmap's background filename
/// inside its `.osu` text file (spec §4.9 "Metadata scanner"). Its `init`
/// does nothing — the parse already finished in `init_async` — so it goes
/// ready the same tick its async phase does, one frame earlier than a
/// resource with real finalize work.
pub struct MetadataScanner {
    path: PathBuf,
    parsed_bg_filename: Option<String>,
}

impl MetadataScanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parsed_bg_filename: None,
        }
    }

    pub fn parsed_filename(&self) -> Option<&str> {
        self.parsed_bg_filename.as_deref()
    }
}

impl ResourceBody for MetadataScanner {
    fn init_async(&mut self, cancel: &CancellationToken) -> bool {
        let Ok(file) = std::fs::File::open(&self.path) else {
            return false;
        };

        let mut in_events_block = false;
        for line in BufReader::new(file).lines() {
            if cancel.is_cancelled() {
                return false;
            }
            let Ok(line) = line else { break };

            // Only a line-leading "//" is a comment (spec §4.9: "allow
            // Artist:DJ'TEKINA//SOMETHING").
            if line.starts_with("//") {
                continue;
            }

            if !in_events_block && line.contains("[Events]") {
                in_events_block = true;
                continue;
            }
            if line.contains("[TimingPoints]") || line.contains("[Colours]") || line.contains("[HitObjects]") {
                break;
            }
            if !in_events_block {
                continue;
            }

            if let Some(filename) = parse_background_record(&line) {
                self.parsed_bg_filename = Some(filename);
                break;
            }
        }

        true
    }

    fn init(&mut self) -> bool {
        true
    }

    fn destroy(&mut self) {}
}

/// Parses one `[Events]` line, returning the background filename if this
/// is a type-`0` (background) record (spec §6 beatmap metadata parse).
/// Quotes around the filename are stripped; whichever downstream consumer
/// cares about the distinction can re-quote.
fn parse_background_record(line: &str) -> Option<String> {
    let mut fields = line.splitn(4, ',');
    let event_type = fields.next()?.trim();
    if event_type != "0" {
        return None;
    }
    let _start_time = fields.next()?;
    let filename = fields.next()?.trim();
    Some(filename.trim_matches('"').to_string())
}

struct BackgroundEntry {
    folder: PathBuf,
    bg_image_filename: Option<String>,
    scanner: Option<Handle<MetadataScanner>>,
    image: Option<Handle<Image>>,
    load_scheduled: bool,
    loading_time: f64,
    used_last_frame: bool,
    evict_frame: u64,
}

/// The two-stage background image cache (spec §4.9): requests are keyed
/// by beatmap file path. An entry with an unknown background filename
/// first goes through a [`MetadataScanner`] to learn it; once known (or if
/// supplied up front), the entry proceeds straight to an image load.
///
/// Entries are stored in an [`IndexMap`] rather than a hash map so
/// overflow eviction (oldest, not-yet-loading entries first) and eviction
/// order generally are deterministic — SPEC_FULL §C.6 supplements the
/// original's unordered map with this for reproducible tests.
pub struct BackgroundImageCache {
    max_cache_size: usize,
    eviction_delay_frames: u64,
    image_loading_delay: f64,
    cache: Mutex<IndexMap<String, BackgroundEntry>>,
    frozen: AtomicBool,
    gpu: GpuContext,
}

impl BackgroundImageCache {
    pub fn new(gpu: GpuContext, max_cache_size: u32, eviction_delay_frames: u32, image_loading_delay: f32) -> Self {
        Self {
            max_cache_size: max_cache_size.min(128) as usize,
            eviction_delay_frames: eviction_delay_frames.min(1024) as u64,
            image_loading_delay: image_loading_delay.clamp(0.0, 2.0) as f64,
            cache: Mutex::new(IndexMap::new()),
            frozen: AtomicBool::new(false),
            gpu,
        }
    }

    /// Prevents eviction for the next [`Self::update`] call only (spec
    /// §4.9 "Freeze"): call this right before a scene switch so assets
    /// already scheduled for destruction survive the new scene's first
    /// frame of use.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Looks up or schedules an entry for `key` (a beatmap file path), and
    /// returns its image if one is loaded and GPU-ready (spec §4.9,
    /// recovered from `getLoadBackgroundImage`). Unlike the original this
    /// never mutates caller-owned beatmap state to cache the learned
    /// filename (spec §9 Open Question 2) — callers that want to persist
    /// it should do so with [`Self::learned_filename`].
    pub fn get_or_schedule(
        &self,
        key: impl Into<String>,
        folder: impl Into<PathBuf>,
        known_filename: Option<String>,
        now: f64,
        frame: u64,
        load_immediately: bool,
    ) -> Option<Handle<Image>> {
        let key = key.into();
        let mut cache = self.cache.lock();

        if let Some(entry) = cache.get_mut(&key) {
            entry.used_last_frame = true;
            entry.evict_frame = frame + self.eviction_delay_frames;
            return entry.image.as_ref().filter(|h| h.ready()).cloned();
        }

        if cache.len() >= self.max_cache_size {
            // Overflow: drop scheduled-but-not-yet-loading entries first,
            // on the assumption they were speculative and are stale.
            cache.retain(|_, entry| !(entry.load_scheduled && !entry.used_last_frame));
        }

        if cache.len() < self.max_cache_size {
            let loading_time = now + if load_immediately { 0.0 } else { self.image_loading_delay };
            cache.insert(
                key,
                BackgroundEntry {
                    folder: folder.into(),
                    bg_image_filename: known_filename.filter(|name| name.len() > 1),
                    scanner: None,
                    image: None,
                    load_scheduled: true,
                    loading_time,
                    used_last_frame: true,
                    evict_frame: frame + self.eviction_delay_frames,
                },
            );
        }

        None
    }

    /// The background filename this entry's scanner learned, if any
    /// (spec §9 Open Question 2's resolution: the caller updates its own
    /// beatmap state with this instead of the cache reaching back in).
    pub fn learned_filename(&self, key: &str) -> Option<String> {
        self.cache.lock().get(key)?.bg_image_filename.clone()
    }

    /// Per-frame drain (spec §4.9): advances scheduled loads, harvests
    /// finished metadata scans, and evicts entries unused since the last
    /// call whose eviction frame has arrived.
    pub fn update(&self, now: f64, frame: u64, allow_eviction: bool, resource_manager: &ResourceManager) {
        let mut cache = self.cache.lock();
        let mut to_evict = Vec::new();

        for (key, entry) in cache.iter_mut() {
            let was_used_last_frame = entry.used_last_frame;
            entry.used_last_frame = false;

            if !was_used_last_frame && frame >= entry.evict_frame {
                if !allow_eviction {
                    entry.evict_frame = frame + self.eviction_delay_frames;
                    continue;
                }
                if self.frozen.load(Ordering::Acquire) {
                    continue;
                }

                if let Some(scanner) = entry.scanner.take() {
                    scanner.interrupt_load();
                    resource_manager.destroy(&scanner.as_untyped(), DestroyMode::ForceAsync);
                }
                if let Some(image) = entry.image.take() {
                    image.interrupt_load();
                    resource_manager.destroy(&image.as_untyped(), DestroyMode::ForceAsync);
                }
                to_evict.push(key.clone());
                continue;
            }

            if !was_used_last_frame {
                continue;
            }

            if entry.load_scheduled {
                if now >= entry.loading_time {
                    entry.load_scheduled = false;

                    if entry.bg_image_filename.as_deref().map(str::len).unwrap_or(0) < 2 {
                        entry.image = None;
                        let path = PathBuf::from(key.as_str());
                        let handle = resource_manager.request(key.clone(), move || MetadataScanner::new(path));
                        entry.scanner = Some(handle);
                    } else {
                        entry.scanner = None;
                        start_image_load(entry, &self.gpu, resource_manager);
                    }
                }
            } else if entry.image.is_none() {
                if let Some(scanner) = entry.scanner.take() {
                    if scanner.ready() {
                        let learned = resource_manager
                            .with_body(&scanner, |s: &MetadataScanner| s.parsed_filename().map(str::to_owned))
                            .ok()
                            .flatten();

                        if let Some(filename) = learned.filter(|name| name.len() > 1) {
                            entry.bg_image_filename = Some(filename);
                            start_image_load(entry, &self.gpu, resource_manager);
                        }

                        resource_manager.destroy(&scanner.as_untyped(), DestroyMode::ForceAsync);
                    } else {
                        entry.scanner = Some(scanner);
                    }
                }
            }
        }

        for key in to_evict {
            cache.shift_remove(&key);
        }

        self.frozen.store(false, Ordering::Release);
    }

    /// Destroys every tracked scanner/image and empties the cache.
    pub fn clear(&self, resource_manager: &ResourceManager) {
        let entries = std::mem::take(&mut *self.cache.lock());
        for (_, entry) in entries {
            if let Some(scanner) = entry.scanner {
                resource_manager.destroy(&scanner.as_untyped(), DestroyMode::Normal);
            }
            if let Some(image) = entry.image {
                resource_manager.destroy(&image.as_untyped(), DestroyMode::Normal);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn start_image_load(entry: &mut BackgroundEntry, gpu: &GpuContext, resource_manager: &ResourceManager) {
    let Some(filename) = entry.bg_image_filename.clone() else { return };
    let full_path = entry.folder.join(filename);
    let gpu = gpu.clone();
    let name = full_path.to_string_lossy().into_owned();
    resource_manager.request_priority_hint();
    entry.image = Some(resource_manager.request(name, move || Image::from_file(full_path, gpu)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ba_gpu_upload::{GpuUploader, NullGpuDevice};
    use std::io::Write;
    use std::sync::Arc;

    fn gpu() -> GpuContext {
        let device: Arc<dyn ba_gpu_upload::GpuDevice> = Arc::new(NullGpuDevice::new());
        GpuContext {
            uploader: Some(Arc::new(GpuUploader::new(Arc::clone(&device)))),
            device,
        }
    }

    fn wait_for_async_ready(handle: &Handle<MetadataScanner>) {
        let mut tries = 0;
        while !handle.async_ready() && tries < 500 {
            std::thread::sleep(std::time::Duration::from_millis(2));
            tries += 1;
        }
        assert!(handle.async_ready());
    }

    #[test]
    fn parses_background_filename_from_events_block() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "osu file format v14").unwrap();
        writeln!(file, "[Events]").unwrap();
        writeln!(file, "0,0,\"bg.jpg\",0,0").unwrap();
        writeln!(file, "[TimingPoints]").unwrap();
        file.flush().unwrap();

        let manager = ResourceManager::new();
        let path = file.path().to_path_buf();
        let handle = manager.request("scan-bg-events", move || MetadataScanner::new(path));

        wait_for_async_ready(&handle);
        manager.update();

        let parsed = manager
            .with_body(&handle, |s: &MetadataScanner| s.parsed_filename().map(str::to_owned))
            .unwrap();
        assert_eq!(parsed.as_deref(), Some("bg.jpg"));
    }

    #[test]
    fn stops_scanning_at_next_section_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[Events]").unwrap();
        writeln!(file, "[TimingPoints]").unwrap();
        writeln!(file, "0,0,\"bg.jpg\",0,0").unwrap();
        file.flush().unwrap();

        let manager = ResourceManager::new();
        let path = file.path().to_path_buf();
        let handle = manager.request("scan-bg-truncated", move || MetadataScanner::new(path));

        wait_for_async_ready(&handle);
        manager.update();

        let parsed = manager
            .with_body(&handle, |s: &MetadataScanner| s.parsed_filename().map(str::to_owned))
            .unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn get_or_schedule_returns_none_until_loaded() {
        let cache = BackgroundImageCache::new(gpu(), 8, 60, 0.5);
        let result = cache.get_or_schedule("song.osu", "/tmp/songs/song/", Some("bg.jpg".to_string()), 0.0, 0, false);
        assert!(result.is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overflow_evicts_scheduled_unused_entries_first() {
        let cache = BackgroundImageCache::new(gpu(), 1, 60, 1.0);
        let manager = ResourceManager::new();
        cache.get_or_schedule("a.osu", "/tmp/a/", None, 0.0, 0, false);

        // One update tick with the loading delay not yet elapsed: "a"
        // stays load_scheduled but is no longer used_last_frame, making it
        // eligible for overflow eviction.
        cache.update(0.0, 0, true, &manager);

        cache.get_or_schedule("b.osu", "/tmp/b/", None, 0.0, 0, false);
        assert_eq!(cache.len(), 1);
        assert!(cache.learned_filename("a.osu").is_none());
    }
}
