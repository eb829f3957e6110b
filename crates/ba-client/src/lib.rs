//! Composition root: owns one instance of every subsystem crate and drives
//! them through the per-frame pump (spec §2 Control flow). Nothing in here
//! implements gameplay; it only wires together I/O, resource loading, GPU
//! upload, networking, configuration and caching, and tells each of them
//! when a frame has elapsed.

mod config;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use ba_async_io::AsyncIoEngine;
use ba_caches::{AvatarCache, BackgroundImageCache, ThumbnailCache};
use ba_config::CVarRegistry;
use ba_core::{Clock, TaskPoolOptions};
use ba_gpu_upload::{GpuDevice, GpuUploader};
use ba_image::GpuContext;
use ba_network::NetworkClient;
use ba_path_resolver::PathResolver;
use ba_resource::ResourceManager;

pub use config::default_cvars;

/// Everything the client needs alive for the process lifetime. Built once
/// in [`Client::new`] and then driven one frame at a time by [`Client::update`].
///
/// The update order matters (spec §2): network completions are drained
/// before resource completions, because a resource's `init_async` (e.g. an
/// avatar image) may itself have been waiting on a network download that
/// only just landed; caches are ticked last since they read the resource
/// manager's freshly finalized state to decide what to request next.
pub struct Client {
    pub clock: Clock,
    pub io: Arc<AsyncIoEngine>,
    pub resources: Arc<ResourceManager>,
    pub gpu: GpuContext,
    pub network: Arc<NetworkClient>,
    pub cvars: Arc<CVarRegistry>,
    pub path_resolver: Arc<PathResolver>,
    pub avatars: AvatarCache,
    pub thumbnails: ThumbnailCache,
    pub backgrounds: BackgroundImageCache,

    /// Whether the user is logged into a server; avatar downloads are
    /// skipped entirely while this is false (spec §4.8 `is_online` check).
    /// Embedders flip this with [`Client::set_online`] once they know.
    online: bool,
}

/// Tunables read once from [`ba_config::ProcessConfig`] at startup (SPEC_FULL §B).
pub struct ClientOptions {
    pub avatar_endpoint: String,
    pub max_background_cache_size: u32,
    pub background_eviction_delay_frames: u32,
    pub background_image_loading_delay: f32,
    pub loader_pool: TaskPoolOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        let process = &ba_config::PROCESS_CONFIG;
        Self {
            avatar_endpoint: process
                .get_or("avatar_endpoint", "ppy.sh".to_string())
                .unwrap_or_else(|_| "ppy.sh".to_string()),
            max_background_cache_size: process
                .get_or("max_background_cache_size", 20i64)
                .unwrap_or(20) as u32,
            background_eviction_delay_frames: process
                .get_or("background_eviction_delay_frames", 2i64)
                .unwrap_or(2) as u32,
            background_image_loading_delay: process
                .get_or("background_image_loading_delay", 0.15f64)
                .unwrap_or(0.15) as f32,
            loader_pool: TaskPoolOptions::default(),
        }
    }
}

impl Client {
    /// Spawns every background thread (loader pool, GPU uploader, network
    /// thread) and returns a ready-to-drive client. Must be called from
    /// within a tokio runtime, since [`AsyncIoEngine`] binds to the
    /// ambient `tokio::runtime::Handle`.
    pub fn new(gpu_device: Arc<dyn GpuDevice>, options: ClientOptions) -> Self {
        let cvars = Arc::new(CVarRegistry::new());
        config::register_default_cvars(&cvars);

        let resources = ResourceManager::with_pool_options(options.loader_pool);
        let io = Arc::new(AsyncIoEngine::new());
        let network = Arc::new(NetworkClient::new());
        let path_resolver = Arc::new(PathResolver::new());

        let uploader = Arc::new(GpuUploader::new(Arc::clone(&gpu_device)));
        let gpu = GpuContext {
            device: gpu_device,
            uploader: Some(uploader),
        };

        let endpoint = Arc::new(RwLock::new(options.avatar_endpoint));
        let avatars = AvatarCache::new(gpu.clone(), Arc::clone(&cvars), endpoint);
        let thumbnails = ThumbnailCache::new(gpu.clone(), Arc::clone(&cvars));
        let backgrounds = BackgroundImageCache::new(
            gpu.clone(),
            options.max_background_cache_size,
            options.background_eviction_delay_frames,
            options.background_image_loading_delay,
        );

        info!("client subsystems initialized");

        Self {
            clock: Clock::default(),
            io,
            resources,
            gpu,
            network,
            cvars,
            path_resolver,
            avatars,
            thumbnails,
            backgrounds,
            online: false,
        }
    }

    /// Flips whether the client is considered logged into a server.
    /// Avatar downloads are gated on this (spec §4.8); thumbnails and
    /// backgrounds are not, since those can come from local beatmap data.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Resolves a mixed-case path relative to `root` to its actual on-disk
    /// casing, or `None` if nothing matches (spec §4.2).
    pub fn resolve_path(&self, root: &Path, relative: &str) -> Option<(String, ba_path_resolver::FileType)> {
        self.path_resolver.resolve(&root.join(relative).to_string_lossy())
    }

    /// Runs one frame's worth of subsystem bookkeeping (spec §2):
    /// 1. Drain network completions — may unblock waiting image downloads.
    /// 2. Drain async I/O completions.
    /// 3. Drain resource loader completions, finalizing any resource whose
    ///    `init_async` has finished with an `init` on this thread.
    /// 4. Tick the image caches, which may enqueue new downloads/requests
    ///    as a result of resources that just became ready or newly evicted.
    ///
    /// Rendering itself is out of scope for this crate; callers render
    /// after calling `update`, using `Handle<Image>::texture_handle`
    /// values obtained from the caches.
    pub fn update(&mut self) {
        self.clock.update();
        let now = self.clock.seconds_since_startup();
        let frame = self.clock.frame_counter();

        self.network.update();
        self.io.update();
        self.resources.update();

        self.avatars
            .update(now, self.online, &self.resources, &self.io, &self.network);
        self.thumbnails.update(now, &self.resources, &self.io, &self.network);
        self.backgrounds.update(now, frame, true, &self.resources);
    }

    /// Called when the active screen changes (spec §4.9 Open Question 3
    /// resolution: freeze background eviction across the switch so
    /// in-flight loads from the old screen aren't thrown away before they
    /// land). `background_eviction_delay_frames` frames of `update` will
    /// then pass with eviction allowed again before the freeze matters,
    /// since `BackgroundImageCache::freeze` only protects a single tick.
    pub fn on_scene_switch(&self) {
        self.backgrounds.freeze();
    }

    /// Blocks until every in-flight async I/O operation has either
    /// completed or been abandoned; called during shutdown so pending
    /// writes aren't silently dropped mid-flight.
    pub fn shutdown(&self, timeout: std::time::Duration) {
        self.io.cleanup(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ba_gpu_upload::NullGpuDevice;

    #[tokio::test]
    async fn new_client_boots_with_default_options() {
        let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
        let client = Client::new(device, ClientOptions::default());

        assert!(client
            .cvars
            .effective("master_volume", false)
            .unwrap()
            .as_float()
            .is_some());
        assert_eq!(client.resources.len(), 0);
    }

    #[tokio::test]
    async fn update_runs_without_panicking_with_nothing_queued() {
        let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
        let mut client = Client::new(device, ClientOptions::default());

        for _ in 0..3 {
            client.update();
        }
        assert_eq!(client.clock.frame_counter(), 3);
    }

    #[tokio::test]
    async fn scene_switch_freezes_background_eviction_for_one_tick() {
        let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
        let mut client = Client::new(device, ClientOptions::default());

        client.on_scene_switch();
        client.update();
        assert_eq!(client.backgrounds.len(), 0);
    }
}
