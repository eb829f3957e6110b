use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use ba_async_io::AsyncIoEngine;
use ba_config::CVarRegistry;
use ba_image::{GpuContext, Image};
use ba_network::NetworkClient;
use ba_resource::{Handle, ResourceManager};

use crate::identifier_cache::IdentifierImageCache;

/// Loaded entries above this bound are pruned oldest-first (spec §4.8;
/// matches `ThumbnailManager.cpp`'s `MAX_LOADED_IMAGES`).
const MAX_LOADED_THUMBNAILS: usize = 100;

/// Unlike [`crate::AvatarIdentifier`], the download URL has no fixed
/// format (spec §6 "Thumbnail URL. Supplied per identifier by the caller")
/// so each identifier carries its own, exactly as `ThumbIdentifier`
/// carries `download_url` alongside `id`/`save_path` in the original.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbIdentifier {
    pub id: String,
    pub file_path: PathBuf,
    pub download_url: String,
}

impl ThumbIdentifier {
    pub fn new(id: impl Into<String>, file_path: impl Into<PathBuf>, download_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
            download_url: download_url.into(),
        }
    }
}

/// Refcounted, disk- and network-backed thumbnail cache (spec §4.8);
/// shares its template with [`crate::AvatarCache`].
pub struct ThumbnailCache {
    inner: IdentifierImageCache<ThumbIdentifier>,
}

impl ThumbnailCache {
    pub fn new(gpu: GpuContext, cvars: Arc<CVarRegistry>) -> Self {
        let inner = IdentifierImageCache::new(
            MAX_LOADED_THUMBNAILS,
            gpu,
            |id: &ThumbIdentifier| id.file_path.clone(),
            move |id: &ThumbIdentifier| {
                let https = cvars
                    .effective("use_https", false)
                    .ok()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                let scheme = if https { "https://" } else { "http://" };
                format!("{scheme}{}", id.download_url)
            },
        );
        Self { inner }
    }

    pub fn request(&self, id: ThumbIdentifier) {
        self.inner.request(id);
    }

    pub fn discard(&self, id: &ThumbIdentifier) {
        self.inner.discard(id);
    }

    pub fn try_get(&self, id: &ThumbIdentifier, now: f64, resource_manager: &ResourceManager) -> Option<Handle<Image>> {
        self.inner.try_get(id, now, resource_manager)
    }

    pub fn clear(&self, resource_manager: &ResourceManager) {
        self.inner.clear(resource_manager);
    }

    pub fn is_blacklisted(&self, id: &ThumbIdentifier) -> bool {
        self.inner.is_blacklisted(id)
    }

    pub fn update(&self, now: f64, resource_manager: &ResourceManager, io: &AsyncIoEngine, network: &NetworkClient) {
        self.inner.update(now, resource_manager, io, network);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ba_config::CvarFlags;
    use ba_gpu_upload::{GpuUploader, NullGpuDevice};

    fn gpu() -> GpuContext {
        let device: Arc<dyn ba_gpu_upload::GpuDevice> = Arc::new(NullGpuDevice::new());
        GpuContext {
            uploader: Some(Arc::new(GpuUploader::new(Arc::clone(&device)))),
            device,
        }
    }

    fn cvars() -> Arc<CVarRegistry> {
        let registry = CVarRegistry::new();
        registry.register_value("use_https", true, CvarFlags::CLIENT);
        Arc::new(registry)
    }

    #[test]
    fn request_enqueues_and_discard_dequeues() {
        let cache = ThumbnailCache::new(gpu(), cvars());
        let id = ThumbIdentifier::new("beatmapset-42", "/tmp/thumbs/42.png", "b.example.invalid/42");
        cache.request(id.clone());
        assert_eq!(cache.inner.queue_len(), 1);
        cache.discard(&id);
        assert_eq!(cache.inner.queue_len(), 0);
    }

    #[test]
    fn try_get_before_request_is_none() {
        let cache = ThumbnailCache::new(gpu(), cvars());
        let manager = ResourceManager::new();
        let id = ThumbIdentifier::new("beatmapset-7", "/tmp/thumbs/7.png", "b.example.invalid/7");
        assert!(cache.try_get(&id, 0.0, &manager).is_none());
    }
}
