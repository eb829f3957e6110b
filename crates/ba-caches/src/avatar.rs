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
/// matches `AvatarManager.cpp`'s `MAX_LOADED_AVATARS`).
const MAX_LOADED_AVATARS: usize = 100;

/// A user id paired with its derived on-disk path, used as the map key
/// exactly like the original's `std::pair<u32, std::string>` (spec §3
/// "Avatar / Thumbnail entry... keyed by an identifier pair").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AvatarIdentifier {
    pub user_id: u64,
    pub file_path: PathBuf,
}

impl AvatarIdentifier {
    pub fn new(user_id: u64, avatar_dir: &std::path::Path) -> Self {
        Self {
            user_id,
            file_path: avatar_dir.join(user_id.to_string()),
        }
    }
}

/// Refcounted, disk- and network-backed avatar cache (spec §4.8).
/// Everything but URL derivation is the shared [`IdentifierImageCache`]
/// template it also backs [`crate::ThumbnailCache`] with.
pub struct AvatarCache {
    inner: IdentifierImageCache<AvatarIdentifier>,
}

impl AvatarCache {
    /// `endpoint` is read fresh on every download (spec §6 avatar URL:
    /// `{scheme}a.{endpoint}/{user_id}`); it changes when the client logs
    /// into a different server, which the cache has no other reason to
    /// know about.
    pub fn new(gpu: GpuContext, cvars: Arc<CVarRegistry>, endpoint: Arc<RwLock<String>>) -> Self {
        let inner = IdentifierImageCache::new(
            MAX_LOADED_AVATARS,
            gpu,
            |id: &AvatarIdentifier| id.file_path.clone(),
            move |id: &AvatarIdentifier| {
                let https = cvars
                    .effective("use_https", false)
                    .ok()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                let scheme = if https { "https://" } else { "http://" };
                format!("{scheme}a.{}/{}", endpoint.read(), id.user_id)
            },
        );
        Self { inner }
    }

    pub fn request(&self, id: AvatarIdentifier) {
        self.inner.request(id);
    }

    pub fn discard(&self, id: &AvatarIdentifier) {
        self.inner.discard(id);
    }

    pub fn try_get(&self, id: &AvatarIdentifier, now: f64, resource_manager: &ResourceManager) -> Option<Handle<Image>> {
        self.inner.try_get(id, now, resource_manager)
    }

    pub fn clear(&self, resource_manager: &ResourceManager) {
        self.inner.clear(resource_manager);
    }

    pub fn is_blacklisted(&self, id: &AvatarIdentifier) -> bool {
        self.inner.is_blacklisted(id)
    }

    /// Downloading avatars while logged out is pointless and the original
    /// explicitly skips the tick rather than touch anything already in
    /// memory (spec §4.8, `AvatarManager::update`'s `is_online` check).
    pub fn update(
        &self,
        now: f64,
        is_online: bool,
        resource_manager: &ResourceManager,
        io: &AsyncIoEngine,
        network: &NetworkClient,
    ) {
        if !is_online {
            return;
        }
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
    fn identifier_equality_is_by_user_id_and_path() {
        let dir = PathBuf::from("/tmp/avatars");
        let a = AvatarIdentifier::new(12345, &dir);
        let b = AvatarIdentifier::new(12345, &dir);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn offline_update_is_a_no_op() {
        let cache = AvatarCache::new(gpu(), cvars(), Arc::new(RwLock::new("example.invalid".to_string())));
        let manager = ResourceManager::new();
        let io = AsyncIoEngine::new();
        let network = NetworkClient::new();

        cache.request(AvatarIdentifier::new(1, &PathBuf::from("/tmp/avatars")));
        cache.update(0.0, false, &manager, &io, &network);
        assert_eq!(cache.inner.queue_len(), 1);
    }
}
