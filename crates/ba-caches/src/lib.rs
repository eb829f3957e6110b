//! Refcounted, disk- and network-backed asset caches: avatars and
//! thumbnails share the [`IdentifierImageCache`] template (spec §4.8),
//! while beatmap backgrounds get their own two-stage cache (spec §4.9)
//! since a background's filename has to be mined out of the beatmap file
//! itself before the image can even be requested.

mod avatar;
mod background;
mod identifier_cache;
mod thumbnail;

pub use avatar::{AvatarCache, AvatarIdentifier};
pub use background::{BackgroundImageCache, MetadataScanner};
pub use identifier_cache::IdentifierImageCache;
pub use thumbnail::{ThumbIdentifier, ThumbnailCache};
