/// Errors surfaced by [`crate::ResourceManager`] itself, as opposed to a
/// given resource's own load failure (which is never an `Err` — per spec §7
/// a failed `init_async`/`init` just leaves the resource not-`ready`).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("resource handle is stale (its slot was already destroyed)")]
    StaleHandle,
}
