//! Cvar definitions owned by the client itself rather than any one
//! subsystem crate (spec §4.10: cvars are declared wherever the value they
//! gate is consumed). Subsystem crates read through a shared
//! [`CVarRegistry`] handed to them by [`crate::Client::new`]; they never
//! register their own defaults, so this is the one place the full set is
//! visible.

use std::sync::Arc;

use ba_config::{CVarRegistry, CvarFlags};

/// Registers every cvar the client knows about with its default value and
/// flags. Called once from [`crate::Client::new`] before any subsystem
/// reads through the registry.
pub fn register_default_cvars(registry: &Arc<CVarRegistry>) {
    registry.register_value("master_volume", 1.0f64, CvarFlags::CLIENT);
    registry.register_value("use_https", true, CvarFlags::CLIENT);
    registry.register_value("show_fps_counter", false, CvarFlags::CLIENT);

    // Gameplay-affecting and server-overridable; falls back to its
    // default while in a multiplayer match regardless of any client or
    // skin-pushed value (spec §4.10 PROTECTED semantics).
    registry.register_value(
        "background_dim",
        0.8f64,
        CvarFlags::CLIENT | CvarFlags::SKINS | CvarFlags::GAMEPLAY | CvarFlags::PROTECTED,
    );
}

/// The names this module registers, exposed for callers that want to
/// enumerate or validate the default set without constructing a `Client`.
pub fn default_cvars() -> &'static [&'static str] {
    &["master_volume", "use_https", "show_fps_counter", "background_dim"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_cvar_is_actually_registered() {
        let registry = Arc::new(CVarRegistry::new());
        register_default_cvars(&registry);

        for name in default_cvars() {
            assert!(registry.effective(name, false).is_ok(), "missing cvar: {name}");
        }
    }
}
