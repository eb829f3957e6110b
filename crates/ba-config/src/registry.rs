use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::errors::ConfigError;
use crate::flags::CvarFlags;
use crate::value::CvarValue;

pub type CommandCallback = Box<dyn Fn(&[String]) + Send + Sync>;
pub type ChangeCallback = Box<dyn Fn(&CvarValue, &CvarValue) + Send + Sync>;

/// Whether a cvar carries a value or is a pure command (spec §C.2,
/// recovered from `ConVar.h`'s command/callback-only constructors).
pub enum CvarKind {
    Value(CvarValue),
    Command(CommandCallback),
}

struct CvarEntry {
    flags: CvarFlags,
    default: CvarValue,
    client: Mutex<Option<CvarValue>>,
    server: Mutex<Option<CvarValue>>,
    skin: Mutex<Option<CvarValue>>,
    command: Option<CommandCallback>,
    on_change: Mutex<Option<ChangeCallback>>,
}

/// Named, typed, flagged configuration values with server/skin/client
/// precedence (spec §4.10). Lives on the main thread in the original but
/// is internally lock-protected here so it can be shared across the
/// loader pool without extra ceremony at call sites.
#[derive(Default)]
pub struct CVarRegistry {
    entries: RwLock<HashMap<String, Arc<CvarEntry>>>,
}

impl CVarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value cvar. Re-registering an existing name replaces it
    /// (matching the original's "last definition wins" static-init order).
    pub fn register_value(&self, name: impl Into<String>, default: impl Into<CvarValue>, flags: CvarFlags) {
        let default = default.into();
        let entry = Arc::new(CvarEntry {
            flags,
            default: default.clone(),
            client: Mutex::new(Some(default)),
            server: Mutex::new(None),
            skin: Mutex::new(None),
            command: None,
            on_change: Mutex::new(None),
        });
        self.entries.write().insert(name.into(), entry);
    }

    /// Registers a pure command cvar (spec §C.2): no backing value, just a
    /// callback invoked with its argument tokens. Implicitly `NOSAVE`.
    pub fn register_command(&self, name: impl Into<String>, flags: CvarFlags, callback: CommandCallback) {
        let entry = Arc::new(CvarEntry {
            flags: flags | CvarFlags::NOSAVE,
            default: CvarValue::String(String::new()),
            client: Mutex::new(None),
            server: Mutex::new(None),
            skin: Mutex::new(None),
            command: Some(callback),
            on_change: Mutex::new(None),
        });
        self.entries.write().insert(name.into(), entry);
    }

    pub fn set_on_change(&self, name: &str, callback: ChangeCallback) -> Result<(), ConfigError> {
        let entry = self.lookup(name)?;
        *entry.on_change.lock() = Some(callback);
        Ok(())
    }

    pub fn flags(&self, name: &str) -> Result<CvarFlags, ConfigError> {
        Ok(self.lookup(name)?.flags)
    }

    /// Invokes a command cvar's callback. Returns an error for names that
    /// aren't commands.
    pub fn execute(&self, name: &str, args: &[String]) -> Result<(), ConfigError> {
        let entry = self.lookup(name)?;
        match &entry.command {
            Some(callback) => {
                callback(args);
                Ok(())
            }
            None => Err(ConfigError::NotAValue { name: name.to_string() }),
        }
    }

    pub fn set_client(&self, name: &str, value: impl Into<CvarValue>) -> Result<(), ConfigError> {
        self.set_slot(name, Slot::Client, value.into())
    }

    pub fn set_server(&self, name: &str, value: impl Into<CvarValue>) -> Result<(), ConfigError> {
        self.set_slot(name, Slot::Server, value.into())
    }

    pub fn set_skin(&self, name: &str, value: impl Into<CvarValue>) -> Result<(), ConfigError> {
        self.set_slot(name, Slot::Skin, value.into())
    }

    /// Clears a pushed server value, e.g. on disconnect.
    pub fn clear_server(&self, name: &str) -> Result<(), ConfigError> {
        let entry = self.lookup(name)?;
        *entry.server.lock() = None;
        Ok(())
    }

    pub fn clear_skin(&self, name: &str) -> Result<(), ConfigError> {
        let entry = self.lookup(name)?;
        *entry.skin.lock() = None;
        Ok(())
    }

    /// Resolves the effective value (spec §4.10 + §C.8): `server` if set,
    /// else `skin` if set, else `client`; `PROTECTED` cvars fall back to
    /// their default while `in_multiplayer` is true regardless of any
    /// pushed or client value (`ConVarHandler.h`).
    pub fn effective(&self, name: &str, in_multiplayer: bool) -> Result<CvarValue, ConfigError> {
        let entry = self.lookup(name)?;

        if in_multiplayer && entry.flags.contains(CvarFlags::PROTECTED) {
            return Ok(entry.default.clone());
        }

        if let Some(server) = entry.server.lock().clone() {
            return Ok(server);
        }
        if let Some(skin) = entry.skin.lock().clone() {
            return Ok(skin);
        }
        entry
            .client
            .lock()
            .clone()
            .ok_or_else(|| ConfigError::NotAValue { name: name.to_string() })
    }

    fn set_slot(&self, name: &str, slot: Slot, value: CvarValue) -> Result<(), ConfigError> {
        let entry = self.lookup(name)?;
        if entry.command.is_some() {
            return Err(ConfigError::NotAValue { name: name.to_string() });
        }
        if std::mem::discriminant(&entry.default) != std::mem::discriminant(&value) {
            return Err(ConfigError::TypeMismatch {
                name: name.to_string(),
                expected: entry.default.type_name(),
                actual: value.type_name(),
            });
        }

        let target = match slot {
            Slot::Client => &entry.client,
            Slot::Server => &entry.server,
            Slot::Skin => &entry.skin,
        };

        let old = target.lock().clone();
        *target.lock() = Some(value.clone());

        if let (Some(old), Some(on_change)) = (old, entry.on_change.lock().as_ref()) {
            if old != value {
                on_change(&old, &value);
            }
        }
        trace!(name, ?slot, "cvar updated");
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Arc<CvarEntry>, ConfigError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCvar(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Client,
    Server,
    Skin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_value_follows_server_skin_client_precedence() {
        let registry = CVarRegistry::new();
        registry.register_value("volume", 50i64, CvarFlags::CLIENT);

        assert_eq!(registry.effective("volume", false).unwrap(), CvarValue::Int(50));

        registry.set_client("volume", 80i64).unwrap();
        assert_eq!(registry.effective("volume", false).unwrap(), CvarValue::Int(80));

        registry.set_skin("volume", 60i64).unwrap();
        assert_eq!(registry.effective("volume", false).unwrap(), CvarValue::Int(60));

        registry.set_server("volume", 10i64).unwrap();
        assert_eq!(registry.effective("volume", false).unwrap(), CvarValue::Int(10));
    }

    #[test]
    fn protected_cvar_resets_to_default_in_multiplayer() {
        let registry = CVarRegistry::new();
        registry.register_value(
            "mod_relax",
            false,
            CvarFlags::CLIENT | CvarFlags::PROTECTED,
        );
        registry.set_client("mod_relax", true).unwrap();

        assert_eq!(
            registry.effective("mod_relax", false).unwrap(),
            CvarValue::Bool(true)
        );
        assert_eq!(
            registry.effective("mod_relax", true).unwrap(),
            CvarValue::Bool(false)
        );
    }

    #[test]
    fn command_cvar_has_no_value_slot() {
        let registry = CVarRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        registry.register_command("exit", CvarFlags::empty(), Box::new(move |args| {
            seen_clone.lock().extend_from_slice(args);
        }));

        registry.execute("exit", &["now".to_string()]).unwrap();
        assert_eq!(seen.lock().as_slice(), &["now".to_string()]);
        assert!(registry.effective("exit", false).is_err());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let registry = CVarRegistry::new();
        registry.register_value("volume", 50i64, CvarFlags::CLIENT);
        assert!(matches!(
            registry.set_client("volume", "loud"),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }
}
