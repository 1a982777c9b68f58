use chat_core::{ChatError, DisplayName};
use chat_platform::KeyValueStore;
use tracing::warn;

/// Storage key holding the last display name.
pub const IDENTITY_STORAGE_KEY: &str = "chat-username";

/// Remembers the local display name across sessions.
pub struct LocalIdentityStore<S: KeyValueStore> {
    storage: S,
}

impl<S: KeyValueStore> LocalIdentityStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Previously saved name, if any. Names that no longer validate are ignored.
    pub fn load(&self) -> Option<DisplayName> {
        let raw = match self.storage.get(IDENTITY_STORAGE_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "failed to read saved display name");
                return None;
            }
        };

        match DisplayName::parse(&raw) {
            Ok(name) => Some(name),
            Err(err) => {
                warn!(error = %err, "ignoring invalid saved display name");
                None
            }
        }
    }

    /// Validate and persist a trimmed name. Nothing is written on rejection.
    pub fn save(&self, raw: &str) -> Result<DisplayName, ChatError> {
        let name = DisplayName::parse(raw)?;
        self.save_name(&name);
        Ok(name)
    }

    pub fn save_name(&self, name: &DisplayName) {
        if let Err(err) = self.storage.set(IDENTITY_STORAGE_KEY, name.as_str()) {
            warn!(error = %err, "failed to persist display name");
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.storage.remove(IDENTITY_STORAGE_KEY) {
            warn!(error = %err, "failed to remove saved display name");
        }
    }
}
