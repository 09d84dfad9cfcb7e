use parking_lot::Mutex;
use tasksync_core::StorageError;

/// Durable home for the session's bearer credential.
///
/// The SQLite mirror in `tasksync-services` implements this under its
/// `auth_token` key; `MemoryCredentialStore` covers tests and ephemeral runs.
pub trait CredentialStore: Send + Sync {
    /// Read the stored credential, if any. Read failures count as "absent".
    fn load_credential(&self) -> Option<String>;

    /// Persist a credential, replacing any previous one.
    fn save_credential(&self, token: &str) -> Result<(), StorageError>;

    /// Remove the stored credential. Clearing an absent credential is not an error.
    fn clear_credential(&self) -> Result<(), StorageError>;
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a credential already present, as if persisted by a prior run.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_credential(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn save_credential(&self, token: &str) -> Result<(), StorageError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear_credential(&self) -> Result<(), StorageError> {
        self.token.lock().take();
        Ok(())
    }
}
