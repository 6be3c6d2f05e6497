//! Secret storage contract for pairing tokens and API credentials.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{Error, Result};

const SERVICE_PREFIX: &str = "framesync";

/// Key-value store for secrets, keyed by service name.
pub trait SecretStore: Send + Sync {
    fn set_secret(&self, service: &str, secret: &str) -> Result<()>;
    fn get_secret(&self, service: &str) -> Result<Option<String>>;
    fn delete_secret(&self, service: &str) -> Result<()>;
}

/// Namespaced storage key for `service`.
pub fn format_service_id(service: &str) -> String {
    format!("{}_{}", SERVICE_PREFIX, service)
}

/// Process-local store, used when no file is configured and in tests.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    fn with_secrets<T>(&self, op: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|_| Error::Secret("Secret store lock poisoned".into()))?;
        Ok(op(&mut secrets))
    }
}

impl SecretStore for MemorySecretStore {
    fn set_secret(&self, service: &str, secret: &str) -> Result<()> {
        let key = format_service_id(service);
        self.with_secrets(|secrets| {
            secrets.insert(key, secret.to_string());
        })
    }

    fn get_secret(&self, service: &str) -> Result<Option<String>> {
        let key = format_service_id(service);
        self.with_secrets(|secrets| secrets.get(&key).cloned())
    }

    fn delete_secret(&self, service: &str) -> Result<()> {
        let key = format_service_id(service);
        self.with_secrets(|secrets| {
            secrets.remove(&key);
        })
    }
}
