use std::{collections::HashMap, fs, path::PathBuf, sync::Mutex};

use serde::{Deserialize, Serialize};

use framesync_core::{
    errors::Error,
    secrets::{format_service_id, SecretStore},
    Result,
};

const CURRENT_VERSION: u32 = 1;

/// Secrets persisted as a JSON document next to the service's data.
///
/// Holds the TV pairing token between restarts. The file is rewritten on
/// every change; keep it readable only by the service user.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize, Deserialize, Default)]
struct SecretsFile {
    version: u32,
    secrets: HashMap<String, String>,
}

impl FileSecretStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn with_store<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Secret("Secret store lock poisoned".into()))?;
        let mut store = self.load_locked()?;
        op(&mut store);
        self.persist_locked(store)
    }

    fn io_error(&self, err: std::io::Error) -> Error {
        Error::Secret(format!("{}: {}", self.path.display(), err))
    }

    fn load_locked(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let raw = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        if raw.is_empty() {
            return Ok(HashMap::new());
        }
        let file: SecretsFile = serde_json::from_slice(&raw)
            .map_err(|e| Error::Secret(format!("{} is not a secrets file: {}", self.path.display(), e)))?;
        Ok(file.secrets)
    }

    fn persist_locked(&self, secrets: HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let file = SecretsFile {
            version: CURRENT_VERSION,
            secrets,
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, json).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn set_secret(&self, service: &str, secret: &str) -> Result<()> {
        let key = format_service_id(service);
        self.with_store(|store| {
            store.insert(key, secret.to_string());
        })
    }

    fn get_secret(&self, service: &str) -> Result<Option<String>> {
        let key = format_service_id(service);
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Secret("Secret store lock poisoned".into()))?;
        Ok(self.load_locked()?.remove(&key))
    }

    fn delete_secret(&self, service: &str) -> Result<()> {
        let key = format_service_id(service);
        self.with_store(|store| {
            store.remove(&key);
        })
    }
}
