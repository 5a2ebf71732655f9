use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use super::{Client, ClientConfig};
use crate::errors::AuError;

/// Caches one [`Client`] per Vault instance name so that repeated passes reuse pooled connections.
#[derive(Default)]
pub struct ClientRepository {
    clients: RwLock<HashMap<String, Arc<Client>>>,
}

impl ClientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached client for `name`, building one from `config` on first use. A cached client that
    /// was closed elsewhere is replaced.
    pub fn get_or_create<F>(&self, name: &str, config: F) -> Result<Arc<Client>, AuError>
    where
        F: FnOnce() -> ClientConfig,
    {
        {
            let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(client) = clients.get(name) {
                if !client.is_closed() {
                    return Ok(client.clone());
                }
            }
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(name) {
            if !client.is_closed() {
                return Ok(client.clone());
            }
        }

        let client = Arc::new(Client::with_config(config())?);
        log::debug!("cached vault client for instance {}", name);
        clients.insert(name.to_string(), client.clone());
        Ok(client)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Client>> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Drops the client for `name` from the cache and closes it.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.clients.write().unwrap_or_else(PoisonError::into_inner).remove(name);
        match removed {
            Some(client) => {
                client.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        for (_, client) in clients.drain() {
            client.close();
        }
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
