use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Error, Result};

/// One backend connection, exclusively owned by a single worker.
///
/// The harness never interprets failure causes: any `Err` from these calls
/// is classified as a failed operation and recorded, nothing more.
#[async_trait]
pub trait BackendConnection: Send {
    async fn get(&mut self, key: &str) -> Result<String>;
    async fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Opens independent connections; connections are never shared across
/// workers, so each pool slot calls this exactly once.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>>;
}

/// In-memory reference backend.
///
/// Each connection is a handle onto one shared map, which keeps the
/// one-connection-per-worker shape of a real backend while staying
/// self-contained for tests and demo runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

#[async_trait]
impl BackendFactory for MemoryBackend {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>> {
        Ok(Box::new(MemoryConnection {
            store: Arc::clone(&self.store),
        }))
    }
}

struct MemoryConnection {
    store: Arc<RwLock<HashMap<String, String>>>,
}

#[async_trait]
impl BackendConnection for MemoryConnection {
    async fn get(&mut self, key: &str) -> Result<String> {
        self.store
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("key not found: {key}")))
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.store
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
