//! Handler registry - maps topics to the handler that owns them

use super::handlers::CommandHandler;
use thiserror::Error;
use tracing::{info, warn};

/// Registry failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Handler topic is empty")]
    EmptyTopic,

    #[error("Topic already registered: {0}")]
    DuplicateTopic(String),

    #[error("No handler registered for topic: {0}")]
    NotFound(String),
}

struct Entry {
    topic: String,
    handler: Box<dyn CommandHandler>,
}

/// Ordered set of handlers, keyed by exact topic
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Entry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own topic
    ///
    /// An empty or already-registered topic is logged and ignored; the
    /// existing registration is left untouched.
    pub fn register(&mut self, handler: Box<dyn CommandHandler>) -> Result<(), RegistryError> {
        let topic = handler.topic().to_string();

        if topic.is_empty() {
            warn!("[REGISTRY] Ignoring handler with empty topic");
            return Err(RegistryError::EmptyTopic);
        }
        if self.entries.iter().any(|e| e.topic == topic) {
            warn!("[REGISTRY] Duplicate topic ignored: {}", topic);
            return Err(RegistryError::DuplicateTopic(topic));
        }

        info!("[REGISTRY] Registered handler for {}", topic);
        self.entries.push(Entry { topic, handler });
        Ok(())
    }

    /// Exact-match lookup
    pub fn resolve(&self, topic: &str) -> Result<&dyn CommandHandler, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.topic == topic)
            .map(|e| e.handler.as_ref())
            .ok_or_else(|| RegistryError::NotFound(topic.to_string()))
    }

    /// Visit handlers in registration order
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &dyn CommandHandler),
    {
        for entry in &self.entries {
            f(&entry.topic, entry.handler.as_ref());
        }
    }

    /// Registered topics in registration order
    pub fn topics(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.topic.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Initialize every handler; returns how many came up
    ///
    /// Handlers that fail stay registered so their topic still resolves.
    pub async fn initialize_all(&self) -> usize {
        let mut ready = 0;
        for entry in &self.entries {
            match entry.handler.initialize().await {
                Ok(()) => {
                    info!("[REGISTRY] {} ready", entry.topic);
                    ready += 1;
                }
                Err(e) => warn!("[REGISTRY] {} failed to initialize: {}", entry.topic, e),
            }
        }
        ready
    }

    /// Release every handler's hardware
    pub async fn shutdown_all(&self) {
        for entry in &self.entries {
            entry.handler.shutdown().await;
        }
    }
}
