//! Persistent update hook polled once per loop iteration

use async_trait::async_trait;

#[async_trait]
pub trait UpdateProvider: Send {
    /// Service pending update work; must return promptly
    async fn poll(&mut self);
}

/// Provider for builds without over-the-air updates
#[derive(Debug, Default)]
pub struct NoopUpdater {
    polls: u64,
}

impl NoopUpdater {
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

#[async_trait]
impl UpdateProvider for NoopUpdater {
    async fn poll(&mut self) {
        self.polls += 1;
    }
}
