//! Process-wide dependencies, constructed once at start-up and passed to
//! every view. Dropping the last clone releases the provider client.

use std::sync::Arc;

use murmur_shared::provider::Backend;

use crate::config::ClientConfig;

#[derive(Clone)]
pub struct ClientContext {
    backend: Arc<dyn Backend>,
    config: Arc<ClientConfig>,
}

impl ClientContext {
    pub fn new(backend: Arc<dyn Backend>, config: ClientConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
