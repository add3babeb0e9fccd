//! Static handler registration and lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::ResolutionError;
use crate::handler::{HandlerKey, JobHandler};

/// Maps `(module, qualname)` pairs to handlers.
///
/// Populated at startup; every job resolves against it before dispatch, so an
/// unknown pair fails with a typed [`ResolutionError`] instead of reaching a
/// handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<HandlerKey, Arc<dyn JobHandler>>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &"<RwLock<HashMap<HandlerKey, Arc<dyn JobHandler>>>>")
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own key. A later registration for the same
    /// key replaces the earlier one.
    pub async fn register<H: JobHandler + 'static>(&self, handler: H) {
        let key = handler.key();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(key.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(handler = %key, "replacing previously registered handler");
        } else {
            tracing::debug!(handler = %key, "registered handler");
        }
    }

    /// Locate the handler for a job.
    pub async fn resolve(
        &self,
        module: &str,
        qualname: &str,
    ) -> Result<Arc<dyn JobHandler>, ResolutionError> {
        if module.is_empty() || module.split('.').any(str::is_empty) {
            return Err(ResolutionError::ModuleNotFound(module.to_owned()));
        }
        if qualname.is_empty() || qualname.split('.').any(str::is_empty) {
            return Err(ResolutionError::AttributeNotFound {
                module: module.to_owned(),
                qualname: qualname.to_owned(),
            });
        }

        let handlers = self.handlers.read().await;
        if let Some(handler) = handlers.get(&HandlerKey::new(module, qualname)) {
            return Ok(Arc::clone(handler));
        }

        if handlers.keys().any(|k| k.module == module) {
            Err(ResolutionError::AttributeNotFound {
                module: module.to_owned(),
                qualname: qualname.to_owned(),
            })
        } else {
            Err(ResolutionError::ModuleNotFound(module.to_owned()))
        }
    }

    /// Registered keys, sorted.
    pub async fn keys(&self) -> Vec<HandlerKey> {
        let mut keys: Vec<_> = self.handlers.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }
}
