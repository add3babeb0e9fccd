//! Built-in job handlers for the Karpix worker.
//!
//! These handlers exercise the worker plumbing end to end without depending on
//! any application service: enqueue one of them to check that a deployment
//! claims jobs, records statuses and delivers webhooks.
//!
//! # Handlers
//!
//! - `services.diagnostics:echo` - returns the job data and arguments
//! - `services.diagnostics:sleep` - waits `seconds` (capped) then returns
//! - `services.diagnostics:respond` - returns a caller-chosen status code
//! - `services.diagnostics:fail` - raises a handler error
//!
//! # Usage
//!
//! ```rust,no_run
//! use karpix_job_queue::HandlerRegistry;
//! use karpix_handlers::register_all_handlers;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = HandlerRegistry::new();
//!     register_all_handlers(&registry).await;
//! }
//! ```

mod diagnostics;

pub use diagnostics::{EchoHandler, FailHandler, RespondHandler, SleepHandler, MAX_SLEEP_SECS};

use karpix_job_queue::HandlerRegistry;

/// Register every built-in handler.
pub async fn register_all_handlers(registry: &HandlerRegistry) {
    registry.register(EchoHandler::new()).await;
    registry.register(SleepHandler::new()).await;
    registry.register(RespondHandler::new()).await;
    registry.register(FailHandler::new()).await;
}

/// Handler names for type-safe references.
pub mod handler_names {
    pub const DIAGNOSTICS_MODULE: &str = "services.diagnostics";
    pub const ECHO: &str = "echo";
    pub const SLEEP: &str = "sleep";
    pub const RESPOND: &str = "respond";
    pub const FAIL: &str = "fail";
}

#[cfg(test)]
mod tests {
    use super::*;
    use karpix_job_queue::HandlerKey;

    #[tokio::test]
    async fn registers_every_builtin() {
        let registry = HandlerRegistry::new();
        register_all_handlers(&registry).await;

        let keys = registry.keys().await;
        assert_eq!(keys.len(), 4);
        for name in [
            handler_names::ECHO,
            handler_names::SLEEP,
            handler_names::RESPOND,
            handler_names::FAIL,
        ] {
            assert!(keys.contains(&HandlerKey::new(handler_names::DIAGNOSTICS_MODULE, name)));
        }
    }
}
