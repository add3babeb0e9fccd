use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing from configuration. `RUST_LOG` takes precedence over the configured level.
pub fn install_tracing_from_config(cfg: &karpix_config::LoggingConfig) {
    let env_filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.level.clone());
    let env_filter = EnvFilter::try_new(&env_filter_str).unwrap_or_else(|error| {
        eprintln!("invalid log filter {env_filter_str:?} ({error}), falling back to info");
        EnvFilter::new("info")
    });

    // The two branches build different subscriber types.
    let installed = if cfg.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(ChronoUtc::rfc_3339())
            .try_init()
    };

    if let Err(error) = installed {
        eprintln!("tracing already initialized: {error}");
    }
}
