use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "endo_ai_lib=debug,info"
    } else {
        "endo_ai_lib=info,warn"
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
