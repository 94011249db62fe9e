use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Console logging. `RUST_LOG` wins over `--verbose` when set.
pub fn setup(verbose: bool) {
    let default = if verbose {
        "shipwright=debug"
    } else {
        "shipwright=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let console_layer = fmt::layer()
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}
