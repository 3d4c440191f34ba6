//! Diagnostic tracing for the agent.
//!
//! Progress lines and the final answer go to stdout with `println!`.
//! Everything here goes to stderr and is filtered by `RUST_LOG`; without it
//! the filter is `warn`, or `enclave=debug` when `--verbose` is given.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init(verbose: bool) {
    let default = if verbose { "warn,enclave=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
        .try_init();
}
