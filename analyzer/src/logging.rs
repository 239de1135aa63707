//! Diagnostic tracing for the analyzer CLI.
//!
//! Output goes to stderr and is controlled by `RUST_LOG`. Events carry ids,
//! roles, counts, and error kinds; transcript and generated text are never
//! logged. Analysis results go to stdout or the `--output` file.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the stderr subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=analyzer=info analyzer analyze --transcript t.json --user-id u1 --mode study-stress
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
