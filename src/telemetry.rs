//! Tracing subscriber setup for binaries and tests embedding the reconciler.

use tracing_subscriber::EnvFilter;

/// Default log directive for this crate.
pub const DEFAULT_DIRECTIVE: &str = "valkey_slot_reconciler=info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to [`DEFAULT_DIRECTIVE`] for this crate. Returns an error if a
/// global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::from_default_env()
        .add_directive(DEFAULT_DIRECTIVE.parse()?)
        .add_directive("kube=info".parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}
