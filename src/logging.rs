use tracing_subscriber::EnvFilter;

/// Logs go to stderr so they never mix with `--dump` output; verbosity is
/// driven by `RUST_LOG`.
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
