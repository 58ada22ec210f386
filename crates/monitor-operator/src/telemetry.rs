use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing.
///
/// `RUST_LOG` wins when it parses as a filter; otherwise `log_level` is used
/// for the whole process.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
