use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes logging with console output and a daily-rotated JSON file in `dir`.
pub fn init_logging(dir: &Path) {
    let _ = fs::create_dir_all(dir);

    let file_appender = tracing_appender::rolling::daily(dir, "pricer.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("apartment_pricer=info"));

    // Already initialized (tests, repeated CLI setup) is fine
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    // Keep the writer alive for the life of the process so logs are flushed
    std::mem::forget(guard);
}
