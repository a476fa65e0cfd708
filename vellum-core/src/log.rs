//! Logging macros. `log_info!`/`log_warn!`/`log_error!` give the rest of
//! the crate a small, stable call-site surface while routing through
//! `tracing` underneath, so the embedder controls the actual sink (file,
//! journald, OTLP, ...) via whatever `tracing_subscriber::Subscriber` it
//! installs — this crate never opens a file or a socket for its own
//! logging.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { tracing::error!($($arg)*) };
}
