pub mod api;
pub mod cancel;
pub mod config;
pub mod error;
pub mod init;
pub mod job;
pub mod poller;
pub mod retriever;
pub mod workflow;

pub use error::{NarrationError, Stage};

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("{}", message),
        "OK" => tracing::info!(outcome = "ok", "{}", message),
        _ => tracing::info!("{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
