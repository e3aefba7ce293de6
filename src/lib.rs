use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod api;
pub mod assembler;
pub mod chapter_plan;
pub mod config;
pub mod duration;
pub mod persona;
pub mod progress;
pub mod prompt;
pub mod relay;
pub mod snapshot;

/// Receives every status line, e.g. for a console log panel.
pub type RelayLogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<RelayLogHook>>> = Lazy::new(|| Mutex::new(None));

pub fn set_log_hook(hook: Option<RelayLogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    if tag == "WARN" {
        tracing::warn!(target: "script_relay", "{}", message);
    } else {
        tracing::info!(target: "script_relay", tag, "{}", message);
    }

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
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

pub mod init;
