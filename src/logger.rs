//! Logging: colored console output plus a pluggable file sink.
//!
//! - The `log!`/`debug!` macros provide operator-facing console output for
//!   service lifecycle events, in the same style as a CLI build tool: a
//!   colored `[module]` prefix, no timestamps (the terminal already has
//!   those via scrollback).
//! - [`sink`] implements the CSV/NDJSON file contract from the external
//!   interface: exact header text, in-place header repair, and an optional
//!   `StatusCode` field.

pub mod sink;

use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::io::{Write, stdout};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use sink::{LogEvent, LogSink};

static VERBOSE: AtomicBool = AtomicBool::new(false);
static SINK: OnceLock<Mutex<Box<dyn LogSink>>> = OnceLock::new();

/// Enable verbose (debug-level) console logging.
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled.
#[allow(dead_code)] // used by debug! macro
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Install the process-wide file sink. Every [`log`] call is mirrored to it
/// from then on, in addition to stdout. Call once at startup; later calls
/// are ignored (the sink cannot be swapped out from under in-flight writers).
pub fn install_sink(sink: Box<dyn LogSink>) {
    let _ = SINK.set(Mutex::new(sink));
}

/// Log a message with a colored module prefix.
///
/// # Usage
/// ```ignore
/// log!("watch"; "started folder {}", path.display());
/// ```
///
/// A `status: ...` form also records an HTTP status code on the file sink's
/// `StatusCode` column, for dispatch-outcome lines that carry one:
/// ```ignore
/// log!("send", status: outcome.last_status; "posted {} [{request_id}]", path.display());
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
    ($module:expr, status: $status:expr; $($arg:tt)*) => {{
        $crate::logger::log_with_status($module, $status, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when `--verbose` is enabled).
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
    ($module:expr, status: $status:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log_with_status($module, $status, &format!($($arg)*))
        }
    }};
}

/// Print a message with a colored module prefix to stdout, and mirror it to
/// the file sink if one was installed via [`install_sink`].
#[inline]
pub fn log(module: &str, message: &str) {
    log_with_status(module, None, message);
}

/// Like [`log`], but also records an HTTP status code on the file sink's
/// `StatusCode` column (used for REST dispatch outcomes).
#[inline]
pub fn log_with_status(module: &str, status_code: Option<u16>, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);
    let mut stdout = stdout().lock();
    let _ = writeln!(stdout, "{prefix} {message}");

    if let Some(sink) = SINK.get() {
        let event = LogEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: if module_lower == "error" { "Error".to_string() } else { "Info".to_string() },
            message: message.to_string(),
            category: module.to_string(),
            exception: None,
            status_code,
        };
        let _ = sink.lock().write_event(&event);
    }
}

/// Apply color to a module prefix based on module type.
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> String {
    let prefix = format!("[{module}]");
    match module_lower {
        "watch" => prefix.bright_green().bold().to_string(),
        "send" | "resilience" => prefix.bright_blue().bold().to_string(),
        "error" | "shutdown" => prefix.bright_red().bold().to_string(),
        "config" => prefix.bright_magenta().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}
