//! Core types shared across the codebase: process-wide shutdown signaling.

mod state;

pub use state::{cancellation_token, is_shutdown, manual_cancellation, setup_shutdown_handler, CancellationToken};
