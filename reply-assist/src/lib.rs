//! Quick-reply overlay engine for host single-page applications.
//!
//! The engine injects a single button next to the host's active reply
//! composer, extracts the post being replied to, and writes processed or
//! canned text back into the composer in a way the host's own state
//! tracking accepts. All host access goes through [`dom::HostDom`].

pub mod classifier;
pub mod config;
pub mod controller;
pub mod dom;
mod error;
pub mod extract;
pub mod geometry;
pub mod input;
pub mod messaging;
pub mod metrics;
pub mod navigation;
pub mod panel;
pub mod reconcile;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod transform;

pub use config::OverlayConfig;
pub use controller::{HostEvent, Overlay};
pub use error::AppError;
pub use settings::{ProcessMode, Settings};

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_logging() -> Result<(), AppError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}
