//! Shared plumbing for the critique crates.
//!
//! Today this is only the [`observability`] module: every binary and
//! integration test funnels its `tracing` setup through
//! [`observability::init_logging`] so logs land in one rolling file sink.
//!
//! ```rust
//! use critique_common::observability::{LogConfig, LogFormat};
//!
//! let cfg = LogConfig {
//!     format: "json".parse().unwrap_or(LogFormat::Text),
//!     ..LogConfig::default()
//! };
//! assert!(matches!(cfg.format, LogFormat::Json));
//! assert_eq!(cfg.app_name, "critique");
//! ```

pub mod observability;

pub use observability::{init_logging, LogConfig, LogFormat};
