//! SmartFetch - context-aware prefetching of remote resources
//!
//! Keeps local copies of registered resources fresh. A periodic wakeup
//! asks the decision engine which resources are worth refreshing given
//! the current link, battery and the learned day x hour usage profile,
//! then lets a small worker pool fetch them conditionally into a
//! multi-candidate cache.
//!
//! Layers, bottom-up:
//!
//! - [`clock`], [`link`], [`sensors`] - time and device context
//! - [`stats`] - raw telemetry log and aggregated profiles
//! - [`resource`] - resources, their config and URIs
//! - [`cache`] - record and file cache backends
//! - [`engine`] - scoring and filtering
//! - [`proxy`] - conditional HTTP fetch
//! - [`worker`] - the fetch worker pool
//! - [`coordinator`], [`scheduler`], [`service`] - wakeups and control inputs

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod events;
pub mod link;
pub mod logging;
pub mod proxy;
pub mod registry;
pub mod resource;
pub mod scheduler;
pub mod sensors;
pub mod service;
pub mod stats;
pub mod worker;

pub use coordinator::{SyncError, UpdateMode, UpdateReport};
pub use service::{Sensors, SyncService};

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
