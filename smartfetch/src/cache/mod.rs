//! Multi-candidate resource cache.
//!
//! Two interchangeable backends implement [`CacheProvider`]:
//!
//! - [`RecordCacheProvider`] - one SQLite row per candidate, for many
//!   small payloads
//! - [`FileCacheProvider`] - one `.info`/`.bin` file pair per candidate,
//!   for big payloads
//!
//! Both delegate admission, selection and maintenance decisions to the
//! [`selection`] rules, so they behave identically for the same sequence
//! of calls.
//!
//! # Example
//!
//! ```ignore
//! use smartfetch::cache::{CacheProvider, CacheSpec};
//!
//! let cache = CacheSpec::file("images")?.open(&layout, clock)?;
//! if cache.fill_resource(&mut resource)? {
//!     println!("{} served from cache", resource.uri());
//! }
//! ```

mod file;
mod info;
mod record;
pub mod selection;
mod spec;
mod traits;

pub use file::FileCacheProvider;
pub use info::{InfoHeader, MAGIC as INFO_MAGIC};
pub use record::RecordCacheProvider;
pub use selection::CandidateMeta;
pub(crate) use spec::is_valid_name;
pub use spec::{validate_cache_name, CacheMethod, CacheSpec};
pub use traits::{CacheError, CacheProvider, MaintenanceReport};
