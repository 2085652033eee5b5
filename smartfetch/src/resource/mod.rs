//! Managed resources.
//!
//! A [`Resource`] couples a normalized [`ResourceUri`] with its
//! [`ResourceConfig`], the [`Status`] of the copy it currently holds and
//! the [`Payload`] itself. Caches fill resources; workers fetch into them.
//!
//! # Example
//!
//! ```
//! use smartfetch::resource::{Resource, ResourceConfig, Status};
//!
//! let mut r = Resource::small("/news/today").unwrap();
//! r.set_config(ResourceConfig::default().with_priority(1));
//! assert_eq!(r.status(), Status::NotAvailable);
//! ```

mod config;
mod payload;
mod status;
mod uri;

use std::io;
use std::path::PathBuf;

pub use config::{
    ResourceConfig, DEFAULT_CACHE_LIFESPAN_MS, DEFAULT_UPDATE_INTERVAL_MS, MARSHALLED_LEN,
};
pub use payload::{FileBody, Payload, SMALL_RESOURCE_WARN_BYTES};
pub use status::Status;
pub use uri::{string_hash, EmptyUri, ResourceUri};

/// A resource that should be kept up to date.
#[derive(Debug)]
pub struct Resource {
    uri: ResourceUri,
    config: ResourceConfig,
    status: Status,
    payload: Payload,
}

impl Resource {
    pub fn new(uri: ResourceUri, payload: Payload) -> Self {
        Self {
            uri,
            config: ResourceConfig::default(),
            status: Status::NotAvailable,
            payload,
        }
    }

    /// Small resource held in memory.
    pub fn small(path: &str) -> Result<Self, EmptyUri> {
        Ok(Self::new(ResourceUri::new(path)?, Payload::Memory(Vec::new())))
    }

    /// Big resource backed by a file.
    pub fn big(path: &str, body: impl Into<PathBuf>) -> Result<Self, EmptyUri> {
        Ok(Self::new(
            ResourceUri::new(path)?,
            Payload::File(FileBody::new(body)),
        ))
    }

    pub fn with_config(mut self, config: ResourceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn uri(&self) -> &ResourceUri {
        &self.uri
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ResourceConfig) {
        self.config = config;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn is_big(&self) -> bool {
        self.payload.is_file()
    }

    pub fn size(&self) -> io::Result<u64> {
        self.payload.len()
    }

    pub fn read_payload(&self) -> io::Result<Vec<u8>> {
        self.payload.read_all()
    }

    /// Replace the payload contents.
    pub fn set_data(&mut self, data: Vec<u8>) -> io::Result<()> {
        self.payload.replace(data)
    }

    /// A fresh, empty resource with the same identity and payload kind.
    ///
    /// File-backed copies get a transient body next to `staging`.
    pub fn empty_like(&self, staging: Option<PathBuf>) -> Self {
        let payload = match (&self.payload, staging) {
            (Payload::File(_), Some(path)) => Payload::File(FileBody::transient(path)),
            _ => Payload::Memory(Vec::new()),
        };
        Self::new(self.uri.clone(), payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_resource_defaults() {
        let r = Resource::small("a/b").unwrap();
        assert_eq!(r.uri().as_str(), "/a/b");
        assert_eq!(r.status(), Status::NotAvailable);
        assert_eq!(r.config(), &ResourceConfig::default());
        assert!(!r.is_big());
        assert_eq!(r.size().unwrap(), 0);
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(Resource::small("").is_err());
        assert!(Resource::big(" ", "/tmp/x").is_err());
    }

    #[test]
    fn test_set_data_on_small_resource() {
        let mut r = Resource::small("/x").unwrap();
        r.set_data(vec![1, 2, 3]).unwrap();
        assert_eq!(r.read_payload().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_like_keeps_identity() {
        let r = Resource::small("/x")
            .unwrap()
            .with_status(Status::Good)
            .with_config(ResourceConfig::default().with_priority(4));
        let copy = r.empty_like(None);
        assert_eq!(copy.uri(), r.uri());
        assert_eq!(copy.status(), Status::NotAvailable);
        assert_eq!(copy.config().priority(), 0);
    }
}
