//! File-oriented cache backend.
//!
//! # Layout
//!
//! ```text
//! <root>/<name>/<hash(uri)>/<base>.info   header, see `info`
//! <root>/<name>/<hash(uri)>/<base>.bin    raw payload
//! ```
//!
//! `hash(uri)` is the absolute polynomial string hash in base 36 and
//! `base` is 10 random alphanumeric characters. The payload is written
//! before its header, and the header is renamed into place, so a crash
//! never leaves a header without a payload. Unreadable headers are
//! skipped by readers and removed by maintenance together with payloads
//! that lost their header.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{debug, warn};

use super::info::InfoHeader;
use super::selection::{self, CandidateMeta};
use super::spec::{validate_cache_name, CacheMethod};
use super::traits::{CacheError, CacheProvider, MaintenanceReport};
use crate::clock::Clock;
use crate::resource::{Payload, Resource, ResourceUri, Status};

const INFO_EXT: &str = "info";
const BIN_EXT: &str = "bin";
const TMP_EXT: &str = "tmp";
const BASE_NAME_LEN: usize = 10;

/// One readable candidate on disk.
#[derive(Debug)]
struct StoredFile {
    /// Path without extension.
    base: PathBuf,
    meta: CandidateMeta,
}

impl StoredFile {
    fn info_path(&self) -> PathBuf {
        self.base.with_extension(INFO_EXT)
    }

    fn bin_path(&self) -> PathBuf {
        self.base.with_extension(BIN_EXT)
    }
}

pub struct FileCacheProvider {
    name: String,
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    closed: bool,
}

impl FileCacheProvider {
    /// Open (or create) the cache directory `<root>/<name>`.
    pub fn open(
        root: impl AsRef<Path>,
        name: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        validate_cache_name(name)?;
        let dir = root.as_ref().join(name);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self {
            name: name.to_string(),
            dir,
            clock,
            closed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed {
            return Err(CacheError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn uri_dir(&self, uri: &ResourceUri) -> PathBuf {
        self.dir.join(uri.dir_hash())
    }

    /// Readable candidates stored for `uri`, ordered by base name.
    fn scan(&self, uri: &ResourceUri) -> Result<Vec<StoredFile>, CacheError> {
        self.ensure_open()?;
        let dir = self.uri_dir(uri);
        let mut stored = Vec::new();
        for info in info_files(&dir)? {
            match read_header(&info) {
                Ok(header) if header.uri == uri.as_str() => stored.push(StoredFile {
                    base: info.with_extension(""),
                    meta: CandidateMeta::new(header.status, header.timestamp, header.config),
                }),
                // Another URI with the same hash.
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %info.display(), error = %e, "Skipping unreadable cache header")
                }
            }
        }
        stored.sort_by(|a, b| a.base.cmp(&b.base));
        Ok(stored)
    }

    fn metas(stored: &[StoredFile]) -> Vec<CandidateMeta> {
        stored.iter().map(|s| s.meta).collect()
    }

    fn new_base(&self, dir: &Path) -> PathBuf {
        let mut rng = rand::rng();
        loop {
            let name: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(BASE_NAME_LEN)
                .map(char::from)
                .collect();
            let base = dir.join(name);
            if !base.with_extension(INFO_EXT).exists() && !base.with_extension(BIN_EXT).exists() {
                return base;
            }
        }
    }

    /// Maintenance for one hash directory.
    fn maintain_dir(
        &self,
        dir: &Path,
        now: i64,
        report: &mut MaintenanceReport,
    ) -> Result<(), CacheError> {
        let mut by_uri: BTreeMap<String, Vec<StoredFile>> = BTreeMap::new();
        let mut headers: HashSet<PathBuf> = HashSet::new();

        for info in info_files(dir)? {
            let base = info.with_extension("");
            match read_header(&info) {
                Ok(header) => {
                    headers.insert(base.clone());
                    by_uri.entry(header.uri).or_default().push(StoredFile {
                        base,
                        meta: CandidateMeta::new(header.status, header.timestamp, header.config),
                    });
                }
                Err(e) => {
                    debug!(path = %info.display(), error = %e, "Removing corrupt cache header");
                    remove_if_exists(&info)?;
                    remove_if_exists(&base.with_extension(BIN_EXT))?;
                    report.corrupt_removed += 1;
                }
            }
        }

        for (_, mut stored) in by_uri {
            stored.sort_by(|a, b| a.base.cmp(&b.base));
            let metas = Self::metas(&stored);
            for index in selection::superseded(&metas, now) {
                remove_pair(&stored[index])?;
                headers.remove(&stored[index].base);
                report.entries_removed += 1;
            }
        }

        for entry in fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))? {
            let path = entry.map_err(|e| CacheError::io(dir, e))?.path();
            let orphan = match path.extension().and_then(|e| e.to_str()) {
                Some(BIN_EXT) => !headers.contains(&path.with_extension("")),
                Some(TMP_EXT) => true,
                _ => false,
            };
            if orphan {
                remove_if_exists(&path)?;
                report.corrupt_removed += 1;
            }
        }

        if fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?.next().is_none() {
            fs::remove_dir(dir).map_err(|e| CacheError::io(dir, e))?;
        }
        Ok(())
    }
}

fn read_header(path: &Path) -> Result<InfoHeader, CacheError> {
    let bytes = fs::read(path).map_err(|e| CacheError::io(path, e))?;
    Ok(InfoHeader::decode(&bytes)?)
}

/// `.info` files directly inside `dir`; empty if `dir` does not exist.
fn info_files(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::io(dir, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CacheError::io(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(INFO_EXT) {
            out.push(path);
        }
    }
    Ok(out)
}

fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(CacheError::io(path, e)),
        _ => Ok(()),
    }
}

/// Remove a candidate, header first so readers never see a header
/// without its payload.
fn remove_pair(stored: &StoredFile) -> Result<(), CacheError> {
    remove_if_exists(&stored.info_path())?;
    remove_if_exists(&stored.bin_path())
}

/// Place `src` at `dst`, hard-linking where possible.
fn link_or_copy(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::remove_file(dst) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    if fs::hard_link(src, dst).is_err() {
        fs::copy(src, dst)?;
    }
    Ok(())
}

impl CacheProvider for FileCacheProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn method(&self) -> CacheMethod {
        CacheMethod::File
    }

    fn cache(&self, r: &Resource) -> Result<bool, CacheError> {
        let now = self.clock.now_ms();
        let stored = self.scan(r.uri())?;
        if !selection::admits(&Self::metas(&stored), r.status(), now) {
            debug!(cache = %self.name, uri = %r.uri(), status = %r.status(), "Cache write skipped");
            return Ok(false);
        }

        let dir = self.uri_dir(r.uri());
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        let base = self.new_base(&dir);
        let bin = base.with_extension(BIN_EXT);

        match r.payload() {
            Payload::Memory(data) => fs::write(&bin, data).map_err(|e| CacheError::io(&bin, e))?,
            Payload::File(body) => match fs::copy(body.path(), &bin) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    fs::write(&bin, b"").map_err(|e| CacheError::io(&bin, e))?
                }
                Err(e) => return Err(CacheError::io(body.path(), e)),
            },
        }

        let header = InfoHeader {
            uri: r.uri().as_str().to_string(),
            status: r.status(),
            timestamp: now,
            config: *r.config(),
        };
        let tmp = base.with_extension(TMP_EXT);
        let info = base.with_extension(INFO_EXT);
        fs::write(&tmp, header.encode()).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &info).map_err(|e| CacheError::io(&info, e))?;

        debug!(
            cache = %self.name,
            uri = %r.uri(),
            status = %r.status(),
            path = %info.display(),
            "Candidate stored"
        );
        Ok(true)
    }

    fn fill_resource(&self, r: &mut Resource) -> Result<bool, CacheError> {
        let stored = self.scan(r.uri())?;
        let Some(best) = selection::best(&Self::metas(&stored), self.clock.now_ms()) else {
            return Ok(false);
        };
        let best = &stored[best];
        let bin = best.bin_path();

        let target = match r.payload() {
            Payload::Memory(_) => None,
            Payload::File(body) => Some(body.path().to_path_buf()),
        };
        match target {
            Some(target) => link_or_copy(&bin, &target).map_err(|e| CacheError::io(&target, e))?,
            None => {
                let data = fs::read(&bin).map_err(|e| CacheError::io(&bin, e))?;
                r.set_data(data)?;
            }
        }
        r.set_status(best.meta.status);
        r.set_config(best.meta.config);
        Ok(true)
    }

    fn caching_status(&self, uri: &ResourceUri) -> Result<Status, CacheError> {
        let stored = self.scan(uri)?;
        Ok(selection::best_status(&Self::metas(&stored), self.clock.now_ms()))
    }

    fn timestamp(&self, uri: &ResourceUri) -> Result<i64, CacheError> {
        let stored = self.scan(uri)?;
        Ok(selection::best_timestamp(&Self::metas(&stored), self.clock.now_ms()))
    }

    fn is_outdated(&self, uri: &ResourceUri) -> Result<bool, CacheError> {
        let stored = self.scan(uri)?;
        Ok(selection::is_outdated(&Self::metas(&stored), self.clock.now_ms()))
    }

    fn candidates(&self, uri: &ResourceUri) -> Result<Vec<CandidateMeta>, CacheError> {
        Ok(Self::metas(&self.scan(uri)?))
    }

    fn remove(&self, uri: &ResourceUri) -> Result<usize, CacheError> {
        let stored = self.scan(uri)?;
        for s in &stored {
            remove_pair(s)?;
        }
        Ok(stored.len())
    }

    fn clear_cache(&self) -> Result<(), CacheError> {
        self.ensure_open()?;
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Err(CacheError::io(&self.dir, e))
            }
            _ => {}
        }
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))
    }

    fn do_extensive_work(&self) -> Result<MaintenanceReport, CacheError> {
        self.ensure_open()?;
        let start = Instant::now();
        let now = self.clock.now_ms();
        let mut report = MaintenanceReport::default();

        for entry in fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))? {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            if path.is_dir() {
                self.maintain_dir(&path, now, &mut report)?;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        debug!(cache = %self.name, %report, "File cache maintenance finished");
        Ok(report)
    }

    fn close(&mut self) -> Result<(), CacheError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::resource::ResourceConfig;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000_000;

    fn provider(tmp: &TempDir) -> (Arc<FixedClock>, FileCacheProvider) {
        let clock = Arc::new(FixedClock::new(NOW));
        let cache = FileCacheProvider::open(tmp.path(), "files", clock.clone()).unwrap();
        (clock, cache)
    }

    fn resource(status: Status, data: &[u8]) -> Resource {
        let mut r = Resource::small("/img/logo")
            .unwrap()
            .with_status(status)
            .with_config(ResourceConfig::new(2, 60_000, 3_600_000, true));
        r.set_data(data.to_vec()).unwrap();
        r
    }

    fn files_with_ext(dir: &Path, ext: &str) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().path())
                    .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_layout_on_disk() {
        let tmp = TempDir::new().unwrap();
        let (_, cache) = provider(&tmp);
        let r = resource(Status::Good, b"png");
        cache.cache(&r).unwrap();

        let dir = tmp.path().join("files").join(r.uri().dir_hash());
        let infos = files_with_ext(&dir, INFO_EXT);
        let bins = files_with_ext(&dir, BIN_EXT);
        assert_eq!(infos.len(), 1);
        assert_eq!(bins.len(), 1);

        let stem = infos[0].file_stem().unwrap().to_str().unwrap();
        assert_eq!(stem.len(), BASE_NAME_LEN);
        assert!(stem.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(fs::read(&bins[0]).unwrap(), b"png");

        let header = InfoHeader::decode(&fs::read(&infos[0]).unwrap()).unwrap();
        assert_eq!(header.uri, "/img/logo");
        assert_eq!(header.timestamp, NOW);
    }

    #[test]
    fn test_corrupt_header_is_skipped_then_removed() {
        let tmp = TempDir::new().unwrap();
        let (_, cache) = provider(&tmp);
        let r = resource(Status::Fair, b"ok");
        cache.cache(&r).unwrap();

        let dir = tmp.path().join("files").join(r.uri().dir_hash());
        fs::write(dir.join("brokenbase.info"), b"\xBA\xBE\xC0\xDEjunk").unwrap();
        fs::write(dir.join("brokenbase.bin"), b"zzz").unwrap();
        fs::write(dir.join("orphanbase.bin"), b"zzz").unwrap();

        assert_eq!(cache.candidates(r.uri()).unwrap().len(), 1);
        assert_eq!(cache.caching_status(r.uri()).unwrap(), Status::Fair);

        let report = cache.do_extensive_work().unwrap();
        assert_eq!(report.entries_removed, 0);
        assert_eq!(report.corrupt_removed, 2);
        assert_eq!(files_with_ext(&dir, BIN_EXT).len(), 1);
    }

    #[test]
    fn test_fill_big_resource_links_payload() {
        let tmp = TempDir::new().unwrap();
        let (_, cache) = provider(&tmp);
        cache.cache(&resource(Status::Best, b"large body")).unwrap();

        let target = tmp.path().join("out/logo.bin");
        let mut big = Resource::big("/img/logo", &target).unwrap();
        assert!(cache.fill_resource(&mut big).unwrap());
        assert_eq!(big.status(), Status::Best);
        assert!(big.config().connection_decisive());
        assert_eq!(fs::read(&target).unwrap(), b"large body");
    }

    #[test]
    fn test_maintenance_drops_empty_directories() {
        let tmp = TempDir::new().unwrap();
        let (clock, cache) = provider(&tmp);
        let r = resource(Status::Good, b"x");
        cache.cache(&r).unwrap();
        clock.advance(3_600_001);

        let report = cache.do_extensive_work().unwrap();
        assert_eq!(report.entries_removed, 1);
        assert!(!tmp.path().join("files").join(r.uri().dir_hash()).exists());
    }

    #[test]
    fn test_clear_and_close() {
        let tmp = TempDir::new().unwrap();
        let (_, mut cache) = provider(&tmp);
        let r = resource(Status::Good, b"x");
        cache.cache(&r).unwrap();
        cache.clear_cache().unwrap();
        assert_eq!(cache.caching_status(r.uri()).unwrap(), Status::NotAvailable);

        cache.close().unwrap();
        assert!(matches!(cache.cache(&r), Err(CacheError::Closed(_))));
    }
}
