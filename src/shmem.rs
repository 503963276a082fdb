//! Named shared segments for same-host field handoff
//!
//! A producer serializes a field into a segment sized to fit it exactly and a
//! consumer on the same host attaches by key and decodes it. Segments are
//! files under a shared-memory backed directory (`/dev/shm` where available)
//! guarded by an advisory exclusive lock, so the byte copy on either side never
//! observes a torn write. A new segment is sized and locked under a private
//! staging name before it becomes visible under its key.
//!
//! ```no_run
//! use voxfield::{SegmentConfig, SparseField, Vec3f, Vec3i};
//!
//! # fn main() -> voxfield::Result<()> {
//! let config = SegmentConfig::new();
//! let mut field = SparseField::new(Vec3i::new(8, 8, 8), Vec3f::zeros(), Vec3f::repeat(50.0));
//! field.add_value(&Vec3i::new(1, 2, 3), 0.25);
//!
//! // Keep the handle alive until consumers are done
//! let segment = field.write_to_memory(&config, "innervation-L4-VPM")?;
//! let copy = SparseField::load_from_memory(&config, "innervation-L4-VPM")?;
//! assert_eq!(copy, field);
//! segment.remove()?;
//! # Ok(())
//! # }
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::field::SparseField;

const SEGMENT_PREFIX: &str = "voxfield-";

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where named segments live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    root_dir: PathBuf,
}

impl SegmentConfig {
    /// Default configuration: `/dev/shm` if present, otherwise the temp directory
    pub fn new() -> Self {
        let shm = Path::new("/dev/shm");
        let root_dir = if shm.is_dir() {
            shm.to_path_buf()
        } else {
            std::env::temp_dir()
        };
        Self { root_dir }
    }

    /// Place segments under `root_dir`
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    /// Directory holding the segments
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Backing path of the segment named `key`
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced so a key can never
    /// escape the root directory.
    pub fn segment_path(&self, key: &str) -> PathBuf {
        self.root_dir
            .join(format!("{}{}", SEGMENT_PREFIX, sanitize_key(key)))
    }

    // Unique per process and call, hidden from attach by the leading dot
    fn staging_path(&self, key: &str) -> PathBuf {
        let serial = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root_dir.join(format!(
            ".{}{}.{}.{}",
            SEGMENT_PREFIX,
            sanitize_key(key),
            process::id(),
            serial
        ))
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a named shared segment
///
/// A handle obtained from [`SharedSegment::create`] owns the segment and
/// removes it when dropped. Handles from [`SharedSegment::attach`] only detach.
#[derive(Debug)]
pub struct SharedSegment {
    key: String,
    path: PathBuf,
    file: File,
    owner: bool,
}

impl SharedSegment {
    /// Create a new segment of exactly `size` bytes
    ///
    /// # Errors
    ///
    /// - [`Error::SegmentExists`] if a segment with this key already exists
    /// - [`Error::Io`] if the segment cannot be created
    pub fn create(config: &SegmentConfig, key: &str, size: u64) -> Result<Self> {
        let segment = Self::create_locked(config, key, size)?;
        FileExt::unlock(&segment.file)?;
        Ok(segment)
    }

    // The returned segment is still exclusively locked by its handle
    fn create_locked(config: &SegmentConfig, key: &str, size: u64) -> Result<Self> {
        let path = config.segment_path(key);
        let staging = config.staging_path(key);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&staging)
            .inspect_err(|e| {
                warn!(key, error = %e, "unable to create shared memory segment");
            })?;

        let published = publish_locked(&file, &staging, &path, size);
        let _ = fs::remove_file(&staging);
        published.map_err(|e| {
            warn!(key, error = %e, "unable to publish shared memory segment");
            match e.kind() {
                io::ErrorKind::AlreadyExists => Error::SegmentExists(key.to_string()),
                _ => Error::Io(e),
            }
        })?;

        debug!(key, size, "created shared memory segment");
        Ok(Self {
            key: key.to_string(),
            path,
            file,
            owner: true,
        })
    }

    /// Attach to an existing segment
    pub fn attach(config: &SegmentConfig, key: &str) -> Result<Self> {
        let path = config.segment_path(key);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .inspect_err(|e| {
                warn!(key, error = %e, "unable to attach to shared memory segment");
            })?;
        Ok(Self {
            key: key.to_string(),
            path,
            file,
            owner: false,
        })
    }

    /// Segment key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Segment size in bytes
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Acquire the segment's exclusive lock, blocking until it is available
    ///
    /// The lock is released when the returned guard is dropped.
    pub fn lock(&self) -> Result<SegmentGuard<'_>> {
        FileExt::lock_exclusive(&self.file)?;
        Ok(SegmentGuard { segment: self })
    }

    /// Destroy the segment
    pub fn remove(mut self) -> Result<()> {
        self.owner = false;
        fs::remove_file(&self.path)?;
        debug!(key = %self.key, "removed shared memory segment");
        Ok(())
    }
}

// Lock and size the staged file, then link it under the segment key. Linking
// fails if the key exists, so publication is exclusive.
fn publish_locked(file: &File, staging: &Path, path: &Path, size: u64) -> io::Result<()> {
    FileExt::lock_exclusive(file)?;
    file.set_len(size)?;
    fs::hard_link(staging, path)
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if self.owner {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Exclusive access to a [`SharedSegment`]'s bytes
#[derive(Debug)]
pub struct SegmentGuard<'a> {
    segment: &'a SharedSegment,
}

impl SegmentGuard<'_> {
    /// Copy `bytes` to the start of the segment
    ///
    /// # Errors
    ///
    /// Returns [`Error::SegmentTooSmall`] if the payload exceeds the segment.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let size = self.segment.size()?;
        let required = bytes.len() as u64;
        if required > size {
            return Err(Error::SegmentTooSmall {
                key: self.segment.key.clone(),
                size,
                required,
            });
        }
        let mut file = &self.segment.file;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    /// Copy the whole segment out
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let mut file = &self.segment.file;
        let mut bytes = Vec::with_capacity(self.segment.size()? as usize);
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Drop for SegmentGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.segment.file);
    }
}

impl SparseField {
    /// Serialize the field into a new shared segment named `key`
    ///
    /// The segment is sized to the encoded field exactly. The returned handle
    /// owns the segment; keep it alive until consumers have loaded the field.
    pub fn write_to_memory(&self, config: &SegmentConfig, key: &str) -> Result<SharedSegment> {
        let bytes = self.to_bytes();
        let segment = SharedSegment::create_locked(config, key, bytes.len() as u64)?;
        {
            // Consumers block on the lock until the payload is complete
            let mut guard = SegmentGuard { segment: &segment };
            guard.write_bytes(&bytes)?;
        }
        info!(key, bytes = bytes.len(), "wrote sparse field to shared memory");
        Ok(segment)
    }

    /// Load a field from the shared segment named `key`
    pub fn load_from_memory(config: &SegmentConfig, key: &str) -> Result<Self> {
        let segment = SharedSegment::attach(config, key)?;
        let bytes = segment.lock()?.read_bytes()?;
        let field = Self::from_bytes(&bytes)?;
        info!(key, locations = field.len(), "loaded sparse field from shared memory");
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Vec3f, Vec3i};

    fn config(dir: &tempfile::TempDir) -> SegmentConfig {
        SegmentConfig::new().with_root_dir(dir.path())
    }

    #[test]
    fn test_segment_path_is_sanitized() {
        let cfg = SegmentConfig::new().with_root_dir("/tmp/segments");
        let path = cfg.segment_path("../etc/passwd");
        assert_eq!(path, Path::new("/tmp/segments/voxfield-.._etc_passwd"));
        assert_eq!(path.parent(), Some(Path::new("/tmp/segments")));
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let _first = SharedSegment::create(&cfg, "dup", 8).unwrap();
        assert!(matches!(
            SharedSegment::create(&cfg, "dup", 8),
            Err(Error::SegmentExists(k)) if k == "dup"
        ));
    }

    #[test]
    fn test_create_releases_lock_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let segment = SharedSegment::create(&cfg, "staged", 32).unwrap();
        let attached = SharedSegment::attach(&cfg, "staged").unwrap();
        FileExt::try_lock_exclusive(&attached.file).unwrap();
        FileExt::unlock(&attached.file).unwrap();
        assert!(SharedSegment::create(&cfg, "staged", 32).is_err());

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("voxfield-staged")]);
        drop(segment);
    }

    #[test]
    fn test_new_segment_is_locked_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let segment = SharedSegment::create_locked(&cfg, "pending", 8).unwrap();
        let attached = SharedSegment::attach(&cfg, "pending").unwrap();
        assert!(FileExt::try_lock_exclusive(&attached.file).is_err());

        drop(SegmentGuard { segment: &segment });
        FileExt::try_lock_exclusive(&attached.file).unwrap();
    }

    #[test]
    fn test_attach_missing_segment_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SharedSegment::attach(&config(&dir), "missing"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_write_larger_than_segment_fails() {
        let dir = tempfile::tempdir().unwrap();
        let segment = SharedSegment::create(&config(&dir), "small", 4).unwrap();
        let err = segment.lock().unwrap().write_bytes(&[0u8; 5]).unwrap_err();
        assert!(matches!(
            err,
            Error::SegmentTooSmall {
                size: 4,
                required: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_owner_drop_removes_segment() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let path = cfg.segment_path("scoped");
        {
            let segment = SharedSegment::create(&cfg, "scoped", 16).unwrap();
            let attached = SharedSegment::attach(&cfg, "scoped").unwrap();
            assert_eq!(attached.size().unwrap(), 16);
            drop(attached);
            assert!(path.exists());
            assert_eq!(segment.key(), "scoped");
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_field_handoff() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let mut field = SparseField::new(
            Vec3i::new(10, 10, 10),
            Vec3f::new(-100.0, 50.0, 0.0),
            Vec3f::repeat(50.0),
        );
        field.add_value(&Vec3i::new(9, 0, 3), 0.125);
        field.add_value(&Vec3i::new(1, 1, 1), 4.0);

        let segment = field.write_to_memory(&cfg, "handoff").unwrap();
        assert_eq!(segment.size().unwrap(), field.encoded_len() as u64);

        let loaded = SparseField::load_from_memory(&cfg, "handoff").unwrap();
        assert_eq!(loaded, field);

        segment.remove().unwrap();
        assert!(SparseField::load_from_memory(&cfg, "handoff").is_err());
    }
}
