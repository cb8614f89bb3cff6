//! Optional on-disk store of serialized automata, shared across restarts.
//!
//! Layout: a `VERSION` file holding the engine version tag, plus one
//! `<blake3>.bin` file per (vocabulary hash, pattern). Opening the store
//! with a different version tag wipes every entry.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bridle_core::Result;
use tracing::{info, warn};

use crate::cache::CacheKey;

const VERSION_FILE: &str = "VERSION";
const ENTRY_EXT: &str = "bin";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn open(dir: impl Into<PathBuf>, version: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let store = Self { dir };

        let version_path = store.dir.join(VERSION_FILE);
        match fs::read_to_string(&version_path) {
            Ok(found) if found.trim() == version => {}
            Ok(found) => {
                info!(
                    dir = %store.dir.display(),
                    old = found.trim(),
                    new = version,
                    "Engine version changed, clearing grammar cache"
                );
                store.wipe()?;
                store.write_atomic(&version_path, version.as_bytes())?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                store.wipe()?;
                store.write_atomic(&version_path, version.as_bytes())?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialized automaton for `key`. Unreadable entries are logged and
    /// treated as missing.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable grammar cache entry");
                None
            }
        }
    }

    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.entry_path(key), bytes)
    }

    /// Drop a corrupt entry so the next compile rewrites it.
    pub fn remove(&self, key: &CacheKey) {
        let path = self.entry_path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Cannot remove grammar cache entry");
            }
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize> {
        let mut n = 0;
        for entry in fs::read_dir(&self.dir)? {
            if is_entry(&entry?.path()) {
                n += 1;
            }
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(key.vocabulary_hash.as_bytes());
        hasher.update(&[0]);
        hasher.update(key.pattern.as_bytes());
        self.dir
            .join(format!("{}.{ENTRY_EXT}", hasher.finalize().to_hex()))
    }

    fn wipe(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if is_entry(&path) || is_temp(&path) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Write through a uniquely named temp file, then rename over `path`.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension(format!(
            "tmp.{}.{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp_path, bytes)?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

fn is_entry(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXT)
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(".tmp."))
}
