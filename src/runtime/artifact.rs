//! Module artifact storage
//!
//! Each module is one file `{root}/{name}`. Names go through an allow-list
//! before any path is derived from them.

use super::RuntimeError;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Longest accepted module name in bytes
pub const MAX_MODULE_NAME_LEN: usize = 255;

/// Check a module name against the allow-list.
///
/// Accepted: 1..=255 bytes of ASCII alphanumerics, `.`, `_` and `-`,
/// excluding the names `.` and `..`.
pub fn validate_module_name(name: &str) -> Result<(), RuntimeError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');

    if name.is_empty()
        || name.len() > MAX_MODULE_NAME_LEN
        || name == "."
        || name == ".."
        || !name.chars().all(allowed)
    {
        return Err(RuntimeError::InvalidModuleName(name.to_string()));
    }
    Ok(())
}

/// Filesystem store for module artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the artifact called `name`
    pub fn path_for(&self, name: &str) -> Result<PathBuf, RuntimeError> {
        validate_module_name(name)?;
        Ok(self.root.join(name))
    }

    /// Write `content` as the artifact `name`, replacing any previous one.
    ///
    /// The content goes to a randomly named temporary file in the root first
    /// and is renamed into place, so a failed write leaves the previous
    /// artifact intact and the staging name never depends on `name`.
    pub fn store(&self, name: &str, content: &[u8]) -> Result<PathBuf, RuntimeError> {
        let path = self.path_for(name)?;

        let write = || -> io::Result<()> {
            fs::create_dir_all(&self.root)?;
            let mut staging = NamedTempFile::new_in(&self.root)?;
            staging.write_all(content)?;
            staging.as_file().sync_all()?;
            staging.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };

        // An unpersisted staging file is removed when dropped
        write().map_err(|source| RuntimeError::WriteFailed {
            name: name.to_string(),
            source,
        })?;

        info!("Stored module artifact {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }

    /// Delete the artifact `name`
    pub fn delete(&self, name: &str) -> Result<(), RuntimeError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed module artifact {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No artifact at {}", path.display());
                Err(RuntimeError::NotFound(name.to_string()))
            }
            Err(source) => Err(RuntimeError::WriteFailed {
                name: name.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_allow_list() {
        for good in ["echo.wasm", "a", "my_module-2.wasm", "..wasm"] {
            assert!(validate_module_name(good).is_ok(), "{good} should be accepted");
        }
        for bad in ["", ".", "..", "../etc/passwd", "dir/echo.wasm", "dir\\echo.wasm", "echo wasm", "é.wasm"] {
            assert!(
                matches!(validate_module_name(bad), Err(RuntimeError::InvalidModuleName(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_module_name(&"a".repeat(MAX_MODULE_NAME_LEN)).is_ok());
        assert!(validate_module_name(&"a".repeat(MAX_MODULE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_store_creates_root_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("wasm-module"));

        let path = store.store("echo.wasm", b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        store.store("echo.wasm", b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");

        // No staging files are left behind
        let entries = fs::read_dir(dir.path().join("wasm-module")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_store_accepts_longest_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let name = "a".repeat(MAX_MODULE_NAME_LEN);

        let path = store.store(&name, b"long").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"long");

        store.store(&name, b"longer").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"longer");
        store.delete(&name).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        assert!(matches!(store.delete("ghost.wasm"), Err(RuntimeError::NotFound(_))));

        store.store("ghost.wasm", b"boo").unwrap();
        store.delete("ghost.wasm").unwrap();
        assert!(!dir.path().join("ghost.wasm").exists());
    }

    #[test]
    fn test_traversal_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("root"));

        assert!(store.store("../escape", b"x").is_err());
        assert!(!dir.path().join("escape").exists());
        assert!(!dir.path().join("root").exists());
    }

    #[test]
    fn test_write_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        // Root is a regular file, so nothing can be created beneath it
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let store = ArtifactStore::new(&blocker);

        assert!(matches!(
            store.store("echo.wasm", b"x"),
            Err(RuntimeError::WriteFailed { .. })
        ));
    }
}
