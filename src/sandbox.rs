/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/sandbox.rs
 * Responsibility: Working root resolution and path containment checks.
 */

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// The single directory every tool is confined to.
///
/// Built once at startup and never changed afterwards. The stored path is
/// canonical, so containment is a segment-wise prefix test against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingRoot {
    root: PathBuf,
}

impl WorkingRoot {
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let root = fs::canonicalize(path.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Join `relative` onto the root and fold away `.` and `..` lexically.
    ///
    /// An absolute `relative` replaces the root entirely, which the
    /// containment check then rejects.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        normalize(&self.root.join(relative))
    }

    /// Whether `absolute` lies at or below the root.
    ///
    /// Compared by whole components, so `/srv/root-evil` is never inside
    /// `/srv/root`. Existing paths are also checked after symlink resolution.
    pub fn is_contained(&self, absolute: &Path) -> bool {
        if !absolute.starts_with(&self.root) {
            return false;
        }

        match fs::canonicalize(absolute) {
            Ok(real) => real.starts_with(&self.root),
            Err(_) => true,
        }
    }

    /// Resolve `relative` and return it only if it stays inside the root.
    pub fn contain(&self, relative: &str) -> Option<PathBuf> {
        let target = self.resolve(relative);
        self.is_contained(&target).then_some(target)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the filesystem root is a no-op, as with `cd /..`.
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
