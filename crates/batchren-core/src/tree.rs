//! The file-tree collaborator the engine works against.
//!
//! The engine never owns entries; it only holds handles handed out by a
//! [`FileTree`] and asks the tree to list, read, write, create, rename and
//! delete on its behalf.

use std::fmt::Debug;
use std::fs;
use std::hash::Hash;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::EngineError;

/// A snapshot of one filesystem object as reported by the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<H> {
    pub handle: H,
    pub name: String,
    pub is_dir: bool,
    pub last_modified: Option<SystemTime>,
    pub declared_type: Option<String>,
}

impl<H> Entry<H> {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

pub trait FileTree {
    type Handle: Clone + Eq + Hash + Debug;

    /// Children of `dir` in enumeration order.
    fn list_children(&self, dir: &Self::Handle) -> io::Result<Vec<Entry<Self::Handle>>>;

    fn open(&self, entry: &Self::Handle) -> io::Result<Box<dyn Read + '_>>;

    /// Opens `entry` for writing, truncating its existing content.
    fn open_for_overwrite(&self, entry: &Self::Handle) -> io::Result<Box<dyn Write + '_>>;

    fn create(
        &self,
        parent: &Self::Handle,
        name: &str,
        content_type: &str,
    ) -> Result<Entry<Self::Handle>, EngineError>;

    /// Renames in place. Returns `false` when the primitive is unsupported
    /// or the rename did not happen.
    fn rename(&self, entry: &Self::Handle, new_name: &str) -> bool;

    fn delete(&self, entry: &Self::Handle) -> bool;

    fn find(&self, parent: &Self::Handle, name: &str) -> Option<Entry<Self::Handle>>;
}

/// Names that cannot escape or corrupt their parent directory.
pub fn is_usable_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// [`FileTree`] over the local filesystem, using paths as handles.
///
/// Local files carry no declared content type, so `declared_type` is always
/// `None` and the content type passed to [`FileTree::create`] is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTree;

impl LocalTree {
    pub fn entry(path: &Path) -> io::Result<Entry<PathBuf>> {
        let metadata = fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Entry {
            handle: path.to_path_buf(),
            name,
            is_dir: metadata.is_dir(),
            last_modified: metadata.modified().ok(),
            declared_type: None,
        })
    }
}

impl FileTree for LocalTree {
    type Handle = PathBuf;

    fn list_children(&self, dir: &PathBuf) -> io::Result<Vec<Entry<PathBuf>>> {
        let mut children = Vec::new();
        for dir_entry in fs::read_dir(dir)? {
            let path = dir_entry?.path();
            match Self::entry(&path) {
                Ok(entry) => children.push(entry),
                Err(err) => debug!("Skipping unreadable entry {:?}: {}", path, err),
            }
        }
        Ok(children)
    }

    fn open(&self, entry: &PathBuf) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(fs::File::open(entry)?))
    }

    fn open_for_overwrite(&self, entry: &PathBuf) -> io::Result<Box<dyn Write + '_>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(entry)?;
        Ok(Box::new(file))
    }

    fn create(
        &self,
        parent: &PathBuf,
        name: &str,
        _content_type: &str,
    ) -> Result<Entry<PathBuf>, EngineError> {
        let create_error = |reason: String| EngineError::Create {
            name: name.to_string(),
            reason,
        };

        if !is_usable_name(name) {
            return Err(create_error("name is not usable".to_string()));
        }

        let path = parent.join(name);
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| create_error(err.to_string()))?;

        Self::entry(&path).map_err(|err| create_error(err.to_string()))
    }

    fn rename(&self, entry: &PathBuf, new_name: &str) -> bool {
        let Some(parent) = entry.parent() else {
            return false;
        };
        if !is_usable_name(new_name) {
            return false;
        }

        // std::fs::rename replaces an existing destination on unix. A hit
        // on the entry itself is a case-only rename and is allowed.
        let parent = parent.to_path_buf();
        if let Some(existing) = self.find(&parent, new_name) {
            if existing.handle != *entry {
                return false;
            }
        }

        match fs::rename(entry, parent.join(new_name)) {
            Ok(()) => true,
            Err(err) => {
                debug!("Rename of {:?} to '{}' failed: {}", entry, new_name, err);
                false
            }
        }
    }

    fn delete(&self, entry: &PathBuf) -> bool {
        let result = if entry.is_dir() {
            fs::remove_dir(entry)
        } else {
            fs::remove_file(entry)
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                debug!("Delete of {:?} failed: {}", entry, err);
                false
            }
        }
    }

    /// Looks `name` up the way the filesystem resolves it, so on a
    /// case-insensitive volume `B.txt` finds an existing `b.txt`. The entry
    /// comes back under its stored name.
    fn find(&self, parent: &PathBuf, name: &str) -> Option<Entry<PathBuf>> {
        if !is_usable_name(name) {
            return None;
        }
        let path = parent.join(name);
        fs::symlink_metadata(&path).ok()?;

        let listed: Vec<PathBuf> = fs::read_dir(parent)
            .ok()?
            .flatten()
            .map(|dir_entry| dir_entry.path())
            .collect();
        let stored = listed
            .iter()
            .find(|candidate| candidate.file_name().and_then(|n| n.to_str()) == Some(name))
            .or_else(|| listed.iter().find(|candidate| same_file(candidate, &path)))?;

        Self::entry(stored).ok()
    }
}

/// Whether two paths name the same filesystem object.
#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::symlink_metadata(a), fs::symlink_metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
