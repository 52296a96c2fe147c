//! In-memory [`FileTree`] used by the unit tests to simulate storage
//! providers without a rename primitive, writes that fail midway, and
//! entries that refuse deletion.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::tree::{is_usable_name, Entry, FileTree};
use crate::EngineError;

pub type NodeId = u64;

struct Node {
    parent: Option<NodeId>,
    name: String,
    is_dir: bool,
    data: Vec<u8>,
    modified: Option<SystemTime>,
    declared_type: Option<String>,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<NodeId, Node>,
    next_id: NodeId,
    rename_unsupported: bool,
    failing_writes: HashSet<String>,
    undeletable: HashSet<String>,
}

pub struct MemoryTree {
    state: Mutex<State>,
}

impl MemoryTree {
    pub const ROOT: NodeId = 0;

    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(
            Self::ROOT,
            Node {
                parent: None,
                name: String::new(),
                is_dir: true,
                data: Vec::new(),
                modified: None,
                declared_type: None,
            },
        );
        state.next_id = 1;
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn insert(&self, parent: NodeId, name: &str, is_dir: bool, data: &[u8]) -> NodeId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                name: name.to_string(),
                is_dir,
                data: data.to_vec(),
                modified: None,
                declared_type: None,
            },
        );
        id
    }

    pub fn add_dir(&self, parent: NodeId, name: &str) -> NodeId {
        self.insert(parent, name, true, &[])
    }

    pub fn add_file(&self, parent: NodeId, name: &str, data: &[u8]) -> NodeId {
        self.insert(parent, name, false, data)
    }

    pub fn add_typed_file(&self, parent: NodeId, name: &str, data: &[u8], mime: &str) -> NodeId {
        let id = self.add_file(parent, name, data);
        if let Some(node) = self.lock().nodes.get_mut(&id) {
            node.declared_type = Some(mime.to_string());
        }
        id
    }

    pub fn set_modified(&self, id: NodeId, secs: u64) {
        if let Some(node) = self.lock().nodes.get_mut(&id) {
            node.modified = Some(UNIX_EPOCH + Duration::from_secs(secs));
        }
    }

    pub fn disable_rename(&self) {
        self.lock().rename_unsupported = true;
    }

    /// Writes to an entry with this name accept a few bytes, then fail.
    pub fn fail_writes_to(&self, name: &str) {
        self.lock().failing_writes.insert(name.to_string());
    }

    pub fn protect(&self, name: &str) {
        self.lock().undeletable.insert(name.to_string());
    }

    /// Sorted names of the children of `parent`.
    pub fn names(&self, parent: NodeId) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state
            .nodes
            .values()
            .filter(|node| node.parent == Some(parent))
            .map(|node| node.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn read(&self, parent: NodeId, name: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        state
            .nodes
            .values()
            .find(|node| node.parent == Some(parent) && node.name == name)
            .map(|node| node.data.clone())
    }

    pub fn content_type(&self, parent: NodeId, name: &str) -> Option<String> {
        let state = self.lock();
        state
            .nodes
            .values()
            .find(|node| node.parent == Some(parent) && node.name == name)
            .and_then(|node| node.declared_type.clone())
    }

    fn snapshot(id: NodeId, node: &Node) -> Entry<NodeId> {
        Entry {
            handle: id,
            name: node.name.clone(),
            is_dir: node.is_dir,
            last_modified: node.modified,
            declared_type: node.declared_type.clone(),
        }
    }
}

struct MemoryWriter<'a> {
    tree: &'a MemoryTree,
    id: NodeId,
    failing: bool,
    written: usize,
}

impl Write for MemoryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing && self.written > 0 {
            return Err(io::Error::other("simulated write failure"));
        }
        let accepted = if self.failing { buf.len().min(3) } else { buf.len() };
        let mut state = self.tree.lock();
        let node = state
            .nodes
            .get_mut(&self.id)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        node.data.extend_from_slice(&buf[..accepted]);
        self.written += accepted;
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileTree for MemoryTree {
    type Handle = NodeId;

    fn list_children(&self, dir: &NodeId) -> io::Result<Vec<Entry<NodeId>>> {
        let state = self.lock();
        match state.nodes.get(dir) {
            Some(node) if node.is_dir => {}
            _ => return Err(io::Error::from(io::ErrorKind::NotFound)),
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(_, node)| node.parent == Some(*dir))
            .map(|(id, node)| Self::snapshot(*id, node))
            .collect())
    }

    fn open(&self, entry: &NodeId) -> io::Result<Box<dyn Read + '_>> {
        let state = self.lock();
        let node = state
            .nodes
            .get(entry)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok(Box::new(Cursor::new(node.data.clone())))
    }

    fn open_for_overwrite(&self, entry: &NodeId) -> io::Result<Box<dyn Write + '_>> {
        let mut state = self.lock();
        let failing = {
            let node = state
                .nodes
                .get(entry)
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
            state.failing_writes.contains(&node.name)
        };
        if let Some(node) = state.nodes.get_mut(entry) {
            node.data.clear();
        }
        Ok(Box::new(MemoryWriter {
            tree: self,
            id: *entry,
            failing,
            written: 0,
        }))
    }

    fn create(
        &self,
        parent: &NodeId,
        name: &str,
        content_type: &str,
    ) -> Result<Entry<NodeId>, EngineError> {
        if !is_usable_name(name) || self.find(parent, name).is_some() {
            return Err(EngineError::Create {
                name: name.to_string(),
                reason: "name is not available".to_string(),
            });
        }
        let id = self.add_typed_file(*parent, name, &[], content_type);
        let state = self.lock();
        Ok(Self::snapshot(id, &state.nodes[&id]))
    }

    fn rename(&self, entry: &NodeId, new_name: &str) -> bool {
        if self.lock().rename_unsupported || !is_usable_name(new_name) {
            return false;
        }
        let parent = match self.lock().nodes.get(entry) {
            Some(node) => node.parent,
            None => return false,
        };
        if let Some(parent) = parent {
            if let Some(existing) = self.find(&parent, new_name) {
                if existing.handle != *entry {
                    return false;
                }
            }
        }
        if let Some(node) = self.lock().nodes.get_mut(entry) {
            node.name = new_name.to_string();
        }
        true
    }

    fn delete(&self, entry: &NodeId) -> bool {
        let mut state = self.lock();
        let Some(node) = state.nodes.get(entry) else {
            return false;
        };
        if state.undeletable.contains(&node.name) {
            return false;
        }
        state.nodes.remove(entry);
        true
    }

    fn find(&self, parent: &NodeId, name: &str) -> Option<Entry<NodeId>> {
        let state = self.lock();
        state
            .nodes
            .iter()
            .find(|(_, node)| node.parent == Some(*parent) && node.name == name)
            .map(|(id, node)| Self::snapshot(*id, node))
    }
}
