//! Engine state that outlives a single call: cancellation and the guard
//! allowing one active operation per root.
//!
//! A cancel request lasts until the operations it interrupted have
//! finished. Once no root is active the token is cleared again, so the
//! engine stays usable for the next run.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::apply::{self, ApplyResult, CollisionStrategy};
use crate::conflict;
use crate::replace::{self, FilePreview, ReplaceRequest, ReplaceSummary};
use crate::scanner::{self, RenameCandidate, RenameRequest};
use crate::tree::FileTree;
use crate::EngineError;

/// Cooperative cancellation, checked between entries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
struct ActiveRoots<H> {
    roots: Arc<Mutex<HashSet<H>>>,
    cancel: CancelToken,
}

impl<H: Clone + Eq + Hash + std::fmt::Debug> ActiveRoots<H> {
    fn new(cancel: CancelToken) -> Self {
        Self {
            roots: Arc::new(Mutex::new(HashSet::new())),
            cancel,
        }
    }

    fn lock(roots: &Mutex<HashSet<H>>) -> MutexGuard<'_, HashSet<H>> {
        roots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, root: &H) -> Result<RootLease<H>, EngineError> {
        if !Self::lock(&self.roots).insert(root.clone()) {
            return Err(EngineError::Busy {
                root: format!("{root:?}"),
            });
        }
        debug!("Acquired {:?}", root);
        Ok(RootLease {
            roots: Arc::clone(&self.roots),
            root: root.clone(),
            cancel: self.cancel.clone(),
        })
    }
}

/// Held for the duration of one operation; releases the root on drop and
/// clears a pending cancel once the last active root is released.
struct RootLease<H: Clone + Eq + Hash + std::fmt::Debug> {
    roots: Arc<Mutex<HashSet<H>>>,
    root: H,
    cancel: CancelToken,
}

impl<H: Clone + Eq + Hash + std::fmt::Debug> Drop for RootLease<H> {
    fn drop(&mut self) {
        let mut roots = ActiveRoots::lock(&self.roots);
        roots.remove(&self.root);
        if roots.is_empty() && self.cancel.is_cancelled() {
            self.cancel.reset();
            debug!("Cleared cancellation");
        }
        debug!("Released {:?}", self.root);
    }
}

/// Runs scans and applies against one [`FileTree`].
///
/// At most one operation may run per root at a time; a second caller gets
/// [`EngineError::Busy`] instead of waiting. Sequence counters and
/// candidate lists belong to the call that made them.
#[derive(Debug)]
pub struct Engine<T: FileTree> {
    tree: T,
    active: ActiveRoots<T::Handle>,
    cancel: CancelToken,
}

impl<T: FileTree> Engine<T> {
    pub fn new(tree: T) -> Self {
        let cancel = CancelToken::new();
        Self {
            tree,
            active: ActiveRoots::new(cancel.clone()),
            cancel,
        }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    /// A handle that cancels the operations this engine is running, or the
    /// next one it starts if it is idle.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Scans `root` and flags conflicting candidates.
    pub fn scan_renames(
        &self,
        root: &T::Handle,
        request: &RenameRequest,
    ) -> Result<Vec<RenameCandidate<T::Handle>>, EngineError> {
        let _lease = self.active.acquire(root)?;
        let mut candidates = scanner::scan(&self.tree, root, request, &self.cancel)?;
        let conflicts = conflict::annotate(&self.tree, &mut candidates);
        debug!("{} of {} candidates conflict", conflicts, candidates.len());
        Ok(candidates)
    }

    pub fn apply_renames(
        &self,
        root: &T::Handle,
        candidates: &[RenameCandidate<T::Handle>],
        strategy: CollisionStrategy,
    ) -> Result<ApplyResult, EngineError> {
        let _lease = self.active.acquire(root)?;
        Ok(apply::apply_renames(&self.tree, candidates, strategy, &self.cancel))
    }

    pub fn scan_replacements(
        &self,
        root: &T::Handle,
        request: &ReplaceRequest,
    ) -> Result<Vec<FilePreview<T::Handle>>, EngineError> {
        let _lease = self.active.acquire(root)?;
        replace::scan_replacements(&self.tree, root, request, &self.cancel)
    }

    pub fn apply_replacements(
        &self,
        root: &T::Handle,
        previews: &[FilePreview<T::Handle>],
        request: &ReplaceRequest,
    ) -> Result<ReplaceSummary, EngineError> {
        let _lease = self.active.acquire(root)?;
        Ok(replace::apply_replacements(&self.tree, previews, request, &self.cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Pattern, PatternMode};
    use crate::template::RenameTemplate;
    use crate::testing::MemoryTree;

    fn request(pattern: &str, template: &str) -> RenameRequest {
        RenameRequest::new(
            Pattern::compile(pattern, PatternMode::Substring, false).unwrap(),
            RenameTemplate::parse(template),
        )
    }

    #[test]
    fn test_scan_then_apply() {
        let tree = MemoryTree::new();
        tree.add_file(MemoryTree::ROOT, "draft_a.txt", b"");
        tree.add_file(MemoryTree::ROOT, "draft_b.txt", b"");
        let engine = Engine::new(tree);

        let candidates = engine
            .scan_renames(&MemoryTree::ROOT, &request("draft", "final_{n}").preserve_extension(true))
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| !c.conflict));

        let result = engine
            .apply_renames(&MemoryTree::ROOT, &candidates, CollisionStrategy::Rename)
            .unwrap();
        assert_eq!(result.applied, 2);
        assert_eq!(engine.tree().names(MemoryTree::ROOT), vec!["final_1.txt", "final_2.txt"]);
    }

    #[test]
    fn test_second_operation_on_same_root_is_busy() {
        let tree = MemoryTree::new();
        let other = tree.add_dir(MemoryTree::ROOT, "other");
        tree.add_file(other, "draft.txt", b"");
        let engine = Engine::new(tree);

        let lease = engine.active.acquire(&MemoryTree::ROOT).unwrap();
        let err = engine
            .scan_renames(&MemoryTree::ROOT, &request("draft", "final"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy { .. }));

        // A different root is independent.
        assert_eq!(engine.scan_renames(&other, &request("draft", "final")).unwrap().len(), 1);

        drop(lease);
        assert!(engine.scan_renames(&MemoryTree::ROOT, &request("draft", "final")).is_ok());
    }

    #[test]
    fn test_lease_released_after_error() {
        let tree = MemoryTree::new();
        tree.add_file(MemoryTree::ROOT, "draft.txt", b"");
        let engine = Engine::new(tree);

        engine.cancel_token().cancel();
        let err = engine
            .scan_renames(&MemoryTree::ROOT, &request("draft", "final"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(engine.active.acquire(&MemoryTree::ROOT).is_ok());
    }

    #[test]
    fn test_cancelled_apply_reports_partial_progress() {
        let tree = MemoryTree::new();
        tree.add_file(MemoryTree::ROOT, "draft.txt", b"");
        let engine = Engine::new(tree);

        let candidates = engine
            .scan_renames(&MemoryTree::ROOT, &request("draft", "final"))
            .unwrap();
        engine.cancel_token().cancel();
        let result = engine
            .apply_renames(&MemoryTree::ROOT, &candidates, CollisionStrategy::Rename)
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.applied, 0);
        assert_eq!(engine.tree().names(MemoryTree::ROOT), vec!["draft.txt"]);
        assert!(!engine.cancel_token().is_cancelled());
    }

    #[test]
    fn test_cancel_stops_only_one_run() {
        let tree = MemoryTree::new();
        tree.add_file(MemoryTree::ROOT, "draft.txt", b"");
        let engine = Engine::new(tree);
        let token = engine.cancel_token();

        token.cancel();
        let err = engine
            .scan_renames(&MemoryTree::ROOT, &request("draft", "final"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));

        let candidates = engine
            .scan_renames(&MemoryTree::ROOT, &request("draft", "final"))
            .unwrap();
        let result = engine
            .apply_renames(&MemoryTree::ROOT, &candidates, CollisionStrategy::Rename)
            .unwrap();
        assert!(!result.cancelled);
        assert_eq!(engine.tree().names(MemoryTree::ROOT), vec!["final"]);
    }

    #[test]
    fn test_cancel_kept_while_another_root_is_active() {
        let tree = MemoryTree::new();
        let other = tree.add_dir(MemoryTree::ROOT, "other");
        tree.add_file(other, "draft.txt", b"");
        let engine = Engine::new(tree);

        let lease = engine.active.acquire(&MemoryTree::ROOT).unwrap();
        engine.cancel_token().cancel();
        assert!(engine.scan_renames(&other, &request("draft", "final")).is_err());
        assert!(engine.cancel_token().is_cancelled());

        drop(lease);
        assert!(!engine.cancel_token().is_cancelled());
    }
}
