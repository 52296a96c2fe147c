use std::collections::HashMap;

use tracing::debug;

use crate::scanner::RenameCandidate;
use crate::tree::FileTree;

/// Flags candidates whose target name is taken by another sibling, or is
/// shared with another candidate in the same directory. Returns how many
/// candidates conflict.
///
/// The flags reflect the tree at the time of the call; rerun after the
/// candidate set or the directories change.
pub fn annotate<T: FileTree>(tree: &T, candidates: &mut [RenameCandidate<T::Handle>]) -> usize {
    let mut targets: HashMap<(T::Handle, String), usize> = HashMap::with_capacity(candidates.len());
    for candidate in candidates.iter() {
        *targets
            .entry((candidate.parent.clone(), candidate.computed_name.clone()))
            .or_insert(0) += 1;
    }

    let mut conflicts = 0;
    for candidate in candidates.iter_mut() {
        let key = (candidate.parent.clone(), candidate.computed_name.clone());
        let internal = targets.get(&key).copied().unwrap_or(0) > 1;
        let external = tree
            .find(&candidate.parent, &candidate.computed_name)
            .is_some_and(|existing| existing.handle != candidate.entry);

        candidate.conflict = internal || external;
        if candidate.conflict {
            debug!(
                "Conflict for '{}' -> '{}' (existing: {}, shared: {})",
                candidate.original_name, candidate.computed_name, external, internal
            );
            conflicts += 1;
        }
    }
    conflicts
}
