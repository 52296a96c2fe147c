use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::mime::content_type_for;
use crate::scanner::{split_extension, RenameCandidate};
use crate::session::CancelToken;
use crate::tree::FileTree;
use crate::EngineError;

const MAX_SUFFIX_ATTEMPTS: u32 = 10_000;

/// What to do when a destination name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionStrategy {
    Skip,
    Overwrite,
    /// Append `_1`, `_2`, ... before the extension until the name is free.
    #[default]
    Rename,
}

impl FromStr for CollisionStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(CollisionStrategy::Skip),
            "overwrite" => Ok(CollisionStrategy::Overwrite),
            "rename" => Ok(CollisionStrategy::Rename),
            _ => Err(EngineError::InvalidFlag {
                token: format!("--collision={s}"),
            }),
        }
    }
}

impl fmt::Display for CollisionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CollisionStrategy::Skip => "skip",
            CollisionStrategy::Overwrite => "overwrite",
            CollisionStrategy::Rename => "rename",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyResult {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the run stopped early; candidates after that point are in
    /// none of the counts.
    pub cancelled: bool,
}

enum Outcome {
    Applied,
    Skipped,
}

/// Renames every candidate in order. Failures are counted and logged, never
/// propagated, so one bad entry does not stop the batch.
pub fn apply_renames<T: FileTree>(
    tree: &T,
    candidates: &[RenameCandidate<T::Handle>],
    strategy: CollisionStrategy,
    cancel: &CancelToken,
) -> ApplyResult {
    info!("Applying {} renames (collision: {})", candidates.len(), strategy);
    let mut result = ApplyResult::default();

    for candidate in candidates {
        if cancel.is_cancelled() {
            warn!("Rename cancelled, {} candidates left untouched", candidates.len() - result.applied - result.skipped - result.failed);
            result.cancelled = true;
            break;
        }

        match apply_one(tree, candidate, strategy) {
            Ok(Outcome::Applied) => result.applied += 1,
            Ok(Outcome::Skipped) => {
                info!("Skipping '{}': '{}' is taken", candidate.original_name, candidate.computed_name);
                result.skipped += 1;
            }
            Err(err) => {
                warn!("Failed to rename '{}': {}", candidate.original_name, err);
                result.failed += 1;
            }
        }
    }

    info!(
        "Rename complete: {} applied, {} skipped, {} failed",
        result.applied, result.skipped, result.failed
    );
    result
}

fn apply_one<T: FileTree>(
    tree: &T,
    candidate: &RenameCandidate<T::Handle>,
    strategy: CollisionStrategy,
) -> Result<Outcome, EngineError> {
    let occupant = tree
        .find(&candidate.parent, &candidate.computed_name)
        .filter(|existing| existing.handle != candidate.entry);

    let destination = match strategy {
        CollisionStrategy::Skip => {
            if candidate.conflict || occupant.is_some() {
                return Ok(Outcome::Skipped);
            }
            candidate.computed_name.clone()
        }
        CollisionStrategy::Overwrite => {
            if let Some(existing) = occupant {
                // A failed delete surfaces as a failed rename or create below.
                if !tree.delete(&existing.handle) {
                    warn!("Could not delete existing '{}'", existing.name);
                }
            }
            candidate.computed_name.clone()
        }
        CollisionStrategy::Rename => match occupant {
            Some(_) => unique_name(tree, candidate)?,
            None => candidate.computed_name.clone(),
        },
    };

    if tree.rename(&candidate.entry, &destination) {
        info!("Renamed '{}' -> '{}'", candidate.original_name, destination);
        return Ok(Outcome::Applied);
    }

    debug!("Rename primitive failed for '{}', copying instead", candidate.original_name);
    copy_then_delete(tree, candidate, &destination)?;
    info!("Copied '{}' -> '{}'", candidate.original_name, destination);
    Ok(Outcome::Applied)
}

/// First free `stem_N.ext` for the candidate's target name.
fn unique_name<T: FileTree>(tree: &T, candidate: &RenameCandidate<T::Handle>) -> Result<String, EngineError> {
    let (stem, extension) = split_extension(&candidate.computed_name);

    (1..=MAX_SUFFIX_ATTEMPTS)
        .map(|attempt| format!("{stem}_{attempt}{extension}"))
        .find(|name| match tree.find(&candidate.parent, name) {
            None => true,
            Some(existing) => existing.handle == candidate.entry,
        })
        .ok_or_else(|| EngineError::Create {
            name: candidate.computed_name.clone(),
            reason: "no free suffixed name".to_string(),
        })
}

/// Creates `destination`, copies the source into it, and only then deletes
/// the source. On a failed copy the partial destination is removed and the
/// source is left as it was.
fn copy_then_delete<T: FileTree>(
    tree: &T,
    candidate: &RenameCandidate<T::Handle>,
    destination: &str,
) -> Result<(), EngineError> {
    let source_type = tree
        .find(&candidate.parent, &candidate.original_name)
        .filter(|source| source.handle == candidate.entry)
        .and_then(|source| source.declared_type);
    let content_type = content_type_for(destination, source_type.as_deref());

    let created = tree.create(&candidate.parent, destination, &content_type)?;

    if let Err(source) = copy_bytes(tree, &candidate.entry, &created.handle) {
        if !tree.delete(&created.handle) {
            warn!("Could not remove partial copy '{}'", created.name);
        }
        return Err(EngineError::Write {
            name: created.name,
            source,
        });
    }

    if !tree.delete(&candidate.entry) {
        warn!(
            "Copied to '{}' but could not delete original '{}'; both kept",
            created.name, candidate.original_name
        );
        return Err(EngineError::Delete {
            name: candidate.original_name.clone(),
        });
    }
    Ok(())
}

fn copy_bytes<T: FileTree>(tree: &T, from: &T::Handle, to: &T::Handle) -> io::Result<()> {
    let mut reader = tree.open(from)?;
    let mut writer = tree.open_for_overwrite(to)?;
    io::copy(&mut reader, &mut writer)?;
    writer.flush()
}
