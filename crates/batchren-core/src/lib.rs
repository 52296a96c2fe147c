use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

pub mod apply;
pub mod classify;
pub mod conflict;
pub mod flags;
pub mod mime;
pub mod pattern;
pub mod replace;
pub mod scanner;
pub mod session;
pub mod template;
pub mod tree;

#[cfg(test)]
mod testing;

pub use apply::{ApplyResult, CollisionStrategy};
pub use flags::Flags;
pub use pattern::{ContentMatcher, Pattern, PatternMode};
pub use replace::{FilePreview, PreviewLine, ReplaceRequest, ReplaceSummary};
pub use scanner::{RenameCandidate, RenameRequest, ScanOrder};
pub use session::{CancelToken, Engine};
pub use template::{RenameTemplate, Sequence};
pub use tree::{Entry, FileTree, LocalTree};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Search pattern cannot be empty")]
    EmptyPattern,
    #[error("Unrecognized flag: {token}")]
    InvalidFlag { token: String },
    #[error("Cannot create '{name}': {reason}")]
    Create { name: String, reason: String },
    #[error("Cannot read '{name}': {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Cannot write '{name}': {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Cannot delete '{name}'")]
    Delete { name: String },
    #[error("Another operation is already running on {root}")]
    Busy { root: String },
    #[error("Operation cancelled")]
    Cancelled,
}

/// What a directory-level rename found and, unless it stopped at the
/// preview, what it did.
#[derive(Debug)]
pub struct RenameReport {
    pub candidates: Vec<RenameCandidate<PathBuf>>,
    pub result: Option<ApplyResult>,
}

impl RenameReport {
    pub fn conflicts(&self) -> usize {
        self.candidates.iter().filter(|c| c.conflict).count()
    }
}

#[derive(Debug)]
pub struct ReplaceReport {
    pub previews: Vec<FilePreview<PathBuf>>,
    pub summary: Option<ReplaceSummary>,
}

fn check_target(target: &Path) -> Result<PathBuf> {
    if !target.exists() {
        anyhow::bail!("Target directory does not exist: {:?}", target);
    }
    if !target.is_dir() {
        anyhow::bail!("Target must be a directory: {:?}", target);
    }
    Ok(target.to_path_buf())
}

/// Renames matching files under `target`.
///
/// `confirm` sees the annotated candidates and decides whether to go
/// ahead; it is not called for a dry run or when nothing matched.
pub fn rename_directory<F>(
    target: &Path,
    pattern: &str,
    template: &str,
    flags: &Flags,
    confirm: F,
) -> Result<RenameReport>
where
    F: FnOnce(&[RenameCandidate<PathBuf>]) -> Result<bool>,
{
    let root = check_target(target)?;
    let pattern = Pattern::compile(pattern, flags.mode(pattern), flags.ignore_case)?;
    let request = RenameRequest::new(pattern, RenameTemplate::parse(template))
        .recursive(flags.recursive)
        .preserve_extension(flags.preserve_extension);

    info!("Starting rename in: {:?}", root);
    let engine = Engine::new(LocalTree);
    let candidates = engine.scan_renames(&root, &request)?;

    let mut report = RenameReport {
        candidates,
        result: None,
    };
    if report.candidates.is_empty() {
        info!("No candidates found");
        return Ok(report);
    }

    if flags.dry_run {
        for candidate in &report.candidates {
            info!(
                "Would rename: {} -> {}",
                candidate.original_name, candidate.computed_name
            );
        }
        warn!("Dry run mode - no changes were made");
        return Ok(report);
    }

    if !confirm(&report.candidates)? {
        info!("Rename declined");
        return Ok(report);
    }

    report.result = Some(engine.apply_renames(&root, &report.candidates, flags.collision())?);
    Ok(report)
}

/// Replaces matching text inside the files under `target`. `confirm`
/// behaves as in [`rename_directory`].
pub fn replace_directory<F>(
    target: &Path,
    pattern: &str,
    replacement: &str,
    flags: &Flags,
    preview_limit: usize,
    confirm: F,
) -> Result<ReplaceReport>
where
    F: FnOnce(&[FilePreview<PathBuf>]) -> Result<bool>,
{
    let root = check_target(target)?;
    let matcher = ContentMatcher::compile(
        pattern,
        flags.mode(pattern),
        flags.ignore_case,
        flags.whole_word,
    )?;
    let request = ReplaceRequest::new(matcher, replacement)
        .recursive(flags.recursive)
        .preview_limit(preview_limit);

    info!("Starting replace in: {:?}", root);
    let engine = Engine::new(LocalTree);
    let previews = engine.scan_replacements(&root, &request)?;

    let mut report = ReplaceReport {
        previews,
        summary: None,
    };
    if report.previews.is_empty() {
        info!("No candidates found");
        return Ok(report);
    }
    if flags.dry_run {
        warn!("Dry run mode - no changes were made");
        return Ok(report);
    }
    if !confirm(&report.previews)? {
        info!("Replace declined");
        return Ok(report);
    }

    report.summary = Some(engine.apply_replacements(&root, &report.previews, &request)?);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sorted_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_rename_directory_applies_after_confirmation() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("IMG_001.jpg"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"b").unwrap();

        let report = rename_directory(dir.path(), "IMG_*", "holiday", &"-x".parse::<Flags>().unwrap(), |candidates| {
            assert_eq!(candidates.len(), 1);
            Ok(true)
        })
        .unwrap();

        assert_eq!(report.result.unwrap().applied, 1);
        assert_eq!(sorted_names(dir.path()), vec!["holiday.jpg", "notes.txt"]);
    }

    #[test]
    fn test_rename_directory_dry_run_changes_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("draft.txt"), b"").unwrap();

        let report = rename_directory(dir.path(), "draft", "final", &"--dry-run -x".parse::<Flags>().unwrap(), |_| {
            panic!("dry run must not ask for confirmation")
        })
        .unwrap();

        assert_eq!(report.candidates.len(), 1);
        assert!(report.result.is_none());
        assert_eq!(sorted_names(dir.path()), vec!["draft.txt"]);
    }

    #[test]
    fn test_rename_directory_declined() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("draft.txt"), b"").unwrap();

        let report = rename_directory(dir.path(), "draft", "final", &Flags::default(), |_| Ok(false)).unwrap();
        assert!(report.result.is_none());
        assert_eq!(sorted_names(dir.path()), vec!["draft.txt"]);
    }

    #[test]
    fn test_rename_directory_reports_conflicts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.tmp"), b"").unwrap();
        fs::write(dir.path().join("b.tmp"), b"").unwrap();

        let report = rename_directory(dir.path(), "*.tmp", "out.tmp", &"--collision=skip".parse::<Flags>().unwrap(), |_| Ok(true))
            .unwrap();
        assert_eq!(report.conflicts(), 2);
        assert_eq!(report.result.unwrap().skipped, 2);
        assert_eq!(sorted_names(dir.path()), vec!["a.tmp", "b.tmp"]);
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = rename_directory(&missing, "a", "b", &Flags::default(), |_| Ok(true)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let dir = tempdir().unwrap();
        let err = rename_directory(dir.path(), "a(b", "c", &"-e".parse::<Flags>().unwrap(), |_| Ok(true)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_replace_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("docs");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("a.txt"), "cat catalog\n").unwrap();
        fs::write(nested.join("b.md"), "the cat\n").unwrap();

        let report = replace_directory(dir.path(), "cat", "dog", &"-r -w".parse::<Flags>().unwrap(), 20, |previews| {
            assert_eq!(previews.len(), 2);
            Ok(true)
        })
        .unwrap();

        let summary = report.summary.unwrap();
        assert_eq!(summary.files_modified, 2);
        assert_eq!(summary.total_matches, 2);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "dog catalog\n");
        assert_eq!(fs::read_to_string(nested.join("b.md")).unwrap(), "the dog\n");
    }

    #[test]
    fn test_replace_directory_without_matches() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "nothing here").unwrap();

        let report = replace_directory(dir.path(), "cat", "dog", &Flags::default(), 20, |_| {
            panic!("nothing to confirm")
        })
        .unwrap();
        assert!(report.previews.is_empty());
        assert!(report.summary.is_none());
    }
}
