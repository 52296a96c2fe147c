use std::io::Write;

use tracing::{debug, info, warn};

use crate::classify::{classify, read_text, Classification};
use crate::pattern::ContentMatcher;
use crate::scanner::walk_files;
use crate::session::CancelToken;
use crate::template::expand_numbering;
use crate::tree::FileTree;
use crate::EngineError;

pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub matcher: ContentMatcher,
    pub template: String,
    pub recursive: bool,
    pub preview_limit: usize,
}

impl ReplaceRequest {
    pub fn new(matcher: ContentMatcher, template: &str) -> Self {
        Self {
            matcher,
            template: template.to_string(),
            recursive: false,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn preview_limit(mut self, limit: usize) -> Self {
        self.preview_limit = limit;
        self
    }

    /// The replacement text for the `sequence`-th matching file.
    fn replacement(&self, sequence: u64) -> String {
        expand_numbering(&self.template, sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLine {
    pub line_number: usize,
    pub original: String,
    pub replaced: String,
}

/// A file with at least one match and the first few changed lines.
#[derive(Debug, Clone)]
pub struct FilePreview<H> {
    pub entry: H,
    pub file_name: String,
    pub sequence: u64,
    pub match_count: usize,
    pub lines: Vec<PreviewLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceSummary {
    pub files_modified: usize,
    pub total_matches: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Finds text files with matches and previews the changes without writing.
/// Files that are not text, or cannot be read, are left out.
pub fn scan_replacements<T: FileTree>(
    tree: &T,
    root: &T::Handle,
    request: &ReplaceRequest,
    cancel: &CancelToken,
) -> Result<Vec<FilePreview<T::Handle>>, EngineError> {
    info!(
        "Scanning contents for '{}' (recursive: {})",
        request.matcher.regex().as_str(),
        request.recursive
    );

    let files = walk_files(tree, root, request.recursive, cancel)?;
    let mut previews = Vec::new();
    let mut sequence = 0;

    for file in files {
        cancel.check()?;

        let content = match classify(tree, &file.entry) {
            Ok(Classification::Text(content)) => content,
            Ok(Classification::Skip(reason)) => {
                debug!("Skipping '{}': {}", file.entry.name, reason);
                continue;
            }
            Err(err) => {
                warn!("Skipping '{}': {}", file.entry.name, err);
                continue;
            }
        };

        let match_count = request.matcher.count(&content.text);
        if match_count == 0 {
            continue;
        }
        sequence += 1;

        let replacement = request.replacement(sequence);
        let lines = preview_lines(&request.matcher, &content.text, &replacement, request.preview_limit);
        debug!("'{}': {} matches", file.entry.name, match_count);

        previews.push(FilePreview {
            entry: file.entry.handle,
            file_name: file.entry.name,
            sequence,
            match_count,
            lines,
        });
    }

    info!("Scan complete: {} files with matches", previews.len());
    Ok(previews)
}

/// Changed lines of `text`, at most `limit`, numbered from 1.
///
/// The matcher runs once over the whole text, as it does when the file is
/// written, and each line holding a match start is shown next to the line
/// of the replaced text where that match's replacement begins.
pub fn preview_lines(matcher: &ContentMatcher, text: &str, replacement: &str, limit: usize) -> Vec<PreviewLine> {
    let (replaced, offsets) = matcher.replace_all_with_offsets(text, replacement);
    let mut lines: Vec<PreviewLine> = Vec::new();
    let mut line_number = 1;
    let mut counted = 0;

    for (source, target) in offsets {
        line_number += text[counted..source].matches('\n').count();
        counted = source;
        if lines.last().is_some_and(|line| line.line_number == line_number) {
            continue;
        }
        if lines.len() == limit {
            break;
        }
        lines.push(PreviewLine {
            line_number,
            original: line_at(text, source).to_string(),
            replaced: line_at(&replaced, target).to_string(),
        });
    }
    lines
}

/// The `\n`-delimited line of `text` containing byte `offset`.
fn line_at(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map_or(0, |newline| newline + 1);
    let end = text[offset..].find('\n').map_or(text.len(), |newline| offset + newline);
    &text[start..end]
}

/// Re-reads each previewed file, replaces every match and writes the result
/// back over the same entry. Files that no longer match are skipped.
///
/// The write truncates in place; a failure partway through can leave the
/// file partially written.
pub fn apply_replacements<T: FileTree>(
    tree: &T,
    previews: &[FilePreview<T::Handle>],
    request: &ReplaceRequest,
    cancel: &CancelToken,
) -> ReplaceSummary {
    info!("Applying replacements to {} files", previews.len());
    let mut summary = ReplaceSummary::default();

    for preview in previews {
        if cancel.is_cancelled() {
            warn!("Replace cancelled");
            summary.cancelled = true;
            break;
        }

        match replace_one(tree, preview, request) {
            Ok(Some(count)) => {
                info!("Updated '{}' ({} replacements)", preview.file_name, count);
                summary.files_modified += 1;
                summary.total_matches += count;
            }
            Ok(None) => summary.skipped += 1,
            Err(err) => {
                warn!("Failed to update '{}': {}", preview.file_name, err);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Replace complete: {} files changed, {} replacements, {} skipped, {} failed",
        summary.files_modified, summary.total_matches, summary.skipped, summary.failed
    );
    summary
}

fn replace_one<T: FileTree>(
    tree: &T,
    preview: &FilePreview<T::Handle>,
    request: &ReplaceRequest,
) -> Result<Option<usize>, EngineError> {
    let content = match read_text(tree, &preview.entry, &preview.file_name)? {
        Classification::Text(content) => content,
        Classification::Skip(reason) => {
            debug!("Skipping '{}': {}", preview.file_name, reason);
            return Ok(None);
        }
    };

    let count = request.matcher.count(&content.text);
    if count == 0 {
        debug!("'{}' no longer matches", preview.file_name);
        return Ok(None);
    }

    let replaced = request
        .matcher
        .replace_all(&content.text, &request.replacement(preview.sequence));
    let write_error = |source| EngineError::Write {
        name: preview.file_name.clone(),
        source,
    };

    let bytes = content.encode(&replaced).ok_or_else(|| {
        write_error(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("replacement cannot be encoded as {}", content.encoding.name()),
        ))
    })?;

    let mut writer = tree.open_for_overwrite(&preview.entry).map_err(write_error)?;
    writer
        .write_all(&bytes)
        .and_then(|()| writer.flush())
        .map_err(write_error)?;

    Ok(Some(count))
}
