use std::time::UNIX_EPOCH;

use tracing::{debug, info, warn};

use crate::pattern::{Pattern, PatternMode};
use crate::session::CancelToken;
use crate::template::{expand, MatchGroups, RenameTemplate, Sequence};
use crate::tree::{Entry, FileTree};
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    /// Whatever order the tree lists entries in.
    #[default]
    Enumeration,
    /// Oldest first by last-modified time, newest first when reversed.
    /// Entries without a timestamp sort as the oldest.
    Modified { reverse: bool },
}

#[derive(Debug, Clone)]
pub struct RenameRequest {
    pub pattern: Pattern,
    pub template: RenameTemplate,
    pub recursive: bool,
    pub preserve_extension: bool,
    pub order: ScanOrder,
}

impl RenameRequest {
    /// Numbered templates order by age so `{n}` follows file history.
    pub fn new(pattern: Pattern, template: RenameTemplate) -> Self {
        let order = if template.is_numbered() || template.reverse {
            ScanOrder::Modified {
                reverse: template.reverse,
            }
        } else {
            ScanOrder::Enumeration
        };

        Self {
            pattern,
            template,
            recursive: false,
            preserve_extension: false,
            order,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn preserve_extension(mut self, preserve: bool) -> Self {
        self.preserve_extension = preserve;
        self
    }

    pub fn order(mut self, order: ScanOrder) -> Self {
        self.order = order;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCandidate<H> {
    pub original_name: String,
    pub entry: H,
    pub parent: H,
    pub computed_name: String,
    pub conflict: bool,
}

/// A file found by [`walk_files`] together with the directory holding it.
#[derive(Debug, Clone)]
pub struct FoundFile<H> {
    pub entry: Entry<H>,
    pub parent: H,
}

/// Collects the files under `root` in enumeration order, descending into
/// subdirectories only when `recursive`. A subdirectory that cannot be
/// listed is skipped; the root itself must be listable.
pub fn walk_files<T: FileTree>(
    tree: &T,
    root: &T::Handle,
    recursive: bool,
    cancel: &CancelToken,
) -> Result<Vec<FoundFile<T::Handle>>, EngineError> {
    let children = tree
        .list_children(root)
        .map_err(|source| EngineError::Read {
            name: format!("{root:?}"),
            source,
        })?;

    let mut found = Vec::new();
    collect(tree, root, children, recursive, cancel, &mut found)?;
    Ok(found)
}

fn collect<T: FileTree>(
    tree: &T,
    dir: &T::Handle,
    children: Vec<Entry<T::Handle>>,
    recursive: bool,
    cancel: &CancelToken,
    found: &mut Vec<FoundFile<T::Handle>>,
) -> Result<(), EngineError> {
    for child in children {
        cancel.check()?;

        if child.is_file() {
            found.push(FoundFile {
                entry: child,
                parent: dir.clone(),
            });
        } else if recursive {
            match tree.list_children(&child.handle) {
                Ok(grandchildren) => {
                    collect(tree, &child.handle, grandchildren, recursive, cancel, found)?
                }
                Err(err) => warn!("Skipping unreadable directory '{}': {}", child.name, err),
            }
        }
    }
    Ok(())
}

/// Proposes a new name for every matching file whose name would change.
/// Nothing is touched on the tree.
pub fn scan<T: FileTree>(
    tree: &T,
    root: &T::Handle,
    request: &RenameRequest,
    cancel: &CancelToken,
) -> Result<Vec<RenameCandidate<T::Handle>>, EngineError> {
    info!(
        "Scanning for '{}' -> '{}' (recursive: {})",
        request.pattern.as_str(),
        request.template.body,
        request.recursive
    );

    let mut files = walk_files(tree, root, request.recursive, cancel)?;
    if let ScanOrder::Modified { reverse } = request.order {
        files.sort_by_key(|file| file.entry.last_modified.unwrap_or(UNIX_EPOCH));
        if reverse {
            files.reverse();
        }
    }

    let mut sequence = Sequence::new();
    let mut candidates = Vec::new();

    for file in files {
        cancel.check()?;

        let name = &file.entry.name;
        let Some(computed) = compute_name(request, name, &mut sequence) else {
            continue;
        };
        if computed == *name {
            debug!("Name unchanged, skipping: {}", name);
            continue;
        }
        if computed.is_empty() {
            debug!("Template produced an empty name for {}, skipping", name);
            continue;
        }

        debug!("Rename candidate: '{}' -> '{}'", name, computed);
        candidates.push(RenameCandidate {
            original_name: name.clone(),
            entry: file.entry.handle,
            parent: file.parent,
            computed_name: computed,
            conflict: false,
        });
    }

    info!("Scan complete: {} rename candidates", candidates.len());
    Ok(candidates)
}

/// The sanitized target name for `name`, or `None` if the pattern does not
/// match. Every match advances `sequence`.
pub fn compute_name(request: &RenameRequest, name: &str, sequence: &mut Sequence) -> Option<String> {
    let (subject, extension) = if request.preserve_extension {
        split_extension(name)
    } else {
        (name, "")
    };

    if !request.pattern.is_match(subject) {
        return None;
    }
    let counter = sequence.advance();
    let template = &request.template;

    if template.is_extension_swap() && request.pattern.mode() != PatternMode::Regex {
        let (stem, _) = split_extension(name);
        return Some(sanitize_name(&format!("{stem}{}", template.body)));
    }

    let groups = request
        .pattern
        .capturing()
        .map(|regex| MatchGroups { regex, subject });
    let expanded = expand(&template.body, counter, groups);

    let new_name = if request.preserve_extension && !template.has_explicit_extension() {
        format!("{expanded}{extension}")
    } else {
        expanded
    };
    Some(sanitize_name(&new_name))
}

/// Splits at the last `.`, keeping the dot with the extension. A leading
/// or trailing dot does not start an extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => name.split_at(dot),
        _ => (name, ""),
    }
}

/// Replaces path separators and NUL so a name stays inside its directory.
pub fn sanitize_name(name: &str) -> String {
    name.replace(['/', '\\', '\0'], "_")
}
