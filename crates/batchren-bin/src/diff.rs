use anyhow::Result;
use batchren_core::{FilePreview, PreviewLine, RenameCandidate};
use inquire::Confirm;
use similar::{ChangeTag, TextDiff};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

fn display_dir(parent: &Path, root: &Path) -> String {
    match parent.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => String::new(),
        Ok(relative) => format!("{}/", relative.display()),
        Err(_) => format!("{}/", parent.display()),
    }
}

pub fn render_candidates(root: &Path, candidates: &[RenameCandidate<PathBuf>]) -> Result<String> {
    let mut output = String::new();
    for candidate in candidates {
        let dir = display_dir(&candidate.parent, root);
        write!(
            output,
            "  {RED}- {dir}{}{RESET}\n  {GREEN}+ {dir}{}{RESET}",
            candidate.original_name, candidate.computed_name
        )?;
        if candidate.conflict {
            write!(output, "  {YELLOW}(conflict){RESET}")?;
        }
        writeln!(output)?;
    }
    Ok(output)
}

/// One preview line with the changed words highlighted.
pub fn render_line(line: &PreviewLine, line_numbers: bool) -> Result<String> {
    let gutter = if line_numbers {
        format!("{:>5} ", line.line_number)
    } else {
        String::new()
    };

    let diff = TextDiff::from_words(&line.original, &line.replaced);
    let mut old = String::new();
    let mut new = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => write!(old, "{RED}{}{RESET}", change.value())?,
            ChangeTag::Insert => write!(new, "{GREEN}{}{RESET}", change.value())?,
            ChangeTag::Equal => {
                old.push_str(change.value());
                new.push_str(change.value());
            }
        }
    }

    let mut output = String::new();
    writeln!(output, "  {gutter}- {old}")?;
    writeln!(output, "  {gutter}+ {new}")?;
    Ok(output)
}

pub fn render_preview(root: &Path, preview: &FilePreview<PathBuf>, line_numbers: bool) -> Result<String> {
    let mut output = String::new();
    let location = preview
        .entry
        .strip_prefix(root)
        .unwrap_or(&preview.entry)
        .display()
        .to_string();
    writeln!(
        output,
        "\n📝 {} ({} matches, {} lines shown)",
        location,
        preview.match_count,
        preview.lines.len()
    )?;

    for (i, line) in preview.lines.iter().enumerate() {
        if i > 0 {
            writeln!(output, "  {:-^1$}", "", 40)?;
        }
        output.push_str(&render_line(line, line_numbers)?);
    }
    Ok(output)
}

pub fn confirm(prompt: &str) -> Result<bool> {
    let apply_change = Confirm::new(prompt).with_default(true).prompt()?;
    Ok(apply_change)
}
