mod cli;
mod diff;

use anyhow::Result;
use batchren_core::{CollisionStrategy, Flags};
use cli::{Cli, CommonArgs, Commands};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    setup_logging(&cli)?;

    info!("Starting batchren");

    match cli.command {
        Commands::Rename {
            pattern,
            template,
            common,
            preserve_extension,
            collision,
        } => {
            handle_rename_command(pattern, template, common, preserve_extension, collision)?;
        }
        Commands::Replace {
            pattern,
            replacement,
            common,
            whole_word,
            line_numbers,
            preview_limit,
        } => {
            handle_replace_command(pattern, replacement, common, whole_word, line_numbers, preview_limit)?;
        }
    }

    info!("Batchren completed successfully");
    Ok(())
}

fn target_dir(target: Option<PathBuf>) -> Result<PathBuf> {
    match target {
        Some(target) => Ok(target),
        None => Ok(std::env::current_dir()?),
    }
}

fn handle_rename_command(
    pattern: String,
    template: String,
    common: CommonArgs,
    preserve_extension: bool,
    collision: Option<CollisionStrategy>,
) -> Result<()> {
    let target_dir = target_dir(common.target.clone())?;
    let flags = common.flags(Flags {
        preserve_extension,
        collision,
        ..Flags::default()
    })?;

    info!("Rename: '{}' -> '{}'", pattern, template);
    info!("Target directory: {:?}", target_dir);
    info!("Collision strategy: {}", flags.collision());

    if flags.dry_run {
        warn!("Dry run mode - no changes will be made");
    }

    let report = batchren_core::rename_directory(&target_dir, &pattern, &template, &flags, |candidates| {
        print!("{}", diff::render_candidates(&target_dir, candidates)?);
        if common.yes {
            return Ok(true);
        }
        let conflicts = candidates.iter().filter(|c| c.conflict).count();
        if conflicts > 0 {
            println!("{} of {} renames conflict (collision: {})", conflicts, candidates.len(), flags.collision());
        }
        diff::confirm(&format!("Rename {} files?", candidates.len()))
    })?;

    if report.candidates.is_empty() {
        println!("No candidates found");
        return Ok(());
    }
    if flags.dry_run {
        print!("{}", diff::render_candidates(&target_dir, &report.candidates)?);
        println!("Dry run: {} renames, {} conflicts", report.candidates.len(), report.conflicts());
        return Ok(());
    }

    match report.result {
        Some(result) => {
            println!("Rename complete!");
            println!("  Applied: {}", result.applied);
            println!("  Skipped: {}", result.skipped);
            println!("  Failed: {}", result.failed);
            if result.cancelled {
                println!("  (cancelled before finishing)");
            }
        }
        None => println!("No changes made"),
    }

    Ok(())
}

fn handle_replace_command(
    pattern: String,
    replacement: String,
    common: CommonArgs,
    whole_word: bool,
    line_numbers: bool,
    preview_limit: usize,
) -> Result<()> {
    let target_dir = target_dir(common.target.clone())?;
    let flags = common.flags(Flags {
        whole_word,
        line_numbers,
        ..Flags::default()
    })?;

    info!("Replace: '{}' -> '{}'", pattern, replacement);
    info!("Target directory: {:?}", target_dir);

    if flags.dry_run {
        warn!("Dry run mode - no changes will be made");
    }

    let show_previews = |previews: &[batchren_core::FilePreview<PathBuf>]| -> Result<()> {
        for preview in previews {
            print!("{}", diff::render_preview(&target_dir, preview, flags.line_numbers)?);
        }
        Ok(())
    };

    let report = batchren_core::replace_directory(
        &target_dir,
        &pattern,
        &replacement,
        &flags,
        preview_limit,
        |previews| {
            show_previews(previews)?;
            if common.yes {
                return Ok(true);
            }
            diff::confirm(&format!("Apply replacements to {} files?", previews.len()))
        },
    )?;

    if report.previews.is_empty() {
        println!("No candidates found");
        return Ok(());
    }
    if flags.dry_run {
        show_previews(&report.previews)?;
        let matches: usize = report.previews.iter().map(|p| p.match_count).sum();
        println!("Dry run: {} files, {} matches", report.previews.len(), matches);
        return Ok(());
    }

    match report.summary {
        Some(summary) => {
            println!("Replace complete!");
            println!("  Files changed: {}", summary.files_modified);
            println!("  Replacements: {}", summary.total_matches);
            println!("  Skipped: {}", summary.skipped);
            println!("  Failed: {}", summary.failed);
            if summary.cancelled {
                println!("  (cancelled before finishing)");
            }
        }
        None => println!("No changes made"),
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .with(filter)
        .init();

    Ok(())
}
