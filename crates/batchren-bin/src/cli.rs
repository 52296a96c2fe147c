use batchren_core::{CollisionStrategy, Flags};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "batchren")]
#[command(version)]
#[command(about = "Batch rename files and replace text across a directory tree")]
#[command(long_about = "Matches file names or file contents against a substring, wildcard or regular expression pattern and rewrites them from a template. Changes are previewed, checked for collisions and confirmed before anything is touched.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Rename files whose names match a pattern")]
    Rename {
        #[arg(help = "Name pattern (substring, wildcard, or regex with -e); empty matches every file")]
        pattern: String,

        #[arg(help = "New name template; supports {n}, {n:W}, $numb, $1 back-references, 'rev:' and '.ext'")]
        template: String,

        #[command(flatten)]
        common: CommonArgs,

        #[arg(short = 'x', long, help = "Match and rename the base name only, keeping the extension")]
        preserve_extension: bool,

        #[arg(long, env = "BATCHREN_COLLISION", help = "What to do when a target name is taken")]
        collision: Option<CollisionStrategy>,
    },

    #[command(about = "Replace text inside files")]
    Replace {
        #[arg(help = "Text pattern (substring, wildcard, or regex with -e)")]
        pattern: String,

        #[arg(help = "Replacement text; supports {n}, {n:W} and $1 back-references")]
        replacement: String,

        #[command(flatten)]
        common: CommonArgs,

        #[arg(short, long, help = "Match whole words only")]
        whole_word: bool,

        #[arg(short = 'n', long, help = "Show line numbers in the preview")]
        line_numbers: bool,

        #[arg(long, env = "BATCHREN_PREVIEW_LIMIT", default_value_t = batchren_core::replace::DEFAULT_PREVIEW_LIMIT, help = "Preview lines shown per file")]
        preview_limit: usize,
    },
}

#[derive(Args)]
pub struct CommonArgs {
    #[arg(help = "Target directory (defaults to current directory)")]
    pub target: Option<PathBuf>,

    #[arg(short, long, help = "Descend into subdirectories")]
    pub recursive: bool,

    #[arg(short = 'i', long, visible_short_alias = 'I', help = "Ignore case")]
    pub ignore_case: bool,

    #[arg(short = 'e', long, help = "Treat the pattern as a regular expression")]
    pub regex: bool,

    #[arg(long, help = "Show the changes without making them")]
    pub dry_run: bool,

    #[arg(long, allow_hyphen_values = true, help = "Raw flag string, e.g. \"-r -i --collision=skip\"")]
    pub flags: Option<String>,

    #[arg(short, long, help = "Apply without asking for confirmation")]
    pub yes: bool,
}

impl CommonArgs {
    /// The typed switches, plus the subcommand's own in `specific`,
    /// combined with anything from `--flags`.
    pub fn flags(&self, specific: Flags) -> Result<Flags, batchren_core::EngineError> {
        let typed = Flags {
            recursive: self.recursive,
            ignore_case: self.ignore_case,
            regex: self.regex,
            dry_run: self.dry_run,
            ..specific
        };
        match &self.flags {
            Some(raw) => Ok(typed.merge(raw.parse()?)),
            None => Ok(typed),
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
