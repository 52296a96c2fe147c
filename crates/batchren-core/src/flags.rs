use std::str::FromStr;

use crate::apply::CollisionStrategy;
use crate::pattern::PatternMode;
use crate::EngineError;

/// Options parsed from a whitespace-separated flag string such as
/// `"-r -i --collision=skip"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub recursive: bool,
    pub ignore_case: bool,
    pub regex: bool,
    pub preserve_extension: bool,
    pub whole_word: bool,
    pub line_numbers: bool,
    pub dry_run: bool,
    pub collision: Option<CollisionStrategy>,
}

impl Flags {
    /// The pattern mode implied by these flags for `raw`.
    pub fn mode(&self, raw: &str) -> PatternMode {
        PatternMode::infer(raw, self.regex)
    }

    pub fn collision(&self) -> CollisionStrategy {
        self.collision.unwrap_or_default()
    }

    /// Switches set in either; `other`'s collision strategy wins when both
    /// name one.
    pub fn merge(self, other: Flags) -> Flags {
        Flags {
            recursive: self.recursive || other.recursive,
            ignore_case: self.ignore_case || other.ignore_case,
            regex: self.regex || other.regex,
            preserve_extension: self.preserve_extension || other.preserve_extension,
            whole_word: self.whole_word || other.whole_word,
            line_numbers: self.line_numbers || other.line_numbers,
            dry_run: self.dry_run || other.dry_run,
            collision: other.collision.or(self.collision),
        }
    }
}

impl FromStr for Flags {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Flags::default();
        for token in s.split_whitespace() {
            match token {
                "-r" => flags.recursive = true,
                "-i" | "-I" => flags.ignore_case = true,
                "-e" => flags.regex = true,
                "-x" => flags.preserve_extension = true,
                "-w" => flags.whole_word = true,
                "-n" => flags.line_numbers = true,
                "--dry-run" => flags.dry_run = true,
                _ => match token.strip_prefix("--collision=") {
                    Some(value) => flags.collision = Some(value.parse()?),
                    None => {
                        return Err(EngineError::InvalidFlag {
                            token: token.to_string(),
                        })
                    }
                },
            }
        }
        Ok(flags)
    }
}
