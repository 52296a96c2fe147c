use std::borrow::Cow;

use regex::{NoExpand, Regex, RegexBuilder};
use tracing::debug;

use crate::template::references_resolve;
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternMode {
    #[default]
    Substring,
    Wildcard,
    Regex,
}

impl PatternMode {
    /// Regex when requested; otherwise wildcard if the pattern uses `*` or
    /// `?`, plain substring if it does not.
    pub fn infer(raw: &str, regex: bool) -> Self {
        if regex {
            PatternMode::Regex
        } else if raw.contains(['*', '?']) {
            PatternMode::Wildcard
        } else {
            PatternMode::Substring
        }
    }
}

/// A compiled name matcher. Immutable once built.
///
/// Wildcard patterns must match the whole name; substring and regex
/// patterns only need to occur somewhere in it.
#[derive(Debug, Clone)]
pub enum Pattern {
    Substring { needle: String, regex: Regex },
    Wildcard { source: String, regex: Regex },
    Regex { regex: Regex },
}

impl Pattern {
    /// An empty pattern matches every name, whatever the mode.
    pub fn compile(raw: &str, mode: PatternMode, ignore_case: bool) -> Result<Self, EngineError> {
        if raw.is_empty() {
            let regex = build(raw, &desugar_wildcard("*"), ignore_case)?;
            return Ok(Pattern::Wildcard {
                source: raw.to_string(),
                regex,
            });
        }

        let pattern = match mode {
            PatternMode::Substring => Pattern::Substring {
                needle: raw.to_string(),
                regex: build(raw, &regex::escape(raw), ignore_case)?,
            },
            PatternMode::Wildcard => {
                let desugared = desugar_wildcard(raw);
                debug!("Wildcard '{}' desugared to '{}'", raw, desugared);
                Pattern::Wildcard {
                    source: raw.to_string(),
                    regex: build(raw, &desugared, ignore_case)?,
                }
            }
            PatternMode::Regex => Pattern::Regex {
                regex: build(raw, raw, ignore_case)?,
            },
        };
        Ok(pattern)
    }

    pub fn mode(&self) -> PatternMode {
        match self {
            Pattern::Substring { .. } => PatternMode::Substring,
            Pattern::Wildcard { .. } => PatternMode::Wildcard,
            Pattern::Regex { .. } => PatternMode::Regex,
        }
    }

    /// The pattern as the user wrote it.
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Substring { needle, .. } => needle,
            Pattern::Wildcard { source, .. } => source,
            Pattern::Regex { regex } => regex.as_str(),
        }
    }

    pub fn is_match(&self, subject: &str) -> bool {
        match self {
            Pattern::Substring { regex, .. }
            | Pattern::Wildcard { regex, .. }
            | Pattern::Regex { regex } => regex.is_match(subject),
        }
    }

    /// The matcher whose capture groups feed template back-references.
    /// Only regex patterns expose one.
    pub fn capturing(&self) -> Option<&Regex> {
        match self {
            Pattern::Regex { regex } => Some(regex),
            _ => None,
        }
    }
}

/// Translates `*` and `?` into regex and escapes everything else, anchored
/// so the result only matches full strings.
pub fn desugar_wildcard(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    out.push('^');
    for ch in raw.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    out.push('$');
    out
}

fn build(raw: &str, expression: &str, ignore_case: bool) -> Result<Regex, EngineError> {
    RegexBuilder::new(expression)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|source| EngineError::InvalidPattern {
            pattern: raw.to_string(),
            source,
        })
}

/// Matcher for search-and-replace inside file contents.
#[derive(Debug, Clone)]
pub struct ContentMatcher {
    mode: PatternMode,
    regex: Regex,
}

impl ContentMatcher {
    pub fn compile(
        raw: &str,
        mode: PatternMode,
        ignore_case: bool,
        whole_word: bool,
    ) -> Result<Self, EngineError> {
        if raw.is_empty() {
            return Err(EngineError::EmptyPattern);
        }

        let body = match mode {
            PatternMode::Substring => regex::escape(raw),
            PatternMode::Regex => raw.to_string(),
            PatternMode::Wildcard => {
                let anchored = desugar_wildcard(raw);
                anchored[1..anchored.len() - 1].to_string()
            }
        };
        // Reject a malformed regex on its own terms before wrapping it.
        if mode == PatternMode::Regex {
            build(raw, &body, ignore_case)?;
        }
        let expression = if whole_word {
            format!(r"\b(?:{body})\b")
        } else {
            body
        };

        Ok(Self {
            mode,
            regex: build(raw, &expression, ignore_case)?,
        })
    }

    pub fn mode(&self) -> PatternMode {
        self.mode
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }

    /// Replaces every match. In regex mode `replacement` may reference
    /// capture groups; a reference to a group the pattern lacks makes the
    /// whole replacement literal. Other modes always insert it verbatim.
    pub fn replace_all<'t>(&self, text: &'t str, replacement: &str) -> Cow<'t, str> {
        if self.mode == PatternMode::Regex && references_resolve(&self.regex, replacement) {
            self.regex.replace_all(text, replacement)
        } else {
            self.regex.replace_all(text, NoExpand(replacement))
        }
    }

    /// Same result as [`replace_all`](Self::replace_all), plus one
    /// `(source, target)` pair per match: where the match starts in `text`
    /// and where its replacement starts in the returned string.
    pub fn replace_all_with_offsets(&self, text: &str, replacement: &str) -> (String, Vec<(usize, usize)>) {
        let expand = self.mode == PatternMode::Regex && references_resolve(&self.regex, replacement);
        let mut out = String::with_capacity(text.len());
        let mut offsets = Vec::new();
        let mut last = 0;

        for captures in self.regex.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            offsets.push((whole.start(), out.len()));
            if expand {
                captures.expand(replacement, &mut out);
            } else {
                out.push_str(replacement);
            }
            last = whole.end();
        }

        out.push_str(&text[last..]);
        (out, offsets)
    }
}
