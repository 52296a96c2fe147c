use regex::Regex;
use tracing::debug;

/// Legacy spelling of the `{n}` placeholder.
const LEGACY_NUMBER_TOKEN: &str = "$numb";
const REVERSE_PREFIX: &str = "rev:";
const MAX_PAD_WIDTH: usize = 64;

/// Running counter for numbering placeholders. Starts at 1 and is owned by
/// a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    next: u64,
}

impl Sequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the current value and moves past it.
    pub fn advance(&mut self) -> u64 {
        let current = self.next;
        self.next += 1;
        current
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

/// The source a regex template's back-references resolve against.
#[derive(Debug, Clone, Copy)]
pub struct MatchGroups<'a> {
    pub regex: &'a Regex,
    pub subject: &'a str,
}

/// Expands numbering placeholders, then (for regex matches) capture-group
/// references against `groups.subject`.
///
/// If the template references a group the regex does not define, the
/// numbered template is returned without substitution.
pub fn expand(template: &str, counter: u64, groups: Option<MatchGroups<'_>>) -> String {
    let numbered = expand_numbering(template, counter);
    let Some(groups) = groups else {
        return numbered;
    };

    if !references_resolve(groups.regex, &numbered) {
        debug!("Template '{}' references unknown groups, using it as-is", numbered);
        return numbered;
    }
    groups
        .regex
        .replace_all(groups.subject, numbered.as_str())
        .into_owned()
}

/// Replaces `{n}`, `{n:W}` and `$numb` with `counter`, zero-padded to `W`
/// digits when a width is given. Anything that does not parse as a
/// placeholder is copied through.
pub fn expand_numbering(template: &str, counter: u64) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;

    while let Some(start) = rest.find(['{', '$']) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if let Some(after) = tail.strip_prefix(LEGACY_NUMBER_TOKEN) {
            out.push_str(&counter.to_string());
            rest = after;
        } else if let Some((width, consumed)) = parse_placeholder(tail) {
            out.push_str(&format!("{counter:0width$}"));
            rest = &tail[consumed..];
        } else {
            // '{' and '$' are both single-byte
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

pub fn has_numbering(template: &str) -> bool {
    expand_numbering(template, 0) != template
}

/// Parses `{n}` or `{n:W}` at the start of `tail`, returning the pad width
/// and the number of bytes consumed.
fn parse_placeholder(tail: &str) -> Option<(usize, usize)> {
    let body = tail.strip_prefix("{n")?;
    if body.starts_with('}') {
        return Some((0, "{n}".len()));
    }

    let spec = body.strip_prefix(':')?;
    let close = spec.find('}')?;
    let digits = &spec[..close];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let width = digits.parse::<usize>().ok()?.min(MAX_PAD_WIDTH);

    Some((width, "{n:".len() + close + 1))
}

/// Whether every `$name`, `$N` and `${name}` in `replacement` names a
/// group that `regex` defines. `$$` is a literal dollar.
pub fn references_resolve(regex: &Regex, replacement: &str) -> bool {
    let bytes = replacement.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        match bytes.get(i) {
            None => break,
            Some(b'$') => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let name = if bytes[i] == b'{' {
            let Some(len) = replacement[i + 1..].find('}') else {
                continue;
            };
            let name = &replacement[i + 1..i + 1 + len];
            i += len + 2;
            name
        } else {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            &replacement[start..i]
        };

        if name.is_empty() {
            continue;
        }
        let known = match name.parse::<usize>() {
            Ok(index) => index < regex.captures_len(),
            Err(_) => regex.capture_names().flatten().any(|group| group == name),
        };
        if !known {
            return false;
        }
    }

    true
}

/// A rename template as typed by the user, with its `rev:` prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTemplate {
    pub body: String,
    pub reverse: bool,
}

impl RenameTemplate {
    pub fn parse(raw: &str) -> Self {
        let prefixed = raw
            .get(..REVERSE_PREFIX.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(REVERSE_PREFIX));

        if prefixed {
            Self {
                body: raw[REVERSE_PREFIX.len()..].to_string(),
                reverse: true,
            }
        } else {
            Self {
                body: raw.to_string(),
                reverse: false,
            }
        }
    }

    pub fn is_numbered(&self) -> bool {
        has_numbering(&self.body)
    }

    /// A dot anywhere in the template is taken to mean it carries its own
    /// extension, so `v.2-release` counts too.
    pub fn has_explicit_extension(&self) -> bool {
        self.body.contains('.')
    }

    /// `.md`-style templates that only replace the extension.
    pub fn is_extension_swap(&self) -> bool {
        self.body.len() > 1
            && self.body.starts_with('.')
            && !self.body[1..].contains('.')
            && !self.is_numbered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_numbering() {
        assert_eq!(expand_numbering("IMG_{n:3}.jpg", 7), "IMG_007.jpg");
        assert_eq!(expand_numbering("{n}-{n:2}", 5), "5-05");
        assert_eq!(expand_numbering("{n:2}", 123), "123");
    }

    #[test]
    fn test_legacy_numbering_token() {
        assert_eq!(expand_numbering("IMG_$numb.jpg", 12), "IMG_12.jpg");
    }

    #[test]
    fn test_malformed_placeholders_pass_through() {
        assert_eq!(expand_numbering("{n:}{n:x}{x}{n", 4), "{n:}{n:x}{x}{n");
        assert_eq!(expand_numbering("$5 and {name}", 4), "$5 and {name}");
        assert!(!has_numbering("plain-{name}"));
        assert!(has_numbering("shot {n:4}"));
    }

    #[test]
    fn test_expand_with_groups() {
        let regex = Regex::new(r"(\w+)-(\d+)").unwrap();
        let groups = MatchGroups {
            regex: &regex,
            subject: "scan-42",
        };
        assert_eq!(expand("${2}_${1}_{n:2}", 3, Some(groups)), "42_scan_03");
        // `$2_` names a group called "2_", which does not exist.
        assert_eq!(expand("$2_x", 3, Some(groups)), "$2_x");
    }

    #[test]
    fn test_expand_falls_back_on_unknown_group() {
        let regex = Regex::new(r"(\w+)").unwrap();
        let groups = MatchGroups {
            regex: &regex,
            subject: "scan",
        };
        assert_eq!(expand("${missing}-{n}", 1, Some(groups)), "${missing}-1");
        assert_eq!(expand("$5", 1, Some(groups)), "$5");
    }

    #[test]
    fn test_named_references() {
        let regex = Regex::new(r"(?P<stem>\w+)").unwrap();
        assert!(references_resolve(&regex, "${stem}_copy"));
        assert!(references_resolve(&regex, "$$100 $0"));
        assert!(!references_resolve(&regex, "$other"));
    }

    #[test]
    fn test_expand_without_groups_is_verbatim() {
        assert_eq!(expand("photo_{n:2}", 9, None), "photo_09");
    }

    #[test]
    fn test_sequence_starts_at_one() {
        let mut sequence = Sequence::new();
        assert_eq!(sequence.advance(), 1);
        assert_eq!(sequence.advance(), 2);
    }

    #[test]
    fn test_rename_template_prefix() {
        let template = RenameTemplate::parse("REV:IMG_{n}.jpg");
        assert!(template.reverse);
        assert_eq!(template.body, "IMG_{n}.jpg");
        assert!(template.is_numbered());
        assert!(template.has_explicit_extension());

        let plain = RenameTemplate::parse("draft");
        assert!(!plain.reverse);
        assert!(!plain.has_explicit_extension());
    }

    #[test]
    fn test_extension_swap_detection() {
        assert!(RenameTemplate::parse(".md").is_extension_swap());
        assert!(!RenameTemplate::parse(".tar.gz").is_extension_swap());
        assert!(!RenameTemplate::parse(".").is_extension_swap());
        assert!(!RenameTemplate::parse("notes.md").is_extension_swap());
    }
}
