//! Decides whether an entry can be treated as text, and decodes it.

use std::fmt;
use std::io::Read;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::tree::{Entry, FileTree};
use crate::EngineError;

/// Bytes read to sniff an untyped, unfamiliar file for binary content.
pub const SNIFF_BYTES: usize = 512;

const REJECTED_TYPE_PREFIXES: [&str; 3] = ["image/", "video/", "audio/"];
const REJECTED_TYPE_MARKERS: [&str; 9] = [
    "zip",
    "compressed",
    "gzip",
    "x-tar",
    "x-7z",
    "x-rar",
    "archive",
    "font",
    "octet-stream",
];

const TEXT_EXTENSIONS: [&str; 22] = [
    ".txt", ".md", ".json", ".xml", ".html", ".htm", ".csv", ".properties", ".yml", ".yaml",
    ".gradle", ".java", ".kt", ".kts", ".cpp", ".c", ".h", ".py", ".sh", ".js", ".css", ".php",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DeclaredType,
    BinarySniff,
    NulBytes,
    Undecodable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SkipReason::DeclaredType => "declared type is not text",
            SkipReason::BinarySniff => "binary data in leading bytes",
            SkipReason::NulBytes => "contains NUL bytes",
            SkipReason::Undecodable => "not decodable as text",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct TextContent {
    pub text: String,
    pub encoding: &'static Encoding,
}

impl TextContent {
    /// Re-encodes `text` in the encoding this content was read with.
    /// `None` if some character has no representation there.
    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        if self.encoding == UTF_8 {
            return Some(text.as_bytes().to_vec());
        }
        let (bytes, _, unmappable) = self.encoding.encode(text);
        (!unmappable).then(|| bytes.into_owned())
    }
}

#[derive(Debug, Clone)]
pub enum Classification {
    Text(TextContent),
    Skip(SkipReason),
}

pub fn is_rejected_type(declared: Option<&str>) -> bool {
    let Some(declared) = declared else {
        return false;
    };
    let lower = declared.to_ascii_lowercase();
    REJECTED_TYPE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
        || REJECTED_TYPE_MARKERS.iter().any(|marker| lower.contains(marker))
}

pub fn has_text_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub fn looks_binary(sample: &[u8]) -> bool {
    sample.contains(&0)
}

/// Checks that need at most the first [`SNIFF_BYTES`]: a non-text declared
/// type, or an untyped file with an unfamiliar extension and a NUL byte
/// near the start.
pub fn precheck<T: FileTree>(tree: &T, entry: &Entry<T::Handle>) -> Result<Option<SkipReason>, EngineError> {
    if is_rejected_type(entry.declared_type.as_deref()) {
        return Ok(Some(SkipReason::DeclaredType));
    }
    if entry.declared_type.is_some() || has_text_extension(&entry.name) {
        return Ok(None);
    }

    let mut sample = Vec::with_capacity(SNIFF_BYTES);
    tree.open(&entry.handle)
        .and_then(|reader| reader.take(SNIFF_BYTES as u64).read_to_end(&mut sample))
        .map_err(|source| EngineError::Read {
            name: entry.name.clone(),
            source,
        })?;

    Ok(looks_binary(&sample).then_some(SkipReason::BinarySniff))
}

/// Runs every check and, if the entry passes, returns its decoded text.
pub fn classify<T: FileTree>(tree: &T, entry: &Entry<T::Handle>) -> Result<Classification, EngineError> {
    if let Some(reason) = precheck(tree, entry)? {
        return Ok(Classification::Skip(reason));
    }
    read_text(tree, &entry.handle, &entry.name)
}

/// Reads the whole entry and decodes it, skipping anything with NUL bytes
/// or no clean decoding.
pub fn read_text<T: FileTree>(tree: &T, handle: &T::Handle, name: &str) -> Result<Classification, EngineError> {
    let mut bytes = Vec::new();
    tree.open(handle)
        .and_then(|mut reader| reader.read_to_end(&mut bytes))
        .map_err(|source| EngineError::Read {
            name: name.to_string(),
            source,
        })?;

    if looks_binary(&bytes) {
        return Ok(Classification::Skip(SkipReason::NulBytes));
    }
    Ok(match decode(&bytes) {
        Some(content) => Classification::Text(content),
        None => Classification::Skip(SkipReason::Undecodable),
    })
}

/// UTF-8 first, then whatever legacy encoding the detector settles on.
pub fn decode(bytes: &[u8]) -> Option<TextContent> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(TextContent {
            text: text.to_string(),
            encoding: UTF_8,
        });
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    if encoding == UTF_8 {
        return None;
    }

    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return None;
    }
    debug!("Decoded as {}", encoding.name());
    Some(TextContent {
        text: text.into_owned(),
        encoding,
    })
}
