//! Content types for entries created under a new name.
//!
//! Storage providers that cannot infer a type from an unfamiliar extension
//! tend to append the type's usual extension, so a renamed `notes.txt`
//! would come back as `notes.md.txt` if it kept `text/plain`. Resolving the
//! type from the new name avoids that.

use std::collections::HashMap;
use std::fs;
use std::sync::OnceLock;

use tracing::debug;

use crate::scanner::split_extension;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const PLAIN_TEXT: &str = "text/plain";

const SYSTEM_TABLES: [&str; 2] = ["/etc/mime.types", "/usr/local/etc/mime.types"];

const CURATED: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("xml", "text/xml"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("py", "text/x-python"),
    ("java", "text/x-java"),
    ("kt", "text/x-kotlin"),
    ("sh", "application/x-sh"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("apk", "application/vnd.android.package-archive"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("mkv", "video/x-matroska"),
];

const PLAINTEXT_LIKE: &[&str] = &[
    "log", "ini", "cfg", "conf", "properties", "gradle", "kts", "toml", "env", "c", "h", "cpp",
    "php", "rs",
];

/// Extension to content-type lookup: a curated table, then the system
/// table, then a plain-text/opaque-binary fallback.
#[derive(Debug, Clone, Default)]
pub struct TypeResolver {
    system: HashMap<String, String>,
}

impl TypeResolver {
    pub fn with_system_table(system: HashMap<String, String>) -> Self {
        Self { system }
    }

    /// Reads the first system `mime.types` file that exists.
    pub fn from_system() -> Self {
        let system = SYSTEM_TABLES
            .iter()
            .find_map(|path| fs::read_to_string(path).ok())
            .map(|contents| parse_mime_types(&contents))
            .unwrap_or_default();
        debug!("Loaded {} system content types", system.len());
        Self { system }
    }

    /// The type to declare for an entry named `destination` that was
    /// produced from an entry of type `source_type`.
    pub fn resolve(&self, destination: &str, source_type: Option<&str>) -> String {
        let (_, extension) = split_extension(destination);
        if extension.is_empty() {
            return source_type.unwrap_or(OCTET_STREAM).to_string();
        }

        let extension = extension[1..].to_ascii_lowercase();
        if let Some((_, mime)) = CURATED.iter().find(|(ext, _)| *ext == extension) {
            return (*mime).to_string();
        }
        if let Some(mime) = self.system.get(&extension) {
            return mime.clone();
        }
        if PLAINTEXT_LIKE.contains(&extension.as_str()) {
            return PLAIN_TEXT.to_string();
        }
        OCTET_STREAM.to_string()
    }
}

/// Parses the `type ext1 ext2 ...` lines of a `mime.types` file.
pub fn parse_mime_types(contents: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(mime) = fields.next() else {
            continue;
        };
        for extension in fields {
            table
                .entry(extension.to_ascii_lowercase())
                .or_insert_with(|| mime.to_string());
        }
    }
    table
}

/// [`TypeResolver::resolve`] against the process-wide system table.
pub fn content_type_for(destination: &str, source_type: Option<&str>) -> String {
    static RESOLVER: OnceLock<TypeResolver> = OnceLock::new();
    RESOLVER
        .get_or_init(TypeResolver::from_system)
        .resolve(destination, source_type)
}
