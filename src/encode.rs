//! Turns opened file bytes into a payload that can cross the bridge.
//!
//! HTML documents travel as text embedded in a script string literal, so
//! quotes, backslashes and line breaks are escaped. 3D model files travel as
//! base64 and need no escaping.

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a recognized file is carried across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// HTML document, delivered as escaped text.
    Text,
    /// 3D model, delivered as base64.
    Model,
}

impl FileKind {
    /// Classifies a path by extension. Unrecognized extensions yield `None`.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "html" | "htm" => Some(Self::Text),
            "stl" | "ply" | "obj" => Some(Self::Model),
            _ => None,
        }
    }

    /// The payload encoding used for this kind.
    #[must_use]
    pub const fn encoding(self) -> Encoding {
        match self {
            Self::Text => Encoding::Text,
            Self::Model => Encoding::Base64,
        }
    }
}

/// Payload encoding tag passed as the bridge's third argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Text,
    Base64,
}

impl Encoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Base64 => "base64",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file encoded for transport to the web content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// File name, escaped for a script string literal.
    pub file_name: String,
    /// Escaped text or base64 content.
    pub content: String,
    pub encoding: Encoding,
}

/// Escapes text for embedding in a single- or double-quoted script literal.
///
/// Backslash is replaced first so later escapes are not doubled.
#[must_use]
pub fn escape_script_string(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\'', "\\'")
}

/// Escapes a file name. Names never contain line breaks worth preserving.
#[must_use]
pub fn escape_file_name(name: &str) -> String {
    name.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
}

/// Reverses [`escape_script_string`] the way a script engine reads the literal.
///
/// Unknown escapes keep the escaped character, and a trailing lone backslash
/// is kept as is.
#[must_use]
pub fn unescape_script_string(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Encodes file bytes for the bridge.
///
/// # Errors
///
/// Returns [`Error::InvalidUtf8`] when a text-kind file is not valid UTF-8.
/// Text files are never silently re-encoded as base64.
pub fn encode(file_name: &str, bytes: &[u8], kind: FileKind) -> Result<EncodedPayload> {
    let content = match kind {
        FileKind::Text => {
            let text = std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8 {
                file_name: file_name.to_string(),
            })?;
            escape_script_string(text)
        }
        FileKind::Model => BASE64.encode(bytes),
    };

    Ok(EncodedPayload {
        file_name: escape_file_name(file_name),
        content,
        encoding: kind.encoding(),
    })
}

/// Decodes base64 content received over the bridge.
///
/// # Errors
///
/// Returns the base64 decode error for malformed content.
pub fn decode_base64(content: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn classifies_extensions() {
        assert_eq!(FileKind::from_path(Path::new("a/page.html")), Some(FileKind::Text));
        assert_eq!(FileKind::from_path(Path::new("page.HTM")), Some(FileKind::Text));
        assert_eq!(FileKind::from_path(Path::new("part.stl")), Some(FileKind::Model));
        assert_eq!(FileKind::from_path(Path::new("scan.Ply")), Some(FileKind::Model));
        assert_eq!(FileKind::from_path(Path::new("mesh.obj")), Some(FileKind::Model));
        assert_eq!(FileKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(FileKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn escapes_backslash_first() {
        assert_eq!(escape_script_string(r#"a\"b"#), r#"a\\\"b"#);
        assert_eq!(escape_script_string("x\ny\rz'"), "x\\ny\\rz\\'");
    }

    #[test]
    fn file_name_keeps_line_breaks_out_of_escaping() {
        assert_eq!(escape_file_name("it's \"here\".html"), "it\\'s \\\"here\\\".html");
    }

    #[test]
    fn text_payload_is_tagged_text() {
        let payload = encode("page.html", b"<p>\"hi\"</p>\n", FileKind::Text).unwrap();
        assert_eq!(payload.encoding, Encoding::Text);
        assert_eq!(payload.content, "<p>\\\"hi\\\"</p>\\n");
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        let err = encode("page.html", &[0x3c, 0xff, 0xfe], FileKind::Text).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8 { file_name } if file_name == "page.html"));
    }

    #[test]
    fn model_payload_is_base64() {
        let payload = encode("cube.stl", &[0, 159, 146, 150], FileKind::Model).unwrap();
        assert_eq!(payload.encoding, Encoding::Base64);
        assert_eq!(payload.content, "AJ+Slg==");
    }

    #[test]
    fn encoding_names() {
        assert_eq!(Encoding::default(), Encoding::Text);
        assert_eq!(Encoding::Base64.to_string(), "base64");
        assert_eq!(serde_json::to_string(&Encoding::Text).unwrap(), "\"text\"");
    }

    proptest! {
        #[test]
        fn text_round_trips_through_receiver(text in any::<String>()) {
            let payload = encode("f.html", text.as_bytes(), FileKind::Text).unwrap();
            prop_assert_eq!(unescape_script_string(&payload.content), text);
        }

        #[test]
        fn model_round_trips_through_base64(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let payload = encode("f.ply", &bytes, FileKind::Model).unwrap();
            prop_assert_eq!(decode_base64(&payload.content).unwrap(), bytes);
        }

        #[test]
        fn file_names_round_trip(name in "[^\n\r]{0,40}") {
            prop_assert_eq!(unescape_script_string(&escape_file_name(&name)), name);
        }
    }
}
