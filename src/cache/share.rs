//! Embeds a shared file into the share-handler document.

const HEAD_CLOSE: &str = "</head>";

/// A file received through the share target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// JSON string literal that is also safe inside a `<script>` element.
fn script_literal(value: &str) -> String {
    serde_json::Value::from(value).to_string().replace("</", "<\\/")
}

/// Script constructing `window.sharedFile` from the upload.
///
/// The content is read as UTF-8 text, with invalid sequences replaced, the
/// same way the share page reads the file with `text()`. Text models (OBJ,
/// ASCII STL and PLY) arrive byte for byte; binary STL or PLY uploads do not.
#[must_use]
pub fn shared_file_script(file: &SharedFile) -> String {
    let content = String::from_utf8_lossy(&file.bytes);
    format!(
        "<script>window.sharedFile = new File([{}], {}, {{type: {}}});</script>",
        script_literal(&content),
        script_literal(&file.file_name),
        script_literal(&file.content_type),
    )
}

/// Inserts the shared-file script before the first `</head>`. A document
/// without one is returned unchanged.
#[must_use]
pub fn inject_shared_file(document: &str, file: &SharedFile) -> String {
    let script = shared_file_script(file);
    document.replacen(HEAD_CLOSE, &format!("{script}{HEAD_CLOSE}"), 1)
}
