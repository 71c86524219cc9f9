use std::path::PathBuf;

use thiserror::Error;

/// One reason a template failed validation, pointing at the page and the field
/// that carry the problem. Messages start lowercase so they compose when quoted
/// inside a larger error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page}, field {field:?}: {problem}")]
pub struct Violation {
    /// Zero-based index of the page in the template.
    pub page: usize,
    pub field: String,
    pub problem: String,
}

/// A failure that rejects the whole batch: no bytes are produced.
///
/// Failures scoped to a single field of a single record do not belong here, they
/// are collected as [`FieldFailure`] values next to the generated document.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("the template failed validation: {}", list_violations(.0))]
    SchemaInvalid(Vec<Violation>),
    #[error("the inputs do not fit the template: {0}")]
    InputMismatch(String),
    #[error("the document could not be assembled: {0}")]
    AssemblyFailed(String),
}

fn list_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| violation.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// What went wrong with one field of one record. The field is left blank in the
/// output and the rest of the document is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldErrorKind {
    #[error("no loaded font covers U+{codepoint:04X}")]
    GlyphUnsupported { codepoint: u32 },
    #[error("the image could not be decoded: {0}")]
    ImageDecodeFailed(String),
    #[error("the content does not fit the field box: {0}")]
    ContentOverflow(String),
    #[error("the bound value does not fit the field type: {0}")]
    ValueMismatch(String),
}

/// A field error located in the batch: which record, which page, which field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {record}, page {page}, field {field:?}: {error}")]
pub struct FieldFailure {
    pub record: usize,
    pub page: usize,
    pub field: String,
    pub error: FieldErrorKind,
}

/// Errors raised while loading fonts into a table, before any generation starts.
#[derive(Debug, Clone, Error)]
pub enum FontError {
    #[error("the font {name:?} could not be parsed: {reason}")]
    UnreadableFace { name: String, reason: String },
    #[error("{count} fonts are flagged as the fallback, exactly one is required")]
    FallbackCount { count: usize },
}

/// Errors raised by a template store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no template is stored under the key {0:?}")]
    NotFound(String),
    #[error("the template under the key {key:?} does not parse: {reason}")]
    Malformed { key: String, reason: String },
    #[error("the backing store failed: {0}")]
    Backend(String),
}

/// Errors raised while reading a font manifest and the files it names.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("the font manifest {path:?} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("the font manifest {path:?} does not parse: {source}")]
    Unparseable {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("the font file {path:?} could not be read: {source}")]
    FontUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violations_are_listed_in_order() {
        let error = GenerateError::SchemaInvalid(vec![
            Violation {
                page: 0,
                field: "title".to_string(),
                problem: "the width and height must be positive".to_string(),
            },
            Violation {
                page: 1,
                field: "total".to_string(),
                problem: "the field leaves the page horizontally".to_string(),
            },
        ]);
        let message = error.to_string();
        let first = message.find("\"title\"").unwrap();
        let second = message.find("\"total\"").unwrap();
        assert!(first < second);
        assert!(message.contains("page 1"));
    }

    #[test]
    fn field_failures_name_the_codepoint() {
        let failure = FieldFailure {
            record: 2,
            page: 0,
            field: "note".to_string(),
            error: FieldErrorKind::GlyphUnsupported { codepoint: 0x20AC },
        };
        assert_eq!(
            failure.to_string(),
            "record 2, page 0, field \"note\": no loaded font covers U+20AC"
        );
    }
}
