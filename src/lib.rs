//! Platen generates PDF documents by merging JSON input records into a declarative
//! template. A template names a base page, either a blank size or an existing PDF
//! document, and places typed fields onto it: text, images, tables and horizontal
//! rules, each with a position, a box and formatting options. Feeding the template
//! a batch of records produces one document whose pages repeat the template once
//! per record, with every field replaced by the value the record binds to its name.
//!
//! The crate is built around one entry point, the [`generate`] function. Everything
//! it needs is constructed from plain data: a [`Template`] parsed from JSON, a slice
//! of [`InputRecord`] maps and a [`FontTable`] loaded from raw TTF bytes. The output
//! is deterministic, so the same template, records and fonts yield byte-identical
//! documents on every run and every machine, which keeps generated artifacts
//! diffable and cacheable.

/// The template model and its JSON representation.
///
/// # Introduction
///
/// The entry point of this module is the `Template` struct. The end user can
/// construct one either from code or from a JSON document in the established
/// template interchange shape: a `basePdf` declaring the canvas and a `schemas`
/// array carrying one page of named fields after another. Fields keep their
/// authored order, which later becomes their drawing order, and unknown field
/// types survive a parse so that a template written by a newer tool can still be
/// inspected, re-serialized and validated here.
///
/// The input side of a merge lives here as well: an `InputRecord` is one JSON
/// object binding field names to values. The module deliberately knows nothing
/// about PDF; it is a plain data model that the rest of the crate consumes.
pub mod template;

/// Structural validation of templates, run before any rendering starts.
///
/// A template is checked as a whole: field types must be known, boxes must have
/// positive finite extents and lie on their page when the page size is declared
/// by the template itself, names must be unique per page, and table fields need
/// plausible column widths. Every problem is reported as a `Violation` naming
/// the page and field, and a batch is only rejected with the complete list,
/// never with the first finding alone.
pub mod validate;

/// Font loading, the fallback chain and text measurement.
///
/// Fonts arrive as raw TTF bytes and are parsed once into a `FontTable`. Fields
/// request a face by name; characters the face cannot shape fall through to the
/// single designated fallback face, and a batch without any loaded fonts runs on
/// the built-in Helvetica metrics instead. The table also answers the advance
/// and line metric queries the layout stage measures with.
pub mod font;

/// The font manifest the command line shell reads font files through.
pub mod manifest;

/// Storage of templates under string keys, in memory or on disk.
pub mod store;

/// The drawing primitives the layout stage hands to the document assembler.
pub mod draw;

/// Text fields: normalization, shaping, wrapping and alignment.
pub mod text;

/// Image fields: data URI decoding and box fitting.
pub mod image;

/// Table fields: column sizing, row measurement and cell layout.
pub mod table;

/// Line fields, drawn as horizontal rules.
pub mod line;

/// Per-record field layout, collecting drawing operations and soft failures.
pub mod layout;

/// Millimeter and point conversions and page geometry.
pub mod units;

/// The error taxonomy used throughout this library.
///
/// Errors split into two severities. Fatal conditions, a malformed template or
/// inputs that cannot be merged at all, abort the batch through `GenerateError`.
/// Per-field conditions, an image that does not decode or a character no font
/// covers, are soft: the field is skipped, the batch continues, and the caller
/// receives the full list as `FieldFailure` values alongside the document. All
/// types implement `std::error::Error` and `Display`, so they compose with any
/// error-reporting stack a caller already has.
pub mod error;

/// The batch pipeline: validate, lay out every record, assemble the document.
pub mod generate;

mod pdf;

pub use crate::error::{
    FieldErrorKind, FieldFailure, FontError, GenerateError, ManifestError, StoreError, Violation,
};
pub use crate::font::{FontEntry, FontTable};
pub use crate::generate::{generate, Generated};
pub use crate::manifest::FontManifest;
pub use crate::store::{FileStore, MemoryStore, TemplateStore};
pub use crate::template::{InputRecord, Template};
