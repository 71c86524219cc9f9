use std::collections::HashMap;
use std::sync::Arc;

use owned_ttf_parser::{AsFaceRef, OwnedFace};
use sha2::{Digest, Sha256};

use crate::error::FontError;

/// The name the built-in, non-embedded face goes by. It backs tables loaded with
/// no fonts at all and covers the printable ASCII range.
pub const BUILTIN_FONT_NAME: &str = "Helvetica";

/// A font binary handed to [`FontTable::load`], together with the name template
/// fields use to request it and the flag electing it as the fallback target.
#[derive(Debug, Clone)]
pub struct FontEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub fallback: bool,
}

impl FontEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>, fallback: bool) -> FontEntry {
        FontEntry {
            name: name.into(),
            data,
            fallback,
        }
    }
}

/// One face resolved by the table: either a loaded font, by index, or the
/// built-in Helvetica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontSelection {
    Builtin,
    Face(usize),
}

/// The vertical metrics of a face scaled to a font size, in points. The descent
/// is negative, measured from the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
}

pub(crate) struct LoadedFace {
    pub(crate) name: String,
    pub(crate) data: Arc<Vec<u8>>,
    pub(crate) face: OwnedFace,
    /// SHA-256 of the font binary; two entries carrying the same bytes embed as
    /// one PDF font object.
    pub(crate) digest: [u8; 32],
}

/// An immutable set of parsed faces shared by every record of a batch.
///
/// Character resolution is two-level: the face the field requests by name, then
/// the single face flagged as the fallback. A codepoint neither face covers is
/// an error carrying the codepoint, never a silently swapped glyph. A table
/// loaded with no fonts at all resolves against the built-in face instead, so
/// that Latin templates work out of the box.
pub struct FontTable {
    faces: Vec<LoadedFace>,
    by_name: HashMap<String, usize>,
    fallback: usize,
}

impl FontTable {
    /// Parses the given entries into a table. With a non-empty entry list,
    /// exactly one entry must be flagged as the fallback.
    pub fn load(entries: Vec<FontEntry>) -> Result<FontTable, FontError> {
        if !entries.is_empty() {
            let flagged = entries.iter().filter(|entry| entry.fallback).count();
            if flagged != 1 {
                return Err(FontError::FallbackCount { count: flagged });
            }
        }
        let mut faces = Vec::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());
        let mut fallback = 0;
        for entry in entries {
            let FontEntry {
                name,
                data,
                fallback: is_fallback,
            } = entry;
            let digest: [u8; 32] = Sha256::digest(&data).into();
            let face = OwnedFace::from_vec(data.clone(), 0).map_err(|error| {
                FontError::UnreadableFace {
                    name: name.clone(),
                    reason: error.to_string(),
                }
            })?;
            if is_fallback {
                fallback = faces.len();
            }
            if by_name.insert(name.clone(), faces.len()).is_some() {
                log::warn!(
                    "the font {:?} is loaded more than once, the last binary wins name resolution",
                    name
                );
            }
            faces.push(LoadedFace {
                name,
                data: Arc::new(data),
                face,
                digest,
            });
        }
        Ok(FontTable {
            faces,
            by_name,
            fallback,
        })
    }

    /// True when no fonts were loaded and text renders in the built-in face.
    pub fn is_builtin_only(&self) -> bool {
        self.faces.is_empty()
    }

    /// Resolves the face a field requests by name, once per field. A name no
    /// loaded font carries resolves to `None` with a warning, which leaves the
    /// field entirely on the fallback path.
    pub fn requested_face(&self, font_name: Option<&str>) -> Option<usize> {
        let name = font_name?;
        let index = self.by_name.get(name).copied();
        if index.is_none() && !self.faces.is_empty() {
            log::warn!(
                "no loaded font is named {:?}, the fallback font takes over",
                name
            );
        }
        index
    }

    /// Selects the face that renders one codepoint: the requested face when it
    /// covers the character, else the fallback, else an error carrying the
    /// codepoint.
    pub fn select(&self, requested: Option<usize>, character: char) -> Result<FontSelection, u32> {
        if self.faces.is_empty() {
            if builtin_covers(character) {
                return Ok(FontSelection::Builtin);
            }
            return Err(character as u32);
        }
        if let Some(index) = requested {
            if self.covers(index, character) {
                return Ok(FontSelection::Face(index));
            }
        }
        if self.covers(self.fallback, character) {
            return Ok(FontSelection::Face(self.fallback));
        }
        Err(character as u32)
    }

    /// The face an empty line takes its vertical metrics from: the requested
    /// face when it exists, else the fallback, else the built-in.
    pub fn metrics_face(&self, requested: Option<usize>) -> FontSelection {
        if self.faces.is_empty() {
            FontSelection::Builtin
        } else {
            FontSelection::Face(requested.unwrap_or(self.fallback))
        }
    }

    /// The horizontal advance of one character at the given size, in points.
    pub fn advance(&self, selection: FontSelection, character: char, font_size: f32) -> f32 {
        match selection {
            FontSelection::Builtin => builtin_advance(character, font_size),
            FontSelection::Face(index) => {
                let face = self.faces[index].face.as_face_ref();
                let advance = face
                    .glyph_index(character)
                    .and_then(|glyph_id| face.glyph_hor_advance(glyph_id))
                    .unwrap_or(0);
                advance as f32 * font_size / face.units_per_em() as f32
            }
        }
    }

    pub fn line_metrics(&self, selection: FontSelection, font_size: f32) -> LineMetrics {
        match selection {
            FontSelection::Builtin => LineMetrics {
                ascent: BUILTIN_ASCENT * font_size / 1000.0,
                descent: BUILTIN_DESCENT * font_size / 1000.0,
            },
            FontSelection::Face(index) => {
                let face = self.faces[index].face.as_face_ref();
                let scale = font_size / face.units_per_em() as f32;
                LineMetrics {
                    ascent: face.ascender() as f32 * scale,
                    descent: face.descender() as f32 * scale,
                }
            }
        }
    }

    fn covers(&self, index: usize, character: char) -> bool {
        self.faces[index]
            .face
            .as_face_ref()
            .glyph_index(character)
            .is_some()
    }

    /// The glyph a loaded face maps one character to. The built-in face is
    /// addressed by character codes directly and has no glyph ids here.
    pub(crate) fn glyph_id(&self, index: usize, character: char) -> Option<u16> {
        self.faces[index]
            .face
            .as_face_ref()
            .glyph_index(character)
            .map(|glyph_id| glyph_id.0)
    }

    pub(crate) fn faces(&self) -> &[LoadedFace] {
        &self.faces
    }
}

const BUILTIN_ASCENT: f32 = 718.0;
const BUILTIN_DESCENT: f32 = -207.0;

/// Advance widths of the printable ASCII range of Helvetica in 1/1000ths of the
/// font size, as published in the Adobe font metrics files.
#[rustfmt::skip]
const BUILTIN_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

fn builtin_covers(character: char) -> bool {
    (' '..='~').contains(&character)
}

fn builtin_advance(character: char, font_size: f32) -> f32 {
    match BUILTIN_WIDTHS.get((character as usize).wrapping_sub(' ' as usize)) {
        Some(&width) => width as f32 * font_size / 1000.0,
        None => 0.0,
    }
}
