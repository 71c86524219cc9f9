use std::sync::Arc;

use crate::font::FontSelection;
use crate::template::Color;
use crate::units::PageGeometry;

/// What a field renderer knows about the page it draws on.
#[derive(Debug, Clone, Copy)]
pub struct PageContext {
    pub geometry: PageGeometry,
}

/// One drawing primitive produced by a field renderer. Coordinates are in
/// points with the origin at the top-left corner of the page; the assembler
/// flips them into PDF user space when it writes the content stream.
#[derive(Debug, Clone)]
pub enum DrawOp {
    /// A run of text rendered in one face. `y` is the baseline.
    TextRun {
        font: FontSelection,
        font_size: f32,
        x: f32,
        y: f32,
        color: Color,
        text: String,
    },
    /// A decoded image placed into the given box, `x` and `y` its top-left
    /// corner.
    Image {
        image: DecodedImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// A straight stroked segment.
    Line {
        from: (f32, f32),
        to: (f32, f32),
        stroke_width: f32,
        color: Color,
    },
}

/// An image decoded as far as the PDF imaging model needs. The same decoded
/// image placed several times, even across records, embeds as a single object.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// SHA-256 of the encoded source bytes, the deduplication key.
    pub digest: [u8; 32],
    pub width: u32,
    pub height: u32,
    pub payload: ImagePayload,
}

/// How the pixels travel into the document.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    /// JPEG source bytes pass through untouched under a `DCTDecode` filter.
    Jpeg {
        data: Arc<Vec<u8>>,
        grayscale: bool,
    },
    /// Everything else is decoded to 8-bit RGB rows, with the alpha channel
    /// split off into a soft mask when the source has one.
    Rgb {
        data: Arc<Vec<u8>>,
        alpha: Option<Arc<Vec<u8>>>,
    },
}
