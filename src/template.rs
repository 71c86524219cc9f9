use std::fmt;

use base64::Engine;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::units::{A4_HEIGHT_MM, A4_WIDTH_MM};

/// One record of caller data: keys are field names appearing in the template,
/// values are whatever those fields consume. One output document section is
/// generated per record.
pub type InputRecord = serde_json::Map<String, serde_json::Value>;

/// The font size a text field renders at when the template does not set one.
pub const DEFAULT_TEXT_FONT_SIZE: f32 = 13.0;
/// The font size table cells render at when the template does not set one.
pub const DEFAULT_TABLE_FONT_SIZE: f32 = 10.0;
/// The baseline-to-baseline distance as a multiple of the font size.
pub const DEFAULT_LINE_HEIGHT: f32 = 1.0;
/// The padding inside table cells, in millimeters.
pub const DEFAULT_CELL_PADDING_MM: f32 = 2.0;
/// The width of table grid strokes, in millimeters.
pub const DEFAULT_STROKE_WIDTH_MM: f32 = 0.3;

/// A document template: the canvas the fields sit on plus one ordered set of
/// named fields per page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default)]
    pub base_pdf: BasePdf,
    pub schemas: Vec<SchemaPage>,
}

impl Template {
    pub fn from_json(raw: &str) -> Result<Template, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The canvas below the fields: either the declaration of a blank page or a
/// base64-encoded PDF document whose pages show through under the overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BasePdf {
    Blank(BlankPage),
    Document(String),
}

impl Default for BasePdf {
    fn default() -> BasePdf {
        BasePdf::Blank(BlankPage::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlankPage {
    pub width: f32,
    pub height: f32,
    pub orientation: PageOrientation,
}

impl Default for BlankPage {
    fn default() -> BlankPage {
        BlankPage {
            width: A4_WIDTH_MM,
            height: A4_HEIGHT_MM,
            orientation: PageOrientation::Portrait,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    #[default]
    Portrait,
    Landscape,
}

/// The ordered fields of one template page. The order of the JSON text is
/// preserved: later fields paint over earlier ones. A name appearing twice is
/// kept twice, so that validation can point at the duplicate instead of one
/// entry silently winning.
#[derive(Debug, Clone, Default)]
pub struct SchemaPage {
    pub fields: Vec<(String, FieldSchema)>,
}

impl SchemaPage {
    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, schema)| schema)
    }
}

impl Serialize for SchemaPage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, schema) in &self.fields {
            map.serialize_entry(name, schema)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SchemaPage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<SchemaPage, D::Error> {
        struct SchemaPageVisitor;

        impl<'de> Visitor<'de> for SchemaPageVisitor {
            type Value = SchemaPage;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map from field names to field schemas")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SchemaPage, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, FieldSchema>()? {
                    fields.push(entry);
                }
                Ok(SchemaPage { fields })
            }
        }

        deserializer.deserialize_map(SchemaPageVisitor)
    }
}

/// One positioned field. The position is the top-left corner of the field box in
/// millimeters from the top-left corner of the page; `width` and `height` span
/// the box. The presentation options are flat on the object, each renderer reads
/// the ones it understands and ignores the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub position: Position,
    pub width: f32,
    pub height: f32,
    /// Rendered when the input record binds no value to the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub alignment: TextAlignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<Color>,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default)]
    pub fit: ImageFit,
    /// Table column widths in millimeters, left to right.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_padding: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// The closed set of field renderers. Rendering dispatches on this enum; a type
/// string outside the set deserializes to `Unknown` and is rejected during
/// validation, which can name the page and field, instead of at parse time,
/// which cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Image,
    Table,
    Line,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// What happens to text that does not fit the field box vertically: `Grow`
/// keeps every line and paints below the box, `Clip` drops whole lines that no
/// longer fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    Grow,
    Clip,
}

/// How an image is scaled into its field box: `Contain` preserves the aspect
/// ratio and centers the result, `Stretch` fills the box exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    #[default]
    Contain,
    Stretch,
}

/// An RGB color parsed from the `#rrggbb` form the templates carry. Components
/// are fractions in `0.0..=1.0`, which is what the PDF `rg` and `RG` operators
/// consume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        red: 0.0,
        green: 0.0,
        blue: 0.0,
    };
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(raw: String) -> Result<Color, String> {
        let digits = raw
            .strip_prefix('#')
            .ok_or_else(|| format!("the color {:?} does not start with '#'", raw))?;
        if digits.len() != 6 || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(format!("the color {:?} is not of the '#rrggbb' form", raw));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).unwrap_or(0) as f32 / 255.0
        };
        Ok(Color {
            red: channel(0..2),
            green: channel(2..4),
            blue: channel(4..6),
        })
    }
}

impl From<Color> for String {
    fn from(color: Color) -> String {
        format!(
            "#{:02x}{:02x}{:02x}",
            (color.red * 255.0).round() as u8,
            (color.green * 255.0).round() as u8,
            (color.blue * 255.0).round() as u8
        )
    }
}

/// Decodes a value that is either a `data:` URI or a bare base64 string into the
/// bytes it carries. The media type of the URI is not trusted; consumers sniff
/// the actual format from the bytes.
pub fn decode_binary_content(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = match raw.split_once(',') {
        Some((header, encoded)) if header.starts_with("data:") => encoded,
        _ => raw,
    };
    base64::engine::general_purpose::STANDARD.decode(encoded.trim())
}
