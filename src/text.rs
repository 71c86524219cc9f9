use unicode_normalization::UnicodeNormalization;

use crate::draw::{DrawOp, PageContext};
use crate::error::FieldErrorKind;
use crate::font::FontTable;
use crate::template::{
    Color, FieldSchema, OverflowPolicy, TextAlignment, DEFAULT_LINE_HEIGHT, DEFAULT_TEXT_FONT_SIZE,
};
use crate::units::millimeters_to_points;

/// Slack for floating point comparisons against box edges, in points.
pub(crate) const FIT_TOLERANCE: f32 = 0.01;

/// One character with the face selected for it and its advance at the field's
/// font size.
pub(crate) struct ShapedCharacter {
    pub(crate) character: char,
    pub(crate) font: crate::font::FontSelection,
    pub(crate) advance: f32,
}

/// Lays out one text field. The bound value is normalized to NFC, wrapped into
/// the field box and emitted as runs, one run per stretch of characters that
/// share a face. A codepoint no font covers fails the whole field with the
/// offending codepoint.
pub fn render_text(
    schema: &FieldSchema,
    value: &str,
    _context: &PageContext,
    fonts: &FontTable,
) -> Result<Vec<DrawOp>, FieldErrorKind> {
    let font_size = schema.font_size.unwrap_or(DEFAULT_TEXT_FONT_SIZE);
    let line_advance = font_size * schema.line_height.unwrap_or(DEFAULT_LINE_HEIGHT);
    let requested = fonts.requested_face(schema.font_name.as_deref());
    let box_width = millimeters_to_points(schema.width);

    // Newlines split paragraphs; all other whitespace renders as a plain space.
    let normalized: String = value
        .nfc()
        .map(|character| {
            if character.is_whitespace() && character != '\n' {
                ' '
            } else {
                character
            }
        })
        .collect();

    let mut lines = Vec::new();
    for paragraph in normalized.split('\n') {
        let shaped = shape(paragraph, requested, font_size, fonts)?;
        lines.extend(wrap(shaped, box_width));
    }

    let block = LineBlock {
        origin_x: millimeters_to_points(schema.position.x),
        origin_y: millimeters_to_points(schema.position.y),
        width: box_width,
        alignment: schema.alignment,
        font_size,
        line_advance,
        color: schema.font_color.unwrap_or(Color::BLACK),
        clip_height: match schema.overflow {
            OverflowPolicy::Grow => None,
            OverflowPolicy::Clip => Some(millimeters_to_points(schema.height)),
        },
        requested,
    };
    let mut operations = Vec::new();
    emit_lines(&block, lines, fonts, &mut operations);
    Ok(operations)
}

/// Resolves every character of one paragraph against the table.
pub(crate) fn shape(
    paragraph: &str,
    requested: Option<usize>,
    font_size: f32,
    fonts: &FontTable,
) -> Result<Vec<ShapedCharacter>, FieldErrorKind> {
    paragraph
        .chars()
        .map(|character| {
            let font = fonts
                .select(requested, character)
                .map_err(|codepoint| FieldErrorKind::GlyphUnsupported { codepoint })?;
            Ok(ShapedCharacter {
                character,
                font,
                advance: fonts.advance(font, character, font_size),
            })
        })
        .collect()
}

/// Greedy word wrap over shaped characters. Whitespace is the break
/// opportunity; a word wider than the box on its own is broken between
/// characters instead, which keeps scripts written without spaces inside the
/// box. An empty paragraph still takes up one (empty) line.
pub(crate) fn wrap(shaped: Vec<ShapedCharacter>, max_width: f32) -> Vec<Vec<ShapedCharacter>> {
    if shaped.is_empty() {
        return vec![Vec::new()];
    }

    let mut tokens: Vec<Vec<ShapedCharacter>> = Vec::new();
    let mut current: Vec<ShapedCharacter> = Vec::new();
    for item in shaped {
        if item.character.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(vec![item]);
        } else {
            current.push(item);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    let mut lines: Vec<Vec<ShapedCharacter>> = Vec::new();
    let mut line: Vec<ShapedCharacter> = Vec::new();
    let mut line_width = 0.0_f32;
    for token in tokens {
        let is_space = token.len() == 1 && token[0].character.is_whitespace();
        let token_width: f32 = token.iter().map(|item| item.advance).sum();
        if is_space {
            // Spaces never force a wrap and never start a line.
            if !line.is_empty() {
                line_width += token_width;
                line.extend(token);
            }
        } else if line_width + token_width <= max_width + FIT_TOLERANCE {
            line_width += token_width;
            line.extend(token);
        } else if token_width <= max_width + FIT_TOLERANCE {
            close_line(&mut lines, &mut line, &mut line_width);
            line_width = token_width;
            line = token;
        } else {
            if !line.is_empty() {
                close_line(&mut lines, &mut line, &mut line_width);
            }
            for item in token {
                if !line.is_empty() && line_width + item.advance > max_width + FIT_TOLERANCE {
                    close_line(&mut lines, &mut line, &mut line_width);
                }
                line_width += item.advance;
                line.push(item);
            }
        }
    }
    if !line.is_empty() || lines.is_empty() {
        close_line(&mut lines, &mut line, &mut line_width);
    }
    lines
}

fn close_line(
    lines: &mut Vec<Vec<ShapedCharacter>>,
    line: &mut Vec<ShapedCharacter>,
    line_width: &mut f32,
) {
    while line
        .last()
        .map_or(false, |item| item.character.is_whitespace())
    {
        line.pop();
    }
    lines.push(std::mem::take(line));
    *line_width = 0.0;
}

/// Where and how a block of wrapped lines lands on the page.
pub(crate) struct LineBlock {
    pub(crate) origin_x: f32,
    /// Top of the first line, in points from the page top.
    pub(crate) origin_y: f32,
    pub(crate) width: f32,
    pub(crate) alignment: TextAlignment,
    pub(crate) font_size: f32,
    pub(crate) line_advance: f32,
    pub(crate) color: Color,
    /// `Some(height)` drops whole lines that would end below the height.
    pub(crate) clip_height: Option<f32>,
    pub(crate) requested: Option<usize>,
}

/// Emits wrapped lines as positioned runs. The baseline of a line sits one
/// ascent below its top, taking the tallest ascent among the faces on the line
/// so mixed-face lines share one baseline.
pub(crate) fn emit_lines(
    block: &LineBlock,
    lines: Vec<Vec<ShapedCharacter>>,
    fonts: &FontTable,
    operations: &mut Vec<DrawOp>,
) {
    for (line_index, line) in lines.into_iter().enumerate() {
        let top = line_index as f32 * block.line_advance;
        if let Some(height) = block.clip_height {
            if top + block.line_advance > height + FIT_TOLERANCE {
                break;
            }
        }
        let line_width: f32 = line.iter().map(|item| item.advance).sum();
        let indent = match block.alignment {
            TextAlignment::Left => 0.0,
            TextAlignment::Center => (block.width - line_width) / 2.0,
            TextAlignment::Right => block.width - line_width,
        };
        let ascent = if line.is_empty() {
            fonts
                .line_metrics(fonts.metrics_face(block.requested), block.font_size)
                .ascent
        } else {
            line.iter()
                .map(|item| fonts.line_metrics(item.font, block.font_size).ascent)
                .fold(0.0_f32, f32::max)
        };
        let baseline = block.origin_y + top + ascent;

        let mut cursor = block.origin_x + indent;
        let mut index = 0;
        while index < line.len() {
            let font = line[index].font;
            let mut text = String::new();
            let mut run_width = 0.0;
            while index < line.len() && line[index].font == font {
                text.push(line[index].character);
                run_width += line[index].advance;
                index += 1;
            }
            operations.push(DrawOp::TextRun {
                font,
                font_size: block.font_size,
                x: cursor,
                y: baseline,
                color: block.color,
                text,
            });
            cursor += run_width;
        }
    }
}
