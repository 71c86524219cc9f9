use crate::draw::{DrawOp, PageContext};
use crate::error::FieldErrorKind;
use crate::font::FontTable;
use crate::template::{
    Color, FieldSchema, TextAlignment, DEFAULT_CELL_PADDING_MM, DEFAULT_STROKE_WIDTH_MM,
    DEFAULT_TABLE_FONT_SIZE,
};
use crate::text::{emit_lines, shape, wrap, LineBlock, ShapedCharacter, FIT_TOLERANCE};
use crate::units::millimeters_to_points;

/// The resolved presentation of a table field, everything in points.
struct TableStyle {
    font_size: f32,
    padding: f32,
    stroke_width: f32,
    stroke_color: Color,
    text_color: Color,
    columns: Vec<f32>,
}

impl TableStyle {
    fn from_schema(schema: &FieldSchema) -> TableStyle {
        TableStyle {
            font_size: schema.font_size.unwrap_or(DEFAULT_TABLE_FONT_SIZE),
            padding: millimeters_to_points(
                schema.cell_padding.unwrap_or(DEFAULT_CELL_PADDING_MM),
            ),
            stroke_width: millimeters_to_points(
                schema.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH_MM),
            ),
            stroke_color: schema.stroke_color.unwrap_or(Color::BLACK),
            text_color: schema.font_color.unwrap_or(Color::BLACK),
            columns: schema
                .columns
                .iter()
                .flatten()
                .map(|&width| millimeters_to_points(width))
                .collect(),
        }
    }

    fn row_line_advance(&self) -> f32 {
        self.font_size
    }
}

/// Measures the heights the given rows take, in points. The height of a row is
/// the tallest wrapped cell on it plus the cell padding above and below; an
/// empty cell still counts one text line. Exposed so callers can size a field
/// before generating.
pub fn measure_row_heights(
    schema: &FieldSchema,
    rows: &[Vec<String>],
    fonts: &FontTable,
) -> Result<Vec<f32>, FieldErrorKind> {
    let style = TableStyle::from_schema(schema);
    let requested = fonts.requested_face(schema.font_name.as_deref());
    rows.iter()
        .map(|row| {
            let mut tallest = 1_usize;
            for (column_index, column_width) in style.columns.iter().enumerate() {
                let cell = row
                    .get(column_index)
                    .map(String::as_str)
                    .unwrap_or_default();
                let lines = wrapped_cell(cell, requested, &style, *column_width, fonts)?;
                tallest = tallest.max(lines.len());
            }
            Ok(tallest as f32 * style.row_line_advance() + 2.0 * style.padding)
        })
        .collect()
}

/// Renders a table field: the grid strokes first, then the cell text over
/// them. Rows that do not fit the field box fail the field with
/// `ContentOverflow`; the engine never inserts pages on its own.
pub fn render_table(
    schema: &FieldSchema,
    rows: &[Vec<String>],
    _context: &PageContext,
    fonts: &FontTable,
) -> Result<Vec<DrawOp>, FieldErrorKind> {
    let style = TableStyle::from_schema(schema);
    if style.columns.is_empty() {
        return Ok(Vec::new());
    }
    let requested = fonts.requested_face(schema.font_name.as_deref());
    let heights = measure_row_heights(schema, rows, fonts)?;

    let box_x = millimeters_to_points(schema.position.x);
    let box_y = millimeters_to_points(schema.position.y);
    let box_height = millimeters_to_points(schema.height);
    let table_width: f32 = style.columns.iter().sum();
    let table_height: f32 = heights.iter().sum();
    if table_height > box_height + FIT_TOLERANCE {
        return Err(FieldErrorKind::ContentOverflow(format!(
            "{} rows take {:.1}pt, the field box is {:.1}pt tall",
            rows.len(),
            table_height,
            box_height
        )));
    }

    let mut operations = Vec::new();

    // Horizontal strokes above every row and below the last one.
    let mut row_edge = box_y;
    for height in heights.iter().chain(std::iter::once(&0.0)) {
        operations.push(DrawOp::Line {
            from: (box_x, row_edge),
            to: (box_x + table_width, row_edge),
            stroke_width: style.stroke_width,
            color: style.stroke_color,
        });
        row_edge += height;
    }
    // Vertical strokes left of every column and right of the last one.
    let mut column_edge = box_x;
    for width in style.columns.iter().chain(std::iter::once(&0.0)) {
        operations.push(DrawOp::Line {
            from: (column_edge, box_y),
            to: (column_edge, box_y + table_height),
            stroke_width: style.stroke_width,
            color: style.stroke_color,
        });
        column_edge += width;
    }

    let mut row_top = box_y;
    for (row_index, row) in rows.iter().enumerate() {
        let mut cell_left = box_x;
        for (column_index, column_width) in style.columns.iter().enumerate() {
            let cell = row
                .get(column_index)
                .map(String::as_str)
                .unwrap_or_default();
            let lines = wrapped_cell(cell, requested, &style, *column_width, fonts)?;
            let block = LineBlock {
                origin_x: cell_left + style.padding,
                origin_y: row_top + style.padding,
                width: column_width - 2.0 * style.padding,
                alignment: TextAlignment::Left,
                font_size: style.font_size,
                line_advance: style.row_line_advance(),
                color: style.text_color,
                clip_height: None,
                requested,
            };
            emit_lines(&block, lines, fonts, &mut operations);
            cell_left += column_width;
        }
        row_top += heights[row_index];
    }

    Ok(operations)
}

/// Wraps one cell into its column, inside the padding.
fn wrapped_cell(
    cell: &str,
    requested: Option<usize>,
    style: &TableStyle,
    column_width: f32,
    fonts: &FontTable,
) -> Result<Vec<Vec<ShapedCharacter>>, FieldErrorKind> {
    let wrap_width = (column_width - 2.0 * style.padding).max(style.font_size);
    let shaped = shape(cell, requested, style.font_size, fonts)?;
    Ok(wrap(shaped, wrap_width))
}
