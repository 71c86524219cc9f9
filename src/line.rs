use crate::draw::{DrawOp, PageContext};
use crate::error::FieldErrorKind;
use crate::template::{Color, FieldSchema};
use crate::units::millimeters_to_points;

/// Renders a line field: one horizontal rule through the vertical center of the
/// field box, as thick as the box is tall. Line fields take no bound value.
pub fn render_line(
    schema: &FieldSchema,
    _context: &PageContext,
) -> Result<Vec<DrawOp>, FieldErrorKind> {
    let x = millimeters_to_points(schema.position.x);
    let middle =
        millimeters_to_points(schema.position.y) + millimeters_to_points(schema.height) / 2.0;
    Ok(vec![DrawOp::Line {
        from: (x, middle),
        to: (x + millimeters_to_points(schema.width), middle),
        stroke_width: millimeters_to_points(schema.height),
        color: schema.color.unwrap_or(Color::BLACK),
    }])
}
