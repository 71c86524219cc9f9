use std::collections::HashSet;

use crate::error::Violation;
use crate::template::{BasePdf, FieldKind, FieldSchema, Template};
use crate::units::{millimeters_to_points, PageGeometry};

/// Slack for the bounds checks, in points.
const BOUNDS_TOLERANCE: f32 = 0.05;

/// Checks a template against the schema rules before any layout work starts.
/// Violations are collected in template order, page by page and field by field,
/// and reported together rather than one at a time.
///
/// The page bounds are only checked against blank pages; a PDF-backed template
/// may legitimately paint anywhere on pages whose size is not known until the
/// base document is parsed.
pub fn validate(template: &Template) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    if template.schemas.is_empty() {
        violations.push(Violation {
            page: 0,
            field: String::new(),
            problem: "the template declares no pages".to_string(),
        });
    }

    let page_geometry = match &template.base_pdf {
        BasePdf::Blank(blank_page) => Some(PageGeometry::from_blank_page(blank_page)),
        BasePdf::Document(_) => None,
    };

    for (page_index, page) in template.schemas.iter().enumerate() {
        let mut seen = HashSet::new();
        for (name, schema) in &page.fields {
            if !seen.insert(name.as_str()) {
                violations.push(violation(
                    page_index,
                    name,
                    "the field name appears more than once on this page",
                ));
            }
            check_field(page_index, name, schema, page_geometry, &mut violations);
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_field(
    page_index: usize,
    name: &str,
    schema: &FieldSchema,
    page_geometry: Option<PageGeometry>,
    violations: &mut Vec<Violation>,
) {
    if schema.kind == FieldKind::Unknown {
        violations.push(violation(
            page_index,
            name,
            "the field type is not one of text, image, table or line",
        ));
    }

    let numbers = [
        ("position.x", schema.position.x),
        ("position.y", schema.position.y),
        ("width", schema.width),
        ("height", schema.height),
    ];
    for (label, value) in numbers {
        if !value.is_finite() {
            violations.push(violation(
                page_index,
                name,
                &format!("{} is not a finite number", label),
            ));
        }
    }
    if schema.position.x < 0.0 || schema.position.y < 0.0 {
        violations.push(violation(page_index, name, "the position is negative"));
    }
    if schema.width <= 0.0 || schema.height <= 0.0 {
        violations.push(violation(
            page_index,
            name,
            "the width and height must be positive",
        ));
    }

    if let Some(geometry) = page_geometry {
        if millimeters_to_points(schema.position.x + schema.width)
            > geometry.width + BOUNDS_TOLERANCE
        {
            violations.push(violation(
                page_index,
                name,
                "the field leaves the page horizontally",
            ));
        }
        if millimeters_to_points(schema.position.y + schema.height)
            > geometry.height + BOUNDS_TOLERANCE
        {
            violations.push(violation(
                page_index,
                name,
                "the field leaves the page vertically",
            ));
        }
    }

    for (label, value) in [
        ("fontSize", schema.font_size),
        ("lineHeight", schema.line_height),
    ] {
        if let Some(value) = value {
            if !value.is_finite() || value <= 0.0 {
                violations.push(violation(
                    page_index,
                    name,
                    &format!("{} must be a positive number", label),
                ));
            }
        }
    }
    for (label, value) in [
        ("cellPadding", schema.cell_padding),
        ("strokeWidth", schema.stroke_width),
    ] {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                violations.push(violation(
                    page_index,
                    name,
                    &format!("{} must not be negative", label),
                ));
            }
        }
    }

    if schema.kind == FieldKind::Table {
        match &schema.columns {
            None => violations.push(violation(
                page_index,
                name,
                "a table needs at least one column width",
            )),
            Some(columns) if columns.is_empty() => violations.push(violation(
                page_index,
                name,
                "a table needs at least one column width",
            )),
            Some(columns) => {
                if columns
                    .iter()
                    .any(|&width| !width.is_finite() || width <= 0.0)
                {
                    violations.push(violation(
                        page_index,
                        name,
                        "column widths must be positive numbers",
                    ));
                }
                let total: f32 = columns.iter().sum();
                if millimeters_to_points(total)
                    > millimeters_to_points(schema.width) + BOUNDS_TOLERANCE
                {
                    violations.push(violation(
                        page_index,
                        name,
                        "the columns are wider than the field",
                    ));
                }
            }
        }
    }
}

fn violation(page: usize, field: &str, problem: &str) -> Violation {
    Violation {
        page,
        field: field.to_string(),
        problem: problem.to_string(),
    }
}
