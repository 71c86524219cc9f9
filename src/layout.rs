use serde_json::Value;

use crate::draw::{DrawOp, PageContext};
use crate::error::{FieldErrorKind, FieldFailure};
use crate::font::FontTable;
use crate::template::{FieldKind, FieldSchema, InputRecord, Template};
use crate::units::PageGeometry;
use crate::{image, line, table, text};

/// The laid-out pages of one input record plus the fields that failed on it.
/// A failed field does not abort the record: it is skipped in the output and
/// reported, so one bad image never costs the batch.
#[derive(Debug, Default)]
pub struct RecordLayout {
    pub pages: Vec<Vec<DrawOp>>,
    pub failures: Vec<FieldFailure>,
}

/// Lays out one input record against every page of the template. `geometries`
/// carries one entry per template page, resolved from the blank page
/// declaration or the base document beforehand. Records are independent, so a
/// batch can run this in parallel and keep the results in record order.
pub fn layout_record(
    template: &Template,
    record: &InputRecord,
    fonts: &FontTable,
    geometries: &[PageGeometry],
    record_index: usize,
) -> RecordLayout {
    let mut layout = RecordLayout::default();
    for (page_index, page) in template.schemas.iter().enumerate() {
        let context = PageContext {
            geometry: geometries[page_index],
        };
        let mut operations = Vec::new();
        for (name, schema) in &page.fields {
            match render_field(schema, record.get(name.as_str()), &context, fonts) {
                Ok(mut rendered) => operations.append(&mut rendered),
                Err(error) => {
                    log::warn!(
                        "record {}, page {}, field {:?} was skipped: {}",
                        record_index,
                        page_index,
                        name,
                        error
                    );
                    layout.failures.push(FieldFailure {
                        record: record_index,
                        page: page_index,
                        field: name.clone(),
                        error,
                    });
                }
            }
        }
        layout.pages.push(operations);
    }
    layout
}

fn render_field(
    schema: &FieldSchema,
    value: Option<&Value>,
    context: &PageContext,
    fonts: &FontTable,
) -> Result<Vec<DrawOp>, FieldErrorKind> {
    match schema.kind {
        FieldKind::Text => match text_value(value, schema)? {
            Some(text_value) => text::render_text(schema, &text_value, context, fonts),
            None => Ok(Vec::new()),
        },
        FieldKind::Image => match image_value(value, schema)? {
            Some(image_value) => image::render_image(schema, &image_value, context),
            None => Ok(Vec::new()),
        },
        FieldKind::Table => match table_rows(value, schema)? {
            Some(rows) => table::render_table(schema, &rows, context, fonts),
            None => Ok(Vec::new()),
        },
        FieldKind::Line => line::render_line(schema, context),
        FieldKind::Unknown => Err(FieldErrorKind::ValueMismatch(
            "the field type is not renderable".to_string(),
        )),
    }
}

/// The string a text field renders: a bound scalar is stringified, an absent or
/// null binding falls back to the schema's default content, and a structured
/// binding is a mismatch.
fn text_value(
    value: Option<&Value>,
    schema: &FieldSchema,
) -> Result<Option<String>, FieldErrorKind> {
    match value {
        None | Some(Value::Null) => Ok(schema.content.clone()),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(Value::Bool(boolean)) => Ok(Some(boolean.to_string())),
        Some(other) => Err(FieldErrorKind::ValueMismatch(format!(
            "a text field cannot render a JSON {}",
            json_kind(other)
        ))),
    }
}

/// Image fields consume strings only: a data URI or bare base64.
fn image_value(
    value: Option<&Value>,
    schema: &FieldSchema,
) -> Result<Option<String>, FieldErrorKind> {
    match value {
        None | Some(Value::Null) => Ok(schema.content.clone()),
        Some(Value::String(encoded)) => Ok(Some(encoded.clone())),
        Some(other) => Err(FieldErrorKind::ValueMismatch(format!(
            "an image field needs a string value, got a JSON {}",
            json_kind(other)
        ))),
    }
}

/// Table fields consume a two-dimensional array of scalar cells. The default
/// content of a table field is itself a JSON-encoded array of rows, mirroring
/// how designers store the sample rows inline.
fn table_rows(
    value: Option<&Value>,
    schema: &FieldSchema,
) -> Result<Option<Vec<Vec<String>>>, FieldErrorKind> {
    let bound = match value {
        None | Some(Value::Null) => match &schema.content {
            None => return Ok(None),
            Some(content) => serde_json::from_str::<Value>(content).map_err(|error| {
                FieldErrorKind::ValueMismatch(format!(
                    "the default table content is not valid JSON: {}",
                    error
                ))
            })?,
        },
        Some(value) => value.clone(),
    };
    let Value::Array(rows) = bound else {
        return Err(FieldErrorKind::ValueMismatch(format!(
            "a table field needs an array of rows, got a JSON {}",
            json_kind(&bound)
        )));
    };
    rows.into_iter()
        .map(|row| {
            let Value::Array(cells) = row else {
                return Err(FieldErrorKind::ValueMismatch(
                    "each table row must be an array of cells".to_string(),
                ));
            };
            cells
                .into_iter()
                .map(|cell| match cell {
                    Value::String(text) => Ok(text),
                    Value::Number(number) => Ok(number.to_string()),
                    Value::Bool(boolean) => Ok(boolean.to_string()),
                    Value::Null => Ok(String::new()),
                    other => Err(FieldErrorKind::ValueMismatch(format!(
                        "a table cell cannot render a JSON {}",
                        json_kind(&other)
                    ))),
                })
                .collect()
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
