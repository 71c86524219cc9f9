mod common;

use base64::Engine as _;
use common::{count_operator, form_operations, page_operations, parse_template, record};
use platen::{FieldErrorKind, FontTable, GenerateError};
use serde_json::json;

fn from_points(points: f32) -> f32 {
    points / 2.834646
}

fn builtin_only() -> FontTable {
    FontTable::load(Vec::new()).unwrap()
}

fn literal_texts(operations: &[lopdf::content::Operation]) -> Vec<String> {
    operations
        .iter()
        .filter(|operation| operation.operator == "Tj")
        .filter_map(|operation| match operation.operands.first() {
            Some(lopdf::Object::String(bytes, _)) => {
                Some(String::from_utf8_lossy(bytes).into_owned())
            }
            _ => None,
        })
        .collect()
}

fn number(object: &lopdf::Object) -> f32 {
    match object {
        lopdf::Object::Integer(value) => *value as f32,
        lopdf::Object::Real(value) => *value,
        other => panic!("expected a number, got {other:?}"),
    }
}

#[test]
fn the_same_batch_renders_byte_identically() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            {
                "title": {
                    "type": "text",
                    "position": { "x": 20.0, "y": 15.0 },
                    "width": 170.0, "height": 12.0,
                    "fontSize": 18.0
                },
                "amount": {
                    "type": "text",
                    "position": { "x": 120.0, "y": 40.0 },
                    "width": 70.0, "height": 8.0,
                    "alignment": "right"
                },
                "items": {
                    "type": "table",
                    "position": { "x": 20.0, "y": 60.0 },
                    "width": 170.0, "height": 120.0,
                    "columns": [100.0, 70.0]
                },
                "rule": {
                    "type": "line",
                    "position": { "x": 20.0, "y": 55.0 },
                    "width": 170.0, "height": 0.5
                }
            }
        ]
    }));
    let inputs = vec![
        record(json!({
            "title": "Invoice 2024-001",
            "amount": "1,250.00",
            "items": [["Consulting", "1,000.00"], ["Travel", "250.00"]]
        })),
        record(json!({
            "title": "Invoice 2024-002",
            "amount": "80.00",
            "items": [["Hosting", "80.00"]]
        })),
    ];
    let fonts = builtin_only();

    let first = platen::generate(&template, &inputs, &fonts).unwrap();
    let second = platen::generate(&template, &inputs, &fonts).unwrap();
    assert!(first.failures.is_empty());
    assert_eq!(first.bytes, second.bytes);

    // The document identifier is derived from the batch, not from a clock or
    // an rng, and both array entries carry the same value.
    let document = lopdf::Document::load_mem(&first.bytes).unwrap();
    let identifier = document.trailer.get(b"ID").unwrap().as_array().unwrap();
    assert_eq!(identifier.len(), 2);
    assert_eq!(identifier[0], identifier[1]);
    match &identifier[0] {
        lopdf::Object::String(bytes, _) => assert_eq!(bytes.len(), 64),
        other => panic!("expected a string identifier, got {other:?}"),
    }
}

#[test]
fn records_multiply_template_pages_in_order() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            { "title": {
                "type": "text",
                "position": { "x": 10.0, "y": 10.0 },
                "width": 100.0, "height": 10.0
            } },
            { "footer": {
                "type": "text",
                "position": { "x": 10.0, "y": 280.0 },
                "width": 100.0, "height": 10.0
            } }
        ]
    }));
    let inputs = vec![
        record(json!({ "title": "alpha", "footer": "one" })),
        record(json!({ "title": "beta", "footer": "two" })),
        record(json!({ "title": "gamma", "footer": "three" })),
    ];
    let generated = platen::generate(&template, &inputs, &builtin_only()).unwrap();

    let pages = page_operations(&generated.bytes);
    assert_eq!(pages.len(), 6);
    let expected = ["alpha", "one", "beta", "two", "gamma", "three"];
    for (page, marker) in pages.iter().zip(expected) {
        assert_eq!(literal_texts(page), vec![marker.to_string()]);
    }
}

#[test]
fn default_content_fills_unbound_fields() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            { "note": {
                "type": "text",
                "position": { "x": 10.0, "y": 10.0 },
                "width": 150.0, "height": 10.0,
                "content": "paid in full"
            } }
        ]
    }));
    let inputs = vec![record(json!({})), record(json!({ "note": "overdue" }))];
    let generated = platen::generate(&template, &inputs, &builtin_only()).unwrap();

    let pages = page_operations(&generated.bytes);
    assert_eq!(literal_texts(&pages[0]), vec!["paid in full".to_string()]);
    assert_eq!(literal_texts(&pages[1]), vec!["overdue".to_string()]);
}

#[test]
fn duplicate_field_names_fail_validation() {
    // The json! macro folds duplicate keys, so this one parses from text, which
    // is where duplicates actually arrive from.
    let template = platen::Template::from_json(
        r#"{
            "basePdf": { "width": 210.0, "height": 297.0 },
            "schemas": [{
                "amount": { "type": "text", "position": { "x": 10, "y": 10 }, "width": 50, "height": 10 },
                "amount": { "type": "text", "position": { "x": 10, "y": 30 }, "width": 50, "height": 10 }
            }]
        }"#,
    )
    .unwrap();

    let error = platen::generate(&template, &[record(json!({}))], &builtin_only()).unwrap_err();
    match error {
        GenerateError::SchemaInvalid(violations) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].field, "amount");
            assert_eq!(violations[0].page, 0);
        }
        other => panic!("expected a validation failure, got {other}"),
    }
}

#[test]
fn unknown_field_types_fail_validation() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            { "code": {
                "type": "qrcode",
                "position": { "x": 10.0, "y": 10.0 },
                "width": 30.0, "height": 30.0
            } }
        ]
    }));
    let error = platen::generate(&template, &[record(json!({}))], &builtin_only()).unwrap_err();
    match error {
        GenerateError::SchemaInvalid(violations) => {
            assert_eq!(violations.len(), 1);
            assert!(violations[0].problem.contains("not one of"));
        }
        other => panic!("expected a validation failure, got {other}"),
    }
}

#[test]
fn clipped_fields_drop_lines_that_grown_fields_keep() {
    let field = |overflow: &str| {
        parse_template(json!({
            "basePdf": { "width": 210.0, "height": 297.0 },
            "schemas": [
                { "words": {
                    "type": "text",
                    "position": { "x": 10.0, "y": 10.0 },
                    "width": from_points(6.2), "height": from_points(10.2),
                    "fontSize": 10.0,
                    "overflow": overflow
                } }
            ]
        }))
    };
    let inputs = vec![record(json!({ "words": "a b c" }))];
    let fonts = builtin_only();

    let grown = platen::generate(&field("grow"), &inputs, &fonts).unwrap();
    let clipped = platen::generate(&field("clip"), &inputs, &fonts).unwrap();
    assert!(grown.failures.is_empty());
    assert!(clipped.failures.is_empty());

    let grown_pages = page_operations(&grown.bytes);
    let clipped_pages = page_operations(&clipped.bytes);
    assert_eq!(count_operator(&grown_pages[0], "Tj"), 3);
    assert_eq!(count_operator(&clipped_pages[0], "Tj"), 1);
}

#[test]
fn tables_draw_grid_strokes_and_cell_text() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            { "items": {
                "type": "table",
                "position": { "x": 20.0, "y": 20.0 },
                "width": 170.0, "height": 100.0,
                "columns": [100.0, 70.0]
            } }
        ]
    }));
    let inputs = vec![record(json!({
        "items": [["first", "1.00"], ["second", "2.00"]]
    }))];
    let generated = platen::generate(&template, &inputs, &builtin_only()).unwrap();

    let pages = page_operations(&generated.bytes);
    // 3 horizontal strokes around 2 rows, 3 vertical strokes around 2 columns.
    assert_eq!(count_operator(&pages[0], "S"), 6);
    assert_eq!(count_operator(&pages[0], "Tj"), 4);
}

#[test]
fn a_failing_field_never_aborts_the_batch() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            {
                "photo": {
                    "type": "image",
                    "position": { "x": 10.0, "y": 10.0 },
                    "width": 50.0, "height": 50.0
                },
                "caption": {
                    "type": "text",
                    "position": { "x": 10.0, "y": 70.0 },
                    "width": 100.0, "height": 10.0
                }
            }
        ]
    }));
    let inputs = vec![record(json!({
        "photo": "data:image/png;base64,@@not-base64@@",
        "caption": "still here"
    }))];
    let generated = platen::generate(&template, &inputs, &builtin_only()).unwrap();

    assert_eq!(generated.failures.len(), 1);
    assert_eq!(generated.failures[0].field, "photo");
    assert_eq!(generated.failures[0].record, 0);
    assert!(matches!(
        generated.failures[0].error,
        FieldErrorKind::ImageDecodeFailed(_)
    ));

    let pages = page_operations(&generated.bytes);
    assert_eq!(literal_texts(&pages[0]), vec!["still here".to_string()]);
}

#[test]
fn table_overflow_fails_the_field_but_not_the_batch() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            { "items": {
                "type": "table",
                "position": { "x": 20.0, "y": 20.0 },
                "width": 100.0, "height": 5.0,
                "columns": [100.0]
            } }
        ]
    }));
    let inputs = vec![record(json!({
        "items": [["one"], ["two"], ["three"]]
    }))];
    let generated = platen::generate(&template, &inputs, &builtin_only()).unwrap();

    assert_eq!(generated.failures.len(), 1);
    assert!(matches!(
        generated.failures[0].error,
        FieldErrorKind::ContentOverflow(_)
    ));
    assert_eq!(page_operations(&generated.bytes).len(), 1);
}

fn png_data_uri() -> String {
    let mut pixels = image::RgbImage::new(2, 2);
    for pixel in pixels.pixels_mut() {
        *pixel = image::Rgb([200, 40, 40]);
    }
    let mut encoded = Vec::new();
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(
            &mut std::io::Cursor::new(&mut encoded),
            image::ImageFormat::Png,
        )
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(encoded)
    )
}

#[test]
fn identical_image_content_embeds_one_xobject() {
    let template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            {
                "left": {
                    "type": "image",
                    "position": { "x": 10.0, "y": 10.0 },
                    "width": 50.0, "height": 50.0
                },
                "right": {
                    "type": "image",
                    "position": { "x": 100.0, "y": 10.0 },
                    "width": 50.0, "height": 50.0
                }
            }
        ]
    }));
    let uri = png_data_uri();
    let inputs = vec![record(json!({ "left": uri, "right": uri }))];
    let generated = platen::generate(&template, &inputs, &builtin_only()).unwrap();
    assert!(generated.failures.is_empty());

    let pages = page_operations(&generated.bytes);
    assert_eq!(count_operator(&pages[0], "Do"), 2);

    let document = lopdf::Document::load_mem(&generated.bytes).unwrap();
    let images = document
        .objects
        .values()
        .filter(|object| {
            object
                .as_stream()
                .map(|stream| {
                    stream
                        .dict
                        .get(b"Subtype")
                        .and_then(|subtype| subtype.as_name())
                        .map(|subtype| subtype == b"Image")
                        .unwrap_or(false)
                })
                .unwrap_or(false)
        })
        .count();
    assert_eq!(images, 1);
}

#[test]
fn a_base_document_is_stamped_not_redrawn() {
    // The base is itself generated: one page with a fixed caption.
    let base_template = parse_template(json!({
        "basePdf": { "width": 210.0, "height": 297.0 },
        "schemas": [
            { "watermark": {
                "type": "text",
                "position": { "x": 60.0, "y": 140.0 },
                "width": 90.0, "height": 12.0,
                "content": "BASE"
            } }
        ]
    }));
    let fonts = builtin_only();
    let base = platen::generate(&base_template, &[record(json!({}))], &fonts).unwrap();
    assert!(base.failures.is_empty());

    let overlay_template = parse_template(json!({
        "basePdf": format!(
            "data:application/pdf;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&base.bytes)
        ),
        "schemas": [
            { "name": {
                "type": "text",
                "position": { "x": 20.0, "y": 20.0 },
                "width": 100.0, "height": 10.0
            } }
        ]
    }));
    let inputs = vec![
        record(json!({ "name": "first" })),
        record(json!({ "name": "second" })),
    ];
    let overlaid = platen::generate(&overlay_template, &inputs, &fonts).unwrap();
    assert!(overlaid.failures.is_empty());

    let pages = page_operations(&overlaid.bytes);
    assert_eq!(pages.len(), 2);
    for page in &pages {
        // The page streams hold the base text and the overlay invocation; the
        // overlay text itself lives in the stamped form.
        assert!(literal_texts(page).contains(&"BASE".to_string()));
        assert_eq!(count_operator(page, "Do"), 1);
    }

    let document = lopdf::Document::load_mem(&overlaid.bytes).unwrap();
    for (page_number, marker) in [(1u32, "first"), (2u32, "second")] {
        let forms = form_operations(&overlaid.bytes, page_number);
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].0, "Stamp0");
        assert!(literal_texts(&forms[0].1).contains(&marker.to_string()));

        let page_id = *document.get_pages().get(&page_number).unwrap();
        let page = document.get_dictionary(page_id).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 3);

        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert!((number(&media_box[2]) - 595.27).abs() < 0.1);
        assert!((number(&media_box[3]) - 841.89).abs() < 0.1);
    }
}

#[test]
fn a_corrupt_base_document_aborts_with_no_bytes() {
    let template = parse_template(json!({
        "basePdf": format!(
            "data:application/pdf;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.5 but cut short")
        ),
        "schemas": [
            { "name": {
                "type": "text",
                "position": { "x": 20.0, "y": 20.0 },
                "width": 100.0, "height": 10.0
            } }
        ]
    }));
    let error =
        platen::generate(&template, &[record(json!({ "name": "x" }))], &builtin_only())
            .unwrap_err();
    assert!(matches!(error, GenerateError::AssemblyFailed(_)));
}

#[test]
fn templates_round_trip_through_their_json_shape() {
    let source = json!({
        "basePdf": { "width": 210.0, "height": 297.0, "orientation": "portrait" },
        "schemas": [
            {
                "title": {
                    "type": "text",
                    "position": { "x": 20.0, "y": 20.0 },
                    "width": 170.0, "height": 12.0,
                    "content": "Invoice",
                    "fontSize": 18.0,
                    "alignment": "center",
                    "overflow": "clip",
                    "fit": "contain"
                },
                "items": {
                    "type": "table",
                    "position": { "x": 20.0, "y": 40.0 },
                    "width": 170.0, "height": 100.0,
                    "alignment": "left",
                    "overflow": "grow",
                    "fit": "contain",
                    "columns": [100.0, 70.0]
                }
            }
        ]
    });
    let template = parse_template(source.clone());
    let rendered: serde_json::Value =
        serde_json::from_str(&template.to_json().unwrap()).unwrap();
    similar_asserts::assert_eq!(source, rendered);
}
