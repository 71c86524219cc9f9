//! Shared fixtures for the integration tests: a tiny TrueType builder, so that
//! font-dependent behavior is testable without checked-in binaries, and helpers
//! that parse generated documents back for inspection.

#![allow(dead_code)]

use serde_json::{Map, Value};

/// Builds a structurally valid TrueType font in memory. Each inclusive
/// codepoint range maps onto consecutive glyph ids starting after `.notdef`,
/// every glyph advances by `advance` font units, and the em square is 1000
/// units with an 800 ascender and a 200 descender. Ranges must be sorted and
/// disjoint. Outlines are empty, which never matters for layout or embedding.
pub fn build_font(ranges: &[(u16, u16)], advance: u16) -> Vec<u8> {
    let glyph_count: u16 = 1 + ranges
        .iter()
        .map(|(start, end)| end - start + 1)
        .sum::<u16>();

    let mut head = Vec::new();
    head.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // version
    head.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // fontRevision
    head.extend_from_slice(&0u32.to_be_bytes()); // checkSumAdjustment
    head.extend_from_slice(&0x5F0F_3CF5u32.to_be_bytes()); // magicNumber
    head.extend_from_slice(&0u16.to_be_bytes()); // flags
    head.extend_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    head.extend_from_slice(&0i64.to_be_bytes()); // created
    head.extend_from_slice(&0i64.to_be_bytes()); // modified
    head.extend_from_slice(&0i16.to_be_bytes()); // xMin
    head.extend_from_slice(&(-200i16).to_be_bytes()); // yMin
    head.extend_from_slice(&(advance as i16).to_be_bytes()); // xMax
    head.extend_from_slice(&800i16.to_be_bytes()); // yMax
    head.extend_from_slice(&0u16.to_be_bytes()); // macStyle
    head.extend_from_slice(&8u16.to_be_bytes()); // lowestRecPPEM
    head.extend_from_slice(&2i16.to_be_bytes()); // fontDirectionHint
    head.extend_from_slice(&0i16.to_be_bytes()); // indexToLocFormat: short
    head.extend_from_slice(&0i16.to_be_bytes()); // glyphDataFormat

    let mut hhea = Vec::new();
    hhea.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    hhea.extend_from_slice(&800i16.to_be_bytes()); // ascender
    hhea.extend_from_slice(&(-200i16).to_be_bytes()); // descender
    hhea.extend_from_slice(&0i16.to_be_bytes()); // lineGap
    hhea.extend_from_slice(&advance.to_be_bytes()); // advanceWidthMax
    hhea.extend_from_slice(&0i16.to_be_bytes()); // minLeftSideBearing
    hhea.extend_from_slice(&0i16.to_be_bytes()); // minRightSideBearing
    hhea.extend_from_slice(&(advance as i16).to_be_bytes()); // xMaxExtent
    hhea.extend_from_slice(&1i16.to_be_bytes()); // caretSlopeRise
    hhea.extend_from_slice(&0i16.to_be_bytes()); // caretSlopeRun
    hhea.extend_from_slice(&0i16.to_be_bytes()); // caretOffset
    hhea.extend_from_slice(&[0u8; 8]); // reserved
    hhea.extend_from_slice(&0i16.to_be_bytes()); // metricDataFormat
    hhea.extend_from_slice(&glyph_count.to_be_bytes()); // numberOfHMetrics

    let mut maxp = Vec::new();
    maxp.extend_from_slice(&0x0000_5000u32.to_be_bytes()); // version 0.5
    maxp.extend_from_slice(&glyph_count.to_be_bytes());

    let mut hmtx = Vec::new();
    for _ in 0..glyph_count {
        hmtx.extend_from_slice(&advance.to_be_bytes());
        hmtx.extend_from_slice(&0i16.to_be_bytes()); // left side bearing
    }

    // Short-format offsets, all zero: every glyph is an empty outline.
    let mut loca = Vec::new();
    for _ in 0..=glyph_count {
        loca.extend_from_slice(&0u16.to_be_bytes());
    }
    let glyf = vec![0u8; 4];

    let cmap = build_cmap(ranges);

    let tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap),
        (*b"glyf", glyf),
        (*b"head", head),
        (*b"hhea", hhea),
        (*b"hmtx", hmtx),
        (*b"loca", loca),
        (*b"maxp", maxp),
    ];

    let table_count = tables.len() as u16;
    let mut search_range = 1u16;
    let mut entry_selector = 0u16;
    while search_range * 2 <= table_count {
        search_range *= 2;
        entry_selector += 1;
    }
    search_range *= 16;
    let range_shift = table_count * 16 - search_range;

    let mut font = Vec::new();
    font.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // sfnt version
    font.extend_from_slice(&table_count.to_be_bytes());
    font.extend_from_slice(&search_range.to_be_bytes());
    font.extend_from_slice(&entry_selector.to_be_bytes());
    font.extend_from_slice(&range_shift.to_be_bytes());

    let mut offset = 12 + 16 * tables.len() as u32;
    let mut records = Vec::new();
    let mut body = Vec::new();
    for (tag, table) in tables {
        let length = table.len() as u32;
        let mut padded = table;
        while padded.len() % 4 != 0 {
            padded.push(0);
        }
        records.push((tag, table_checksum(&padded), offset, length));
        offset += padded.len() as u32;
        body.extend_from_slice(&padded);
    }
    for (tag, checksum, start, length) in records {
        font.extend_from_slice(&tag);
        font.extend_from_slice(&checksum.to_be_bytes());
        font.extend_from_slice(&start.to_be_bytes());
        font.extend_from_slice(&length.to_be_bytes());
    }
    font.extend_from_slice(&body);
    font
}

/// A format 4 subtable under the Windows Unicode BMP encoding, one segment per
/// range plus the required `0xffff` terminator. Consecutive glyph assignment
/// makes every segment a plain delta segment.
fn build_cmap(ranges: &[(u16, u16)]) -> Vec<u8> {
    let segment_count = ranges.len() as u16 + 1;
    let mut search_range = 1u16;
    let mut entry_selector = 0u16;
    while search_range * 2 <= segment_count {
        search_range *= 2;
        entry_selector += 1;
    }
    search_range *= 2;
    let range_shift = segment_count * 2 - search_range;

    let mut subtable = Vec::new();
    subtable.extend_from_slice(&4u16.to_be_bytes()); // format
    subtable.extend_from_slice(&(16 + 8 * segment_count).to_be_bytes()); // length
    subtable.extend_from_slice(&0u16.to_be_bytes()); // language
    subtable.extend_from_slice(&(segment_count * 2).to_be_bytes());
    subtable.extend_from_slice(&search_range.to_be_bytes());
    subtable.extend_from_slice(&entry_selector.to_be_bytes());
    subtable.extend_from_slice(&range_shift.to_be_bytes());
    for (_, end) in ranges {
        subtable.extend_from_slice(&end.to_be_bytes());
    }
    subtable.extend_from_slice(&0xFFFFu16.to_be_bytes());
    subtable.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
    for (start, _) in ranges {
        subtable.extend_from_slice(&start.to_be_bytes());
    }
    subtable.extend_from_slice(&0xFFFFu16.to_be_bytes());
    let mut first_glyph = 1u16;
    for (start, end) in ranges {
        subtable.extend_from_slice(&first_glyph.wrapping_sub(*start).to_be_bytes());
        first_glyph += end - start + 1;
    }
    subtable.extend_from_slice(&1u16.to_be_bytes()); // the terminator maps to .notdef
    for _ in 0..segment_count {
        subtable.extend_from_slice(&0u16.to_be_bytes()); // idRangeOffset
    }

    let mut cmap = Vec::new();
    cmap.extend_from_slice(&0u16.to_be_bytes()); // version
    cmap.extend_from_slice(&1u16.to_be_bytes()); // one encoding record
    cmap.extend_from_slice(&3u16.to_be_bytes()); // platform: Windows
    cmap.extend_from_slice(&1u16.to_be_bytes()); // encoding: Unicode BMP
    cmap.extend_from_slice(&12u32.to_be_bytes()); // subtable offset
    cmap.extend_from_slice(&subtable);
    cmap
}

fn table_checksum(padded: &[u8]) -> u32 {
    padded
        .chunks(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .fold(0u32, u32::wrapping_add)
}

pub fn parse_template(value: Value) -> platen::Template {
    platen::Template::from_json(&value.to_string()).unwrap()
}

pub fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("input records are JSON objects, got {other}"),
    }
}

/// Parses generated bytes back and decodes the content stream operations of
/// every page, in page order. Overlay forms are not followed; use
/// [`form_operations`] for content stamped over a base document.
pub fn page_operations(bytes: &[u8]) -> Vec<Vec<lopdf::content::Operation>> {
    let document = lopdf::Document::load_mem(bytes).unwrap();
    document
        .get_pages()
        .values()
        .map(|&page_id| {
            let content = document.get_page_content(page_id).unwrap();
            lopdf::content::Content::decode(&content).unwrap().operations
        })
        .collect()
}

/// Decodes the operations of every form XObject reachable from the page's
/// resources, keyed by resource name, for inspecting stamped overlay content.
pub fn form_operations(bytes: &[u8], page_number: u32) -> Vec<(String, Vec<lopdf::content::Operation>)> {
    let document = lopdf::Document::load_mem(bytes).unwrap();
    let page_id = *document.get_pages().get(&page_number).unwrap();
    let page = document.get_dictionary(page_id).unwrap();
    let resources = match page.get(b"Resources").unwrap() {
        lopdf::Object::Reference(reference) => {
            document.get_dictionary(*reference).unwrap().clone()
        }
        lopdf::Object::Dictionary(dictionary) => dictionary.clone(),
        other => panic!("unexpected resources object: {other:?}"),
    };
    let Ok(xobjects) = resources.get(b"XObject") else {
        return Vec::new();
    };
    let xobjects = match xobjects {
        lopdf::Object::Reference(reference) => document.get_dictionary(*reference).unwrap().clone(),
        lopdf::Object::Dictionary(dictionary) => dictionary.clone(),
        other => panic!("unexpected XObject entry: {other:?}"),
    };
    let mut forms = Vec::new();
    for (name, value) in xobjects.iter() {
        let stream = match value {
            lopdf::Object::Reference(reference) => document.get_object(*reference).unwrap(),
            direct => direct,
        };
        let stream = stream.as_stream().unwrap();
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(|subtype| subtype.as_name())
            .map(|subtype| subtype == b"Form")
            .unwrap_or(false);
        if !is_form {
            continue;
        }
        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        forms.push((
            String::from_utf8_lossy(name).into_owned(),
            lopdf::content::Content::decode(&content).unwrap().operations,
        ));
    }
    forms
}

pub fn count_operator(operations: &[lopdf::content::Operation], operator: &str) -> usize {
    operations
        .iter()
        .filter(|operation| operation.operator == operator)
        .count()
}
