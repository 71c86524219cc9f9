use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::BufWriter;
use std::mem;

use lopdf::content::{Content, Operation};
use lopdf::{Object, ObjectId, StringFormat};
use owned_ttf_parser::{AsFaceRef, Face, GlyphId};
use time::OffsetDateTime;

use crate::draw::{DecodedImage, DrawOp, ImagePayload};
use crate::error::GenerateError;
use crate::font::{FontSelection, FontTable, LoadedFace, BUILTIN_FONT_NAME};
use crate::layout::RecordLayout;
use crate::template::{decode_binary_content, BasePdf};
use crate::units::PageGeometry;

/// The canvas resolved before any record is laid out: the size of every
/// template page, plus the parsed base document when the template brings one.
pub(crate) struct PreparedBase {
    geometries: Vec<PageGeometry>,
    kind: BaseKind,
}

enum BaseKind {
    Blank,
    Overlay {
        document: lopdf::Document,
        /// Template page index to base page index. A template with more pages
        /// than the base repeats the last base page.
        page_map: Vec<usize>,
        /// The `MediaBox` of each base page, resolved through the page tree.
        media_boxes: Vec<[f32; 4]>,
    },
}

impl PreparedBase {
    pub(crate) fn geometries(&self) -> &[PageGeometry] {
        &self.geometries
    }
}

/// Resolves the template's canvas into per-page geometries. A blank canvas is a
/// declaration and cannot fail past this point; an encoded base document is
/// decoded and parsed here, once, before the per-record work starts.
pub(crate) fn prepare_base(
    base_pdf: &BasePdf,
    page_count: usize,
) -> Result<PreparedBase, GenerateError> {
    match base_pdf {
        BasePdf::Blank(blank_page) => Ok(PreparedBase {
            geometries: vec![PageGeometry::from_blank_page(blank_page); page_count],
            kind: BaseKind::Blank,
        }),
        BasePdf::Document(encoded) => {
            let bytes = decode_binary_content(encoded).map_err(|error| {
                GenerateError::AssemblyFailed(format!(
                    "the base document is not valid base64: {error}"
                ))
            })?;
            let document = lopdf::Document::load_mem(&bytes).map_err(|error| {
                GenerateError::AssemblyFailed(format!(
                    "the base document could not be parsed: {error}"
                ))
            })?;
            if document.trailer.has(b"Encrypt") {
                return Err(GenerateError::AssemblyFailed(
                    "the base document is encrypted".to_string(),
                ));
            }
            let page_ids: Vec<ObjectId> = document.get_pages().values().copied().collect();
            if page_ids.is_empty() {
                return Err(GenerateError::AssemblyFailed(
                    "the base document has no pages".to_string(),
                ));
            }
            let mut media_boxes = Vec::with_capacity(page_ids.len());
            for (index, page_id) in page_ids.iter().enumerate() {
                let media_box = page_media_box(&document, *page_id).ok_or_else(|| {
                    GenerateError::AssemblyFailed(format!(
                        "the base document page {} declares no usable MediaBox",
                        index + 1
                    ))
                })?;
                media_boxes.push(media_box);
            }
            let page_map: Vec<usize> = (0..page_count)
                .map(|index| index.min(page_ids.len() - 1))
                .collect();
            let geometries = page_map
                .iter()
                .map(|&base_index| PageGeometry::from_media_box(media_boxes[base_index]))
                .collect();
            Ok(PreparedBase {
                geometries,
                kind: BaseKind::Overlay {
                    document,
                    page_map,
                    media_boxes,
                },
            })
        }
    }
}

/// Everything the assembler keeps of one base page: a clone of its dictionary,
/// its content streams in order, its effective resources split around the
/// `XObject` category, and the overlay name no base resource already takes.
struct BasePagePart {
    dictionary: lopdf::Dictionary,
    contents: Vec<ObjectId>,
    resources: lopdf::Dictionary,
    xobjects: lopdf::Dictionary,
    stamp: String,
    media_box: [f32; 4],
}

/// Writes the laid-out records into one document and serializes it. Pages run
/// in record order, the template's pages within each record. The same inputs
/// produce the same bytes: object numbering follows the build order, the info
/// timestamps are pinned, and the file identifier is the given batch digest.
pub(crate) fn assemble(
    base: PreparedBase,
    layouts: &[RecordLayout],
    fonts: &FontTable,
    batch_digest: &[u8; 32],
) -> Result<Vec<u8>, GenerateError> {
    use lopdf::Object::*;
    use lopdf::StringFormat::*;

    let PreparedBase { geometries, kind } = base;
    let mut document = lopdf::Document::with_version("1.5");
    let pages_id = document.new_object_id();

    // Merge the base document's objects in before anything of our own, so that
    // every reference inside its page dictionaries stays valid.
    let mut base_parts: Vec<BasePagePart> = Vec::new();
    let mut guard_id = None;
    if let BaseKind::Overlay {
        document: mut base_document,
        page_map,
        media_boxes,
    } = kind
    {
        // Never downgrade the header version below what the base declares.
        if base_document.version.as_str() > document.version.as_str() {
            document.version = base_document.version.clone();
        }
        base_document.renumber_objects_with(document.max_id + 1);
        document.max_id = base_document.max_id;
        let base_page_ids: Vec<ObjectId> = base_document.get_pages().values().copied().collect();
        for &base_index in &page_map {
            let page_id = base_page_ids[base_index];
            let dictionary = base_document
                .get_dictionary(page_id)
                .map_err(|error| {
                    GenerateError::AssemblyFailed(format!(
                        "the base document page {} could not be read: {error}",
                        base_index + 1
                    ))
                })?
                .clone();
            let contents = content_stream_ids(&base_document, &dictionary);
            let mut resources = page_effective_resources(&base_document, page_id);
            let xobjects = match resources.remove(b"XObject") {
                Some(Dictionary(subdictionary)) => subdictionary,
                Some(Reference(reference)) => base_document
                    .get_object(reference)
                    .ok()
                    .and_then(|object| object.as_dict().ok())
                    .cloned()
                    .unwrap_or_else(lopdf::Dictionary::new),
                _ => lopdf::Dictionary::new(),
            };
            let taken: HashSet<Vec<u8>> = xobjects.iter().map(|(key, _)| key.to_vec()).collect();
            base_parts.push(BasePagePart {
                dictionary,
                contents,
                resources,
                xobjects,
                stamp: free_stamp_name(&taken),
                media_box: media_boxes[base_index],
            });
        }
        document
            .objects
            .extend(mem::take(&mut base_document.objects));
        // Base content may leave the graphics state unbalanced; the guard's `q`
        // is popped by the overlay invoker's `Q` before the form runs.
        guard_id = Some(document.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            b"q\n".to_vec(),
        )));
    }

    // Fonts and images embed once each, keyed by content, in the order the
    // batch first uses them. Iteration never runs over a hash map here, so the
    // object numbering is reproducible.
    let mut font_names = HashMap::new();
    let mut image_names = HashMap::new();
    let mut font_resources = lopdf::Dictionary::new();
    let mut xobject_resources = lopdf::Dictionary::new();
    let mut fonts_by_digest: HashMap<[u8; 32], std::string::String> = HashMap::new();
    let mut face_count = 0usize;
    let mut image_count = 0usize;
    for layout in layouts {
        for operations in &layout.pages {
            for operation in operations {
                match operation {
                    DrawOp::TextRun { font, .. } => {
                        if font_names.contains_key(font) {
                            continue;
                        }
                        match font {
                            FontSelection::Builtin => {
                                let reference = embed_builtin_font(&mut document);
                                font_resources.set("FB", Reference(reference));
                                font_names.insert(*font, "FB".to_string());
                            }
                            FontSelection::Face(index) => {
                                let face = &fonts.faces()[*index];
                                if let Some(name) = fonts_by_digest.get(&face.digest) {
                                    font_names.insert(*font, name.clone());
                                    continue;
                                }
                                let name = format!("F{face_count}");
                                face_count += 1;
                                let reference = embed_composite_font(&mut document, face);
                                font_resources.set(name.as_str(), Reference(reference));
                                fonts_by_digest.insert(face.digest, name.clone());
                                font_names.insert(*font, name);
                            }
                        }
                    }
                    DrawOp::Image { image, .. } => {
                        if image_names.contains_key(&image.digest) {
                            continue;
                        }
                        let name = format!("Im{image_count}");
                        image_count += 1;
                        let reference = embed_image(&mut document, image);
                        xobject_resources.set(name.as_str(), Reference(reference));
                        image_names.insert(image.digest, name);
                    }
                    DrawOp::Line { .. } => {}
                }
            }
        }
    }

    // One resources dictionary serves every blank page and every overlay form.
    let mut resources = lopdf::Dictionary::new();
    if !font_resources.is_empty() {
        resources.set("Font", Dictionary(font_resources));
    }
    if !xobject_resources.is_empty() {
        resources.set("XObject", Dictionary(xobject_resources));
    }
    let resources_id = document.add_object(Dictionary(resources));

    let mut invoker_ids = HashMap::new();
    let mut page_refs: Vec<Object> = Vec::new();
    for layout in layouts {
        for (page_index, operations) in layout.pages.iter().enumerate() {
            let geometry = geometries[page_index];
            let page_id = match base_parts.get(page_index) {
                None => {
                    let encoded =
                        page_content(operations, geometry, &font_names, &image_names, fonts)?;
                    let content_id = document
                        .add_object(lopdf::Stream::new(lopdf::Dictionary::new(), encoded));
                    document.add_object(lopdf::Dictionary::from_iter(vec![
                        ("Type", "Page".into()),
                        ("Parent", Reference(pages_id)),
                        (
                            "MediaBox",
                            vec![
                                0.into(),
                                0.into(),
                                geometry.width.into(),
                                geometry.height.into(),
                            ]
                            .into(),
                        ),
                        ("Resources", Reference(resources_id)),
                        ("Contents", Reference(content_id)),
                    ]))
                }
                Some(part) => {
                    let mut dictionary = part.dictionary.clone();
                    dictionary.set("Parent", Reference(pages_id));
                    // Re-parenting breaks attribute inheritance, so the page
                    // carries its box and resources directly from here on.
                    dictionary.set(
                        "MediaBox",
                        Array(vec![
                            part.media_box[0].into(),
                            part.media_box[1].into(),
                            part.media_box[2].into(),
                            part.media_box[3].into(),
                        ]),
                    );
                    let mut page_resources = part.resources.clone();
                    if operations.is_empty() {
                        if !part.xobjects.is_empty() {
                            page_resources.set("XObject", Dictionary(part.xobjects.clone()));
                        }
                        dictionary.set("Resources", Dictionary(page_resources));
                        document.add_object(dictionary)
                    } else {
                        let encoded =
                            page_content(operations, geometry, &font_names, &image_names, fonts)?;
                        let form = lopdf::Stream::new(
                            lopdf::Dictionary::from_iter(vec![
                                ("Type", Name("XObject".into())),
                                ("Subtype", Name("Form".into())),
                                (
                                    "BBox",
                                    vec![
                                        0.into(),
                                        0.into(),
                                        geometry.width.into(),
                                        geometry.height.into(),
                                    ]
                                    .into(),
                                ),
                                // Base pages may declare an offset MediaBox;
                                // the form maps onto its lower-left corner.
                                (
                                    "Matrix",
                                    vec![
                                        1.into(),
                                        0.into(),
                                        0.into(),
                                        1.into(),
                                        part.media_box[0].into(),
                                        part.media_box[1].into(),
                                    ]
                                    .into(),
                                ),
                                ("Resources", Reference(resources_id)),
                            ]),
                            encoded,
                        );
                        let form_id = document.add_object(form);
                        let invoker_id = match invoker_ids.get(&part.stamp).copied() {
                            Some(reference) => reference,
                            None => {
                                let reference = document.add_object(lopdf::Stream::new(
                                    lopdf::Dictionary::new(),
                                    format!("Q\n/{} Do\n", part.stamp).into_bytes(),
                                ));
                                invoker_ids.insert(part.stamp.clone(), reference);
                                reference
                            }
                        };
                        let mut xobjects = part.xobjects.clone();
                        xobjects.set(part.stamp.as_str(), Reference(form_id));
                        page_resources.set("XObject", Dictionary(xobjects));
                        dictionary.set("Resources", Dictionary(page_resources));
                        let mut contents = Vec::with_capacity(part.contents.len() + 2);
                        if let Some(guard) = guard_id {
                            contents.push(Reference(guard));
                        }
                        contents.extend(part.contents.iter().map(|id| Reference(*id)));
                        contents.push(Reference(invoker_id));
                        dictionary.set("Contents", Array(contents));
                        document.add_object(dictionary)
                    }
                }
            };
            page_refs.push(Reference(page_id));
        }
    }

    let pages = lopdf::Dictionary::from_iter(vec![
        ("Type", "Pages".into()),
        ("Count", Integer(page_refs.len() as i64)),
        ("Kids", Array(page_refs)),
    ]);
    document.objects.insert(pages_id, Dictionary(pages));

    let catalog_id = document.add_object(lopdf::Dictionary::from_iter(vec![
        ("Type", "Catalog".into()),
        ("PageLayout", "OneColumn".into()),
        ("PageMode", "UseNone".into()),
        ("Pages", Reference(pages_id)),
    ]));

    // The timestamps are pinned so that reruns of the same batch byte-match.
    let timestamp = pdf_timestamp(&OffsetDateTime::UNIX_EPOCH);
    let info_id = document.add_object(lopdf::Dictionary::from_iter(vec![
        ("Trapped", "False".into()),
        (
            "CreationDate",
            String(timestamp.clone().into_bytes(), Literal),
        ),
        ("ModDate", String(timestamp.into_bytes(), Literal)),
        ("Producer", String("platen".into(), Literal)),
        ("Creator", String("platen".into(), Literal)),
    ]));

    document.trailer.set("Root", Reference(catalog_id));
    document.trailer.set("Info", Reference(info_id));
    let identifier = hex_digest(batch_digest);
    document.trailer.set(
        "ID",
        Array(vec![
            String(identifier.clone().into_bytes(), Literal),
            String(identifier.into_bytes(), Literal),
        ]),
    );

    write_document_bytes(document)
}

fn write_document_bytes(mut document: lopdf::Document) -> Result<Vec<u8>, GenerateError> {
    document.prune_objects();
    // Zero-length streams are left alone: an empty page keeps an empty content
    // stream, and base documents may carry empty streams their pages reference.
    document.renumber_objects();
    document.compress();

    let mut bytes = Vec::new();
    let mut writer = BufWriter::new(&mut bytes);
    document.save_to(&mut writer).map_err(|error| {
        GenerateError::AssemblyFailed(format!("the document could not be serialized: {error}"))
    })?;
    mem::drop(writer);

    Ok(bytes)
}

/// Translates the drawing primitives of one page into an encoded content
/// stream, flipping the vertical axis into PDF user space.
fn page_content(
    operations: &[DrawOp],
    geometry: PageGeometry,
    font_names: &HashMap<FontSelection, String>,
    image_names: &HashMap<[u8; 32], String>,
    fonts: &FontTable,
) -> Result<Vec<u8>, GenerateError> {
    use lopdf::Object::*;

    let mut encoded = Vec::new();
    for operation in operations {
        match operation {
            DrawOp::TextRun {
                font,
                font_size,
                x,
                y,
                color,
                text,
            } => {
                let Some(name) = font_names.get(font) else {
                    continue;
                };
                encoded.push(Operation::new("BT", vec![]));
                encoded.push(Operation::new(
                    "Tf",
                    vec![name.as_str().into(), (*font_size).into()],
                ));
                encoded.push(Operation::new(
                    "Td",
                    vec![(*x).into(), geometry.flip_y(*y).into()],
                ));
                encoded.push(Operation::new(
                    "rg",
                    vec![Real(color.red), Real(color.green), Real(color.blue)],
                ));
                encoded.push(Operation::new("Tj", vec![encode_text(fonts, *font, text)]));
                encoded.push(Operation::new("ET", vec![]));
            }
            DrawOp::Image {
                image,
                x,
                y,
                width,
                height,
            } => {
                let Some(name) = image_names.get(&image.digest) else {
                    continue;
                };
                encoded.push(Operation::new("q", vec![]));
                encoded.push(Operation::new(
                    "cm",
                    vec![
                        (*width).into(),
                        0.into(),
                        0.into(),
                        (*height).into(),
                        (*x).into(),
                        geometry.flip_y(*y + *height).into(),
                    ],
                ));
                encoded.push(Operation::new("Do", vec![name.as_str().into()]));
                encoded.push(Operation::new("Q", vec![]));
            }
            DrawOp::Line {
                from,
                to,
                stroke_width,
                color,
            } => {
                encoded.push(Operation::new("q", vec![]));
                encoded.push(Operation::new("w", vec![(*stroke_width).into()]));
                encoded.push(Operation::new(
                    "RG",
                    vec![Real(color.red), Real(color.green), Real(color.blue)],
                ));
                encoded.push(Operation::new(
                    "m",
                    vec![from.0.into(), geometry.flip_y(from.1).into()],
                ));
                encoded.push(Operation::new(
                    "l",
                    vec![to.0.into(), geometry.flip_y(to.1).into()],
                ));
                encoded.push(Operation::new("S", vec![]));
                encoded.push(Operation::new("Q", vec![]));
            }
        }
    }

    Content {
        operations: encoded,
    }
    .encode()
    .map_err(|error| {
        GenerateError::AssemblyFailed(format!("a content stream could not be encoded: {error}"))
    })
}

/// Encodes one run for the `Tj` operator. Embedded faces are addressed by
/// two-byte glyph ids under `Identity-H`; the built-in face takes the
/// characters themselves, which shaping has restricted to ASCII.
fn encode_text(fonts: &FontTable, selection: FontSelection, text: &str) -> Object {
    match selection {
        FontSelection::Builtin => {
            Object::String(text.bytes().collect(), StringFormat::Literal)
        }
        FontSelection::Face(index) => {
            let mut bytes = Vec::with_capacity(text.len() * 2);
            for character in text.chars() {
                match fonts.glyph_id(index, character) {
                    Some(glyph) => bytes.extend_from_slice(&glyph.to_be_bytes()),
                    None => log::warn!(
                        "the shaped character {:?} has no glyph in its selected face",
                        character
                    ),
                }
            }
            Object::String(bytes, StringFormat::Hexadecimal)
        }
    }
}

/// Embeds one TrueType face as a `Type0` font with identity CID encoding: the
/// uncompressed font program, a descriptor, per-glyph widths and a `ToUnicode`
/// map so that text extraction sees characters instead of glyph ids.
fn embed_composite_font(document: &mut lopdf::Document, loaded: &LoadedFace) -> ObjectId {
    use lopdf::Object::*;

    let face = loaded.face.as_face_ref();
    let scale = 1000.0 / f32::from(face.units_per_em());
    let base_font = postscript_name(&loaded.name);

    // Length1 must be the exact byte count of the program, so it travels
    // uncompressed.
    let font_file_id = document.add_object(
        lopdf::Stream::new(
            lopdf::Dictionary::from_iter(vec![("Length1", Integer(loaded.data.len() as i64))]),
            loaded.data.as_ref().clone(),
        )
        .with_compression(false),
    );

    let bounding_box = face.global_bounding_box();
    let ascent = glyph_space(face.ascender(), scale);
    let descent = glyph_space(face.descender(), scale);
    let cap_height = face
        .capital_height()
        .map(|height| glyph_space(height, scale))
        .unwrap_or(ascent);
    let descriptor_id = document.add_object(lopdf::Dictionary::from_iter(vec![
        ("Type", Name("FontDescriptor".into())),
        ("FontName", Name(base_font.clone().into_bytes())),
        // Flag 32 declares a nonsymbolic font using the standard Latin set.
        ("Flags", Integer(32)),
        (
            "FontBBox",
            Array(vec![
                Integer(glyph_space(bounding_box.x_min, scale)),
                Integer(glyph_space(bounding_box.y_min, scale)),
                Integer(glyph_space(bounding_box.x_max, scale)),
                Integer(glyph_space(bounding_box.y_max, scale)),
            ]),
        ),
        ("ItalicAngle", Integer(0)),
        ("Ascent", Integer(ascent)),
        ("Descent", Integer(descent)),
        ("CapHeight", Integer(cap_height)),
        ("StemV", Integer(80)),
        ("FontFile2", Reference(font_file_id)),
    ]));

    // W runs: consecutive glyph ids share one `first [w w ...]` entry, broken
    // wherever a glyph has no advance of its own.
    let mut width_ranges: Vec<Object> = Vec::new();
    let mut run: Vec<Object> = Vec::new();
    let mut run_start: u16 = 0;
    let mut next_expected: u16 = 0;
    for glyph in 0..face.number_of_glyphs() {
        let Some(advance) = face.glyph_hor_advance(GlyphId(glyph)) else {
            log::warn!(
                "the glyph {} of the font {:?} has no advance width, it keeps the default",
                glyph,
                loaded.name
            );
            continue;
        };
        if glyph != next_expected {
            if !run.is_empty() {
                width_ranges.push(Integer(i64::from(run_start)));
                width_ranges.push(Array(mem::take(&mut run)));
            }
            run_start = glyph;
        }
        run.push(Integer((f32::from(advance) * scale) as i64));
        next_expected = glyph + 1;
    }
    if !run.is_empty() {
        width_ranges.push(Integer(i64::from(run_start)));
        width_ranges.push(Array(run));
    }

    let descendant = lopdf::Dictionary::from_iter(vec![
        ("Type", Name("Font".into())),
        ("Subtype", Name("CIDFontType2".into())),
        ("BaseFont", Name(base_font.clone().into_bytes())),
        (
            "CIDSystemInfo",
            Dictionary(lopdf::Dictionary::from_iter(vec![
                ("Registry", String("Adobe".into(), StringFormat::Literal)),
                ("Ordering", String("Identity".into(), StringFormat::Literal)),
                ("Supplement", Integer(0)),
            ])),
        ),
        ("DW", Integer(1000)),
        ("W", Array(width_ranges)),
        ("FontDescriptor", Reference(descriptor_id)),
    ]);

    let to_unicode = to_unicode_cmap(&unicode_coverage(face));
    let to_unicode_id = document.add_object(lopdf::Stream::new(
        lopdf::Dictionary::new(),
        to_unicode.into_bytes(),
    ));

    document.add_object(lopdf::Dictionary::from_iter(vec![
        ("Type", Name("Font".into())),
        ("Subtype", Name("Type0".into())),
        ("BaseFont", Name(base_font.into_bytes())),
        ("Encoding", Name("Identity-H".into())),
        ("DescendantFonts", Array(vec![Dictionary(descendant)])),
        ("ToUnicode", Reference(to_unicode_id)),
    ]))
}

/// The built-in face is one of the standard fourteen and embeds as a bare
/// `Type1` dictionary, no program attached.
fn embed_builtin_font(document: &mut lopdf::Document) -> ObjectId {
    use lopdf::Object::*;

    document.add_object(lopdf::Dictionary::from_iter(vec![
        ("Type", Name("Font".into())),
        ("Subtype", Name("Type1".into())),
        ("BaseFont", Name(BUILTIN_FONT_NAME.into())),
        ("Encoding", Name("WinAnsiEncoding".into())),
    ]))
}

fn embed_image(document: &mut lopdf::Document, image: &DecodedImage) -> ObjectId {
    use lopdf::Object::*;

    match &image.payload {
        ImagePayload::Jpeg { data, grayscale } => {
            let color_space = if *grayscale { "DeviceGray" } else { "DeviceRGB" };
            document.add_object(
                lopdf::Stream::new(
                    lopdf::Dictionary::from_iter(vec![
                        ("Type", Name("XObject".into())),
                        ("Subtype", Name("Image".into())),
                        ("Width", Integer(i64::from(image.width))),
                        ("Height", Integer(i64::from(image.height))),
                        ("ColorSpace", Name(color_space.into())),
                        ("BitsPerComponent", Integer(8)),
                        ("Filter", Name("DCTDecode".into())),
                    ]),
                    data.as_ref().clone(),
                )
                .with_compression(false),
            )
        }
        ImagePayload::Rgb { data, alpha } => {
            let mut dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", Name("XObject".into())),
                ("Subtype", Name("Image".into())),
                ("Width", Integer(i64::from(image.width))),
                ("Height", Integer(i64::from(image.height))),
                ("ColorSpace", Name("DeviceRGB".into())),
                ("BitsPerComponent", Integer(8)),
            ]);
            if let Some(alpha) = alpha {
                let mask_id = document.add_object(lopdf::Stream::new(
                    lopdf::Dictionary::from_iter(vec![
                        ("Type", Name("XObject".into())),
                        ("Subtype", Name("Image".into())),
                        ("Width", Integer(i64::from(image.width))),
                        ("Height", Integer(i64::from(image.height))),
                        ("ColorSpace", Name("DeviceGray".into())),
                        ("BitsPerComponent", Integer(8)),
                    ]),
                    alpha.as_ref().clone(),
                ));
                dictionary.set("SMask", Reference(mask_id));
            }
            document.add_object(lopdf::Stream::new(dictionary, data.as_ref().clone()))
        }
    }
}

/// Every unicode codepoint the face maps to a real glyph, keyed by glyph id.
/// The ordered map keeps the `ToUnicode` stream stable across runs.
fn unicode_coverage(face: &Face<'_>) -> BTreeMap<u16, char> {
    let mut coverage = BTreeMap::new();
    if let Some(cmap) = face.tables().cmap {
        for subtable in cmap.subtables.into_iter().filter(|s| s.is_unicode()) {
            subtable.codepoints(|codepoint| {
                if let Ok(character) = char::try_from(codepoint) {
                    if let Some(glyph) = subtable.glyph_index(codepoint).filter(|g| g.0 > 0) {
                        coverage.entry(glyph.0).or_insert(character);
                    }
                }
            });
        }
    }
    coverage
}

const TO_UNICODE_HEAD: &str = "/CIDInit /ProcSet findresource begin\n\
12 dict begin\n\
begincmap\n\
/CIDSystemInfo <<\n\
/Registry (Adobe)\n\
/Ordering (UCS)\n\
/Supplement 0\n\
>> def\n\
/CMapName /Adobe-Identity-UCS def\n\
/CMapType 2 def\n\
1 begincodespacerange\n\
<0000> <ffff>\n\
endcodespacerange\n";

const TO_UNICODE_TAIL: &str = "endcmap\n\
CMapName currentdict /CMap defineresource pop\n\
end\n\
end\n";

/// Renders the glyph-to-character map as a CMap stream. `bfchar` blocks hold at
/// most 100 entries and never cross a high-byte boundary; characters outside
/// the basic plane are written as UTF-16 surrogate pairs.
fn to_unicode_cmap(coverage: &BTreeMap<u16, char>) -> String {
    let mut blocks: Vec<Vec<(u16, char)>> = Vec::new();
    let mut block: Vec<(u16, char)> = Vec::new();
    let mut high_byte: u16 = 0;
    for (&glyph, &character) in coverage {
        if (glyph >> 8) != high_byte || block.len() >= 100 {
            if !block.is_empty() {
                blocks.push(mem::take(&mut block));
            }
            high_byte = glyph >> 8;
        }
        block.push((glyph, character));
    }
    if !block.is_empty() {
        blocks.push(block);
    }

    let mut cmap = String::from(TO_UNICODE_HEAD);
    for block in blocks {
        cmap.push_str(&format!("{} beginbfchar\r\n", block.len()));
        for (glyph, character) in block {
            cmap.push_str(&format!("<{glyph:04x}> <"));
            let mut units = [0u16; 2];
            for unit in character.encode_utf16(&mut units) {
                cmap.push_str(&format!("{unit:04x}"));
            }
            cmap.push_str(">\n");
        }
        cmap.push_str("endbfchar\r\n");
    }
    cmap.push_str(TO_UNICODE_TAIL);
    cmap
}

/// A `BaseFont` entry wants a plain PostScript name; anything else in the
/// user-facing font name is stripped.
fn postscript_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|character| character.is_ascii_alphanumeric() || *character == '-')
        .collect();
    if cleaned.is_empty() {
        "Embedded".to_string()
    } else {
        cleaned
    }
}

fn glyph_space(value: i16, scale: f32) -> i64 {
    (f32::from(value) * scale) as i64
}

fn free_stamp_name(taken: &HashSet<Vec<u8>>) -> String {
    let mut index = 0usize;
    loop {
        let candidate = format!("Stamp{index}");
        if !taken.contains(candidate.as_bytes()) {
            return candidate;
        }
        index += 1;
    }
}

/// The content streams of a page in paint order, whether the page stores one
/// stream, an array, or a reference to either.
fn content_stream_ids(document: &lopdf::Document, page: &lopdf::Dictionary) -> Vec<ObjectId> {
    match page.get(b"Contents") {
        Ok(Object::Reference(reference)) => match document.get_object(*reference) {
            Ok(Object::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_reference().ok())
                .collect(),
            _ => vec![*reference],
        },
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_reference().ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// The resources a page actually renders with, walking `Parent` links for the
/// inheritable entry. Returns an empty dictionary when the chain declares none.
fn page_effective_resources(
    document: &lopdf::Document,
    page_id: ObjectId,
) -> lopdf::Dictionary {
    let mut current = page_id;
    for _ in 0..64 {
        let Ok(dictionary) = document.get_dictionary(current) else {
            break;
        };
        if let Ok(value) = dictionary.get(b"Resources") {
            let resolved = match value {
                Object::Reference(reference) => document
                    .get_object(*reference)
                    .ok()
                    .and_then(|object| object.as_dict().ok()),
                Object::Dictionary(dictionary) => Some(dictionary),
                _ => None,
            };
            if let Some(resources) = resolved {
                return resources.clone();
            }
        }
        match dictionary.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => break,
        }
    }
    lopdf::Dictionary::new()
}

/// The `MediaBox` governing a page, walking `Parent` links when the page
/// inherits it. The walk is depth-capped against cyclic page trees.
fn page_media_box(document: &lopdf::Document, page_id: ObjectId) -> Option<[f32; 4]> {
    let mut current = page_id;
    for _ in 0..64 {
        let dictionary = document.get_dictionary(current).ok()?;
        if let Ok(value) = dictionary.get(b"MediaBox") {
            return media_box_values(document, value);
        }
        match dictionary.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
    None
}

fn media_box_values(document: &lopdf::Document, value: &Object) -> Option<[f32; 4]> {
    let resolved = match value {
        Object::Reference(reference) => document.get_object(*reference).ok()?,
        direct => direct,
    };
    let array = resolved.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, object) in values.iter_mut().zip(array) {
        *slot = object_as_float(object)?;
    }
    Some(values)
}

fn object_as_float(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

/// Formats a time the way the PDF specification expects, for example
/// `D:20170505150224+02'00'`.
fn pdf_timestamp(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}

fn hex_digest(digest: &[u8; 32]) -> String {
    let mut rendered = String::with_capacity(64);
    for byte in digest {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_epoch_timestamp_is_stable() {
        assert_eq!(
            pdf_timestamp(&OffsetDateTime::UNIX_EPOCH),
            "D:19700101000000+00'00'"
        );
    }

    #[test]
    fn digests_render_as_lowercase_hex() {
        assert_eq!(hex_digest(&[0u8; 32]), "0".repeat(64));
        let rendered = hex_digest(&[0xAB; 32]);
        assert!(rendered.starts_with("abab"));
        assert_eq!(rendered.len(), 64);
    }

    #[test]
    fn stamp_names_step_over_taken_ones() {
        let mut taken = HashSet::new();
        assert_eq!(free_stamp_name(&taken), "Stamp0");
        taken.insert(b"Stamp0".to_vec());
        taken.insert(b"Stamp1".to_vec());
        assert_eq!(free_stamp_name(&taken), "Stamp2");
    }

    #[test]
    fn media_boxes_inherit_through_the_page_tree() {
        let mut document = lopdf::Document::with_version("1.5");
        let parent_id = document.add_object(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
        ]));
        let page_id = document.add_object(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(parent_id)),
        ]));
        assert_eq!(
            page_media_box(&document, page_id),
            Some([0.0, 0.0, 612.0, 792.0])
        );
    }

    #[test]
    fn content_streams_normalize_to_an_ordered_list() {
        let mut document = lopdf::Document::with_version("1.5");
        let first = document.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            b"q Q".to_vec(),
        ));
        let second = document.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            b"BT ET".to_vec(),
        ));
        let array_id =
            document.add_object(vec![Object::Reference(first), Object::Reference(second)]);

        let direct = lopdf::Dictionary::from_iter(vec![("Contents", Object::Reference(first))]);
        assert_eq!(content_stream_ids(&document, &direct), vec![first]);

        let via_array =
            lopdf::Dictionary::from_iter(vec![("Contents", Object::Reference(array_id))]);
        assert_eq!(content_stream_ids(&document, &via_array), vec![first, second]);

        let inline = lopdf::Dictionary::from_iter(vec![(
            "Contents",
            Object::Array(vec![Object::Reference(second), Object::Reference(first)]),
        )]);
        assert_eq!(content_stream_ids(&document, &inline), vec![second, first]);
    }

    #[test]
    fn characters_outside_the_basic_plane_become_surrogate_pairs() {
        let mut coverage = BTreeMap::new();
        coverage.insert(5u16, 'A');
        coverage.insert(6u16, '😀');
        let cmap = to_unicode_cmap(&coverage);
        assert!(cmap.contains("<0005> <0041>"));
        assert!(cmap.contains("<0006> <d83dde00>"));
        assert!(cmap.contains("2 beginbfchar"));
    }

    #[test]
    fn postscript_names_strip_everything_but_alphanumerics() {
        assert_eq!(postscript_name("Noto Sans JP"), "NotoSansJP");
        assert_eq!(postscript_name("Roboto-Bold"), "Roboto-Bold");
        assert_eq!(postscript_name("漢字"), "Embedded");
    }
}
