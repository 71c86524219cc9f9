use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::{FieldFailure, GenerateError};
use crate::font::FontTable;
use crate::layout::{layout_record, RecordLayout};
use crate::pdf::{assemble, prepare_base};
use crate::template::{InputRecord, Template};
use crate::validate;

/// The outcome of a batch: the finished document, plus every field that was
/// skipped along the way. A non-empty `failures` list still comes with a
/// complete document; the affected fields are simply absent from it.
#[derive(Debug)]
pub struct Generated {
    pub bytes: Vec<u8>,
    pub failures: Vec<FieldFailure>,
}

/// Renders every input record through the template into a single document.
///
/// The template is validated up front and rejected as a whole when it is
/// malformed; per-field problems during layout are collected instead of
/// aborting the batch. Pages appear in record order, with the template's pages
/// in sequence inside each record. Given equal templates, inputs and fonts,
/// the returned bytes are identical across runs and machines.
pub fn generate(
    template: &Template,
    inputs: &[InputRecord],
    fonts: &FontTable,
) -> Result<Generated, GenerateError> {
    validate::validate(template).map_err(GenerateError::SchemaInvalid)?;
    if inputs.is_empty() {
        return Err(GenerateError::InputMismatch(
            "at least one input record is required".to_string(),
        ));
    }

    let base = prepare_base(&template.base_pdf, template.schemas.len())?;
    let digest = batch_digest(template, inputs, fonts);

    // Records do not interact, so they lay out in parallel; the indexed
    // iterator keeps the collected layouts in input order.
    let layouts: Vec<RecordLayout> = inputs
        .par_iter()
        .enumerate()
        .map(|(record_index, record)| {
            layout_record(template, record, fonts, base.geometries(), record_index)
        })
        .collect();
    let failures: Vec<FieldFailure> = layouts
        .iter()
        .flat_map(|layout| layout.failures.iter().cloned())
        .collect();

    let bytes = assemble(base, &layouts, fonts, &digest)?;
    Ok(Generated { bytes, failures })
}

/// Digest of everything that shapes the output, used as the document
/// identifier: the template, the inputs and the loaded font programs.
fn batch_digest(template: &Template, inputs: &[InputRecord], fonts: &FontTable) -> [u8; 32] {
    let mut hasher = Sha256::new();
    match serde_json::to_vec(template) {
        Ok(serialized) => hasher.update(&serialized),
        Err(error) => log::warn!("the template does not serialize for identification: {error}"),
    }
    hasher.update([0u8]);
    match serde_json::to_vec(inputs) {
        Ok(serialized) => hasher.update(&serialized),
        Err(error) => log::warn!("the inputs do not serialize for identification: {error}"),
    }
    for face in fonts.faces() {
        hasher.update(face.digest);
    }
    hasher.finalize().into()
}
