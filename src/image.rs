use std::sync::Arc;

use image::GenericImageView;
use sha2::{Digest, Sha256};

use crate::draw::{DecodedImage, DrawOp, ImagePayload, PageContext};
use crate::error::FieldErrorKind;
use crate::template::{decode_binary_content, FieldSchema, ImageFit};
use crate::units::millimeters_to_points;

/// Decodes the bound value of an image field and places it into the field box
/// according to the fit option.
pub fn render_image(
    schema: &FieldSchema,
    value: &str,
    _context: &PageContext,
) -> Result<Vec<DrawOp>, FieldErrorKind> {
    let image = decode_image(value)?;

    let box_x = millimeters_to_points(schema.position.x);
    let box_y = millimeters_to_points(schema.position.y);
    let box_width = millimeters_to_points(schema.width);
    let box_height = millimeters_to_points(schema.height);

    let (x, y, width, height) = match schema.fit {
        ImageFit::Stretch => (box_x, box_y, box_width, box_height),
        ImageFit::Contain => {
            let scale =
                (box_width / image.width as f32).min(box_height / image.height as f32);
            let width = image.width as f32 * scale;
            let height = image.height as f32 * scale;
            (
                box_x + (box_width - width) / 2.0,
                box_y + (box_height - height) / 2.0,
                width,
                height,
            )
        }
    };

    Ok(vec![DrawOp::Image {
        image,
        x,
        y,
        width,
        height,
    }])
}

/// Decodes a data URI or bare base64 image value. JPEG bytes are carried
/// through untouched so the PDF can keep them under a `DCTDecode` filter;
/// everything else goes through the decoder into raw RGB plus an optional
/// alpha plane.
pub(crate) fn decode_image(value: &str) -> Result<DecodedImage, FieldErrorKind> {
    let bytes = decode_binary_content(value)
        .map_err(|error| FieldErrorKind::ImageDecodeFailed(error.to_string()))?;
    let digest: [u8; 32] = Sha256::digest(&bytes).into();
    let format = image::guess_format(&bytes)
        .map_err(|error| FieldErrorKind::ImageDecodeFailed(error.to_string()))?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|error| FieldErrorKind::ImageDecodeFailed(error.to_string()))?;
    let (width, height) = decoded.dimensions();

    let payload = if format == image::ImageFormat::Jpeg {
        let grayscale = matches!(
            decoded.color(),
            image::ColorType::L8 | image::ColorType::La8 | image::ColorType::L16
        );
        ImagePayload::Jpeg {
            data: Arc::new(bytes),
            grayscale,
        }
    } else {
        let rgba = decoded.to_rgba8();
        let pixel_count = (width as usize) * (height as usize);
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        let mut opaque = true;
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
            opaque &= pixel.0[3] == 0xFF;
        }
        ImagePayload::Rgb {
            data: Arc::new(rgb),
            alpha: (!opaque).then(|| Arc::new(alpha)),
        }
    };

    Ok(DecodedImage {
        digest,
        width,
        height,
        payload,
    })
}
