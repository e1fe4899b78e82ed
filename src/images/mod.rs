//! Image format conversion and image-to-PDF assembly.
//!
//! Three container formats are recognized, by magic number only: JPEG,
//! PNG, and WebP. Conversion decodes with the `image` crate and
//! re-encodes; WebP is decode-only, so it appears as a source but never
//! as a target. Any conversion that lands on JPEG first composites the
//! image onto an opaque white background, since JPEG has no alpha
//! channel and dropping it silently would turn transparency into black.
//!
//! `images_to_pdf` maps each input to one PDF page sized 1 point per
//! pixel. JPEG payloads are embedded as-is under /DCTDecode (decoded
//! only for dimensions and color space); everything else becomes
//! Flate-compressed raw RGB.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::writer::{DocumentWriter, ObjectSerializer};
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, GenericImageView, RgbImage};
use std::collections::HashMap;
use std::io::{Cursor, Write};

/// JPEG re-encode quality for all conversions.
const JPEG_QUALITY: u8 = 95;

/// Supported image containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
}

impl ImageFormat {
    /// Identify the container from its magic number.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::WebP => "WebP",
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    fn decoder_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Re-encode `input` from `source` into `target`.
///
/// The claimed source is checked against the actual bytes; a mismatch,
/// unrecognized input, and WebP as a target all fail with
/// [`Error::UnsupportedFormat`].
pub fn convert(input: &[u8], source: ImageFormat, target: ImageFormat) -> Result<Vec<u8>> {
    let detected = ImageFormat::detect(input)
        .ok_or_else(|| Error::UnsupportedFormat("unrecognized image data".to_string()))?;
    if detected != source {
        return Err(Error::UnsupportedFormat(format!(
            "input contains {} data, expected {}",
            detected, source
        )));
    }

    let img = image::load_from_memory_with_format(input, source.decoder_format())
        .map_err(|e| Error::Decode(format!("cannot decode {} image: {}", source, e)))?;
    match target {
        ImageFormat::Jpeg => encode_jpeg(&flatten_onto_white(&img)),
        ImageFormat::Png => {
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, image::ImageOutputFormat::Png)
                .map_err(|e| Error::Decode(format!("PNG encoding failed: {}", e)))?;
            Ok(out.into_inner())
        },
        ImageFormat::WebP => Err(Error::UnsupportedFormat(
            "WebP encoding is not supported".to_string(),
        )),
    }
}

/// Build a PDF with one page per image, sized 1 point per pixel.
pub fn images_to_pdf(images: &[Vec<u8>]) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(Error::UnsupportedFormat("no input images".to_string()));
    }

    let mut objects: HashMap<ObjectRef, Object> = HashMap::new();
    let catalog = ObjectRef::new(1, 0);
    let pages_root = ObjectRef::new(2, 0);
    let mut next = 3u32;
    let mut kids = Vec::with_capacity(images.len());

    for data in images {
        let format = ImageFormat::detect(data)
            .ok_or_else(|| Error::UnsupportedFormat("unrecognized image data".to_string()))?;
        let img = image::load_from_memory_with_format(data, format.decoder_format())
            .map_err(|e| Error::Decode(format!("cannot decode {} image: {}", format, e)))?;
        let (width, height) = img.dimensions();

        let xobject = match format {
            ImageFormat::Jpeg => jpeg_xobject(data, &img),
            _ => flate_rgb_xobject(&flatten_onto_white(&img))?,
        };

        let xobject_ref = ObjectRef::new(next, 0);
        let contents_ref = ObjectRef::new(next + 1, 0);
        let page_ref = ObjectRef::new(next + 2, 0);
        next += 3;

        objects.insert(xobject_ref, xobject);
        objects.insert(
            contents_ref,
            Object::Stream {
                dict: HashMap::new(),
                data: Bytes::from(format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", width, height)),
            },
        );
        objects.insert(
            page_ref,
            ObjectSerializer::dict(vec![
                ("Type", ObjectSerializer::name("Page")),
                ("Parent", Object::Reference(pages_root)),
                ("MediaBox", ObjectSerializer::rect(0.0, 0.0, width as f64, height as f64)),
                ("Contents", Object::Reference(contents_ref)),
                (
                    "Resources",
                    ObjectSerializer::dict(vec![(
                        "XObject",
                        ObjectSerializer::dict(vec![("Im0", Object::Reference(xobject_ref))]),
                    )]),
                ),
            ]),
        );
        kids.push(Object::Reference(page_ref));
    }

    objects.insert(
        pages_root,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Pages")),
            ("Count", ObjectSerializer::integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]),
    );
    objects.insert(
        catalog,
        ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("Catalog")),
            ("Pages", Object::Reference(pages_root)),
        ]),
    );

    DocumentWriter::from_objects((1, 7), &objects, catalog, None)?.to_bytes()
}

/// Composite onto an opaque white background, dropping alpha.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let alpha = src[3] as u32;
        for c in 0..3 {
            dst[c] = ((src[c] as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        }
    }
    out
}

fn encode_jpeg(rgb: &RgbImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(rgb)
        .map_err(|e| Error::Decode(format!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}

/// XObject wrapping the original JPEG payload under /DCTDecode.
fn jpeg_xobject(data: &[u8], img: &DynamicImage) -> Object {
    let color_space = match img.color() {
        ColorType::L8 | ColorType::L16 => "DeviceGray",
        _ => "DeviceRGB",
    };
    Object::Stream {
        dict: xobject_dict(img.dimensions(), color_space, "DCTDecode"),
        data: Bytes::copy_from_slice(data),
    }
}

/// XObject holding zlib-compressed raw RGB rows.
fn flate_rgb_xobject(rgb: &RgbImage) -> Result<Object> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(rgb.as_raw())?;
    let compressed = encoder.finish()?;

    Ok(Object::Stream {
        dict: xobject_dict((rgb.width(), rgb.height()), "DeviceRGB", "FlateDecode"),
        data: Bytes::from(compressed),
    })
}

fn xobject_dict((width, height): (u32, u32), color_space: &str, filter: &str) -> HashMap<String, Object> {
    match ObjectSerializer::dict(vec![
        ("Type", ObjectSerializer::name("XObject")),
        ("Subtype", ObjectSerializer::name("Image")),
        ("Width", ObjectSerializer::integer(width as i64)),
        ("Height", ObjectSerializer::integer(height as i64)),
        ("ColorSpace", ObjectSerializer::name(color_space)),
        ("BitsPerComponent", ObjectSerializer::integer(8)),
        ("Filter", ObjectSerializer::name(filter)),
    ]) {
        Object::Dictionary(d) => d,
        _ => unreachable!(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    fn solid_rgba(r: u8, g: u8, b: u8, a: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([r, g, b, a])))
    }

    #[test]
    fn test_detect_magic_numbers() {
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(
            ImageFormat::detect(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::detect(b"RIFF\x24\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::detect(b"GIF89a"), None);
        assert_eq!(ImageFormat::detect(b""), None);
        // RIFF alone is not WebP
        assert_eq!(ImageFormat::detect(b"RIFF\x24\x00\x00\x00WAVE"), None);
    }

    #[test]
    fn test_convert_png_to_jpeg_composites_onto_white() {
        // Half-transparent pure red over white should blend toward pink
        let input = png_bytes(&solid_rgba(255, 0, 0, 128));
        let jpeg = convert(&input, ImageFormat::Png, ImageFormat::Jpeg).unwrap();
        assert_eq!(ImageFormat::detect(&jpeg), Some(ImageFormat::Jpeg));

        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        let px = decoded.get_pixel(3, 3);
        assert!(px[0] > 230, "red stays saturated, got {:?}", px);
        assert!(px[1] > 90 && px[1] < 160, "green blends to mid, got {:?}", px);
        assert!(px[2] > 90 && px[2] < 160, "blue blends to mid, got {:?}", px);
    }

    #[test]
    fn test_convert_jpeg_to_png() {
        let rgb = RgbImage::from_pixel(5, 4, Rgb([10, 200, 30]));
        let jpeg = encode_jpeg(&rgb).unwrap();
        let png = convert(&jpeg, ImageFormat::Jpeg, ImageFormat::Png).unwrap();
        assert_eq!(ImageFormat::detect(&png), Some(ImageFormat::Png));

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.dimensions(), (5, 4));
    }

    #[test]
    fn test_convert_rejects_webp_target() {
        let input = png_bytes(&solid_rgba(0, 0, 0, 255));
        match convert(&input, ImageFormat::Png, ImageFormat::WebP) {
            Err(Error::UnsupportedFormat(_)) => {},
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_rejects_unknown_input() {
        match convert(b"definitely not an image", ImageFormat::Png, ImageFormat::Jpeg) {
            Err(Error::UnsupportedFormat(_)) => {},
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_rejects_claimed_format_mismatch() {
        // Real PNG bytes claimed as JPEG
        let input = png_bytes(&solid_rgba(1, 2, 3, 255));
        match convert(&input, ImageFormat::Jpeg, ImageFormat::Png) {
            Err(Error::UnsupportedFormat(msg)) => assert!(msg.contains("PNG")),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_images_to_pdf_one_page_per_image() {
        let a = png_bytes(&solid_rgba(255, 0, 0, 255));
        let b = encode_jpeg(&RgbImage::from_pixel(12, 9, Rgb([0, 0, 255]))).unwrap();

        let pdf = images_to_pdf(&[a, b]).unwrap();
        let mut doc = Document::parse(pdf).unwrap();
        assert_eq!(doc.page_count().unwrap(), 2);

        // Page size tracks pixel dimensions
        let page = doc.page(1).unwrap();
        let media_box = page.dict.get("MediaBox").and_then(|m| m.as_array()).unwrap();
        assert_eq!(media_box[2].as_number(), Some(12.0));
        assert_eq!(media_box[3].as_number(), Some(9.0));
    }

    #[test]
    fn test_images_to_pdf_embeds_jpeg_undecoded() {
        let jpeg = encode_jpeg(&RgbImage::from_pixel(7, 7, Rgb([80, 90, 100]))).unwrap();
        let pdf = images_to_pdf(&[jpeg.clone()]).unwrap();

        // The original JPEG payload appears verbatim in the file
        assert!(crate::xref::find_subslice(&pdf, &jpeg).is_some());
        assert!(crate::xref::find_subslice(&pdf, b"/DCTDecode").is_some());
    }

    #[test]
    fn test_images_to_pdf_flattens_png_alpha() {
        let pdf = images_to_pdf(&[png_bytes(&solid_rgba(0, 255, 0, 0))]).unwrap();
        let mut doc = Document::parse(pdf).unwrap();

        let page = doc.page(0).unwrap();
        let resources = page.dict.get("Resources").and_then(|r| r.as_dict()).unwrap();
        let xobject_ref = resources
            .get("XObject")
            .and_then(|x| x.as_dict())
            .and_then(|x| x.get("Im0"))
            .and_then(|i| i.as_reference())
            .unwrap();
        let xobject = doc.load_object(xobject_ref).unwrap();
        let raw = doc.decode_stream(&xobject, xobject_ref).unwrap();

        // Fully transparent green flattens to white RGB rows
        assert_eq!(raw.len(), 8 * 6 * 3);
        assert!(raw.iter().all(|&b| b == 255));
    }

    #[test]
    fn test_images_to_pdf_rejects_empty_and_garbage() {
        assert!(matches!(images_to_pdf(&[]), Err(Error::UnsupportedFormat(_))));
        assert!(matches!(
            images_to_pdf(&[b"nope".to_vec()]),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
