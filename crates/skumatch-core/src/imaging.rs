use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::SkumatchError;
use crate::model::{ColorSpace, ImageEncoding, NormalizedImage, PositionedImage, SourceFormat};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// How a source image is brought to the exact target size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Scale to fit inside the box and pad the rest with white.
    #[default]
    Pad,
    /// Scale to cover the box and crop the overflow around the center.
    Crop,
}

/// Decodes embedded images and resizes them to a fixed footprint.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    pub width: u32,
    pub height: u32,
    pub fit: FitPolicy,
}

impl ImageNormalizer {
    pub fn new(width: u32, height: u32, fit: FitPolicy) -> Self {
        ImageNormalizer { width, height, fit }
    }

    /// Decode and resize the image bound to `code`.
    ///
    /// The result is always exactly `width` x `height` pixels. The source
    /// bytes are left untouched.
    pub fn normalize(
        &self,
        image: &PositionedImage,
        code: &str,
    ) -> Result<NormalizedImage, SkumatchError> {
        let to_error = |reason: String| SkumatchError::ImageDecode {
            page: image.page,
            code: code.to_string(),
            reason,
        };
        let decoded = decode(&image.raw_bytes, &image.encoding).map_err(to_error)?;
        let canvas = self.fit_to_box(&flatten_onto_white(&decoded));

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| to_error(format!("PNG encoding failed: {e}")))?;

        Ok(NormalizedImage {
            width: self.width,
            height: self.height,
            png,
        })
    }

    fn fit_to_box(&self, source: &RgbImage) -> RgbImage {
        let source = DynamicImage::ImageRgb8(source.clone());
        match self.fit {
            FitPolicy::Crop => source
                .resize_to_fill(self.width, self.height, FilterType::Lanczos3)
                .to_rgb8(),
            FitPolicy::Pad => {
                let scaled = source
                    .resize(self.width, self.height, FilterType::Lanczos3)
                    .to_rgb8();
                let mut canvas = RgbImage::from_pixel(self.width, self.height, WHITE);
                let x = (self.width.saturating_sub(scaled.width()) / 2) as i64;
                let y = (self.height.saturating_sub(scaled.height()) / 2) as i64;
                imageops::overlay(&mut canvas, &scaled, x, y);
                canvas
            }
        }
    }
}

/// Decode image bytes according to how the scanner found them.
pub fn decode(bytes: &[u8], encoding: &ImageEncoding) -> Result<DynamicImage, String> {
    match *encoding {
        ImageEncoding::Encoded { format } => decode_encoded(bytes, format),
        ImageEncoding::Raw {
            width,
            height,
            bits_per_component,
            color_space,
        } => decode_raw(bytes, width, height, bits_per_component, color_space),
    }
}

fn decode_encoded(bytes: &[u8], format: SourceFormat) -> Result<DynamicImage, String> {
    let hint = match format {
        SourceFormat::Jpeg => Some(image::ImageFormat::Jpeg),
        SourceFormat::Png => Some(image::ImageFormat::Png),
        SourceFormat::Jpeg2000 => return Err("JPEG 2000 images are not supported".into()),
        SourceFormat::Gif | SourceFormat::Unknown => None,
    };
    let result = match hint {
        Some(f) => image::load_from_memory_with_format(bytes, f),
        None => image::load_from_memory(bytes),
    };
    result.map_err(|e| format!("{format} decode failed: {e}"))
}

fn decode_raw(
    bytes: &[u8],
    width: u32,
    height: u32,
    bits_per_component: u8,
    color_space: ColorSpace,
) -> Result<DynamicImage, String> {
    if width == 0 || height == 0 {
        return Err("image has zero width or height".into());
    }
    if !matches!(bits_per_component, 1 | 2 | 4 | 8) {
        return Err(format!("{bits_per_component} bits per component is not supported"));
    }
    let channels = color_space.channels() as usize;
    let row_bytes = (width as usize * channels * bits_per_component as usize).div_ceil(8);
    let expected = row_bytes * height as usize;
    if bytes.len() < expected {
        return Err(format!(
            "raw image data is {} bytes, expected {expected}",
            bytes.len()
        ));
    }

    let samples = if bits_per_component < 8 {
        expand_sub_byte_samples(&bytes[..expected], width as usize * channels, row_bytes, bits_per_component)
    } else {
        bytes[..expected].to_vec()
    };

    let image = match color_space {
        ColorSpace::Gray => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        ColorSpace::Cmyk => {
            RgbImage::from_raw(width, height, cmyk_to_rgb(&samples)).map(DynamicImage::ImageRgb8)
        }
    };
    image.ok_or_else(|| "raw image buffer does not match its dimensions".to_string())
}

/// Expand packed 1/2/4-bit samples to one byte each, scaled to 0..=255.
/// Rows are byte-aligned in PDF image streams.
fn expand_sub_byte_samples(
    bytes: &[u8],
    samples_per_row: usize,
    row_bytes: usize,
    bpc: u8,
) -> Vec<u8> {
    let max_val = (1u16 << bpc) - 1;
    let per_byte = 8 / bpc as usize;
    let mut out = Vec::with_capacity(samples_per_row * (bytes.len() / row_bytes.max(1)));

    for row in bytes.chunks(row_bytes) {
        let mut taken = 0;
        'row: for &byte in row {
            for i in 0..per_byte {
                if taken == samples_per_row {
                    break 'row;
                }
                let shift = 8 - bpc * (i as u8 + 1);
                let val = (byte >> shift) as u16 & max_val;
                out.push((val * 255 / max_val) as u8);
                taken += 1;
            }
        }
    }
    out
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for px in cmyk.chunks_exact(4) {
        let k = px[3] as u16;
        for &c in &px[..3] {
            rgb.push(255u16.saturating_sub((c as u16 + k).min(255)) as u8);
        }
    }
    rgb
}

/// Composite any alpha channel over white and drop it.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba: RgbaImage = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Identify an encoded image by its magic bytes.
pub fn detect_format(bytes: &[u8]) -> SourceFormat {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        SourceFormat::Jpeg
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        SourceFormat::Png
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        SourceFormat::Gif
    } else if bytes.starts_with(&[0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20])
        || bytes.starts_with(&[0xFF, 0x4F, 0xFF, 0x51])
    {
        SourceFormat::Jpeg2000
    } else {
        SourceFormat::Unknown
    }
}

/// Map a PDF stream filter to the file format its bytes are stored in.
pub fn format_from_filter(filter: &str) -> Option<SourceFormat> {
    match filter {
        "DCTDecode" | "DCT" => Some(SourceFormat::Jpeg),
        "JPXDecode" => Some(SourceFormat::Jpeg2000),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BBox;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn encoded(bytes: Vec<u8>) -> PositionedImage {
        PositionedImage {
            id: "Im1#0".into(),
            page: 3,
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            raw_bytes: bytes,
            encoding: ImageEncoding::Encoded {
                format: SourceFormat::Png,
            },
        }
    }

    fn decode_output(img: &NormalizedImage) -> RgbImage {
        image::load_from_memory(&img.png).unwrap().to_rgb8()
    }

    fn is_red(px: &Rgb<u8>) -> bool {
        px.0[0] > 240 && px.0[1] < 15 && px.0[2] < 15
    }

    fn is_white(px: &Rgb<u8>) -> bool {
        px.0.iter().all(|c| *c > 245)
    }

    #[test]
    fn pad_keeps_aspect_and_exact_size() {
        let wide = RgbImage::from_pixel(200, 50, Rgb([255, 0, 0]));
        let normalizer = ImageNormalizer::new(100, 100, FitPolicy::Pad);
        let out = normalizer
            .normalize(&encoded(png_bytes(DynamicImage::ImageRgb8(wide))), "K1001")
            .unwrap();
        assert_eq!((out.width, out.height), (100, 100));

        let pixels = decode_output(&out);
        assert_eq!(pixels.dimensions(), (100, 100));
        // 200x50 scales to 100x25, centered vertically
        assert!(is_white(pixels.get_pixel(50, 5)));
        assert!(is_white(pixels.get_pixel(50, 95)));
        assert!(is_red(pixels.get_pixel(50, 50)));
        assert!(is_red(pixels.get_pixel(2, 50)));
    }

    #[test]
    fn pad_tall_image_pads_sides() {
        let tall = RgbImage::from_pixel(30, 300, Rgb([255, 0, 0]));
        let out = ImageNormalizer::new(100, 100, FitPolicy::Pad)
            .normalize(&encoded(png_bytes(DynamicImage::ImageRgb8(tall))), "K1")
            .unwrap();
        let pixels = decode_output(&out);
        assert!(is_white(pixels.get_pixel(5, 50)));
        assert!(is_white(pixels.get_pixel(94, 50)));
        assert!(is_red(pixels.get_pixel(50, 50)));
    }

    #[test]
    fn crop_fills_the_box() {
        let wide = RgbImage::from_pixel(200, 50, Rgb([255, 0, 0]));
        let out = ImageNormalizer::new(100, 100, FitPolicy::Crop)
            .normalize(&encoded(png_bytes(DynamicImage::ImageRgb8(wide))), "K1")
            .unwrap();
        let pixels = decode_output(&out);
        assert_eq!(pixels.dimensions(), (100, 100));
        assert!(is_red(pixels.get_pixel(50, 2)));
        assert!(is_red(pixels.get_pixel(50, 97)));
    }

    #[test]
    fn non_square_target() {
        let square = RgbImage::from_pixel(64, 64, Rgb([0, 0, 255]));
        let out = ImageNormalizer::new(120, 80, FitPolicy::Pad)
            .normalize(&encoded(png_bytes(DynamicImage::ImageRgb8(square))), "K1")
            .unwrap();
        assert_eq!(decode_output(&out).dimensions(), (120, 80));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let clear = RgbaImage::from_pixel(10, 10, image::Rgba([0, 0, 0, 0]));
        let out = ImageNormalizer::new(20, 20, FitPolicy::Pad)
            .normalize(&encoded(png_bytes(DynamicImage::ImageRgba8(clear))), "K1")
            .unwrap();
        assert!(is_white(decode_output(&out).get_pixel(10, 10)));
    }

    #[test]
    fn corrupt_bytes_report_page_and_code() {
        let err = ImageNormalizer::new(100, 100, FitPolicy::Pad)
            .normalize(&encoded(vec![0x89, b'P', b'N', b'G', 1, 2, 3]), "K2002")
            .unwrap_err();
        match err {
            SkumatchError::ImageDecode { page, code, .. } => {
                assert_eq!(page, 3);
                assert_eq!(code, "K2002");
            }
            other => panic!("expected ImageDecode, got {other:?}"),
        }
    }

    #[test]
    fn raw_rgb_samples() {
        let image = PositionedImage {
            encoding: ImageEncoding::Raw {
                width: 2,
                height: 1,
                bits_per_component: 8,
                color_space: ColorSpace::Rgb,
            },
            ..encoded(vec![255, 0, 0, 255, 0, 0])
        };
        let out = ImageNormalizer::new(100, 100, FitPolicy::Pad)
            .normalize(&image, "K1")
            .unwrap();
        let pixels = decode_output(&out);
        assert!(is_red(pixels.get_pixel(50, 50)));
        assert!(is_white(pixels.get_pixel(50, 5)));
    }

    #[test]
    fn raw_data_too_short() {
        let result = decode(
            &[0, 0, 0],
            &ImageEncoding::Raw {
                width: 2,
                height: 2,
                bits_per_component: 8,
                color_space: ColorSpace::Rgb,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn one_bit_rows_are_byte_aligned() {
        // 3 px wide, 2 rows: 101 / 010, each row padded to a full byte
        let samples = expand_sub_byte_samples(&[0b1010_0000, 0b0100_0000], 3, 1, 1);
        assert_eq!(samples, vec![255, 0, 255, 0, 255, 0]);
    }

    #[test]
    fn cmyk_conversion() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), vec![255, 255, 255]);
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 255]), vec![0, 0, 0]);
        assert_eq!(cmyk_to_rgb(&[0, 255, 255, 0]), vec![255, 0, 0]);
    }

    #[test]
    fn jpeg2000_is_an_error() {
        let result = decode(
            &[0xFF, 0x4F, 0xFF, 0x51],
            &ImageEncoding::Encoded {
                format: SourceFormat::Jpeg2000,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn magic_bytes() {
        assert_eq!(detect_format(&[0xFF, 0xD8, 0xFF, 0xE0]), SourceFormat::Jpeg);
        assert_eq!(
            detect_format(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            SourceFormat::Png
        );
        assert_eq!(detect_format(b"GIF89a..."), SourceFormat::Gif);
        assert_eq!(detect_format(&[1, 2, 3]), SourceFormat::Unknown);
        assert_eq!(format_from_filter("DCTDecode"), Some(SourceFormat::Jpeg));
        assert_eq!(format_from_filter("FlateDecode"), None);
    }
}
