//! Codec adapter: single-image transcoding over the `image` crate
//!
//! Given an input file and conversion options, decodes the image, applies an
//! optional bounded resize, and encodes to the target format with a
//! format-specific quality/compression mapping. Synchronous and CPU-bound;
//! callers run it through `spawn_blocking`.

use crate::error::AppError;
use crate::modules::converter::{ConversionOptions, ImageFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Write;
use std::path::Path;

/// Compression effort used when the options leave it unset
const DEFAULT_COMPRESSION_LEVEL: u8 = 6;

/// Convert one image file, returning the output pixel dimensions
///
/// # Errors
///
/// Returns error if the input cannot be decoded (unsupported or corrupt
/// data) or the output cannot be encoded/written
pub fn convert_image(
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> Result<(u32, u32), AppError> {
    let img = ImageReader::open(input)?.with_guessed_format()?.decode()?;
    let img = apply_resize(img, options);
    let dims = (img.width(), img.height());

    let img = normalize_color(img, options.format);
    let quality = options.quality.min(100);
    let level = options
        .compression_level
        .unwrap_or(DEFAULT_COMPRESSION_LEVEL)
        .min(9);

    let file = std::fs::File::create(output)?;
    let mut writer = std::io::BufWriter::new(file);

    match options.format {
        ImageFormat::Jpg => {
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            img.write_with_encoder(encoder)?;
        }
        ImageFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut writer,
                png_compression(level),
                PngFilterType::Adaptive,
            );
            img.write_with_encoder(encoder)?;
        }
        ImageFormat::Webp => {
            // The backend only encodes lossless WebP; quality is accepted for
            // API compatibility and ignored here
            let encoder = WebPEncoder::new_lossless(&mut writer);
            img.write_with_encoder(encoder)?;
        }
        ImageFormat::Avif => {
            let encoder =
                AvifEncoder::new_with_speed_quality(&mut writer, avif_speed(level), quality.max(1));
            img.write_with_encoder(encoder)?;
        }
        ImageFormat::Gif => img.write_to(&mut writer, image::ImageFormat::Gif)?,
        ImageFormat::Bmp => img.write_to(&mut writer, image::ImageFormat::Bmp)?,
        ImageFormat::Tiff => img.write_to(&mut writer, image::ImageFormat::Tiff)?,
    }

    writer.flush()?;
    Ok(dims)
}

/// Apply the optional resize from the options
///
/// Fit mode is "inside the box" when the aspect ratio is maintained, exact
/// stretch otherwise. Targets are clamped to the original dimensions so the
/// image is never upscaled.
fn apply_resize(img: DynamicImage, options: &ConversionOptions) -> DynamicImage {
    if options.width.is_none() && options.height.is_none() {
        return img;
    }

    let (orig_w, orig_h) = (img.width(), img.height());
    let target_w = options.width.unwrap_or(orig_w).clamp(1, orig_w);
    let target_h = options.height.unwrap_or(orig_h).clamp(1, orig_h);

    if target_w == orig_w && target_h == orig_h {
        return img;
    }

    if options.maintain_aspect_ratio {
        img.resize(target_w, target_h, FilterType::Lanczos3)
    } else {
        img.resize_exact(target_w, target_h, FilterType::Lanczos3)
    }
}

/// Normalize the pixel layout to what the target encoder accepts
fn normalize_color(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpg => DynamicImage::ImageRgb8(img.to_rgb8()),
        // These encoders accept 8-bit RGB(A) only
        ImageFormat::Webp | ImageFormat::Avif | ImageFormat::Gif | ImageFormat::Bmp => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        ImageFormat::Png | ImageFormat::Tiff => img,
    }
}

/// Map the 0-9 compression level onto the PNG encoder's presets
const fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Map the 0-9 compression level onto AVIF encoder speed (10 = fastest)
const fn avif_speed(level: u8) -> u8 {
    let speed = 10_u8.saturating_sub(level);
    if speed == 0 {
        1
    } else {
        speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_test_png(path: &Path, w: u32, h: u32) {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 200, 30, 255]));
        img.save(path).unwrap();
    }

    fn options(format: ImageFormat) -> ConversionOptions {
        ConversionOptions {
            format,
            quality: 80,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
            compression_level: None,
        }
    }

    #[test]
    fn test_convert_png_to_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.png");
        let output = temp_dir.path().join("out.jpg");
        write_test_png(&input, 16, 10);

        let dims = convert_image(&input, &output, &options(ImageFormat::Jpg)).unwrap();
        assert_eq!(dims, (16, 10));
        assert!(output.exists());

        let reloaded = image::open(&output).unwrap();
        assert_eq!(reloaded.width(), 16);
        assert_eq!(reloaded.height(), 10);
    }

    #[test]
    fn test_convert_to_webp_lossless() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.png");
        let output = temp_dir.path().join("out.webp");
        write_test_png(&input, 8, 8);

        convert_image(&input, &output, &options(ImageFormat::Webp)).unwrap();
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn test_convert_to_bmp_and_tiff() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.png");
        write_test_png(&input, 6, 6);

        for format in [ImageFormat::Bmp, ImageFormat::Tiff, ImageFormat::Gif] {
            let output = temp_dir.path().join(format!("out.{}", format.extension()));
            convert_image(&input, &output, &options(format)).unwrap();
            assert!(output.exists());
        }
    }

    #[test]
    fn test_resize_fit_inside_preserves_aspect() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("wide.png");
        let output = temp_dir.path().join("out.png");
        write_test_png(&input, 100, 50);

        let mut opts = options(ImageFormat::Png);
        opts.width = Some(40);
        opts.height = Some(40);
        opts.maintain_aspect_ratio = true;

        let dims = convert_image(&input, &output, &opts).unwrap();
        // Fits inside 40x40 keeping 2:1 ratio
        assert_eq!(dims, (40, 20));
    }

    #[test]
    fn test_resize_stretch_ignores_aspect() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("wide.png");
        let output = temp_dir.path().join("out.png");
        write_test_png(&input, 100, 50);

        let mut opts = options(ImageFormat::Png);
        opts.width = Some(30);
        opts.height = Some(30);
        opts.maintain_aspect_ratio = false;

        let dims = convert_image(&input, &output, &opts).unwrap();
        assert_eq!(dims, (30, 30));
    }

    #[test]
    fn test_resize_never_upscales() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("small.png");
        let output = temp_dir.path().join("out.png");
        write_test_png(&input, 10, 10);

        let mut opts = options(ImageFormat::Png);
        opts.width = Some(500);
        opts.height = Some(500);

        let dims = convert_image(&input, &output, &opts).unwrap();
        assert_eq!(dims, (10, 10));
    }

    #[test]
    fn test_convert_corrupt_input_fails() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("broken.png");
        let output = temp_dir.path().join("out.png");
        std::fs::write(&input, b"definitely not an image").unwrap();

        let result = convert_image(&input, &output, &options(ImageFormat::Png));
        assert!(result.is_err());
    }

    #[test]
    fn test_png_compression_mapping() {
        assert!(matches!(png_compression(0), CompressionType::Fast));
        assert!(matches!(png_compression(2), CompressionType::Fast));
        assert!(matches!(png_compression(3), CompressionType::Default));
        assert!(matches!(png_compression(6), CompressionType::Default));
        assert!(matches!(png_compression(7), CompressionType::Best));
        assert!(matches!(png_compression(9), CompressionType::Best));
    }

    #[test]
    fn test_avif_speed_mapping() {
        assert_eq!(avif_speed(0), 10);
        assert_eq!(avif_speed(6), 4);
        assert_eq!(avif_speed(9), 1);
        assert_eq!(avif_speed(10), 1); // clamped, never zero
    }
}
