use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::ImageFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Webp,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "webp" => Some(ExportFormat::Webp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }
}

/// Re-encodes a displayed result into the chosen format. Quality applies to
/// JPEG (1-100); PNG is always lossless and the WebP encoder shipped with
/// the image crate is lossless-only, so quality is ignored for both.
pub fn reencode(bytes: &[u8], format: ExportFormat, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("Failed to decode image for export")?;
    let mut buffer = Cursor::new(Vec::new());

    match format {
        ExportFormat::Png => {
            img.write_to(&mut buffer, ImageFormat::Png)
                .context("Failed to encode PNG")?;
        }
        ExportFormat::Jpeg => {
            let quality = quality.clamp(1, 100);
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            img.to_rgb8()
                .write_with_encoder(encoder)
                .context("Failed to encode JPEG")?;
        }
        ExportFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut buffer);
            img.to_rgba8()
                .write_with_encoder(encoder)
                .context("Failed to encode WebP")?;
        }
    }

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn sample_png() -> Vec<u8> {
        let img = RgbImage::from_fn(4, 4, |x, y| image::Rgb([x as u8 * 60, y as u8 * 60, 128]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn reencodes_into_each_format() {
        let source = sample_png();

        let png = reencode(&source, ExportFormat::Png, 90).unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);

        let jpeg = reencode(&source, ExportFormat::Jpeg, 60).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);

        let webp = reencode(&source, ExportFormat::Webp, 90).unwrap();
        assert_eq!(image::guess_format(&webp).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn export_rejects_undecodable_input() {
        assert!(reencode(&[0, 1, 2, 3], ExportFormat::Png, 90).is_err());
    }

    #[test]
    fn parses_format_aliases() {
        assert_eq!(ExportFormat::parse("JPG"), Some(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::parse("webp"), Some(ExportFormat::Webp));
        assert_eq!(ExportFormat::parse("gif"), None);
    }
}
