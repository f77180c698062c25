//! Pixel operations behind derived icons.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageResult, RgbaImage};
use kml_ingest_core::Color;

/// Blend every pixel's luminance with `tint` and scale alpha by the tint's
/// alpha.
///
/// Each colour channel becomes the mean of the tint channel and the pixel's
/// luminance `(30r + 59g + 11b) / 100`, so a white tint yields a greyscale
/// icon.
pub(crate) fn colorize(image: &mut RgbaImage, tint: Color) {
    let tint_alpha = u32::from(tint.alpha);
    for pixel in image.pixels_mut() {
        let [red, green, blue, alpha] = pixel.0;
        let luma = (30 * u32::from(red) + 59 * u32::from(green) + 11 * u32::from(blue)) / 100;
        let blend = |channel: u8| channel_from((u32::from(channel) + luma) / 2);
        pixel.0 = [
            blend(tint.red),
            blend(tint.green),
            blend(tint.blue),
            channel_from(u32::from(alpha) * tint_alpha / 255),
        ];
    }
}

fn channel_from(value: u32) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

/// Dimensions after scaling by `factor`, rounded up as a bounding box.
///
/// Returns `None` for factors that are not finite and positive, or that
/// would collapse or overflow a dimension.
pub(crate) fn scaled_size((width, height): (u32, u32), factor: f64) -> Option<(u32, u32)> {
    if !factor.is_finite() || factor <= 0.0 {
        return None;
    }
    let scale = |dimension: u32| pixel_count((f64::from(dimension) * factor).ceil());
    Some((scale(width)?, scale(height)?))
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "whole values within u32 bounds convert exactly"
)]
fn pixel_count(value: f64) -> Option<u32> {
    (1.0..=f64::from(u32::MAX))
        .contains(&value)
        .then_some(value as u32)
}

/// Bilinear resample to `width` x `height`.
pub(crate) fn resample(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Encode `image` as `format`, dropping alpha for formats without it.
pub(crate) fn encode(image: RgbaImage, format: ImageFormat) -> ImageResult<Vec<u8>> {
    let rgba = DynamicImage::ImageRgba8(image);
    let output = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(rgba.to_rgb8())
    } else {
        rgba
    };
    let mut encoded = Cursor::new(Vec::new());
    output.write_to(&mut encoded, format)?;
    Ok(encoded.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};
    use rstest::rstest;

    #[rstest]
    fn tint_blends_luminance_and_scales_alpha() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        colorize(&mut image, Color::rgba(255, 255, 0, 128));
        // luminance (6000 + 5900 + 550) / 100 = 124
        assert!(image.pixels().all(|pixel| pixel.0 == [189, 189, 62, 128]));
    }

    #[rstest]
    fn white_tint_greys_out() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 200]));
        colorize(&mut image, Color::WHITE);
        assert_eq!(image.get_pixel(0, 0).0, [127, 127, 127, 200]);
    }

    #[rstest]
    #[case((32, 32), 2.0, Some((64, 64)))]
    #[case((32, 32), 1.5, Some((48, 48)))]
    #[case((3, 1), 0.5, Some((2, 1)))]
    #[case((32, 32), 0.0, None)]
    #[case((32, 32), -1.0, None)]
    #[case((32, 32), f64::NAN, None)]
    #[case((32, 32), f64::INFINITY, None)]
    #[case((1, 1), 1.0e10, None)]
    #[case((3, 3), 0.1, Some((1, 1)))]
    fn scales_bounding_boxes(
        #[case] size: (u32, u32),
        #[case] factor: f64,
        #[case] expected: Option<(u32, u32)>,
    ) {
        assert_eq!(scaled_size(size, factor), expected);
    }

    #[rstest]
    #[case(ImageFormat::Png)]
    #[case(ImageFormat::Jpeg)]
    #[case(ImageFormat::Gif)]
    fn encodes_in_every_supported_format(#[case] format: ImageFormat) {
        let image = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let encoded = encode(image, format).expect("encode");
        let decoded = image::load_from_memory_with_format(&encoded, format).expect("decode");
        assert_eq!(decoded.dimensions(), (4, 3));
    }
}
