use std::io::Cursor;

use anyhow::{Context, Result};
use image::{
    imageops::{self, FilterType},
    DynamicImage, GrayImage, ImageFormat, Luma,
};

/// Upscale factor applied to the stacked crops before OCR.
pub const UPSCALE: u32 = 4;

/// Grayscale, then stretch the darkest pixel to black and the lightest to white.
pub fn prepare(image: &DynamicImage) -> GrayImage {
    let mut gray = image.to_luma8();
    autocontrast(&mut gray);
    gray
}

fn autocontrast(gray: &mut GrayImage) {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), Luma([v])| (lo.min(*v), hi.max(*v)));
    if hi <= lo {
        return;
    }
    let span = (hi - lo) as u32;
    for Luma([v]) in gray.pixels_mut() {
        *v = ((*v - lo) as u32 * 255 / span) as u8;
    }
}

/// Stack `crops` top to bottom on a white canvas as wide as the widest crop,
/// then upscale. `None` if there is nothing to stack.
pub fn combine(crops: &[DynamicImage]) -> Option<DynamicImage> {
    if crops.is_empty() {
        return None;
    }
    let prepared: Vec<GrayImage> = crops.iter().map(prepare).collect();
    let width = prepared.iter().map(GrayImage::width).max().unwrap_or(0);
    let height: u32 = prepared.iter().map(GrayImage::height).sum();
    if width == 0 || height == 0 {
        return None;
    }

    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    let mut y = 0i64;
    for crop in &prepared {
        imageops::overlay(&mut canvas, crop, 0, y);
        y += crop.height() as i64;
    }

    let upscaled = imageops::resize(&canvas, width * UPSCALE, height * UPSCALE, FilterType::Lanczos3);
    Some(DynamicImage::ImageLuma8(upscaled))
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(buf.into_inner())
}
