use color_quant::NeuQuant;
use image::{imageops::FilterType, DynamicImage, RgbaImage};
use std::io::Write;

/// Screen resolution of the target device, covers never exceed it
pub const COVER_WIDTH: u32 = 256;
pub const COVER_HEIGHT: u32 = 192;
const MAX_PALETTE_COLORS: usize = 256;
// 1 is best quality and slowest, 30 is the fastest
const QUANTIZER_SAMPLE_FACTOR: i32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum CoverImageError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not encode png: {0}")]
    Encode(#[from] png::EncodingError),
}

/// Shrinks the image to fit the screen, keeping its aspect ratio. Smaller images are untouched
pub fn fit_to_screen(image: DynamicImage) -> RgbaImage {
    if image.width() <= COVER_WIDTH && image.height() <= COVER_HEIGHT {
        return image.into_rgba8();
    }

    image
        .resize(COVER_WIDTH, COVER_HEIGHT, FilterType::Lanczos3)
        .into_rgba8()
}

/// Writes a palettized 8 bit png with at most 256 colors
pub fn write_indexed_png(image: &RgbaImage, writer: impl Write) -> Result<(), CoverImageError> {
    let pixels = image.as_raw();
    let quantizer = NeuQuant::new(QUANTIZER_SAMPLE_FACTOR, MAX_PALETTE_COLORS, pixels);
    let color_map = quantizer.color_map_rgba();

    let mut palette = Vec::with_capacity(MAX_PALETTE_COLORS * 3);
    let mut transparency = Vec::with_capacity(MAX_PALETTE_COLORS);
    for color in color_map.chunks_exact(4) {
        palette.extend_from_slice(&color[..3]);
        transparency.push(color[3]);
    }

    let indices: Vec<u8> = pixels
        .chunks_exact(4)
        .map(|pixel| quantizer.index_of(pixel) as u8)
        .collect();

    let mut encoder = png::Encoder::new(writer, image.width(), image.height());
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(palette);
    encoder.set_trns(transparency);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&indices)?;
    writer.finish()?;

    Ok(())
}

/// Decode, shrink and re-encode in one go
pub fn convert_cover(bytes: &[u8], writer: impl Write) -> Result<(), CoverImageError> {
    let image = image::load_from_memory(bytes)?;
    write_indexed_png(&fit_to_screen(image), writer)
}
