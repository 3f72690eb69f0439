use image::{Rgba, RgbaImage};
use std::io::{self, Read, Seek, SeekFrom};

pub const ICON_DIMENSION: u32 = 32;
const ICON_BITMAP_OFFSET: u64 = 0x20;
const ICON_BITMAP_SIZE: usize = 0x200;
const ICON_PALETTE_SIZE: usize = 0x20;
const KNOWN_BANNER_VERSIONS: [u16; 4] = [0x0001, 0x0002, 0x0003, 0x0103];

/// The 32x32 icon embedded in a cartridge banner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerIcon {
    /// 4x4 tiles of 8x8 pixels, 4 bits per pixel, low nibble first
    bitmap: [u8; ICON_BITMAP_SIZE],
    /// BGR555 colors, index 0 is transparent
    palette: [u16; 16],
}

impl BannerIcon {
    /// Reads the icon at `banner_offset`, returning nothing for missing or unknown banners
    pub fn read<R: Read + Seek>(reader: &mut R, banner_offset: u32) -> io::Result<Option<Self>> {
        if banner_offset == 0 {
            return Ok(None);
        }

        let mut version = [0; 2];
        reader.seek(SeekFrom::Start(banner_offset as u64))?;
        if read_fully(reader, &mut version)?.is_none() {
            return Ok(None);
        }

        let version = u16::from_le_bytes(version);
        if !KNOWN_BANNER_VERSIONS.contains(&version) {
            tracing::debug!("Ignoring banner with unknown version {:#06x}", version);
            return Ok(None);
        }

        let mut bitmap = [0; ICON_BITMAP_SIZE];
        let mut palette_bytes = [0; ICON_PALETTE_SIZE];
        reader.seek(SeekFrom::Start(banner_offset as u64 + ICON_BITMAP_OFFSET))?;
        if read_fully(reader, &mut bitmap)?.is_none()
            || read_fully(reader, &mut palette_bytes)?.is_none()
        {
            return Ok(None);
        }

        let mut palette = [0; 16];
        for (color, bytes) in palette.iter_mut().zip(palette_bytes.chunks_exact(2)) {
            *color = u16::from_le_bytes([bytes[0], bytes[1]]);
        }

        Ok(Some(Self { bitmap, palette }))
    }

    pub fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_fn(ICON_DIMENSION, ICON_DIMENSION, |x, y| {
            let tile = (y / 8) * 4 + x / 8;
            let pixel = (y % 8) * 8 + x % 8;
            let byte = self.bitmap[(tile * 32 + pixel / 2) as usize];
            let index = if pixel % 2 == 0 { byte & 0xf } else { byte >> 4 };

            if index == 0 {
                return Rgba([0, 0, 0, 0]);
            }

            let color = self.palette[index as usize];
            Rgba([
                expand_channel(color),
                expand_channel(color >> 5),
                expand_channel(color >> 10),
                0xff,
            ])
        })
    }
}

fn expand_channel(value: u16) -> u8 {
    let value = (value & 0x1f) as u8;
    (value << 3) | (value >> 2)
}

/// Like `read_exact` but a short read is "no data" instead of an error
fn read_fully(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buffer) {
        Ok(()) => Ok(Some(())),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err),
    }
}
