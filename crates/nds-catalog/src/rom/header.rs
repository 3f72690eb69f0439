use super::region::{resolve_region, RegionCode};
use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

/// Bytes of the cartridge header we care about
pub const HEADER_SIZE: usize = 0x200;

const TITLE_RANGE: std::ops::Range<usize> = 0x00..0x0c;
const GAME_ID_RANGE: std::ops::Range<usize> = 0x0c..0x10;
const MAKER_CODE_RANGE: std::ops::Range<usize> = 0x12..0x14;
const ROM_VERSION_OFFSET: usize = 0x1e;
const BANNER_OFFSET_RANGE: std::ops::Range<usize> = 0x68..0x6c;

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("header truncated: got {got} bytes, need 512")]
    Truncated { got: usize },
    #[error("could not read rom: {0}")]
    Io(#[from] io::Error),
}

/// Identity of a cartridge as declared by its header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub game_id: String,
    pub maker_code: String,
    pub rom_version: u8,
    pub region_code: RegionCode,
    /// Offset of the banner holding the icon, zero when absent
    pub banner_offset: u32,
}

impl CartridgeHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated { got: bytes.len() });
        }

        let game_id = decode_ascii(&bytes[GAME_ID_RANGE]);
        let region_code = resolve_region(&game_id);
        let banner_offset = u32::from_le_bytes([
            bytes[BANNER_OFFSET_RANGE.start],
            bytes[BANNER_OFFSET_RANGE.start + 1],
            bytes[BANNER_OFFSET_RANGE.start + 2],
            bytes[BANNER_OFFSET_RANGE.start + 3],
        ]);

        Ok(Self {
            title: decode_ascii(&bytes[TITLE_RANGE]),
            game_id,
            maker_code: decode_ascii(&bytes[MAKER_CODE_RANGE]),
            rom_version: bytes[ROM_VERSION_OFFSET],
            region_code,
            banner_offset,
        })
    }

    /// Reads the header off the start of a stream, which may hold more than the header
    pub fn from_reader(reader: &mut impl Read) -> Result<Self, HeaderError> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE);
        reader.take(HEADER_SIZE as u64).read_to_end(&mut buffer)?;

        Self::parse(&buffer)
    }

    /// Parses a rom on disk, substituting the file stem for a blank title
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HeaderError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let header = Self::from_reader(&mut file)?;
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(header.with_fallback_title(&stem))
    }

    pub fn with_fallback_title(mut self, stem: &str) -> Self {
        if self.title.is_empty() {
            self.title = stem.to_string();
        }

        self
    }
}

/// ASCII decode which drops anything outside of 7 bit and trims NUL padding
fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|byte| byte.is_ascii())
        .map(|&byte| byte as char)
        .collect::<String>()
        .trim_matches('\0')
        .to_string()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn build_header(title: &[u8], game_id: &[u8], maker: &[u8], version: u8) -> Vec<u8> {
        let mut header = vec![0; HEADER_SIZE];
        header[..title.len()].copy_from_slice(title);
        header[GAME_ID_RANGE.start..GAME_ID_RANGE.start + game_id.len()].copy_from_slice(game_id);
        header[MAKER_CODE_RANGE.start..MAKER_CODE_RANGE.start + maker.len()]
            .copy_from_slice(maker);
        header[ROM_VERSION_OFFSET] = version;
        header
    }

    #[test]
    fn layout() {
        let bytes = build_header(b"POKEMON\0\0\0\0\0", b"CPUE", b"01", 3);
        let header = CartridgeHeader::parse(&bytes).unwrap();

        assert_eq!(header.title, "POKEMON");
        assert_eq!(header.game_id, "CPUE");
        assert_eq!(header.maker_code, "01");
        assert_eq!(header.rom_version, 3);
        assert_eq!(header.region_code, RegionCode::Usa);
        assert_eq!(header.banner_offset, 0);
    }

    #[test]
    fn version_is_unsigned() {
        let bytes = build_header(b"X", b"AAAJ", b"01", 0xff);
        assert_eq!(CartridgeHeader::parse(&bytes).unwrap().rom_version, 255);
    }

    #[test]
    fn blank_title_falls_back() {
        let bytes = build_header(&[0; 12], b"AAAE", b"01", 0);
        let header = CartridgeHeader::parse(&bytes)
            .unwrap()
            .with_fallback_title("homebrew");

        assert_eq!(header.title, "homebrew");
    }

    #[test]
    fn invalid_bytes_are_dropped() {
        let bytes = build_header(b"MA\xffRIO\x80", b"AMCP", b"01", 0);
        assert_eq!(CartridgeHeader::parse(&bytes).unwrap().title, "MARIO");
    }

    #[test]
    fn truncated_is_fatal() {
        assert!(matches!(
            CartridgeHeader::parse(&[0; 0x100]),
            Err(HeaderError::Truncated { got: 0x100 })
        ));
    }

    #[test]
    fn reads_from_file_with_stem() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("my game.nds");
        let mut bytes = build_header(&[0; 12], b"AAAP", b"01", 1);
        bytes.extend_from_slice(&[0xaa; 0x400]);
        std::fs::write(&path, bytes).unwrap();

        let header = CartridgeHeader::from_file(&path).unwrap();
        assert_eq!(header.title, "my game");
        assert_eq!(header.region_code, RegionCode::Eur);
    }
}
