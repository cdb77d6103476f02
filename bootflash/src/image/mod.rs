//! Firmware image loading and segmentation.

pub mod hex;
pub mod page;

pub use hex::{HexChunk, parse_intel_hex};
pub use page::{FirmwarePage, PageMap};

use crate::error::Result;
use crate::profile::DeviceProfile;
use std::fmt;
use std::fs;
use std::path::Path;

/// On-disk firmware image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ImageFormat {
    /// Raw binary, placed at the profile's base address.
    #[default]
    Binary,
    /// Intel HEX with absolute addresses.
    IntelHex,
}

impl ImageFormat {
    /// Guess the format from a file extension (`.hex`, `.ihex`, `.ihx`).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("hex" | "ihex" | "ihx") => Self::IntelHex,
            _ => Self::Binary,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::IntelHex => write!(f, "intel-hex"),
        }
    }
}

/// Build a page map from image bytes in the given format.
pub fn page_map_from_bytes(
    bytes: &[u8],
    format: ImageFormat,
    profile: &DeviceProfile,
) -> Result<PageMap> {
    match format {
        ImageFormat::Binary => PageMap::segment(bytes, profile),
        ImageFormat::IntelHex => {
            let text = String::from_utf8_lossy(bytes);
            let chunks = parse_intel_hex(&text)?;
            PageMap::from_chunks(
                chunks.iter().map(|c| (c.address, c.data.as_slice())),
                profile,
            )
        },
    }
}

/// Load a firmware file and build its page map.
///
/// When `format` is `None` the format is guessed from the extension.
pub fn load_page_map(
    path: impl AsRef<Path>,
    format: Option<ImageFormat>,
    profile: &DeviceProfile,
) -> Result<PageMap> {
    let path = path.as_ref();
    let format = format.unwrap_or_else(|| ImageFormat::from_path(path));
    let bytes = fs::read(path)?;
    page_map_from_bytes(&bytes, format, profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ImageFormat::from_path(&PathBuf::from("fw.hex")),
            ImageFormat::IntelHex
        );
        assert_eq!(
            ImageFormat::from_path(&PathBuf::from("FW.IHX")),
            ImageFormat::IntelHex
        );
        assert_eq!(
            ImageFormat::from_path(&PathBuf::from("fw.bin")),
            ImageFormat::Binary
        );
        assert_eq!(
            ImageFormat::from_path(&PathBuf::from("firmware")),
            ImageFormat::Binary
        );
    }

    #[test]
    fn test_page_map_from_hex_bytes() {
        let profile = DeviceProfile::new(256)
            .with_base_address(0x2000)
            .with_address_space(0x1000);
        let text = format!(
            "{}\n{}\n",
            ihex::Record::Data {
                offset: 0x2100,
                value: vec![0x12, 0x34],
            }
            .to_record_string()
            .unwrap(),
            ihex::Record::EndOfFile.to_record_string().unwrap()
        );

        let map = page_map_from_bytes(text.as_bytes(), ImageFormat::IntelHex, &profile).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.first_address(), Some(0x2100));
        assert_eq!(&map.page(0).unwrap().data()[..3], &[0x12, 0x34, 0xFF]);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_page_map("/nonexistent/fw.bin", None, &DeviceProfile::default());
        assert!(matches!(err, Err(crate::Error::Io(_))));
    }
}
