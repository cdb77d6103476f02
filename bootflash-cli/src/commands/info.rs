//! Firmware image info command implementation.

use {
    crate::Format,
    anyhow::{Context, Result},
    bootflash::{DeviceProfile, ImageFormat, PageMap, load_page_map},
    console::style,
    std::path::Path,
};

/// Resolve the image format from the flag or the file extension.
pub(crate) fn resolve_format(firmware: &Path, format: Option<Format>) -> ImageFormat {
    format.map_or_else(|| ImageFormat::from_path(firmware), ImageFormat::from)
}

/// Load and segment `firmware` with `profile`.
pub(crate) fn load_firmware(
    firmware: &Path,
    format: ImageFormat,
    profile: &DeviceProfile,
) -> Result<PageMap> {
    load_page_map(firmware, Some(format), profile)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))
}

/// Info command implementation.
pub(crate) fn cmd_info(
    firmware: &Path,
    format: Option<Format>,
    profile: &DeviceProfile,
    list_pages: bool,
    json: bool,
) -> Result<()> {
    let format = resolve_format(firmware, format);
    let map = load_firmware(firmware, format, profile)?;

    if json {
        return print_info_json(&map, format, profile);
    }

    eprintln!("{}", style("Firmware Information").bold().underlined());
    eprintln!("  Format:         {format}");
    eprintln!("  Page size:      {} bytes", map.page_size());
    eprintln!("  Pages:          {}", map.len());
    eprintln!("  Payload:        {} bytes", map.payload_bytes());
    eprintln!("  Transfer:       {} bytes", map.transfer_bytes());
    if let (Some(first), Some(last)) = (map.first_address(), map.last_address()) {
        eprintln!("  Address range:  0x{first:08X} - 0x{last:08X}");
    }
    eprintln!(
        "  Device region:  0x{:08X} - 0x{:08X} ({} pages)",
        profile.base_address,
        profile.end_address(),
        profile.page_capacity()
    );

    if map.is_empty() {
        eprintln!("  {}", style("Image is empty, nothing to flash").yellow());
    }

    if list_pages && !map.is_empty() {
        eprintln!("\n{}", style("Pages").bold().underlined());
        for (index, page) in map.iter().enumerate() {
            eprintln!(
                "  {:>4}  {}",
                style(index).dim(),
                style(format!("0x{:08X}", page.address())).cyan()
            );
        }
    }

    Ok(())
}

fn print_info_json(map: &PageMap, format: ImageFormat, profile: &DeviceProfile) -> Result<()> {
    let addresses: Vec<u32> = map.iter().map(|page| page.address()).collect();
    let output = serde_json::json!({
        "ok": true,
        "data": {
            "format": format,
            "page_size": map.page_size(),
            "pages": map.len(),
            "payload_bytes": map.payload_bytes(),
            "transfer_bytes": map.transfer_bytes(),
            "first_address": map.first_address(),
            "last_address": map.last_address(),
            "profile": profile,
            "addresses": addresses,
        }
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format_from_flag() {
        assert_eq!(
            resolve_format(Path::new("fw.bin"), Some(Format::Hex)),
            ImageFormat::IntelHex
        );
        assert_eq!(
            resolve_format(Path::new("fw.hex"), Some(Format::Bin)),
            ImageFormat::Binary
        );
    }

    #[test]
    fn test_resolve_format_from_extension() {
        assert_eq!(
            resolve_format(Path::new("fw.hex"), None),
            ImageFormat::IntelHex
        );
        assert_eq!(
            resolve_format(Path::new("fw.bin"), None),
            ImageFormat::Binary
        );
    }

    #[test]
    fn test_load_firmware_missing_file() {
        let err = load_firmware(
            Path::new("/nonexistent/fw.bin"),
            ImageFormat::Binary,
            &DeviceProfile::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load firmware"));
    }
}
