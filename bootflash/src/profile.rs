//! Device profile: the bootloader constants a flash session depends on.
//!
//! The defaults describe the robot's on-chip bootloader: 2 KiB pages,
//! application flash starting right after the bootloader at `0x2000`,
//! erased flash reading back as `0xFF`.

use crate::error::{Error, Result};

/// Default bytes per flash page.
pub const DEFAULT_PAGE_SIZE: u32 = 2048;

/// Default first flashable address.
pub const DEFAULT_BASE_ADDRESS: u32 = 0x0000_2000;

/// Default padding byte (erased flash value).
pub const DEFAULT_FILL_BYTE: u8 = 0xFF;

/// Default number of re-sends allowed per page.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default flashable bytes above the base address.
pub const DEFAULT_ADDRESS_SPACE: u32 = 0x0001_A000;

/// Device profile configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceProfile {
    /// Bytes per page (positive power of two).
    pub page_size: u32,
    /// First flashable address, page aligned.
    pub base_address: u32,
    /// Value used to pad partially filled pages.
    pub fill_byte: u8,
    /// Per-page retry bound.
    pub max_retries: u32,
    /// Total flashable bytes starting at `base_address`.
    pub address_space: u32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            base_address: DEFAULT_BASE_ADDRESS,
            fill_byte: DEFAULT_FILL_BYTE,
            max_retries: DEFAULT_MAX_RETRIES,
            address_space: DEFAULT_ADDRESS_SPACE,
        }
    }
}

impl DeviceProfile {
    /// Create a profile with the given page size and default everything else.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    /// Set the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the base address.
    #[must_use]
    pub fn with_base_address(mut self, base_address: u32) -> Self {
        self.base_address = base_address;
        self
    }

    /// Set the fill byte.
    #[must_use]
    pub fn with_fill_byte(mut self, fill_byte: u8) -> Self {
        self.fill_byte = fill_byte;
        self
    }

    /// Set the per-page retry bound.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the flashable region size.
    #[must_use]
    pub fn with_address_space(mut self, address_space: u32) -> Self {
        self.address_space = address_space;
        self
    }

    /// One past the last flashable address.
    pub fn end_address(&self) -> u64 {
        u64::from(self.base_address) + u64::from(self.address_space)
    }

    /// Number of pages the flashable region holds.
    pub fn page_capacity(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.address_space / self.page_size
    }

    /// Check that the profile describes a usable device.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "page size must be a positive power of two, got {}",
                self.page_size
            )));
        }
        if self.base_address % self.page_size != 0 {
            return Err(Error::Config(format!(
                "base address 0x{:08X} is not aligned to the {}-byte page size",
                self.base_address, self.page_size
            )));
        }
        if self.address_space == 0 || self.address_space % self.page_size != 0 {
            return Err(Error::Config(format!(
                "address space {} must be a non-zero multiple of the page size {}",
                self.address_space, self.page_size
            )));
        }
        if self.end_address() > u64::from(u32::MAX) + 1 {
            return Err(Error::Config(format!(
                "flashable region 0x{:08X}+0x{:X} exceeds the 32-bit address range",
                self.base_address, self.address_space
            )));
        }
        Ok(())
    }
}
