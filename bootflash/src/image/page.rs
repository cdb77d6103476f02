//! Firmware pages and the page map.
//!
//! A [`PageMap`] is built once per flash request and never mutated
//! afterwards. Iteration order is ascending address, which is also the
//! transmission order.
//!
//! ```text
//!  base_address                                     base + address_space
//!  |<- page 0 ->|<- page 1 ->|<- page 2 ->| ... |<- page N-1 ->|
//!  |############|############|#####.......|
//!                                  ^ fill byte
//! ```

use crate::error::{Error, Result};
use crate::profile::DeviceProfile;
use log::debug;
use std::collections::BTreeMap;

/// Immutable unit of transfer: one page bound to a device address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePage {
    address: u32,
    data: Vec<u8>,
}

impl FirmwarePage {
    /// Destination address on the device.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Page payload, always exactly one page long.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Ordered, read-only mapping from address to page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMap {
    pages: Vec<FirmwarePage>,
    page_size: u32,
    payload_bytes: usize,
}

impl PageMap {
    /// Split a contiguous image into pages starting at the profile's base
    /// address. The last page is padded with the profile's fill byte.
    pub fn segment(image: &[u8], profile: &DeviceProfile) -> Result<Self> {
        profile.validate()?;

        if image.len() as u64 > u64::from(profile.address_space) {
            return Err(Error::InvalidImage(format!(
                "image is {} bytes but only {} bytes are flashable at 0x{:08X}",
                image.len(),
                profile.address_space,
                profile.base_address
            )));
        }

        let page_size = profile.page_size as usize;
        // index < page_capacity, so the address stays inside the validated region
        #[allow(clippy::cast_possible_truncation)]
        let pages = image
            .chunks(page_size)
            .enumerate()
            .map(|(index, chunk)| {
                let mut data = chunk.to_vec();
                data.resize(page_size, profile.fill_byte);
                FirmwarePage {
                    address: profile.base_address + index as u32 * profile.page_size,
                    data,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "Segmented {} bytes into {} pages of {} bytes",
            image.len(),
            pages.len(),
            page_size
        );

        Ok(Self {
            pages,
            page_size: profile.page_size,
            payload_bytes: image.len(),
        })
    }

    /// Build a page map from scattered `(address, bytes)` chunks.
    ///
    /// Only pages touched by a chunk are created. Each new page starts out
    /// filled with the fill byte and chunk bytes are overlaid onto it; a later
    /// chunk overwrites an earlier one where they overlap.
    pub fn from_chunks<'a, I>(chunks: I, profile: &DeviceProfile) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, &'a [u8])>,
    {
        profile.validate()?;

        let page_size = u64::from(profile.page_size);
        let start = u64::from(profile.base_address);
        let end = profile.end_address();

        let mut pages: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        let mut payload_bytes = 0usize;

        for (address, bytes) in chunks {
            let chunk_start = u64::from(address);
            let chunk_end = chunk_start + bytes.len() as u64;
            if chunk_start < start || chunk_end > end {
                return Err(Error::InvalidImage(format!(
                    "data at 0x{chunk_start:08X}..0x{chunk_end:08X} lies outside the flashable region 0x{start:08X}..0x{end:08X}"
                )));
            }

            let mut offset = 0usize;
            while offset < bytes.len() {
                let absolute = chunk_start + offset as u64;
                let page_address = absolute - absolute % page_size;
                let in_page = (absolute - page_address) as usize;
                let take = (profile.page_size as usize - in_page).min(bytes.len() - offset);

                // page_address < end <= 2^32, checked by validate()
                #[allow(clippy::cast_possible_truncation)]
                let page = pages
                    .entry(page_address as u32)
                    .or_insert_with(|| vec![profile.fill_byte; profile.page_size as usize]);
                page[in_page..in_page + take].copy_from_slice(&bytes[offset..offset + take]);

                offset += take;
            }
            payload_bytes += bytes.len();
        }

        let pages = pages
            .into_iter()
            .map(|(address, data)| FirmwarePage { address, data })
            .collect::<Vec<_>>();

        debug!(
            "Built sparse page map: {} pages from {} payload bytes",
            pages.len(),
            payload_bytes
        );

        Ok(Self {
            pages,
            page_size: profile.page_size,
            payload_bytes,
        })
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the map holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page size the map was built with.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Image bytes carried before padding.
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Bytes that will be transmitted, padding included.
    pub fn transfer_bytes(&self) -> usize {
        self.pages.len() * self.page_size as usize
    }

    /// Page at position `index` in transmission order.
    pub fn page(&self, index: usize) -> Option<&FirmwarePage> {
        self.pages.get(index)
    }

    /// Look up a page by its device address.
    pub fn get(&self, address: u32) -> Option<&FirmwarePage> {
        self.pages
            .binary_search_by_key(&address, FirmwarePage::address)
            .ok()
            .map(|i| &self.pages[i])
    }

    /// Pages in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = &FirmwarePage> {
        self.pages.iter()
    }

    /// Lowest page address, if any.
    pub fn first_address(&self) -> Option<u32> {
        self.pages.first().map(FirmwarePage::address)
    }

    /// Highest page address, if any.
    pub fn last_address(&self) -> Option<u32> {
        self.pages.last().map(FirmwarePage::address)
    }
}

impl<'a> IntoIterator for &'a PageMap {
    type Item = &'a FirmwarePage;
    type IntoIter = std::slice::Iter<'a, FirmwarePage>;

    fn into_iter(self) -> Self::IntoIter {
        self.pages.iter()
    }
}
