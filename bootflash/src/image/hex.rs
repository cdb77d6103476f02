//! Intel HEX image loading.
//!
//! HEX files carry scattered data records. Segment (`02`) and linear (`04`)
//! extended address records move the upper address window; start address
//! records are ignored since the bootloader always jumps to its fixed entry.

use crate::error::{Error, Result};
use ihex::Record;
use log::trace;

/// A run of contiguous bytes at an absolute address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexChunk {
    /// Absolute start address.
    pub address: u32,
    /// Chunk bytes.
    pub data: Vec<u8>,
}

/// Parse Intel HEX text into chunks, in file order.
///
/// Adjacent data records are merged into a single chunk. File order is kept
/// so that a later record overrides an earlier one where they overlap.
pub fn parse_intel_hex(text: &str) -> Result<Vec<HexChunk>> {
    let mut chunks: Vec<HexChunk> = Vec::new();
    let mut upper: u32 = 0;
    let mut saw_eof = false;

    for record in ihex::Reader::new(text) {
        match record? {
            Record::Data { offset, value } => {
                let address = upper
                    .checked_add(u32::from(offset))
                    .ok_or_else(|| Error::InvalidImage("HEX address overflow".into()))?;
                trace!("HEX data: {} bytes at 0x{address:08X}", value.len());

                match chunks.last_mut() {
                    Some(last)
                        if u64::from(last.address) + last.data.len() as u64
                            == u64::from(address) =>
                    {
                        last.data.extend_from_slice(&value);
                    },
                    _ => chunks.push(HexChunk {
                        address,
                        data: value,
                    }),
                }
            },
            Record::ExtendedSegmentAddress(segment) => {
                upper = u32::from(segment) << 4;
            },
            Record::ExtendedLinearAddress(high) => {
                upper = u32::from(high) << 16;
            },
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {},
            Record::EndOfFile => {
                saw_eof = true;
                break;
            },
        }
    }

    if !saw_eof {
        return Err(Error::InvalidImage("HEX file has no end-of-file record".into()));
    }

    Ok(chunks)
}
