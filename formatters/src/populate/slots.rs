// Core slot headers in the firmware flash
//
// Slot header (offsets within the first sector of a slot):
//   0x00  "MEGA65BITSTREAM0"
//   0x10  "MEGA65"
//   0x30  version string, 32 bytes, space padded
//   0x72  number of embedded files
//   0x73  LE32 offset of the first file header, relative to the slot

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use m65fdisk_core::{FdiskError, Flash};
use std::fmt;

pub const MAX_SLOTS: usize = 8;
pub const SLOT_MAGIC: &[u8; 16] = b"MEGA65BITSTREAM0";
/// Repeated at 0x10 on MEGA65 cores.
pub const CORE_MAGIC_LEN: usize = 6;

const HDR_CORE_MAGIC: usize = 0x10;
const HDR_VERSION: usize = 0x30;
const HDR_VERSION_LEN: usize = 32;
const HDR_FILE_COUNT: usize = 0x72;
const HDR_FILE_OFFSET: usize = 0x73;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub index: u8,
    /// Flash offset of the slot.
    pub base: u32,
    pub version: String,
    pub file_count: u8,
    /// Flash offset of the first file header.
    pub file_offset: u32,
}

impl SlotInfo {
    /// Parse a slot header sector. `None` when the magic does not match.
    pub fn parse(index: u8, base: u32, header: &[u8]) -> Option<Self> {
        if &header[..SLOT_MAGIC.len()] != SLOT_MAGIC {
            return None;
        }
        if header[HDR_CORE_MAGIC..HDR_CORE_MAGIC + CORE_MAGIC_LEN] != SLOT_MAGIC[..CORE_MAGIC_LEN] {
            debug!("Slot {} holds a bitstream that is not a MEGA65 core", index);
            return None;
        }

        let version = String::from_utf8_lossy(&header[HDR_VERSION..HDR_VERSION + HDR_VERSION_LEN])
            .trim_end_matches([' ', '\0'])
            .to_string();

        Some(SlotInfo {
            index,
            base,
            version,
            file_count: header[HDR_FILE_COUNT],
            file_offset: base.wrapping_add(LittleEndian::read_u32(&header[HDR_FILE_OFFSET..])),
        })
    }

    pub fn has_files(&self) -> bool {
        !self.version.is_empty() && self.file_count > 0
    }
}

impl fmt::Display for SlotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) MEGA65 - {:2} Files", self.index, self.file_count)
    }
}

/// The eight flash slots. Entries are `Some` only for valid MEGA65 cores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotTable {
    slots: [Option<SlotInfo>; MAX_SLOTS],
}

impl SlotTable {
    /// Read the header of every slot. Slot `i` starts at `i * slot_size`.
    pub fn scan(flash: &mut dyn Flash, slot_size: u32) -> Result<Self, FdiskError> {
        let mut table = SlotTable::default();
        for (index, entry) in table.slots.iter_mut().enumerate() {
            let base = index as u32 * slot_size;
            let header = flash.read_sector(base)?;
            *entry = SlotInfo::parse(index as u8, base, &header);
            if let Some(slot) = entry {
                debug!("Slot {}: {:?}, {} files", index, slot.version, slot.file_count);
            }
        }
        Ok(table)
    }

    pub fn get(&self, index: usize) -> Option<&SlotInfo> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Slots that carry embedded files, in slot order.
    pub fn with_files(&self) -> impl Iterator<Item = &SlotInfo> {
        self.slots.iter().flatten().filter(|slot| slot.has_files())
    }
}
