// 8.3 directory entries for the root directory of a fresh volume

use super::constants::*;
use byteorder::{ByteOrder, LittleEndian};
use m65fdisk_core::DosName;

/// FAT time 21:50:38, the fixed stamp of every entry this tool creates.
pub const FIXED_TIME: u16 = 0xAE53;
/// FAT date 2017-04-19.
pub const FIXED_DATE: u16 = 0x4A93;

pub const ENTRIES_PER_SECTOR: usize = 512 / DIR_ENTRY_SIZE;

fn stamp(entry: &mut [u8]) {
    LittleEndian::write_u16(&mut entry[DIR_CRT_TIME..], FIXED_TIME);
    LittleEndian::write_u16(&mut entry[DIR_CRT_DATE..], FIXED_DATE);
    LittleEndian::write_u16(&mut entry[DIR_LST_ACC_DATE..], FIXED_DATE);
    LittleEndian::write_u16(&mut entry[DIR_WRT_TIME..], FIXED_TIME);
    LittleEndian::write_u16(&mut entry[DIR_WRT_DATE..], FIXED_DATE);
}

/// Volume label entry (attribute 0x08, no cluster, no size).
pub fn volume_label_entry(label: &[u8; 11]) -> [u8; DIR_ENTRY_SIZE] {
    let mut entry = [0u8; DIR_ENTRY_SIZE];
    entry[DIR_NAME..DIR_NAME + 11].copy_from_slice(label);
    entry[DIR_ATTR] = ATTR_VOLUME_ID;
    stamp(&mut entry);
    entry
}

pub fn file_entry(name: &DosName, first_cluster: u32, size: u32) -> [u8; DIR_ENTRY_SIZE] {
    let mut entry = [0u8; DIR_ENTRY_SIZE];
    entry[DIR_NAME..DIR_NAME + 11].copy_from_slice(name.as_bytes());
    entry[DIR_ATTR] = ATTR_ARCHIVE;
    stamp(&mut entry);
    LittleEndian::write_u16(&mut entry[DIR_FST_CLUS_HI..], (first_cluster >> 16) as u16);
    LittleEndian::write_u16(&mut entry[DIR_FST_CLUS_LO..], (first_cluster & 0xFFFF) as u16);
    LittleEndian::write_u32(&mut entry[DIR_FILE_SIZE..], size);
    entry
}

/// True when the slot is unused (first name byte 0x00 or deleted 0xE5).
pub fn is_free(entry: &[u8]) -> bool {
    entry[DIR_NAME] == 0x00 || entry[DIR_NAME] == 0xE5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_label_entry_bytes() {
        let entry = volume_label_entry(b"M.E.G.A.65!");
        assert_eq!(&entry[..11], b"M.E.G.A.65!");
        assert_eq!(
            &entry[11..26],
            &[0x08, 0, 0, 0x53, 0xAE, 0x93, 0x4A, 0x93, 0x4A, 0, 0, 0x53, 0xAE, 0x93, 0x4A]
        );
        assert!(entry[26..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_file_entry_splits_cluster() {
        let name = DosName::parse_strict("big.bin").unwrap();
        let entry = file_entry(&name, 0x0001_0003, 70_000);
        assert_eq!(&entry[..11], b"BIG     BIN");
        assert_eq!(entry[DIR_ATTR], ATTR_ARCHIVE);
        assert_eq!(LittleEndian::read_u16(&entry[DIR_FST_CLUS_HI..]), 0x0001);
        assert_eq!(LittleEndian::read_u16(&entry[DIR_FST_CLUS_LO..]), 0x0003);
        assert_eq!(LittleEndian::read_u32(&entry[DIR_FILE_SIZE..]), 70_000);
        assert!(!is_free(&entry));
    }
}
