// Boot sector builder for the MEGA65 FAT32 volume
// The BPB fields are fixed except the two size fields patched per card

use super::constants::*;
use byteorder::{ByteOrder, LittleEndian};
use m65fdisk_core::{Sector, SECTOR_SIZE};
use static_assertions::const_assert;

/// x86 stub that prints the message at 0x7C77 and waits for a key.
const BOOT_CODE: [u8; 29] = [
    0x0E, 0x1F, 0xBE, 0x77, 0x7C, 0xAC, 0x22, 0xC0, 0x74, 0x0B, 0x56, 0xB4, 0x0E, 0xBB, 0x07,
    0x00, 0xCD, 0x10, 0x5E, 0xEB, 0xF0, 0x32, 0xE4, 0xCD, 0x16, 0xCD, 0x19, 0xEB, 0xFE,
];

const BOOT_MESSAGE_OFFSET: usize = BS32_BOOT_CODE + BOOT_CODE.len();

const BOOT_MESSAGE: &[u8] = b"MEGA65 HYPPOBOOT V00.11\r\n\r?NO 45GS02, 4510, 65[ce]02, 6510 OR 8510 PROCESSOR  ERROR\r\nINSERT DISK IN REAL COMPUTER AND TRY AGAIN.\n\nREADY.\r\n";

// The stub loads SI with 0x7C77
const_assert!(BOOT_MESSAGE_OFFSET == 0x77);
const_assert!(BOOT_MESSAGE_OFFSET + BOOT_MESSAGE.len() <= BOOT_SIGNATURE_OFFSET);

/// Fixed BPB parameters of the MEGA65 FAT32 volume
#[derive(Debug, Clone)]
pub struct FatBootSectorParams {
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub media_descriptor: u8,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub volume_serial: u32,
    pub volume_label: [u8; 11],
}

impl Default for FatBootSectorParams {
    fn default() -> Self {
        Self {
            oem_name: *b"MEGA65r1",
            bytes_per_sector: STANDARD_BYTES_PER_SECTOR,
            sectors_per_cluster: 8,
            reserved_sectors: 568,
            num_fats: 2,
            media_descriptor: MEDIA_FIXED,
            // LBA only
            sectors_per_track: 0,
            num_heads: 0,
            hidden_sectors: 0,
            volume_serial: u32::from_le_bytes(*b"mfba"),
            volume_label: *b"M.E.G.A. 65",
        }
    }
}

/// Build the FAT32 boot sector. `total_sectors` is the size of the whole
/// FAT partition, `sectors_per_fat32` the size of one FAT copy.
pub fn build_fat32_boot_sector(
    params: &FatBootSectorParams,
    total_sectors: u32,
    sectors_per_fat32: u32,
) -> Sector {
    let mut boot_sector = [0u8; SECTOR_SIZE];

    // Jump instruction
    boot_sector[BS_JMP_BOOT..BS_JMP_BOOT + 3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    boot_sector[BS_OEM_NAME..BS_OEM_NAME + 8].copy_from_slice(&params.oem_name);

    // BPB common fields
    LittleEndian::write_u16(&mut boot_sector[BPB_BYTES_PER_SEC..], params.bytes_per_sector);
    boot_sector[BPB_SEC_PER_CLUS] = params.sectors_per_cluster;
    LittleEndian::write_u16(&mut boot_sector[BPB_RSVD_SEC_CNT..], params.reserved_sectors);
    boot_sector[BPB_NUM_FATS] = params.num_fats;
    LittleEndian::write_u16(&mut boot_sector[BPB_ROOT_ENT_CNT..], 0);
    LittleEndian::write_u16(&mut boot_sector[BPB_TOT_SEC16..], 0);
    boot_sector[BPB_MEDIA] = params.media_descriptor;
    LittleEndian::write_u16(&mut boot_sector[BPB_FAT_SZ16..], 0);
    LittleEndian::write_u16(&mut boot_sector[BPB_SEC_PER_TRK..], params.sectors_per_track);
    LittleEndian::write_u16(&mut boot_sector[BPB_NUM_HEADS..], params.num_heads);
    LittleEndian::write_u32(&mut boot_sector[BPB_HIDD_SEC..], params.hidden_sectors);
    LittleEndian::write_u32(&mut boot_sector[BPB_TOT_SEC32..], total_sectors);

    // FAT32 extended BPB
    LittleEndian::write_u32(&mut boot_sector[BPB_FAT_SZ32..], sectors_per_fat32);
    LittleEndian::write_u16(&mut boot_sector[BPB_EXT_FLAGS..], 0);
    LittleEndian::write_u16(&mut boot_sector[BPB_FS_VER..], 0);
    LittleEndian::write_u32(&mut boot_sector[BPB_ROOT_CLUS..], FAT32_ROOT_CLUSTER);
    LittleEndian::write_u16(&mut boot_sector[BPB_FS_INFO..], FAT32_FS_INFO_SECTOR);
    LittleEndian::write_u16(&mut boot_sector[BPB_BK_BOOT_SEC..], FAT32_BACKUP_BOOT_SECTOR);

    boot_sector[BS32_DRV_NUM] = 0x80;
    boot_sector[BS32_RESERVED1] = 0;
    boot_sector[BS32_BOOT_SIG] = 0x29;
    LittleEndian::write_u32(&mut boot_sector[BS32_VOL_ID..], params.volume_serial);
    boot_sector[BS32_VOL_LAB..BS32_VOL_LAB + 11].copy_from_slice(&params.volume_label);
    boot_sector[BS32_FIL_SYS_TYPE..BS32_FIL_SYS_TYPE + 8].copy_from_slice(b"FAT32   ");

    // Non-bootable stub and its message
    boot_sector[BS32_BOOT_CODE..BOOT_MESSAGE_OFFSET].copy_from_slice(&BOOT_CODE);
    boot_sector[BOOT_MESSAGE_OFFSET..BOOT_MESSAGE_OFFSET + BOOT_MESSAGE.len()]
        .copy_from_slice(BOOT_MESSAGE);

    boot_sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);

    boot_sector
}

/// Total sectors and sectors per FAT as stored in a boot sector.
pub fn read_fat32_sizes(boot_sector: &Sector) -> (u32, u32) {
    (
        LittleEndian::read_u32(&boot_sector[BPB_TOT_SEC32..]),
        LittleEndian::read_u32(&boot_sector[BPB_FAT_SZ32..]),
    )
}
