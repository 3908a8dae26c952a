// FAT32 on-disk constants used by the MEGA65 volume layout

// Boot sector offsets
pub const BS_JMP_BOOT: usize = 0x00;
pub const BS_OEM_NAME: usize = 0x03;
pub const BPB_BYTES_PER_SEC: usize = 0x0B;
pub const BPB_SEC_PER_CLUS: usize = 0x0D;
pub const BPB_RSVD_SEC_CNT: usize = 0x0E;
pub const BPB_NUM_FATS: usize = 0x10;
pub const BPB_ROOT_ENT_CNT: usize = 0x11;
pub const BPB_TOT_SEC16: usize = 0x13;
pub const BPB_MEDIA: usize = 0x15;
pub const BPB_FAT_SZ16: usize = 0x16;
pub const BPB_SEC_PER_TRK: usize = 0x18;
pub const BPB_NUM_HEADS: usize = 0x1A;
pub const BPB_HIDD_SEC: usize = 0x1C;
pub const BPB_TOT_SEC32: usize = 0x20;

// FAT32 extended BPB
pub const BPB_FAT_SZ32: usize = 0x24;
pub const BPB_EXT_FLAGS: usize = 0x28;
pub const BPB_FS_VER: usize = 0x2A;
pub const BPB_ROOT_CLUS: usize = 0x2C;
pub const BPB_FS_INFO: usize = 0x30;
pub const BPB_BK_BOOT_SEC: usize = 0x32;
pub const BS32_DRV_NUM: usize = 0x40;
pub const BS32_RESERVED1: usize = 0x41;
pub const BS32_BOOT_SIG: usize = 0x42;
pub const BS32_VOL_ID: usize = 0x43;
pub const BS32_VOL_LAB: usize = 0x47;
pub const BS32_FIL_SYS_TYPE: usize = 0x52;
pub const BS32_BOOT_CODE: usize = 0x5A;

// Boot sector signature
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;

// FSInfo sector
pub const FSI_LEAD_SIG: usize = 0x000;
pub const FSI_STRUC_SIG: usize = 0x1E4;
pub const FSI_FREE_COUNT: usize = 0x1E8;
pub const FSI_NXT_FREE: usize = 0x1EC;
pub const FSI_LEAD_SIGNATURE: &[u8; 4] = b"RRaA";
pub const FSI_STRUC_SIGNATURE: &[u8; 4] = b"rrAa";

// FAT entry values
pub const FAT32_EOC: u32 = 0x0FFF_FFFF;
pub const FAT32_MEDIA_ENTRY: u32 = 0x0FFF_FFF8;
pub const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;
pub const FAT32_ENTRY_SIZE: usize = 4;

// Standard values
pub const STANDARD_BYTES_PER_SECTOR: u16 = 512;
pub const FAT32_ROOT_CLUSTER: u32 = 2;
pub const FAT32_FS_INFO_SECTOR: u16 = 1;
pub const FAT32_BACKUP_BOOT_SECTOR: u16 = 6;
pub const FAT32_BACKUP_FS_INFO_SECTOR: u16 = 7;

// Media descriptors
pub const MEDIA_FIXED: u8 = 0xF8;

// Directory entries
pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_NAME: usize = 0x00;
pub const DIR_ATTR: usize = 0x0B;
pub const DIR_CRT_TIME: usize = 0x0E;
pub const DIR_CRT_DATE: usize = 0x10;
pub const DIR_LST_ACC_DATE: usize = 0x12;
pub const DIR_FST_CLUS_HI: usize = 0x14;
pub const DIR_WRT_TIME: usize = 0x16;
pub const DIR_WRT_DATE: usize = 0x18;
pub const DIR_FST_CLUS_LO: usize = 0x1A;
pub const DIR_FILE_SIZE: usize = 0x1C;

pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_ARCHIVE: u8 = 0x20;

// Partition type codes for MBR
pub const PARTITION_TYPE_FAT32_LBA: u8 = 0x0C;
pub const PARTITION_TYPE_MEGA65_SYSTEM: u8 = 0x41;
