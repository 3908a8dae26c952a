// Native FAT32 formatter for the MEGA65 data partition
// Uses the shared FAT components and writes through the Storage trait

use crate::fat_common::directory::volume_label_entry;
use crate::fat_common::{
    build_fat32_boot_sector, FatBootSectorParams, BOOT_SIGNATURE, BOOT_SIGNATURE_OFFSET,
    FAT32_BACKUP_BOOT_SECTOR, FAT32_BACKUP_FS_INFO_SECTOR, FAT32_EOC, FAT32_FS_INFO_SECTOR,
    FAT32_MEDIA_ENTRY, FSI_FREE_COUNT, FSI_LEAD_SIG, FSI_LEAD_SIGNATURE, FSI_NXT_FREE,
    FSI_STRUC_SIG, FSI_STRUC_SIGNATURE,
};
use crate::planner::PartitionPlan;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};
use m65fdisk_core::{FdiskError, Sector, Storage, SECTOR_SIZE};

/// First cluster after the root directory.
pub const FIRST_FREE_CLUSTER: u32 = 3;

/// Sectors erased after the first root directory sector.
const ROOT_DIR_TAIL_SECTORS: u32 = 8;

pub struct Fat32NativeFormatter {
    params: FatBootSectorParams,
    volume_label: [u8; 11],
}

impl Fat32NativeFormatter {
    pub fn new(volume_label: [u8; 11]) -> Self {
        Self {
            params: FatBootSectorParams::default(),
            volume_label,
        }
    }

    /// Create FSInfo sector
    pub fn create_fsinfo_sector(free_clusters: u32, next_free: u32) -> Sector {
        let mut fsinfo = [0u8; SECTOR_SIZE];

        fsinfo[FSI_LEAD_SIG..FSI_LEAD_SIG + 4].copy_from_slice(FSI_LEAD_SIGNATURE);
        fsinfo[FSI_STRUC_SIG..FSI_STRUC_SIG + 4].copy_from_slice(FSI_STRUC_SIGNATURE);
        LittleEndian::write_u32(&mut fsinfo[FSI_FREE_COUNT..], free_clusters);
        LittleEndian::write_u32(&mut fsinfo[FSI_NXT_FREE..], next_free);
        fsinfo[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);

        fsinfo
    }

    /// First sector of an empty FAT: media entry, end of chain, and the
    /// root directory cluster.
    pub fn create_fat_sector() -> Sector {
        let mut fat = [0u8; SECTOR_SIZE];
        LittleEndian::write_u32(&mut fat[0..], FAT32_MEDIA_ENTRY);
        LittleEndian::write_u32(&mut fat[4..], FAT32_EOC);
        LittleEndian::write_u32(&mut fat[8..], FAT32_MEDIA_ENTRY);
        fat
    }

    /// First root directory sector, holding only the volume label.
    pub fn create_root_dir_sector(volume_label: &[u8; 11]) -> Sector {
        let mut sector = [0u8; SECTOR_SIZE];
        let entry = volume_label_entry(volume_label);
        sector[..entry.len()].copy_from_slice(&entry);
        sector
    }

    /// Write the FAT32 volume described by `plan`. The MBR and system
    /// partition are written separately.
    pub fn write_volume(&self, storage: &mut dyn Storage, plan: &PartitionPlan) -> Result<(), FdiskError> {
        let start = plan.fat_partition_start;
        let fat = &plan.fat;

        info!(
            "FAT32 parameters: {} sectors, {} sectors/cluster, {} sectors/FAT, {} total clusters",
            plan.fat_partition_sectors, fat.sectors_per_cluster, fat.fat_sectors, fat.clusters
        );

        let boot_sector = build_fat32_boot_sector(&self.params, plan.fat_partition_sectors, fat.fat_sectors);
        storage.write_sector(start, &boot_sector)?;
        storage.write_sector(start + FAT32_BACKUP_BOOT_SECTOR as u32, &boot_sector)?;
        info!("Wrote FAT32 boot sector and backup");

        let fsinfo = Self::create_fsinfo_sector(fat.free_clusters(), FIRST_FREE_CLUSTER);
        storage.write_sector(start + FAT32_FS_INFO_SECTOR as u32, &fsinfo)?;
        storage.write_sector(start + FAT32_BACKUP_FS_INFO_SECTOR as u32, &fsinfo)?;
        info!("Wrote FSInfo sector and backup");

        let fat_sector = Self::create_fat_sector();
        storage.write_sector(plan.fat1_lba(), &fat_sector)?;
        storage.write_sector(plan.fat2_lba(), &fat_sector)?;
        info!("Wrote 2 FAT32 tables");

        storage.write_sector(plan.rootdir_lba(), &Self::create_root_dir_sector(&self.volume_label))?;
        info!("Initialized root directory cluster");

        let gaps = [
            (start + FAT32_FS_INFO_SECTOR as u32 + 1, start + FAT32_BACKUP_BOOT_SECTOR as u32 - 1),
            (start + FAT32_BACKUP_FS_INFO_SECTOR as u32 + 1, plan.fat1_lba() - 1),
            (plan.fat1_lba() + 1, plan.fat2_lba() - 1),
            (plan.fat2_lba() + 1, plan.rootdir_lba() - 1),
            (plan.rootdir_lba() + 1, plan.rootdir_lba() + ROOT_DIR_TAIL_SECTORS),
        ];
        for (first, last) in gaps {
            erase_if_nonempty(storage, first, last)?;
        }

        info!("FAT32 format completed successfully");
        Ok(())
    }
}

/// Erase `first..=last`, skipping empty ranges.
pub(crate) fn erase_if_nonempty(storage: &mut dyn Storage, first: u32, last: u32) -> Result<(), FdiskError> {
    if last < first {
        debug!("Skipping empty erase ${:x}..${:x}", first, last);
        return Ok(());
    }
    debug!("Erasing sectors ${:x} - ${:x}", first, last);
    storage.erase_range(first, last)
}
