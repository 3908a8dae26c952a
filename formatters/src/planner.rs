// Partition and FAT32 geometry planning
// Splits the card into the FAT32 data partition and the MEGA65 system
// partition, then fits the largest cluster count the FAT partition can hold.

use crate::system_partition::SystemPartitionLayout;
use log::{debug, info};
use m65fdisk_core::FdiskError;

/// First partition starts at 1 MiB.
pub const FAT_PARTITION_START: u32 = 0x0800;
pub const RESERVED_SECTORS: u32 = 568;
pub const SECTORS_PER_CLUSTER: u32 = 8;
/// 4 byte FAT32 entries in a 512 byte sector.
pub const FAT_ENTRIES_PER_SECTOR: u32 = 128;
/// 2 GiB upper bound for the system partition.
pub const MAX_SYS_PARTITION_SECTORS: u32 = 2 * 1024 * 2048;
pub const PARTITION_ALIGNMENT: u32 = 2048;
/// Two reserved FAT entries plus the root directory cluster.
pub const MIN_CLUSTERS: u32 = 3;

/// FAT32 geometry. Sector numbers are relative to the partition start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat32Geometry {
    pub reserved_sectors: u32,
    pub sectors_per_cluster: u32,
    /// Sectors in one FAT copy.
    pub fat_sectors: u32,
    pub fat1_sector: u32,
    pub fat2_sector: u32,
    pub rootdir_sector: u32,
    pub clusters: u32,
    pub data_sectors: u32,
}

impl Fat32Geometry {
    /// Sectors the FATs plus the usable data clusters take up.
    pub fn required_sectors(&self) -> u64 {
        sectors_required(self.clusters, self.fat_sectors)
    }

    /// Free clusters on an empty volume, root directory excluded.
    pub fn free_clusters(&self) -> u32 {
        self.clusters - MIN_CLUSTERS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub total_sectors: u32,
    pub fat_partition_start: u32,
    pub fat_partition_sectors: u32,
    pub sys_partition_start: u32,
    pub sys_partition_sectors: u32,
    pub fat: Fat32Geometry,
    pub system: SystemPartitionLayout,
}

impl PartitionPlan {
    /// Plan the layout of a card with `total_sectors` 512 byte sectors.
    pub fn for_device(total_sectors: u32) -> Result<Self, FdiskError> {
        let usable = total_sectors.checked_sub(FAT_PARTITION_START).ok_or_else(|| {
            FdiskError::Capacity(format!(
                "{} sectors is less than the {} sector partition offset",
                total_sectors, FAT_PARTITION_START
            ))
        })?;

        let sys_partition_sectors = system_partition_sectors(usable);
        let fat_partition_sectors = usable - sys_partition_sectors;
        let fat = plan_fat32(fat_partition_sectors)?;

        let fat_partition_start = FAT_PARTITION_START;
        let sys_partition_start = fat_partition_start + fat_partition_sectors;
        let system = SystemPartitionLayout::new(sys_partition_start, sys_partition_sectors);

        if system.used_sectors() > sys_partition_sectors {
            return Err(FdiskError::Capacity(format!(
                "system partition of {} sectors cannot hold its {} sector reserved area and directories",
                sys_partition_sectors,
                system.used_sectors()
            )));
        }

        info!(
            "VFAT32 partition has ${:x} sectors (${:x} available), system partition ${:x} sectors",
            fat_partition_sectors,
            fat_partition_sectors - RESERVED_SECTORS,
            sys_partition_sectors
        );

        Ok(Self {
            total_sectors,
            fat_partition_start,
            fat_partition_sectors,
            sys_partition_start,
            sys_partition_sectors,
            fat,
            system,
        })
    }

    pub fn fat1_lba(&self) -> u32 {
        self.fat_partition_start + self.fat.fat1_sector
    }

    pub fn fat2_lba(&self) -> u32 {
        self.fat_partition_start + self.fat.fat2_sector
    }

    pub fn rootdir_lba(&self) -> u32 {
        self.fat_partition_start + self.fat.rootdir_sector
    }

    /// Human readable summary shown before asking for confirmation.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!(
                "{} MiB VFAT32 Data Partition @ ${:08x}:",
                (self.fat_partition_sectors + 1) / 2048,
                self.fat_partition_start
            ),
            format!(
                "  ${:x} Clusters, {} Sectors/FAT, {} Reserved Sectors.",
                self.fat.clusters, self.fat.fat_sectors, self.fat.reserved_sectors
            ),
            format!(
                "{} MiB MEGA65 System Partition @ ${:08x}:",
                (self.sys_partition_sectors + 1) / 2048,
                self.sys_partition_start
            ),
            format!("  {} Freeze and OS Service slots.", self.system.slot_count),
        ]
    }
}

/// Half of the space after the partition offset, capped at 2 GiB and
/// rounded down to a whole MiB.
pub fn system_partition_sectors(usable: u32) -> u32 {
    let half = (usable / 2).min(MAX_SYS_PARTITION_SECTORS);
    half - half % PARTITION_ALIGNMENT
}

fn fat_sectors_for(clusters: u32) -> u32 {
    clusters.div_ceil(FAT_ENTRIES_PER_SECTOR)
}

fn sectors_required(clusters: u32, fat_sectors: u32) -> u64 {
    2 * fat_sectors as u64 + (clusters as u64 - 2) * SECTORS_PER_CLUSTER as u64
}

/// Fit the cluster count into a FAT partition of `fat_partition_sectors`.
pub fn plan_fat32(fat_partition_sectors: u32) -> Result<Fat32Geometry, FdiskError> {
    let too_small = |clusters: u64| {
        FdiskError::Capacity(format!(
            "FAT partition of {} sectors fits only {} clusters, need at least {}",
            fat_partition_sectors, clusters, MIN_CLUSTERS
        ))
    };

    let available = fat_partition_sectors.checked_sub(RESERVED_SECTORS).ok_or_else(|| too_small(0))?;

    let mut clusters = available / SECTORS_PER_CLUSTER;
    if clusters < MIN_CLUSTERS {
        return Err(too_small(clusters as u64));
    }
    let mut fat_sectors = fat_sectors_for(clusters);
    let mut required = sectors_required(clusters, fat_sectors);

    while required > available as u64 {
        let excess = required - available as u64;
        let delta = (excess / (1 + SECTORS_PER_CLUSTER as u64)).max(1);
        debug!("{} clusters would take {} too many sectors", clusters, excess);

        clusters = match (clusters as u64).checked_sub(delta) {
            Some(fewer) if fewer >= MIN_CLUSTERS as u64 => fewer as u32,
            Some(fewer) => return Err(too_small(fewer)),
            None => return Err(too_small(0)),
        };
        fat_sectors = fat_sectors_for(clusters);
        required = sectors_required(clusters, fat_sectors);
    }

    let fat1_sector = RESERVED_SECTORS;
    let fat2_sector = fat1_sector + fat_sectors;
    let rootdir_sector = fat2_sector + fat_sectors;

    Ok(Fat32Geometry {
        reserved_sectors: RESERVED_SECTORS,
        sectors_per_cluster: SECTORS_PER_CLUSTER,
        fat_sectors,
        fat1_sector,
        fat2_sector,
        rootdir_sector,
        clusters,
        data_sectors: clusters * SECTORS_PER_CLUSTER,
    })
}
