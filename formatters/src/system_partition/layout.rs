// Layout of the MEGA65 system partition
//
// [ header | config | erased ... ]  1 MiB reserved
// [ freeze dir | freeze slots   ]
// [ service dir | service slots ]

/// 512 KiB per frozen program or service slot.
pub const SLOT_SIZE_SECTORS: u32 = 1024;
/// Header, configuration sector and erased margin.
pub const SYSTEM_RESERVED_SECTORS: u32 = 2048;
/// Slot counters are 16 bit on disk.
pub const MAX_SLOTS: u32 = 0xFFFF;
/// 128 byte directory entries.
pub const DIR_ENTRIES_PER_SECTOR: u32 = 4;

pub const HEADER_SECTOR: u32 = 0;
pub const CONFIG_SECTOR: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemPartitionLayout {
    pub partition_start: u32,
    pub partition_sectors: u32,
    pub slot_size: u32,
    pub slot_count: u16,
    pub dir_sectors: u16,
}

impl SystemPartitionLayout {
    /// Freeze and service areas get the same number of slots, each slot
    /// costing `slot_size` sectors plus a directory entry in both areas.
    pub fn new(partition_start: u32, partition_sectors: u32) -> Self {
        let slot_size = SLOT_SIZE_SECTORS;
        let slot_count = (partition_sectors.saturating_sub(SYSTEM_RESERVED_SECTORS) / (slot_size * 2 + 1))
            .min(MAX_SLOTS) as u16;
        let dir_sectors = 1 + slot_count / DIR_ENTRIES_PER_SECTOR as u16;

        Self {
            partition_start,
            partition_sectors,
            slot_size,
            slot_count,
            dir_sectors,
        }
    }

    /// Directory plus slots of one area.
    pub fn area_sectors(&self) -> u32 {
        self.slot_size * self.slot_count as u32 + self.dir_sectors as u32
    }

    /// Freeze directory, relative to the partition start.
    pub fn freeze_dir_offset(&self) -> u32 {
        SYSTEM_RESERVED_SECTORS
    }

    /// Service directory, relative to the partition start. It follows the
    /// last freeze slot.
    pub fn service_dir_offset(&self) -> u32 {
        self.freeze_dir_offset() + self.area_sectors()
    }

    pub fn freeze_dir_lba(&self) -> u32 {
        self.partition_start + self.freeze_dir_offset()
    }

    pub fn service_dir_lba(&self) -> u32 {
        self.partition_start + self.service_dir_offset()
    }

    pub fn header_lba(&self) -> u32 {
        self.partition_start + HEADER_SECTOR
    }

    pub fn config_lba(&self) -> u32 {
        self.partition_start + CONFIG_SECTOR
    }

    /// Sectors from the partition start to the end of the service area.
    pub fn used_sectors(&self) -> u32 {
        SYSTEM_RESERVED_SECTORS + 2 * self.area_sectors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_only_partition_has_no_slots() {
        let layout = SystemPartitionLayout::new(0x100000, 4096);
        assert_eq!(layout.slot_count, 0);
        assert_eq!(layout.dir_sectors, 1);
        assert_eq!(layout.area_sectors(), 1);
        assert_eq!(layout.freeze_dir_lba(), 0x100000 + 2048);
        assert_eq!(layout.service_dir_lba(), 0x100000 + 2049);
        assert!(layout.used_sectors() <= 4096);
    }

    #[test]
    fn test_partition_smaller_than_reserved_area() {
        let layout = SystemPartitionLayout::new(0, 1024);
        assert_eq!(layout.slot_count, 0);
        assert!(layout.used_sectors() > 1024);
    }

    #[test]
    fn test_full_size_partition() {
        let layout = SystemPartitionLayout::new(0x800, 4_194_304);
        assert_eq!(layout.slot_count, 2045);
        assert_eq!(layout.dir_sectors, 512);
        assert_eq!(layout.area_sectors(), 1024 * 2045 + 512);
        assert_eq!(layout.service_dir_offset(), 2048 + 1024 * 2045 + 512);
        assert!(layout.used_sectors() <= 4_194_304);
    }

    #[test]
    fn test_areas_are_contiguous_and_equal() {
        let layout = SystemPartitionLayout::new(5000, 1_048_576);
        assert_eq!(layout.service_dir_lba() - layout.freeze_dir_lba(), layout.area_sectors());
        assert_eq!(
            layout.used_sectors(),
            layout.service_dir_offset() + layout.area_sectors()
        );
    }
}
