// Contiguous file creation on a freshly formatted MEGA65 FAT32 volume
// Files are placed back to back after the root directory cluster. The
// FSInfo counters are left for the next fsck to recompute.

use super::formatter_native::FIRST_FREE_CLUSTER;
use crate::fat_common::directory::{file_entry, is_free, ENTRIES_PER_SECTOR};
use crate::fat_common::{DIR_ENTRY_SIZE, FAT32_EOC, FAT32_ENTRY_SIZE, FAT32_ROOT_CLUSTER};
use crate::planner::{Fat32Geometry, FAT_ENTRIES_PER_SECTOR};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use m65fdisk_core::{DosName, FdiskError, FileAllocator, Sector, Storage, SECTOR_SIZE};

pub struct Fat32ContiguousAllocator {
    sectors_per_cluster: u32,
    /// One past the highest valid cluster number.
    cluster_limit: u32,
    next_free: u32,
}

impl Fat32ContiguousAllocator {
    pub fn new(geometry: &Fat32Geometry) -> Self {
        Self {
            sectors_per_cluster: geometry.sectors_per_cluster,
            cluster_limit: geometry.clusters,
            next_free: FIRST_FREE_CLUSTER,
        }
    }

    pub fn next_free_cluster(&self) -> u32 {
        self.next_free
    }

    fn cluster_bytes(&self) -> u32 {
        self.sectors_per_cluster * SECTOR_SIZE as u32
    }

    /// First free entry of the root directory cluster, as (lba, byte offset).
    fn find_free_entry(
        &self,
        storage: &mut dyn Storage,
        root_dir_lba: u32,
    ) -> Result<Option<(u32, Sector, usize)>, FdiskError> {
        for lba in root_dir_lba..root_dir_lba + self.sectors_per_cluster {
            let sector = storage.read_sector(lba)?;
            for index in 0..ENTRIES_PER_SECTOR {
                let offset = index * DIR_ENTRY_SIZE;
                if is_free(&sector[offset..offset + DIR_ENTRY_SIZE]) {
                    return Ok(Some((lba, sector, offset)));
                }
            }
        }
        Ok(None)
    }

    /// Link `first..first+count` into a single chain in one FAT copy.
    fn write_chain(
        &self,
        storage: &mut dyn Storage,
        fat_lba: u32,
        first: u32,
        count: u32,
    ) -> Result<(), FdiskError> {
        let last = first + count - 1;
        let mut cluster = first;
        while cluster <= last {
            let fat_sector = cluster / FAT_ENTRIES_PER_SECTOR;
            let lba = fat_lba + fat_sector;
            let mut sector = storage.read_sector(lba)?;

            while cluster <= last && cluster / FAT_ENTRIES_PER_SECTOR == fat_sector {
                let offset = (cluster % FAT_ENTRIES_PER_SECTOR) as usize * FAT32_ENTRY_SIZE;
                let next = if cluster == last { FAT32_EOC } else { cluster + 1 };
                LittleEndian::write_u32(&mut sector[offset..], next);
                cluster += 1;
            }

            storage.write_sector(lba, &sector)?;
        }
        Ok(())
    }
}

impl FileAllocator for Fat32ContiguousAllocator {
    fn create_contiguous_file(
        &mut self,
        storage: &mut dyn Storage,
        name: &DosName,
        length: u32,
        root_dir_lba: u32,
        fat1_lba: u32,
        fat2_lba: u32,
    ) -> Result<Option<u32>, FdiskError> {
        let count = length.div_ceil(self.cluster_bytes()).max(1);
        let first = self.next_free;

        if first as u64 + count as u64 > self.cluster_limit as u64 {
            warn!(
                "No room for {} ({} clusters needed, {} free)",
                name,
                count,
                self.cluster_limit.saturating_sub(first)
            );
            return Ok(None);
        }

        let Some((dir_lba, mut dir_sector, offset)) = self.find_free_entry(storage, root_dir_lba)? else {
            warn!("Root directory is full, cannot create {}", name);
            return Ok(None);
        };

        let entry = file_entry(name, first, length);
        dir_sector[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(&entry);
        storage.write_sector(dir_lba, &dir_sector)?;
        debug!("Directory entry for {} at ${:x}+{}", name, dir_lba, offset);

        self.write_chain(storage, fat1_lba, first, count)?;
        self.write_chain(storage, fat2_lba, first, count)?;
        self.next_free = first + count;

        let first_sector = root_dir_lba + (first - FAT32_ROOT_CLUSTER) * self.sectors_per_cluster;
        info!(
            "Created {} ({} bytes) at cluster {} (sector ${:x})",
            name, length, first, first_sector
        );
        Ok(Some(first_sector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat32::Fat32NativeFormatter;
    use crate::planner::PartitionPlan;
    use m65fdisk_core::test_utils::MemoryStorage;
    use m65fdisk_core::Bus;

    fn formatted() -> (MemoryStorage, PartitionPlan) {
        let plan = PartitionPlan::for_device(40_960).unwrap();
        let mut storage = MemoryStorage::new(40_960);
        storage.select(Bus::Internal).unwrap();
        Fat32NativeFormatter::new(*b"M.E.G.A.65!")
            .write_volume(&mut storage, &plan)
            .unwrap();
        (storage, plan)
    }

    fn create(
        allocator: &mut Fat32ContiguousAllocator,
        storage: &mut MemoryStorage,
        plan: &PartitionPlan,
        name: &str,
        length: u32,
    ) -> Option<u32> {
        allocator
            .create_contiguous_file(
                storage,
                &DosName::parse_strict(name).unwrap(),
                length,
                plan.rootdir_lba(),
                plan.fat1_lba(),
                plan.fat2_lba(),
            )
            .unwrap()
    }

    fn fat_entry(storage: &MemoryStorage, fat_lba: u32, cluster: u32) -> u32 {
        let sector = storage.sector(Bus::Internal, fat_lba + cluster / 128);
        LittleEndian::read_u32(&sector[(cluster % 128) as usize * 4..])
    }

    #[test]
    fn test_files_are_placed_back_to_back() {
        let (mut storage, plan) = formatted();
        let mut allocator = Fat32ContiguousAllocator::new(&plan.fat);

        let first = create(&mut allocator, &mut storage, &plan, "mega65.rom", 131_072).unwrap();
        assert_eq!(first, plan.rootdir_lba() + 8);
        assert_eq!(allocator.next_free_cluster(), 3 + 32);

        let second = create(&mut allocator, &mut storage, &plan, "a.txt", 10).unwrap();
        assert_eq!(second, plan.rootdir_lba() + 33 * 8);

        let root = storage.sector(Bus::Internal, plan.rootdir_lba());
        assert_eq!(&root[..11], b"M.E.G.A.65!");
        assert_eq!(&root[32..43], b"MEGA65  ROM");
        assert_eq!(LittleEndian::read_u16(&root[32 + 0x1A..]), 3);
        assert_eq!(LittleEndian::read_u32(&root[32 + 0x1C..]), 131_072);
        assert_eq!(&root[64..75], b"A       TXT");
        assert_eq!(LittleEndian::read_u16(&root[64 + 0x1A..]), 35);
    }

    #[test]
    fn test_chain_written_to_both_fats() {
        let (mut storage, plan) = formatted();
        let mut allocator = Fat32ContiguousAllocator::new(&plan.fat);

        // 200 clusters cross the first FAT sector boundary
        create(&mut allocator, &mut storage, &plan, "big.bin", 200 * 4096).unwrap();

        for fat_lba in [plan.fat1_lba(), plan.fat2_lba()] {
            assert_eq!(fat_entry(&storage, fat_lba, 0), 0x0FFF_FFF8);
            assert_eq!(fat_entry(&storage, fat_lba, 2), 0x0FFF_FFF8);
            assert_eq!(fat_entry(&storage, fat_lba, 3), 4);
            assert_eq!(fat_entry(&storage, fat_lba, 127), 128);
            assert_eq!(fat_entry(&storage, fat_lba, 128), 129);
            assert_eq!(fat_entry(&storage, fat_lba, 202), 0x0FFF_FFFF);
            assert_eq!(fat_entry(&storage, fat_lba, 203), 0);
        }
    }

    #[test]
    fn test_out_of_space_returns_none() {
        let (mut storage, plan) = formatted();
        let mut allocator = Fat32ContiguousAllocator::new(&plan.fat);
        let too_big = plan.fat.clusters * 4096;
        assert_eq!(create(&mut allocator, &mut storage, &plan, "huge.bin", too_big), None);
        assert_eq!(allocator.next_free_cluster(), 3);
    }

    #[test]
    fn test_full_root_directory_returns_none() {
        let (mut storage, plan) = formatted();
        let mut used = [0u8; 512];
        for entry in used.chunks_mut(32) {
            entry[..11].copy_from_slice(b"TAKEN   BIN");
        }
        for lba in plan.rootdir_lba()..plan.rootdir_lba() + 8 {
            storage.preload(Bus::Internal, lba, used);
        }

        let mut allocator = Fat32ContiguousAllocator::new(&plan.fat);
        assert_eq!(create(&mut allocator, &mut storage, &plan, "late.txt", 1), None);
    }
}
