// Copies the files embedded in a core slot onto the new FAT32 volume
//
// File header, at a flash offset given relative to the slot:
//   0x00  LE32 offset of the next header, relative to the slot
//   0x04  LE32 file length in bytes
//   0x08  file name, NUL terminated, 32 bytes
//   0x28  file data

use super::slots::SlotInfo;
use crate::planner::PartitionPlan;
use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};
use m65fdisk_core::{Console, DosName, FdiskError, FileAllocator, Flash, Sector, Storage, SECTOR_SIZE};

pub const ROM_FILE_NAME: &str = "MEGA65.ROM";

const FH_NEXT_OFFSET: usize = 0x00;
const FH_LENGTH: usize = 0x04;
const FH_NAME: usize = 0x08;
const FH_NAME_LEN: usize = 32;
pub const FILE_HEADER_SIZE: u32 = 4 + 4 + FH_NAME_LEN as u32;

/// One file handed to the allocator.
#[derive(Debug)]
pub struct PopulatedFile {
    pub name: String,
    pub dos_name: DosName,
    pub length: u32,
    /// First data sector on the card, or why the file was skipped.
    pub result: Result<u32, FdiskError>,
}

impl PopulatedFile {
    pub fn written(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct PopulateReport {
    pub files: Vec<PopulatedFile>,
    pub have_rom: bool,
}

impl PopulateReport {
    pub fn failures(&self) -> impl Iterator<Item = &PopulatedFile> {
        self.files.iter().filter(|file| !file.written())
    }
}

/// Sectors spanned by `length` bytes.
pub fn sectors_for(length: u32) -> u32 {
    length.div_ceil(SECTOR_SIZE as u32)
}

/// Hand `dos_name` to the allocator and, on success, copy the file one
/// sector at a time from `read`. Allocation failures are reported, not raised.
pub(crate) fn place_file(
    storage: &mut dyn Storage,
    allocator: &mut dyn FileAllocator,
    plan: &PartitionPlan,
    dos_name: &DosName,
    length: u32,
    mut read: impl FnMut(u32) -> Result<Sector, FdiskError>,
) -> Result<Result<u32, FdiskError>, FdiskError> {
    let first_sector = allocator.create_contiguous_file(
        storage,
        dos_name,
        length,
        plan.rootdir_lba(),
        plan.fat1_lba(),
        plan.fat2_lba(),
    )?;

    let Some(first_sector) = first_sector else {
        warn!("No space for {} ({} bytes)", dos_name, length);
        return Ok(Err(FdiskError::AllocationFailure(dos_name.to_string())));
    };

    for index in 0..sectors_for(length) {
        let data = read(index)?;
        storage.write_sector(first_sector + index, &data)?;
    }
    Ok(Ok(first_sector))
}

/// Every sector of the payload starts at an addressable flash offset.
fn payload_in_flash(data_offset: u32, length: u32) -> bool {
    let last_sector = sectors_for(length).saturating_sub(1) as u64;
    data_offset as u64 + last_sector * SECTOR_SIZE as u64 <= u32::MAX as u64
}

pub struct EmbeddedFilePopulator<'a> {
    plan: &'a PartitionPlan,
}

impl<'a> EmbeddedFilePopulator<'a> {
    pub fn new(plan: &'a PartitionPlan) -> Self {
        Self { plan }
    }

    /// Walk the file list of `slot` and copy every file. Storage and flash
    /// errors abort; a file the allocator refuses is skipped.
    pub fn populate(
        &self,
        flash: &mut dyn Flash,
        storage: &mut dyn Storage,
        allocator: &mut dyn FileAllocator,
        console: &mut dyn Console,
        slot: &SlotInfo,
    ) -> Result<PopulateReport, FdiskError> {
        let mut report = PopulateReport::default();

        console.write_line(&format!("Using files embedded in slot {}", slot.index));
        console.write_line(&format!(
            "{:2} Files in Core, starting at ${:08x}.",
            slot.file_count, slot.file_offset
        ));

        let mut header_offset = slot.file_offset;
        for _ in 0..slot.file_count {
            let header = flash.read_sector(header_offset)?;
            let next_offset = slot.base.wrapping_add(LittleEndian::read_u32(&header[FH_NEXT_OFFSET..]));
            let length = LittleEndian::read_u32(&header[FH_LENGTH..]);

            let raw_name = &header[FH_NAME..FH_NAME + FH_NAME_LEN];
            let raw_name = &raw_name[..raw_name.iter().position(|&b| b == 0).unwrap_or(FH_NAME_LEN)];
            let name = String::from_utf8_lossy(raw_name).into_owned();
            let dos_name = DosName::from_lossy(raw_name);

            console.write_line(&format!("Pre-populating file {}", name));
            if name == ROM_FILE_NAME {
                report.have_rom = true;
            }

            let data_offset = header_offset.wrapping_add(FILE_HEADER_SIZE);
            let result = if payload_in_flash(data_offset, length) {
                place_file(storage, allocator, self.plan, &dos_name, length, |index| {
                    flash.read_sector(data_offset + index * SECTOR_SIZE as u32)
                })?
            } else {
                warn!("{} ({} bytes) at ${:08x} runs past the end of flash", name, length, data_offset);
                Err(FdiskError::InvalidInput(format!(
                    "{} runs past the end of flash",
                    name
                )))
            };

            match &result {
                Ok(first_sector) => info!("{} ({} bytes) written at sector ${:x}", name, length, first_sector),
                Err(_) => console.write_line("!! Error writing file"),
            }

            report.files.push(PopulatedFile {
                name,
                dos_name,
                length,
                result,
            });
            header_offset = next_offset;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populate::slots::tests::slot_header;
    use m65fdisk_core::test_utils::{MemoryFlash, MemoryStorage, RecordingAllocator, ScriptedConsole, StorageOp};
    use m65fdisk_core::Bus;

    const SLOT_SIZE: u32 = 4 * 1024 * 1024;

    fn file_header(next: u32, length: u32, name: &str) -> Vec<u8> {
        let mut header = vec![0u8; 40];
        header[0..4].copy_from_slice(&next.to_le_bytes());
        header[4..8].copy_from_slice(&length.to_le_bytes());
        header[8..8 + name.len()].copy_from_slice(name.as_bytes());
        header
    }

    fn payload(length: usize, fill: u8) -> Vec<u8> {
        (0..length).map(|i| fill.wrapping_add((i / 512) as u8)).collect()
    }

    /// Slot 1 with two files: a 1000 byte note and a 1536 byte ROM.
    fn two_file_slot() -> (MemoryFlash, SlotInfo) {
        let base = SLOT_SIZE;
        let mut flash = MemoryFlash::new();
        let header = slot_header("test core", 2, 0x1000);
        flash.put(base, &header);

        flash.put(base + 0x1000, &file_header(0x2000, 1000, "readme.txt"));
        flash.put(base + 0x1000 + 40, &payload(1000, 0x10));
        flash.put(base + 0x2000, &file_header(0, 1536, "MEGA65.ROM"));
        flash.put(base + 0x2000 + 40, &payload(1536, 0x20));

        let slot = SlotInfo::parse(1, base, &header).unwrap();
        (flash, slot)
    }

    #[test]
    fn test_two_files_copied_in_order() {
        let plan = PartitionPlan::for_device(40_960).unwrap();
        let (mut flash, slot) = two_file_slot();
        let mut storage = MemoryStorage::new(40_960);
        let mut allocator = RecordingAllocator::starting_at(30_000);
        let mut console = ScriptedConsole::new();

        let report = EmbeddedFilePopulator::new(&plan)
            .populate(&mut flash, &mut storage, &mut allocator, &mut console, &slot)
            .unwrap();

        assert_eq!(allocator.calls.len(), 2);
        assert_eq!(allocator.calls[0].name.as_bytes(), b"readme  txt");
        assert_eq!(allocator.calls[0].length, 1000);
        assert_eq!(allocator.calls[0].root_dir_lba, plan.rootdir_lba());
        assert_eq!(allocator.calls[0].fat1_lba, plan.fat1_lba());
        assert_eq!(allocator.calls[0].fat2_lba, plan.fat2_lba());
        assert_eq!(allocator.calls[1].name.as_bytes(), b"MEGA65  ROM");
        assert_eq!(allocator.calls[1].length, 1536);

        // ceil(1000/512) = 2 sectors, then 3 sectors 8 sectors further on
        assert_eq!(
            storage.mutations(),
            vec![
                StorageOp::Write(30_000),
                StorageOp::Write(30_001),
                StorageOp::Write(30_008),
                StorageOp::Write(30_009),
                StorageOp::Write(30_010),
            ]
        );
        assert_eq!(storage.sector(Bus::Internal, 30_001)[0], 0x11);
        assert_eq!(storage.sector(Bus::Internal, 30_010)[0], 0x22);

        assert!(report.have_rom);
        assert_eq!(report.failures().count(), 0);
        assert!(console.printed("Pre-populating file MEGA65.ROM"));
    }

    #[test]
    fn test_refused_file_is_reported_and_skipped() {
        let plan = PartitionPlan::for_device(40_960).unwrap();
        let (mut flash, slot) = two_file_slot();
        let mut storage = MemoryStorage::new(40_960);
        let mut allocator =
            RecordingAllocator::starting_at(30_000).refusing(DosName::from_raw(*b"readme  txt"));
        let mut console = ScriptedConsole::new();

        let report = EmbeddedFilePopulator::new(&plan)
            .populate(&mut flash, &mut storage, &mut allocator, &mut console, &slot)
            .unwrap();

        assert_eq!(allocator.calls.len(), 2);
        assert_eq!(storage.writes(), vec![30_000, 30_001, 30_002]);
        assert!(console.printed("!! Error writing file"));
        let failed: Vec<&str> = report.failures().map(|file| file.name.as_str()).collect();
        assert_eq!(failed, vec!["readme.txt"]);
        assert!(matches!(report.files[0].result, Err(FdiskError::AllocationFailure(_))));
        assert!(report.have_rom);
    }

    #[test]
    fn test_long_embedded_name_is_truncated() {
        let plan = PartitionPlan::for_device(40_960).unwrap();
        let base = 0;
        let mut flash = MemoryFlash::new();
        let header = slot_header("core", 1, 0x400);
        flash.put(base, &header);
        flash.put(0x400, &file_header(0, 0, "characterset.bin1"));
        let slot = SlotInfo::parse(0, base, &header).unwrap();

        let mut storage = MemoryStorage::new(40_960);
        let mut allocator = RecordingAllocator::starting_at(30_000);
        let mut console = ScriptedConsole::new();
        let report = EmbeddedFilePopulator::new(&plan)
            .populate(&mut flash, &mut storage, &mut allocator, &mut console, &slot)
            .unwrap();

        assert_eq!(allocator.calls[0].name.as_bytes(), b"charactebin");
        assert!(storage.writes().is_empty());
        assert!(!report.have_rom);
    }

    #[test]
    fn test_payload_past_end_of_flash_is_skipped() {
        let plan = PartitionPlan::for_device(40_960).unwrap();
        let corrupt = u32::MAX - 100;
        let mut flash = MemoryFlash::new();
        let header = slot_header("core", 2, corrupt);
        flash.put(0, &header);
        flash.put(corrupt, &file_header(0x400, 1000, "broken.bin"));
        flash.put(0x400, &file_header(0, 10, "next.txt"));
        let slot = SlotInfo::parse(0, 0, &header).unwrap();

        let mut storage = MemoryStorage::new(40_960);
        let mut allocator = RecordingAllocator::starting_at(30_000);
        let mut console = ScriptedConsole::new();
        let report = EmbeddedFilePopulator::new(&plan)
            .populate(&mut flash, &mut storage, &mut allocator, &mut console, &slot)
            .unwrap();

        assert_eq!(allocator.calls.len(), 1);
        assert_eq!(allocator.calls[0].name.as_bytes(), b"next    txt");
        assert!(matches!(report.files[0].result, Err(FdiskError::InvalidInput(_))));
        assert!(report.files[1].written());
        assert_eq!(storage.writes(), vec![30_000]);
        assert!(console.printed("!! Error writing file"));
    }

    #[test]
    fn test_payload_in_flash() {
        assert!(payload_in_flash(0, u32::MAX));
        assert!(payload_in_flash(u32::MAX - 511, 512));
        assert!(!payload_in_flash(u32::MAX - 511, 513));
        assert!(payload_in_flash(u32::MAX, 0));
    }

    #[test]
    fn test_sectors_for() {
        assert_eq!(sectors_for(0), 0);
        assert_eq!(sectors_for(1), 1);
        assert_eq!(sectors_for(512), 1);
        assert_eq!(sectors_for(513), 2);
    }
}
