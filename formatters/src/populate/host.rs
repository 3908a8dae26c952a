// Stages files from the host file system onto the new FAT32 volume

use super::populator::{place_file, PopulateReport, PopulatedFile, ROM_FILE_NAME};
use crate::planner::PartitionPlan;
use log::info;
use m65fdisk_core::{Console, DosName, FdiskError, FileAllocator, Storage, SECTOR_SIZE};
use std::path::Path;

/// Strict 8.3 name of a host file, taken from its final path component.
pub fn host_dos_name(path: &Path) -> Result<DosName, FdiskError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| FdiskError::InvalidInput(format!("No usable file name in {}", path.display())))?;
    DosName::parse_strict(file_name)
}

/// Copy each file in `paths` as a contiguous file. Bad names and unreadable
/// files are errors; a file that does not fit is recorded and skipped.
pub fn stage_host_files<P: AsRef<Path>>(
    paths: &[P],
    storage: &mut dyn Storage,
    allocator: &mut dyn FileAllocator,
    console: &mut dyn Console,
    plan: &PartitionPlan,
) -> Result<PopulateReport, FdiskError> {
    let mut report = PopulateReport::default();

    for path in paths {
        let path = path.as_ref();
        console.write_line(&format!("Writing file {} to SD card", path.display()));

        let dos_name = host_dos_name(path)?;
        let contents = std::fs::read(path)?;
        let length = u32::try_from(contents.len()).map_err(|_| {
            FdiskError::InvalidInput(format!("{} is larger than a FAT32 file can be", path.display()))
        })?;

        let result = place_file(storage, allocator, plan, &dos_name, length, |index| {
            let start = index as usize * SECTOR_SIZE;
            let end = (start + SECTOR_SIZE).min(contents.len());
            let mut sector = [0u8; SECTOR_SIZE];
            sector[..end - start].copy_from_slice(&contents[start..end]);
            Ok(sector)
        })?;

        match &result {
            Ok(first_sector) => {
                info!("{} staged as {} at sector ${:x}", path.display(), dos_name, first_sector);
                console.write_line("File written.");
            }
            Err(_) => console.write_line(&format!("!! No room for {}", dos_name)),
        }

        if dos_name.to_string() == ROM_FILE_NAME {
            report.have_rom = true;
        }
        report.files.push(PopulatedFile {
            name: path.display().to_string(),
            dos_name,
            length,
            result,
        });
    }

    Ok(report)
}
