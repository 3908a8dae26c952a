// MBR creation and display for MEGA65 cards
// Entry 0 is the FAT32 data partition, entry 1 the MEGA65 system partition.
// Both use LBA only; the CHS fields stay zero.

pub mod mbr_verifier;


use crate::fat_common::{
    BOOT_SIGNATURE, BOOT_SIGNATURE_OFFSET, PARTITION_TYPE_FAT32_LBA, PARTITION_TYPE_MEGA65_SYSTEM,
};
use crate::planner::PartitionPlan;
use byteorder::{ByteOrder, LittleEndian};
use log::info;
use m65fdisk_core::{Console, FdiskError, Sector, Storage, SECTOR_SIZE};
use mbr_verifier::{MbrVerifier, PartitionInfo};

pub const MBR_LBA: u32 = 0;
pub const DISK_SIGNATURE_OFFSET: usize = 0x1B8;
pub const DISK_SIGNATURE: [u8; 4] = [0x83, 0x7D, 0xCB, 0xA6];
pub const PARTITION_TABLE_OFFSET: usize = 0x1BE;
pub const PARTITION_ENTRY_SIZE: usize = 16;
pub const PARTITION_ENTRIES: usize = 4;

// Offsets within a partition entry
pub const PE_STATUS: usize = 0x0;
pub const PE_CHS_START: usize = 0x1;
pub const PE_TYPE: usize = 0x4;
pub const PE_CHS_END: usize = 0x5;
pub const PE_LBA_START: usize = 0x8;
pub const PE_SECTORS: usize = 0xC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub partition_type: u8,
    pub start_lba: u32,
    pub sectors: u32,
}

fn write_entry(mbr: &mut Sector, index: usize, entry: &PartitionEntry) {
    let offset = PARTITION_TABLE_OFFSET + index * PARTITION_ENTRY_SIZE;
    mbr[offset + PE_TYPE] = entry.partition_type;
    LittleEndian::write_u32(&mut mbr[offset + PE_LBA_START..], entry.start_lba);
    LittleEndian::write_u32(&mut mbr[offset + PE_SECTORS..], entry.sectors);
}

/// Build the two-entry MEGA65 MBR. No boot code, no active flag.
pub fn create_mega65_mbr(fat_start: u32, fat_sectors: u32, sys_start: u32, sys_sectors: u32) -> Sector {
    let mut mbr = [0u8; SECTOR_SIZE];

    mbr[DISK_SIGNATURE_OFFSET..DISK_SIGNATURE_OFFSET + 4].copy_from_slice(&DISK_SIGNATURE);

    write_entry(
        &mut mbr,
        0,
        &PartitionEntry {
            partition_type: PARTITION_TYPE_FAT32_LBA,
            start_lba: fat_start,
            sectors: fat_sectors,
        },
    );
    write_entry(
        &mut mbr,
        1,
        &PartitionEntry {
            partition_type: PARTITION_TYPE_MEGA65_SYSTEM,
            start_lba: sys_start,
            sectors: sys_sectors,
        },
    );

    mbr[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);
    mbr
}

pub fn create_mbr_for_plan(plan: &PartitionPlan) -> Sector {
    create_mega65_mbr(
        plan.fat_partition_start,
        plan.fat_partition_sectors,
        plan.sys_partition_start,
        plan.sys_partition_sectors,
    )
}

/// Write the MBR for `plan` to sector 0 of the selected card.
pub fn write_partition_table(storage: &mut dyn Storage, plan: &PartitionPlan) -> Result<(), FdiskError> {
    let mbr = create_mbr_for_plan(plan);
    storage.write_sector(MBR_LBA, &mbr)?;
    info!(
        "Wrote MBR: FAT32 @ ${:08x} (${:x} sectors), system @ ${:08x} (${:x} sectors)",
        plan.fat_partition_start,
        plan.fat_partition_sectors,
        plan.sys_partition_start,
        plan.sys_partition_sectors
    );
    Ok(())
}

fn format_entry(p: &PartitionInfo) -> String {
    let (scyl, shead, ssec) = p.start_chs;
    let (ecyl, ehead, esec) = p.end_chs;
    format!(
        "{:02X}{} : Start={:3}/{:2}/{:4} or {:08X} / End={:3}/{:2}/{:4} or {:08X}",
        p.partition_type,
        if p.bootable { '*' } else { ' ' },
        shead,
        ssec,
        scyl,
        p.start_lba,
        ehead,
        esec,
        ecyl,
        p.size_sectors
    )
}

/// Lines describing the partition table in `mbr`, all four slots included.
pub fn describe_partition_table(mbr: &Sector) -> Vec<String> {
    if mbr[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2] != BOOT_SIGNATURE {
        return vec!["Current partition table is invalid.".to_string()];
    }

    let mut lines = vec!["Current partition table:".to_string()];
    for index in 0..PARTITION_ENTRIES {
        let offset = PARTITION_TABLE_OFFSET + index * PARTITION_ENTRY_SIZE;
        let info = MbrVerifier::parse_partition_entry(index as u8 + 1, &mbr[offset..offset + PARTITION_ENTRY_SIZE]);
        lines.push(format_entry(&info));
    }
    lines
}

/// Read sector 0 of the selected card and print its partition table.
pub fn show_mbr(storage: &mut dyn Storage, console: &mut dyn Console) -> Result<Sector, FdiskError> {
    let mbr = storage.read_sector(MBR_LBA)?;
    console.write_line("");
    for line in describe_partition_table(&mbr) {
        console.write_line(&line);
    }
    Ok(mbr)
}
