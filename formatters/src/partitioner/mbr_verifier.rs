// MBR Verifier - checks a MEGA65 partition table read back from a card
use super::{
    DISK_SIGNATURE_OFFSET, PARTITION_ENTRIES, PARTITION_ENTRY_SIZE, PARTITION_TABLE_OFFSET, PE_CHS_END,
    PE_CHS_START, PE_LBA_START, PE_SECTORS, PE_STATUS, PE_TYPE,
};
use crate::fat_common::{BOOT_SIGNATURE_OFFSET, PARTITION_TYPE_FAT32_LBA, PARTITION_TYPE_MEGA65_SYSTEM};
use crate::planner::PARTITION_ALIGNMENT;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};

#[derive(Debug)]
pub struct MbrVerificationResult {
    pub is_valid: bool,
    pub has_disk_signature: bool,
    pub has_fat32_partition: bool,
    pub has_system_partition: bool,
    pub partitions: Vec<PartitionInfo>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub number: u8,
    pub bootable: bool,
    pub partition_type: u8,
    pub type_name: String,
    pub start_lba: u32,
    pub size_sectors: u32,
    pub start_chs: (u32, u32, u32), // Cylinder, Head, Sector
    pub end_chs: (u32, u32, u32),
}

impl PartitionInfo {
    fn end_lba(&self) -> u64 {
        self.start_lba as u64 + self.size_sectors as u64
    }
}

fn decode_chs(bytes: &[u8]) -> (u32, u32, u32) {
    let head = bytes[0] as u32;
    let sector = (bytes[1] & 0x3F) as u32;
    let cylinder = (((bytes[1] & 0xC0) as u32) << 2) | bytes[2] as u32;
    (cylinder, head, sector)
}

pub fn partition_type_name(partition_type: u8) -> &'static str {
    match partition_type {
        0x00 => "Empty",
        0x01 => "FAT12",
        0x04 => "FAT16 (<32MB)",
        0x05 => "Extended",
        0x06 => "FAT16",
        0x07 => "NTFS/exFAT",
        0x0B => "FAT32 (CHS)",
        PARTITION_TYPE_FAT32_LBA => "FAT32 (LBA)",
        0x0E => "FAT16 (LBA)",
        0x0F => "Extended (LBA)",
        PARTITION_TYPE_MEGA65_SYSTEM => "MEGA65 System",
        0x83 => "Linux",
        0xEE => "GPT Protective",
        _ => "Unknown",
    }
}

pub struct MbrVerifier;

impl MbrVerifier {
    /// Verify an MBR sector (512 bytes). `device_sectors` bounds the
    /// partitions when known.
    pub fn verify_mbr(mbr_data: &[u8], device_sectors: Option<u32>) -> MbrVerificationResult {
        let mut result = MbrVerificationResult {
            is_valid: true,
            has_disk_signature: false,
            has_fat32_partition: false,
            has_system_partition: false,
            partitions: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        if mbr_data.len() != 512 {
            result.errors.push(format!("Invalid MBR size: {} bytes (should be 512)", mbr_data.len()));
            result.is_valid = false;
            return result;
        }

        if mbr_data[BOOT_SIGNATURE_OFFSET] != 0x55 || mbr_data[BOOT_SIGNATURE_OFFSET + 1] != 0xAA {
            result.errors.push(format!(
                "Invalid MBR signature: {:02X}{:02X} (should be 55AA)",
                mbr_data[BOOT_SIGNATURE_OFFSET],
                mbr_data[BOOT_SIGNATURE_OFFSET + 1]
            ));
            result.is_valid = false;
        }

        let disk_sig = LittleEndian::read_u32(&mbr_data[DISK_SIGNATURE_OFFSET..]);
        if disk_sig != 0 {
            result.has_disk_signature = true;
            debug!("Disk signature: 0x{:08X}", disk_sig);
        } else {
            result.warnings.push("No disk signature found".to_string());
        }

        for i in 0..PARTITION_ENTRIES {
            let offset = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
            let entry = &mbr_data[offset..offset + PARTITION_ENTRY_SIZE];

            if entry[PE_TYPE] != 0 {
                let partition = Self::parse_partition_entry(i as u8 + 1, entry);
                Self::validate_partition(&partition, device_sectors, &mut result);
                result.partitions.push(partition);
            }
        }

        for i in 0..result.partitions.len() {
            for j in i + 1..result.partitions.len() {
                let p1 = &result.partitions[i];
                let p2 = &result.partitions[j];

                if (p1.start_lba as u64) < p2.end_lba() && (p2.start_lba as u64) < p1.end_lba() {
                    result.errors.push(format!("Partitions {} and {} overlap!", p1.number, p2.number));
                    result.is_valid = false;
                }
            }
        }

        result.has_fat32_partition = result
            .partitions
            .iter()
            .any(|p| p.partition_type == PARTITION_TYPE_FAT32_LBA);
        result.has_system_partition = result
            .partitions
            .iter()
            .any(|p| p.partition_type == PARTITION_TYPE_MEGA65_SYSTEM);

        if result.partitions.is_empty() {
            result.warnings.push("No partitions found in MBR".to_string());
        } else {
            if !result.has_fat32_partition {
                result.warnings.push("No FAT32 (LBA) data partition".to_string());
            }
            if !result.has_system_partition {
                result.warnings.push("No MEGA65 system partition".to_string());
            }
        }

        result
    }

    pub fn parse_partition_entry(number: u8, entry: &[u8]) -> PartitionInfo {
        let partition_type = entry[PE_TYPE];
        PartitionInfo {
            number,
            bootable: entry[PE_STATUS] & 0x80 != 0,
            partition_type,
            type_name: partition_type_name(partition_type).to_string(),
            start_lba: LittleEndian::read_u32(&entry[PE_LBA_START..]),
            size_sectors: LittleEndian::read_u32(&entry[PE_SECTORS..]),
            start_chs: decode_chs(&entry[PE_CHS_START..PE_CHS_START + 3]),
            end_chs: decode_chs(&entry[PE_CHS_END..PE_CHS_END + 3]),
        }
    }

    fn validate_partition(partition: &PartitionInfo, device_sectors: Option<u32>, result: &mut MbrVerificationResult) {
        if partition.size_sectors == 0 {
            result.errors.push(format!("Partition {} has zero size", partition.number));
            result.is_valid = false;
        }

        if partition.start_lba % PARTITION_ALIGNMENT != 0 {
            result.warnings.push(format!(
                "Partition {} not aligned: starts at LBA {} (expected a multiple of {})",
                partition.number, partition.start_lba, PARTITION_ALIGNMENT
            ));
        }

        if let Some(device_sectors) = device_sectors {
            if partition.end_lba() > device_sectors as u64 {
                result.errors.push(format!(
                    "Partition {} ends at LBA {} beyond the {} sector card",
                    partition.number,
                    partition.end_lba(),
                    device_sectors
                ));
                result.is_valid = false;
            }
        }

        info!("Partition {}:", partition.number);
        info!("  Type: 0x{:02X} ({})", partition.partition_type, partition.type_name);
        info!("  Start LBA: {}", partition.start_lba);
        info!(
            "  Size: {} sectors ({} MB)",
            partition.size_sectors,
            partition.size_sectors as u64 * 512 / 1024 / 1024
        );
    }

    /// Generate a human-readable report
    pub fn generate_report(result: &MbrVerificationResult) -> String {
        let mut report = String::new();

        report.push_str("MBR Verification Report\n");
        report.push_str("=======================\n\n");

        report.push_str(&format!("Status: {}\n", if result.is_valid { "VALID" } else { "INVALID" }));
        report.push_str(&format!(
            "Disk Signature: {}\n",
            if result.has_disk_signature { "Present" } else { "Missing" }
        ));
        report.push_str(&format!(
            "MEGA65 layout: {}\n",
            if result.has_fat32_partition && result.has_system_partition {
                "FAT32 + system partition"
            } else {
                "incomplete"
            }
        ));
        report.push_str(&format!("Partitions: {}\n\n", result.partitions.len()));

        if !result.errors.is_empty() {
            report.push_str("ERRORS:\n");
            for error in &result.errors {
                report.push_str(&format!("  ✗ {}\n", error));
            }
            report.push('\n');
        }

        if !result.warnings.is_empty() {
            report.push_str("WARNINGS:\n");
            for warning in &result.warnings {
                report.push_str(&format!("  ⚠ {}\n", warning));
            }
            report.push('\n');
        }

        if !result.partitions.is_empty() {
            report.push_str("PARTITIONS:\n");
            for p in &result.partitions {
                report.push_str(&format!("  Partition {}:\n", p.number));
                report.push_str(&format!("    Type: 0x{:02X} ({})\n", p.partition_type, p.type_name));
                report.push_str(&format!(
                    "    Start: LBA {} ({}MB from start)\n",
                    p.start_lba,
                    p.start_lba as u64 * 512 / 1024 / 1024
                ));
                report.push_str(&format!(
                    "    Size: {} sectors ({}MB)\n",
                    p.size_sectors,
                    p.size_sectors as u64 * 512 / 1024 / 1024
                ));
            }
        }

        report
    }
}
