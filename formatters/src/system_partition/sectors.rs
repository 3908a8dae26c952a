// System partition header and configuration sector images

use super::layout::SystemPartitionLayout;
use byteorder::{ByteOrder, LittleEndian};
use m65fdisk_core::{Sector, SystemConfig, SECTOR_SIZE};

pub const SYS_PART_MAGIC: &[u8; 11] = b"MEGA65SYS00";

// Header: one 16 byte descriptor per area
const FREEZE_AREA: usize = 0x10;
const SERVICE_AREA: usize = 0x20;
const AREA_START: usize = 0x0;
const AREA_SIZE: usize = 0x4;
const AREA_SLOT_SIZE: usize = 0x8;
const AREA_SLOT_COUNT: usize = 0xC;
const AREA_DIR_SECTORS: usize = 0xE;

// Config sector
const CFG_VERSION: usize = 0x000;
const CFG_VIDEO: usize = 0x002;
const CFG_AUDIO: usize = 0x003;
const CFG_FLOPPY: usize = 0x004;
const CFG_MOUSE: usize = 0x005;
const CFG_MAC: usize = 0x006;
const CFG_DISK_IMAGE: usize = 0x010;
const CFG_DMAGIC: usize = 0x020;
const CFG_STRUCTURE_VERSION: [u8; 2] = [0x01, 0x01];

fn write_area(sector: &mut Sector, base: usize, start: u32, layout: &SystemPartitionLayout) {
    LittleEndian::write_u32(&mut sector[base + AREA_START..], start);
    LittleEndian::write_u32(&mut sector[base + AREA_SIZE..], layout.area_sectors());
    LittleEndian::write_u32(&mut sector[base + AREA_SLOT_SIZE..], layout.slot_size);
    LittleEndian::write_u16(&mut sector[base + AREA_SLOT_COUNT..], layout.slot_count);
    LittleEndian::write_u16(&mut sector[base + AREA_DIR_SECTORS..], layout.dir_sectors);
}

/// First sector of the system partition.
pub fn build_system_header(layout: &SystemPartitionLayout) -> Sector {
    let mut sector = [0u8; SECTOR_SIZE];
    sector[..SYS_PART_MAGIC.len()].copy_from_slice(SYS_PART_MAGIC);
    write_area(&mut sector, FREEZE_AREA, 0, layout);
    write_area(&mut sector, SERVICE_AREA, layout.area_sectors(), layout);
    sector
}

/// Default configuration sector read by the hypervisor at boot.
pub fn build_config_sector(config: &SystemConfig) -> Sector {
    let mut sector = [0u8; SECTOR_SIZE];

    sector[CFG_VERSION..CFG_VERSION + 2].copy_from_slice(&CFG_STRUCTURE_VERSION);
    sector[CFG_VIDEO] = config.video_mode.config_byte();
    sector[CFG_AUDIO] = config.audio_flags;
    sector[CFG_FLOPPY] = config.floppy_source.config_byte();
    sector[CFG_MOUSE] = config.auto_amiga_mouse as u8;
    sector[CFG_MAC..CFG_MAC + 6].copy_from_slice(&config.mac_address);

    let image = config.default_disk_image.as_bytes();
    let len = image.len().min(CFG_DMAGIC - CFG_DISK_IMAGE);
    sector[CFG_DISK_IMAGE..CFG_DISK_IMAGE + len].copy_from_slice(&image[..len]);

    sector[CFG_DMAGIC] = config.dmagic.config_byte();

    sector
}
