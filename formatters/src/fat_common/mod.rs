// Shared FAT structures for the MEGA65 volume

pub mod boot_sector;
pub mod constants;
pub mod directory;

pub use boot_sector::{build_fat32_boot_sector, read_fat32_sizes, FatBootSectorParams};
pub use constants::*;
