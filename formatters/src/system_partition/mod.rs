// MEGA65 system partition: frozen program and OS service slot areas

pub mod layout;
pub mod sectors;

pub use layout::{SystemPartitionLayout, SLOT_SIZE_SECTORS, SYSTEM_RESERVED_SECTORS};
pub use sectors::{build_config_sector, build_system_header, SYS_PART_MAGIC};
