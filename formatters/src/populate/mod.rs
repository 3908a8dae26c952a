// Filling a fresh volume: files embedded in a core slot, or host files

pub mod host;
pub mod populator;
pub mod slots;

pub use host::{host_dos_name, stage_host_files};
pub use populator::{sectors_for, EmbeddedFilePopulator, PopulateReport, PopulatedFile, ROM_FILE_NAME};
pub use slots::{SlotInfo, SlotTable, MAX_SLOTS};
