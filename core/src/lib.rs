pub mod console;
pub mod device;
pub mod error;
pub mod filesystem;
pub mod format;
pub mod test_utils;

pub use console::Console;
pub use device::{Bus, Flash, Sector, Storage, SECTOR_SIZE};
pub use error::FdiskError;
pub use filesystem::{DosName, FileAllocator};
pub use format::{DmagicRevision, FloppySource, FormatOptions, SystemConfig, VideoMode};
