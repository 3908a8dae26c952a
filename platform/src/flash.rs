// Firmware flash read from a dump file

use log::info;
use m65fdisk_core::{FdiskError, Flash, Sector, SECTOR_SIZE};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Erased flash reads back as 0xFF.
const ERASED: u8 = 0xFF;

#[derive(Debug)]
pub struct ImageFlash {
    file: File,
    len: u64,
}

impl ImageFlash {
    pub fn open(path: &Path) -> Result<Self, FdiskError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        info!("Opened flash image {} ({} bytes)", path.display(), len);
        Ok(Self { file, len })
    }
}

impl Flash for ImageFlash {
    /// Read 512 bytes at any byte offset. Bytes past the end of the dump
    /// read as erased flash.
    fn read_sector(&mut self, offset: u32) -> Result<Sector, FdiskError> {
        let mut sector = [ERASED; SECTOR_SIZE];
        let start = offset as u64;
        if start >= self.len {
            return Ok(sector);
        }

        let available = (self.len - start).min(SECTOR_SIZE as u64) as usize;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut sector[..available])?;
        Ok(sector)
    }
}
