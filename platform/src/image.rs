// Card access through image files or raw block devices
// Bus 0 and bus 1 each map to an optional file. A bus without a file
// behaves like an empty card slot.

use log::{debug, info};
use m65fdisk_core::{Bus, FdiskError, Sector, Storage, SECTOR_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Zeros are written in chunks of this many sectors when erasing.
const ERASE_CHUNK_SECTORS: u32 = 2048;

#[derive(Debug)]
struct CardImage {
    path: PathBuf,
    file: File,
    sectors: u32,
}

impl CardImage {
    fn open(path: &Path) -> Result<Self, FdiskError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        // Block devices report a zero length in their metadata
        let bytes = file.seek(SeekFrom::End(0))?;
        let sectors = u32::try_from(bytes / SECTOR_SIZE as u64).map_err(|_| {
            FdiskError::InvalidInput(format!(
                "{} has more sectors than a 32 bit LBA can address",
                path.display()
            ))
        })?;

        info!("Opened {} ({} sectors)", path.display(), sectors);
        Ok(Self {
            path: path.to_path_buf(),
            file,
            sectors,
        })
    }

    fn seek_to(&mut self, lba: u32) -> Result<(), FdiskError> {
        self.file
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))
            .map_err(|e| FdiskError::device_io(lba, e))?;
        Ok(())
    }

    fn check_range(&self, first: u32, last: u32) -> Result<(), FdiskError> {
        if last >= self.sectors || first > last {
            return Err(FdiskError::device_io(
                last,
                format!("outside {} ({} sectors)", self.path.display(), self.sectors),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ImageStorage {
    cards: [Option<CardImage>; 2],
    selected: Bus,
}

impl ImageStorage {
    pub fn open(internal: Option<&Path>, external: Option<&Path>) -> Result<Self, FdiskError> {
        Ok(Self {
            cards: [
                internal.map(CardImage::open).transpose()?,
                external.map(CardImage::open).transpose()?,
            ],
            selected: Bus::Internal,
        })
    }

    /// Create (or truncate) a blank image of `sectors` sectors.
    pub fn create_image(path: &Path, sectors: u32) -> Result<(), FdiskError> {
        let file = File::create(path)?;
        file.set_len(sectors as u64 * SECTOR_SIZE as u64)?;
        info!("Created blank {} sector image {}", sectors, path.display());
        Ok(())
    }

    /// Flush every open card to stable storage.
    pub fn sync(&mut self) -> Result<(), FdiskError> {
        for card in self.cards.iter_mut().flatten() {
            card.file.sync_all()?;
        }
        Ok(())
    }

    fn card(&mut self) -> Result<&mut CardImage, FdiskError> {
        let bus = self.selected;
        self.cards[bus.index() as usize]
            .as_mut()
            .ok_or(FdiskError::NoDevice(bus.index()))
    }
}

impl Storage for ImageStorage {
    fn select(&mut self, bus: Bus) -> Result<(), FdiskError> {
        debug!("Selecting bus {}", bus.index());
        self.selected = bus;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), FdiskError> {
        self.card().map(|_| ())
    }

    fn sector_count(&mut self) -> Result<u32, FdiskError> {
        Ok(self.card()?.sectors)
    }

    fn read_sector(&mut self, lba: u32) -> Result<Sector, FdiskError> {
        let card = self.card()?;
        card.check_range(lba, lba)?;
        card.seek_to(lba)?;
        let mut sector = [0u8; SECTOR_SIZE];
        card.file
            .read_exact(&mut sector)
            .map_err(|e| FdiskError::device_io(lba, e))?;
        Ok(sector)
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> Result<(), FdiskError> {
        let card = self.card()?;
        card.check_range(lba, lba)?;
        card.seek_to(lba)?;
        card.file.write_all(data).map_err(|e| FdiskError::device_io(lba, e))
    }

    fn erase_range(&mut self, first: u32, last: u32) -> Result<(), FdiskError> {
        let card = self.card()?;
        card.check_range(first, last)?;
        card.seek_to(first)?;

        let zeros = vec![0u8; ERASE_CHUNK_SECTORS as usize * SECTOR_SIZE];
        let mut lba = first;
        while lba <= last {
            let count = (last - lba + 1).min(ERASE_CHUNK_SECTORS);
            card.file
                .write_all(&zeros[..count as usize * SECTOR_SIZE])
                .map_err(|e| FdiskError::device_io(lba, e))?;
            lba = match lba.checked_add(count) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(())
    }
}
