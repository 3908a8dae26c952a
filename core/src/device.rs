use crate::FdiskError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every device the formatter touches uses fixed 512-byte sectors.
pub const SECTOR_SIZE: usize = 512;

pub type Sector = [u8; SECTOR_SIZE];

/// SD card slot the storage collaborator can talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Bus {
    Internal,
    External,
}

impl Bus {
    pub const ALL: [Bus; 2] = [Bus::Internal, Bus::External];

    pub fn index(self) -> u8 {
        match self {
            Bus::Internal => 0,
            Bus::External => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Bus> {
        match index {
            0 => Some(Bus::Internal),
            1 => Some(Bus::External),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Bus::Internal => "internal",
            Bus::External => "external",
        }
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::Internal => write!(f, "SD Card 0 (Internal SD slot)"),
            Bus::External => write!(f, "SD Card 1 (External microSD slot)"),
        }
    }
}

/// Sector-addressed block device. All calls block until complete.
pub trait Storage {
    fn select(&mut self, bus: Bus) -> Result<(), FdiskError>;

    /// Resets the selected card. An error means no card answered.
    fn reset(&mut self) -> Result<(), FdiskError>;

    fn sector_count(&mut self) -> Result<u32, FdiskError>;

    fn read_sector(&mut self, lba: u32) -> Result<Sector, FdiskError>;

    fn write_sector(&mut self, lba: u32, data: &Sector) -> Result<(), FdiskError>;

    /// Zero every sector in `first..=last`.
    fn erase_range(&mut self, first: u32, last: u32) -> Result<(), FdiskError>;
}

/// Read-only access to the firmware flash that carries the core slots.
pub trait Flash {
    fn read_sector(&mut self, offset: u32) -> Result<Sector, FdiskError>;
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn select(&mut self, bus: Bus) -> Result<(), FdiskError> {
        (**self).select(bus)
    }

    fn reset(&mut self) -> Result<(), FdiskError> {
        (**self).reset()
    }

    fn sector_count(&mut self) -> Result<u32, FdiskError> {
        (**self).sector_count()
    }

    fn read_sector(&mut self, lba: u32) -> Result<Sector, FdiskError> {
        (**self).read_sector(lba)
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> Result<(), FdiskError> {
        (**self).write_sector(lba, data)
    }

    fn erase_range(&mut self, first: u32, last: u32) -> Result<(), FdiskError> {
        (**self).erase_range(first, last)
    }
}

impl<F: Flash + ?Sized> Flash for &mut F {
    fn read_sector(&mut self, offset: u32) -> Result<Sector, FdiskError> {
        (**self).read_sector(offset)
    }
}
