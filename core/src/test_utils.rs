/// Test utilities and mock collaborators - NEVER touch real hardware
use crate::{Bus, Console, DosName, FdiskError, FileAllocator, Flash, Sector, Storage, SECTOR_SIZE};
use std::collections::{BTreeMap, VecDeque};

/// Every call made against a [`MemoryStorage`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Select(Bus),
    Reset,
    Read(u32),
    Write(u32),
    Erase(u32, u32),
}

#[derive(Debug, Clone, Default)]
struct MemoryCard {
    sectors: u32,
    data: BTreeMap<u32, Sector>,
}

/// Sparse in-memory card pair. Sectors never written read back as zeros.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    cards: [Option<MemoryCard>; 2],
    selected: Bus,
    fail_write_at: Option<u32>,
    pub ops: Vec<StorageOp>,
}

impl MemoryStorage {
    /// A single card in the internal slot.
    pub fn new(sectors: u32) -> Self {
        Self::with_cards(Some(sectors), None)
    }

    pub fn with_cards(internal: Option<u32>, external: Option<u32>) -> Self {
        let card = |sectors: Option<u32>| {
            sectors.map(|sectors| MemoryCard {
                sectors,
                data: BTreeMap::new(),
            })
        };
        Self {
            cards: [card(internal), card(external)],
            selected: Bus::Internal,
            fail_write_at: None,
            ops: Vec::new(),
        }
    }

    /// Make the write to `lba` fail with a device error.
    pub fn fail_write_at(mut self, lba: u32) -> Self {
        self.fail_write_at = Some(lba);
        self
    }

    /// Pre-load a sector on the given bus, bypassing the op log.
    pub fn preload(&mut self, bus: Bus, lba: u32, data: Sector) {
        if let Some(card) = self.cards[bus.index() as usize].as_mut() {
            card.data.insert(lba, data);
        }
    }

    pub fn sector(&self, bus: Bus, lba: u32) -> Sector {
        self.cards[bus.index() as usize]
            .as_ref()
            .and_then(|card| card.data.get(&lba).copied())
            .unwrap_or([0u8; SECTOR_SIZE])
    }

    pub fn selected(&self) -> Bus {
        self.selected
    }

    /// LBAs written, in order.
    pub fn writes(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                StorageOp::Write(lba) => Some(*lba),
                _ => None,
            })
            .collect()
    }

    /// Writes and erases only.
    pub fn mutations(&self) -> Vec<StorageOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, StorageOp::Write(_) | StorageOp::Erase(_, _)))
            .cloned()
            .collect()
    }

    fn card(&mut self) -> Result<&mut MemoryCard, FdiskError> {
        let bus = self.selected;
        self.cards[bus.index() as usize]
            .as_mut()
            .ok_or(FdiskError::NoDevice(bus.index()))
    }
}

impl Storage for MemoryStorage {
    fn select(&mut self, bus: Bus) -> Result<(), FdiskError> {
        self.ops.push(StorageOp::Select(bus));
        self.selected = bus;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), FdiskError> {
        self.ops.push(StorageOp::Reset);
        self.card().map(|_| ())
    }

    fn sector_count(&mut self) -> Result<u32, FdiskError> {
        Ok(self.card()?.sectors)
    }

    fn read_sector(&mut self, lba: u32) -> Result<Sector, FdiskError> {
        self.ops.push(StorageOp::Read(lba));
        let card = self.card()?;
        if lba >= card.sectors {
            return Err(FdiskError::device_io(lba, "read past end of card"));
        }
        Ok(card.data.get(&lba).copied().unwrap_or([0u8; SECTOR_SIZE]))
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> Result<(), FdiskError> {
        self.ops.push(StorageOp::Write(lba));
        if self.fail_write_at == Some(lba) {
            return Err(FdiskError::device_io(lba, "injected write failure"));
        }
        let card = self.card()?;
        if lba >= card.sectors {
            return Err(FdiskError::device_io(lba, "write past end of card"));
        }
        card.data.insert(lba, *data);
        Ok(())
    }

    fn erase_range(&mut self, first: u32, last: u32) -> Result<(), FdiskError> {
        self.ops.push(StorageOp::Erase(first, last));
        let card = self.card()?;
        if last >= card.sectors {
            return Err(FdiskError::device_io(last, "erase past end of card"));
        }
        card.data.retain(|lba, _| !(first..=last).contains(lba));
        Ok(())
    }
}

/// Sparse flash image assembled from byte regions.
#[derive(Debug, Clone, Default)]
pub struct MemoryFlash {
    regions: Vec<(u32, Vec<u8>)>,
    pub reads: Vec<u32>,
}

impl MemoryFlash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, offset: u32, bytes: &[u8]) {
        self.regions.push((offset, bytes.to_vec()));
    }
}

impl Flash for MemoryFlash {
    fn read_sector(&mut self, offset: u32) -> Result<Sector, FdiskError> {
        self.reads.push(offset);
        let mut sector = [0u8; SECTOR_SIZE];
        let start = offset as u64;
        let end = start + SECTOR_SIZE as u64;
        for (base, bytes) in &self.regions {
            let base = *base as u64;
            let region_end = base + bytes.len() as u64;
            let lo = start.max(base);
            let hi = end.min(region_end);
            if lo < hi {
                sector[(lo - start) as usize..(hi - start) as usize]
                    .copy_from_slice(&bytes[(lo - base) as usize..(hi - base) as usize]);
            }
        }
        Ok(sector)
    }
}

/// Console fed from prepared lines and keys. Everything written is kept.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConsole {
    lines: VecDeque<String>,
    keys: VecDeque<char>,
    pub output: Vec<String>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(mut self, lines: &[&str]) -> Self {
        self.lines.extend(lines.iter().map(|line| line.to_string()));
        self
    }

    pub fn with_keys(mut self, keys: &str) -> Self {
        self.keys.extend(keys.chars());
        self
    }

    pub fn printed(&self, needle: &str) -> bool {
        self.output.iter().any(|line| line.contains(needle))
    }
}

impl Console for ScriptedConsole {
    fn write_line(&mut self, line: &str) {
        self.output.push(line.to_string());
    }

    fn read_line(&mut self) -> Result<Option<String>, FdiskError> {
        Ok(self.lines.pop_front())
    }

    fn read_key(&mut self) -> Result<Option<char>, FdiskError> {
        Ok(self.keys.pop_front())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationCall {
    pub name: DosName,
    pub length: u32,
    pub root_dir_lba: u32,
    pub fat1_lba: u32,
    pub fat2_lba: u32,
}

/// Allocator that hands out consecutive cluster-aligned runs from `next_lba`
/// and remembers every request.
#[derive(Debug, Clone)]
pub struct RecordingAllocator {
    next_lba: u32,
    refuse: Vec<DosName>,
    pub calls: Vec<AllocationCall>,
}

impl RecordingAllocator {
    pub fn starting_at(next_lba: u32) -> Self {
        Self {
            next_lba,
            refuse: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Return `None` for this name.
    pub fn refusing(mut self, name: DosName) -> Self {
        self.refuse.push(name);
        self
    }
}

impl FileAllocator for RecordingAllocator {
    fn create_contiguous_file(
        &mut self,
        _storage: &mut dyn Storage,
        name: &DosName,
        length: u32,
        root_dir_lba: u32,
        fat1_lba: u32,
        fat2_lba: u32,
    ) -> Result<Option<u32>, FdiskError> {
        self.calls.push(AllocationCall {
            name: *name,
            length,
            root_dir_lba,
            fat1_lba,
            fat2_lba,
        });
        if self.refuse.contains(name) {
            return Ok(None);
        }
        let first = self.next_lba;
        let clusters = (length.div_ceil(4096)).max(1);
        self.next_lba += clusters * 8;
        Ok(Some(first))
    }
}
