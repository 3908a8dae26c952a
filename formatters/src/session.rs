// Interactive session: pick a card, confirm, format, fill, repeat in batch mode

use crate::fat32::Fat32ContiguousAllocator;
use crate::orchestrator::{FormatOrchestrator, FormatOutcome};
use crate::partitioner::show_mbr;
use crate::planner::PartitionPlan;
use crate::populate::{stage_host_files, EmbeddedFilePopulator, PopulateReport, SlotInfo, SlotTable};
use log::{debug, info, warn};
use m65fdisk_core::{Bus, Console, FdiskError, Flash, FormatOptions, Storage};
use std::path::PathBuf;

/// Where files for the new volume come from.
pub enum FileSource<'a> {
    None,
    /// Firmware flash holding core slots with embedded files.
    Embedded(&'a mut dyn Flash),
    /// Files on the host, staged in order.
    Host(Vec<PathBuf>),
}

/// Answers given up front instead of at the prompts.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub bus: Option<Bus>,
    pub phrase: Option<String>,
    pub slot: Option<u8>,
    /// Ask for the confirmation phrase once and fail on a mismatch.
    pub single_prompt: bool,
}

#[derive(Debug)]
pub struct CardReport {
    pub bus: Bus,
    pub plan: PartitionPlan,
    pub outcome: FormatOutcome,
    pub files: Option<PopulateReport>,
}

impl CardReport {
    /// Closing advice for the operator.
    pub fn guidance(&self) -> &'static str {
        let have_sdfiles = self.files.as_ref().is_some_and(|report| !report.files.is_empty());
        let have_rom = self.files.as_ref().is_some_and(|report| report.have_rom);
        if !have_sdfiles {
            "Remove, Copy SD Essentials and MEGA65.ROM, reinsert AND reboot."
        } else if !have_rom {
            "Remove, Copy MEGA65.ROM, reinsert AND reboot."
        } else {
            "Reboot to continue."
        }
    }
}

pub struct FdiskSession<'a> {
    storage: &'a mut dyn Storage,
    console: &'a mut dyn Console,
    files: FileSource<'a>,
    options: SessionOptions,
    format_options: FormatOptions,
    orchestrator: FormatOrchestrator,
}

impl<'a> FdiskSession<'a> {
    pub fn new(
        storage: &'a mut dyn Storage,
        console: &'a mut dyn Console,
        files: FileSource<'a>,
        format_options: FormatOptions,
        options: SessionOptions,
    ) -> Self {
        Self {
            storage,
            console,
            files,
            options,
            orchestrator: FormatOrchestrator::new(format_options.clone()),
            format_options,
        }
    }

    /// Format one card, or one after another once batch mode is on.
    pub fn run(&mut self) -> Result<Vec<CardReport>, FdiskError> {
        let mut reports = Vec::new();
        loop {
            let report = self.format_card()?;
            let outcome = report.outcome;
            reports.push(report);

            if outcome == FormatOutcome::MbrRewritten || !self.orchestrator.batch_mode() {
                break;
            }

            self.console.write_line("Press ALMOST ANY KEY to format next card");
            if self.console.read_key()?.is_none() {
                info!("Input ended, leaving batch mode after {} cards", reports.len());
                break;
            }
        }
        Ok(reports)
    }

    /// Probe both buses and print what answered. Returns the buses with a
    /// card and their sector counts.
    pub fn probe_cards(&mut self) -> Result<Vec<(Bus, u32)>, FdiskError> {
        self.console.write_line("Detecting SD card(s) (can take a while)");
        let mut found = Vec::new();

        for bus in Bus::ALL {
            self.console.write_line("");
            self.console.write_line(&format!("{}:", bus));
            self.storage.select(bus)?;

            if let Err(err) = self.storage.reset() {
                debug!("Reset on bus {} failed: {}", bus.index(), err);
                self.console.write_line(&format!("No card detected on bus {}", bus.index()));
                continue;
            }

            let sectors = self.storage.sector_count()?;
            info!("Bus {}: {} sectors", bus.index(), sectors);
            show_mbr(self.storage, self.console)?;
            found.push((bus, sectors));
        }

        self.console.write_line("");
        Ok(found)
    }

    /// Ask for one of `available`, or `None` to rescan.
    fn choose_card(&mut self, available: &[(Bus, u32)]) -> Result<Option<Bus>, FdiskError> {
        let mut prompt = String::from("Please select SD card to modify or r to rescan (");
        for (bus, _) in available {
            prompt.push_str(&format!("{}/", bus.index()));
        }
        prompt.push_str("r): ");
        self.console.write_line(&prompt);

        loop {
            let key = self.console.read_key()?.ok_or(FdiskError::Aborted)?;
            if key == 'r' {
                return Ok(None);
            }
            let chosen = key
                .to_digit(10)
                .and_then(|digit| Bus::from_index(digit as u8))
                .filter(|bus| available.iter().any(|(present, _)| present == bus));
            if let Some(bus) = chosen {
                return Ok(Some(bus));
            }
        }
    }

    fn select_card(&mut self) -> Result<Bus, FdiskError> {
        if let Some(bus) = self.options.bus {
            return Ok(bus);
        }
        loop {
            let available = self.probe_cards()?;
            if let Some(bus) = self.choose_card(&available)? {
                return Ok(bus);
            }
            debug!("Rescanning card slots");
        }
    }

    fn format_card(&mut self) -> Result<CardReport, FdiskError> {
        let bus = self.select_card()?;

        self.storage.select(bus)?;
        self.storage.reset()?;
        let sectors = self.storage.sector_count()?;
        show_mbr(self.storage, self.console)?;

        let plan = PartitionPlan::for_device(sectors)?;
        self.console.write_line("");
        for line in plan.summary() {
            self.console.write_line(&line);
        }

        let confirmation = match self.options.phrase.take() {
            Some(phrase) => self.orchestrator.accept(&phrase)?,
            None if self.options.single_prompt => self.orchestrator.confirm_once(self.console, bus)?,
            None => self.orchestrator.await_confirmation(self.console, bus)?,
        };
        let outcome = self.orchestrator.execute(confirmation, self.storage, self.console, &plan)?;

        if outcome == FormatOutcome::MbrRewritten {
            return Ok(CardReport {
                bus,
                plan,
                outcome,
                files: None,
            });
        }

        let files = self.populate(&plan)?;
        let report = CardReport {
            bus,
            plan,
            outcome,
            files,
        };

        self.console.write_line("");
        self.console.write_line("SD Card has been formatted.");
        self.console.write_line(report.guidance());
        Ok(report)
    }

    fn populate(&mut self, plan: &PartitionPlan) -> Result<Option<PopulateReport>, FdiskError> {
        let mut allocator = Fat32ContiguousAllocator::new(&plan.fat);

        match &mut self.files {
            FileSource::None => Ok(None),
            FileSource::Host(paths) => {
                if paths.is_empty() {
                    return Ok(None);
                }
                let report = stage_host_files(paths.as_slice(), self.storage, &mut allocator, self.console, plan)?;
                Ok(Some(report))
            }
            FileSource::Embedded(flash) => {
                self.console.write_line("Scanning core for embedded files...");
                let table = SlotTable::scan(*flash, self.format_options.flash_slot_size())?;

                let Some(slot) = choose_slot(self.console, &table, self.options.slot)? else {
                    return Ok(None);
                };
                let report = EmbeddedFilePopulator::new(plan).populate(
                    *flash,
                    self.storage,
                    &mut allocator,
                    self.console,
                    &slot,
                )?;
                Ok(Some(report))
            }
        }
    }
}

/// List the slots with files and ask which one to use, `s` skips.
pub fn choose_slot(
    console: &mut dyn Console,
    table: &SlotTable,
    preselected: Option<u8>,
) -> Result<Option<SlotInfo>, FdiskError> {
    let candidates: Vec<&SlotInfo> = table.with_files().collect();

    for slot in &candidates {
        console.write_line(&slot.to_string());
        console.write_line(&slot.version);
    }

    if let Some(index) = preselected {
        return candidates
            .iter()
            .find(|slot| slot.index == index)
            .map(|slot| Some((*slot).clone()))
            .ok_or_else(|| FdiskError::InvalidInput(format!("Slot {} has no embedded files", index)));
    }

    if candidates.is_empty() {
        console.write_line("No slots with files found, skipping population.");
        return Ok(None);
    }

    console.write_line("Populate SD card with embedded files from slot # or s to skip (#/s)?");
    loop {
        let Some(key) = console.read_key()? else {
            warn!("Input ended at the slot prompt, skipping population");
            console.write_line("Skipping SD card population.");
            return Ok(None);
        };
        if key == 's' {
            console.write_line("Skipping SD card population.");
            return Ok(None);
        }
        if let Some(slot) = key
            .to_digit(10)
            .and_then(|digit| candidates.iter().find(|slot| slot.index as u32 == digit))
        {
            return Ok(Some((*slot).clone()));
        }
    }
}
