// Confirmation and write sequence for one card
//
// Idle -> AwaitConfirmation -> Formatting -> Done
//                  |                    \-> Failed
//                  \-> Aborted
//
// Nothing is written until a confirmation phrase is accepted. Once writing
// starts, any storage error stops the sequence and the card is left
// partially written.

use crate::fat32::formatter_native::erase_if_nonempty;
use crate::fat32::Fat32NativeFormatter;
use crate::partitioner::{show_mbr, write_partition_table};
use crate::planner::PartitionPlan;
use crate::system_partition::{build_config_sector, build_system_header, SYSTEM_RESERVED_SECTORS};
use log::{info, warn};
use m65fdisk_core::{Bus, Console, FdiskError, FormatOptions, Storage};

pub const PHRASE_DELETE_EVERYTHING: &str = "DELETE EVERYTHING";
pub const PHRASE_BATCH_MODE: &str = "BATCH MODE";
pub const PHRASE_FIX_MBR: &str = "FIX MBR";
pub const PHRASE_NO_MORE_PROMPTS: &str = "FOLTERLOS MODUS BITTE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatState {
    Idle,
    AwaitConfirmation,
    Formatting,
    Done,
    /// Operator backed out before anything was written.
    Aborted,
    /// A write failed part way through.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Format the card.
    Proceed,
    /// Only rewrite sector 0.
    FixMbr,
    /// Format and stop asking for the rest of the process.
    ProceedWithoutPrompts,
}

impl Confirmation {
    /// Exact, case sensitive match against the accepted phrases.
    pub fn parse(phrase: &str) -> Option<Self> {
        match phrase {
            PHRASE_DELETE_EVERYTHING | PHRASE_BATCH_MODE => Some(Confirmation::Proceed),
            PHRASE_FIX_MBR => Some(Confirmation::FixMbr),
            PHRASE_NO_MORE_PROMPTS => Some(Confirmation::ProceedWithoutPrompts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOutcome {
    Formatted,
    MbrRewritten,
}

pub struct FormatOrchestrator {
    options: FormatOptions,
    state: FormatState,
    batch_mode: bool,
}

impl FormatOrchestrator {
    pub fn new(options: FormatOptions) -> Self {
        Self {
            options,
            state: FormatState::Idle,
            batch_mode: false,
        }
    }

    pub fn state(&self) -> FormatState {
        self.state
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    /// Set once the no-more-prompts phrase is accepted. Lasts for every
    /// later card handled by this orchestrator.
    pub fn batch_mode(&self) -> bool {
        self.batch_mode
    }

    /// Ask for a phrase until one matches. In batch mode the prompt is
    /// skipped. End of input aborts.
    pub fn await_confirmation(&mut self, console: &mut dyn Console, bus: Bus) -> Result<Confirmation, FdiskError> {
        self.state = FormatState::AwaitConfirmation;

        if self.batch_mode {
            return Ok(Confirmation::Proceed);
        }

        loop {
            let line = self.prompt(console, bus)?;
            match self.accept(&line) {
                Ok(confirmation) => return Ok(confirmation),
                Err(_) => console.write_line("Entered text does not match. Try again."),
            }
        }
    }

    /// Ask once. A phrase that does not match is an error, not a retry.
    pub fn confirm_once(&mut self, console: &mut dyn Console, bus: Bus) -> Result<Confirmation, FdiskError> {
        self.state = FormatState::AwaitConfirmation;

        if self.batch_mode {
            return Ok(Confirmation::Proceed);
        }

        let line = self.prompt(console, bus)?;
        match self.accept(&line) {
            Ok(confirmation) => Ok(confirmation),
            Err(err) => {
                self.state = FormatState::Aborted;
                console.write_line("Entered text does not match.");
                Err(err)
            }
        }
    }

    fn prompt(&mut self, console: &mut dyn Console, bus: Bus) -> Result<String, FdiskError> {
        console.write_line("");
        console.write_line(&format!(
            "Type {} to continue formatting the {} SD",
            PHRASE_DELETE_EVERYTHING,
            bus.describe()
        ));
        console.write_line(&format!("or type {} to re-write MBR:", PHRASE_FIX_MBR));

        console.read_line()?.ok_or_else(|| {
            self.state = FormatState::Aborted;
            warn!("Input ended at the confirmation prompt, nothing written");
            FdiskError::Aborted
        })
    }

    /// Check a single phrase without prompting.
    pub fn accept(&mut self, phrase: &str) -> Result<Confirmation, FdiskError> {
        self.state = FormatState::AwaitConfirmation;
        let confirmation = Confirmation::parse(phrase.trim_end_matches(['\r', '\n']))
            .ok_or_else(|| FdiskError::ConfirmationMismatch(phrase.to_string()))?;

        if confirmation == Confirmation::ProceedWithoutPrompts {
            info!("Batch mode enabled, no further confirmation prompts");
            self.batch_mode = true;
        }
        Ok(confirmation)
    }

    /// Carry out an accepted confirmation on the selected card.
    pub fn execute(
        &mut self,
        confirmation: Confirmation,
        storage: &mut dyn Storage,
        console: &mut dyn Console,
        plan: &PartitionPlan,
    ) -> Result<FormatOutcome, FdiskError> {
        if self.state != FormatState::AwaitConfirmation {
            return Err(FdiskError::InvalidInput(format!(
                "cannot write a card in state {:?}",
                self.state
            )));
        }

        self.state = FormatState::Formatting;
        let outcome = match confirmation {
            Confirmation::FixMbr => self.rewrite_mbr(storage, console, plan).map(|_| FormatOutcome::MbrRewritten),
            Confirmation::Proceed | Confirmation::ProceedWithoutPrompts => {
                self.format(storage, console, plan).map(|_| FormatOutcome::Formatted)
            }
        };

        self.state = match outcome {
            Ok(_) => FormatState::Done,
            Err(_) => FormatState::Failed,
        };
        outcome
    }

    /// Prompt, then write. The usual entry point for an interactive session.
    pub fn run(
        &mut self,
        storage: &mut dyn Storage,
        console: &mut dyn Console,
        bus: Bus,
        plan: &PartitionPlan,
    ) -> Result<FormatOutcome, FdiskError> {
        let confirmation = self.await_confirmation(console, bus)?;
        self.execute(confirmation, storage, console, plan)
    }

    fn rewrite_mbr(
        &self,
        storage: &mut dyn Storage,
        console: &mut dyn Console,
        plan: &PartitionPlan,
    ) -> Result<(), FdiskError> {
        write_partition_table(storage, plan)?;
        show_mbr(storage, console)?;
        console.write_line("MBR Re-written");
        Ok(())
    }

    fn format(&self, storage: &mut dyn Storage, console: &mut dyn Console, plan: &PartitionPlan) -> Result<(), FdiskError> {
        let system = &plan.system;

        console.write_line("");
        console.write_line("Writing Partition Table / Master Boot Record...");
        write_partition_table(storage, plan)?;
        show_mbr(storage, console)?;

        console.write_line("Writing MEGA65 System Partition header sector...");
        storage.write_sector(system.header_lba(), &build_system_header(system))?;
        console.write_line(&format!("Freeze  dir @ ${:08x}", system.freeze_dir_lba()));
        console.write_line(&format!("Service dir @ ${:08x}", system.service_dir_lba()));

        storage.write_sector(system.config_lba(), &build_config_sector(&self.options.system_config))?;

        console.write_line("Erasing configuration area");
        erase_if_nonempty(
            storage,
            system.partition_start + 2,
            system.partition_start + SYSTEM_RESERVED_SECTORS - 1,
        )?;

        console.write_line("Erasing frozen program and system service directories");
        let dir_sectors = system.dir_sectors as u32;
        erase_if_nonempty(storage, system.freeze_dir_lba(), system.freeze_dir_lba() + dir_sectors - 1)?;
        erase_if_nonempty(storage, system.service_dir_lba(), system.service_dir_lba() + dir_sectors - 1)?;

        console.write_line("Writing FAT file system...");
        Fat32NativeFormatter::new(self.options.volume_label_bytes()).write_volume(storage, plan)?;

        info!("Card formatted: {} clusters free", plan.fat.free_clusters());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m65fdisk_core::test_utils::{MemoryStorage, ScriptedConsole, StorageOp};

    const CARD: u32 = 40_960;

    fn setup() -> (FormatOrchestrator, MemoryStorage, PartitionPlan) {
        let plan = PartitionPlan::for_device(CARD).unwrap();
        (FormatOrchestrator::new(FormatOptions::default()), MemoryStorage::new(CARD), plan)
    }

    #[test]
    fn test_phrases() {
        assert_eq!(Confirmation::parse("DELETE EVERYTHING"), Some(Confirmation::Proceed));
        assert_eq!(Confirmation::parse("BATCH MODE"), Some(Confirmation::Proceed));
        assert_eq!(Confirmation::parse("FIX MBR"), Some(Confirmation::FixMbr));
        assert_eq!(
            Confirmation::parse("FOLTERLOS MODUS BITTE"),
            Some(Confirmation::ProceedWithoutPrompts)
        );
        assert_eq!(Confirmation::parse("delete everything"), None);
        assert_eq!(Confirmation::parse(""), None);
    }

    #[test]
    fn test_mismatch_reprompts_without_writing() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new().with_lines(&["yes", "", "DELETE EVERYTHING"]);

        let outcome = orchestrator.run(&mut storage, &mut console, Bus::Internal, &plan).unwrap();

        assert_eq!(outcome, FormatOutcome::Formatted);
        assert_eq!(orchestrator.state(), FormatState::Done);
        let mismatches = console
            .output
            .iter()
            .filter(|line| *line == "Entered text does not match. Try again.")
            .count();
        assert_eq!(mismatches, 2);
        assert!(console.printed("continue formatting the internal SD"));
    }

    #[test]
    fn test_end_of_input_aborts_without_writing() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new().with_lines(&["nope"]);

        let result = orchestrator.run(&mut storage, &mut console, Bus::Internal, &plan);

        assert!(matches!(result, Err(FdiskError::Aborted)));
        assert_eq!(orchestrator.state(), FormatState::Aborted);
        assert!(storage.mutations().is_empty());
    }

    #[test]
    fn test_write_sequence() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new().with_lines(&["DELETE EVERYTHING"]);

        orchestrator.run(&mut storage, &mut console, Bus::Internal, &plan).unwrap();

        let sys = plan.sys_partition_start;
        let freeze = plan.system.freeze_dir_lba();
        let service = plan.system.service_dir_lba();
        let dir = plan.system.dir_sectors as u32;
        let fat = plan.fat_partition_start;
        let (fat1, fat2, root) = (plan.fat1_lba(), plan.fat2_lba(), plan.rootdir_lba());

        let expected = vec![
            StorageOp::Write(0),
            StorageOp::Write(sys),
            StorageOp::Write(sys + 1),
            StorageOp::Erase(sys + 2, sys + 2047),
            StorageOp::Erase(freeze, freeze + dir - 1),
            StorageOp::Erase(service, service + dir - 1),
            StorageOp::Write(fat),
            StorageOp::Write(fat + 6),
            StorageOp::Write(fat + 1),
            StorageOp::Write(fat + 7),
            StorageOp::Write(fat1),
            StorageOp::Write(fat2),
            StorageOp::Write(root),
            StorageOp::Erase(fat + 2, fat + 5),
            StorageOp::Erase(fat + 8, fat1 - 1),
            StorageOp::Erase(fat1 + 1, fat2 - 1),
            StorageOp::Erase(fat2 + 1, root - 1),
            StorageOp::Erase(root + 1, root + 8),
        ];
        assert_eq!(storage.mutations(), expected);

        let header = storage.sector(Bus::Internal, sys);
        assert_eq!(&header[..11], b"MEGA65SYS00");
        let mbr = storage.sector(Bus::Internal, 0);
        assert_eq!(mbr[0x1C2], 0x0C);
        assert_eq!(mbr[0x1D2], 0x41);
    }

    #[test]
    fn test_fix_mbr_only_touches_sector_zero() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new().with_lines(&["FIX MBR"]);

        let outcome = orchestrator.run(&mut storage, &mut console, Bus::Internal, &plan).unwrap();

        assert_eq!(outcome, FormatOutcome::MbrRewritten);
        assert_eq!(storage.mutations(), vec![StorageOp::Write(0)]);
        assert!(console.printed("MBR Re-written"));
        assert!(console.printed("0C  : Start"));
    }

    #[test]
    fn test_batch_mode_suppresses_later_prompts() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new().with_lines(&["FOLTERLOS MODUS BITTE"]);

        orchestrator.run(&mut storage, &mut console, Bus::Internal, &plan).unwrap();
        assert!(orchestrator.batch_mode());

        // Second card: no lines left, yet no prompt and no abort
        let mut second = MemoryStorage::new(CARD);
        let prompts_before = console.output.iter().filter(|l| l.starts_with("Type ")).count();
        let outcome = orchestrator.run(&mut second, &mut console, Bus::Internal, &plan).unwrap();
        let prompts_after = console.output.iter().filter(|l| l.starts_with("Type ")).count();

        assert_eq!(outcome, FormatOutcome::Formatted);
        assert_eq!(prompts_before, prompts_after);
        assert!(!second.mutations().is_empty());
    }

    #[test]
    fn test_storage_error_stops_sequence() {
        let plan = PartitionPlan::for_device(CARD).unwrap();
        let mut storage = MemoryStorage::new(CARD).fail_write_at(plan.fat_partition_start);
        let mut orchestrator = FormatOrchestrator::new(FormatOptions::default());
        let mut console = ScriptedConsole::new().with_lines(&["DELETE EVERYTHING"]);

        let result = orchestrator.run(&mut storage, &mut console, Bus::Internal, &plan);

        assert!(matches!(result, Err(FdiskError::DeviceIo { .. })));
        assert_eq!(orchestrator.state(), FormatState::Failed);
        assert_eq!(storage.writes().last(), Some(&plan.fat_partition_start));
        // Earlier writes stay on the card
        assert_eq!(&storage.sector(Bus::Internal, plan.sys_partition_start)[..11], b"MEGA65SYS00");
    }

    #[test]
    fn test_single_prompt_mismatch_fails_without_writing() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new().with_lines(&["yes", "DELETE EVERYTHING"]);

        let result = orchestrator.confirm_once(&mut console, Bus::Internal);

        assert!(matches!(result, Err(FdiskError::ConfirmationMismatch(_))));
        assert_eq!(orchestrator.state(), FormatState::Aborted);
        assert!(console.printed("Entered text does not match."));
        assert!(!console.printed("Try again."));
        let retry = orchestrator.execute(Confirmation::Proceed, &mut storage, &mut console, &plan);
        assert!(matches!(retry, Err(FdiskError::InvalidInput(_))));
        assert!(storage.mutations().is_empty());
    }

    #[test]
    fn test_single_prompt_accepts_phrase() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new().with_lines(&["FIX MBR"]);

        let confirmation = orchestrator.confirm_once(&mut console, Bus::External).unwrap();
        assert_eq!(confirmation, Confirmation::FixMbr);
        assert!(console.printed("continue formatting the external SD"));

        orchestrator.execute(confirmation, &mut storage, &mut console, &plan).unwrap();
        assert_eq!(orchestrator.state(), FormatState::Done);
    }

    #[test]
    fn test_non_interactive_mismatch_is_an_error() {
        let mut orchestrator = FormatOrchestrator::new(FormatOptions::default());
        assert!(matches!(
            orchestrator.accept("yes"),
            Err(FdiskError::ConfirmationMismatch(_))
        ));
        assert_eq!(orchestrator.accept("BATCH MODE").unwrap(), Confirmation::Proceed);
        assert!(!orchestrator.batch_mode());
    }

    #[test]
    fn test_execute_requires_confirmation() {
        let (mut orchestrator, mut storage, plan) = setup();
        let mut console = ScriptedConsole::new();
        let result = orchestrator.execute(Confirmation::Proceed, &mut storage, &mut console, &plan);
        assert!(matches!(result, Err(FdiskError::InvalidInput(_))));
        assert!(storage.mutations().is_empty());
    }
}
