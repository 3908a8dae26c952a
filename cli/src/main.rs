use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{debug, LevelFilter};
use m65fdisk_core::{Bus, FormatOptions, Storage};
use m65fdisk_formatters::populate::host_dos_name;
use m65fdisk_formatters::{
    describe_partition_table, FdiskSession, FileSource, MbrVerifier, PartitionPlan, SessionOptions,
};
use m65fdisk_platform::{ImageFlash, ImageStorage, TerminalConsole};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "m65fdisk")]
#[command(about = "Partition and format SD cards for the MEGA65", long_about = None)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition and format a card, then fill it with files
    Format {
        /// Card image or block device on bus 0 (internal slot)
        #[arg(long)]
        image: Option<PathBuf>,
        /// Card image or block device on bus 1 (external slot)
        #[arg(long)]
        external: Option<PathBuf>,
        /// Format the card on this bus without asking (0 or 1)
        #[arg(long)]
        bus: Option<u8>,
        /// JSON file with volume label, hardware model and system config
        #[arg(long)]
        config: Option<PathBuf>,
        /// Firmware flash image to take embedded files from
        #[arg(long = "core", conflicts_with = "files")]
        core_image: Option<PathBuf>,
        /// Core slot to take embedded files from
        #[arg(long, requires = "core_image")]
        slot: Option<u8>,
        /// Confirmation phrase, given up front instead of at the prompt
        #[arg(long = "yes-i-know", value_name = "PHRASE")]
        phrase: Option<String>,
        /// Host files to copy onto the new volume (8.3 names)
        files: Vec<PathBuf>,
    },
    /// Show and check the partition table of a card
    Show {
        /// Card image or block device
        image: PathBuf,
    },
    /// Print the layout that would be written to a card of this many sectors
    Plan {
        sectors: u32,
    },
    /// Create a blank card image
    CreateImage {
        path: PathBuf,
        /// Size in MiB
        #[arg(long, default_value_t = 64)]
        mib: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    run(cli, BufReader::new(std::io::stdin()), std::io::stdout())
}

/// Carry out one command, prompting on `input` and reporting on `output`.
fn run<R: BufRead, W: Write>(cli: Cli, input: R, mut output: W) -> anyhow::Result<()> {
    match cli.command {
        Commands::Format {
            image,
            external,
            bus,
            config,
            core_image,
            slot,
            phrase,
            files,
        } => {
            if image.is_none() && external.is_none() {
                bail!("No card given. Use --image and/or --external.");
            }

            let format_options = match &config {
                Some(path) => FormatOptions::from_file(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => FormatOptions::default(),
            };
            format_options.validate().context("Invalid format options")?;

            // Catch bad host files before anything is written
            for path in &files {
                host_dos_name(path).with_context(|| format!("Cannot stage {}", path.display()))?;
                std::fs::metadata(path).with_context(|| format!("Cannot read {}", path.display()))?;
            }

            let bus = bus
                .map(|index| Bus::from_index(index).with_context(|| format!("No bus {}", index)))
                .transpose()?;

            let mut storage = ImageStorage::open(image.as_deref(), external.as_deref())
                .context("Failed to open card")?;
            let mut flash = match &core_image {
                Some(path) => Some(
                    ImageFlash::open(path)
                        .with_context(|| format!("Failed to open core image {}", path.display()))?,
                ),
                None => None,
            };
            let source = match flash.as_mut() {
                Some(flash) => FileSource::Embedded(flash),
                None if files.is_empty() => FileSource::None,
                None => FileSource::Host(files),
            };

            let mut console = TerminalConsole::new(input, &mut output);
            let options = SessionOptions {
                bus,
                phrase,
                slot,
                single_prompt: true,
            };
            let reports = {
                let mut session = FdiskSession::new(&mut storage, &mut console, source, format_options, options);
                session.run().context("Format failed")?
            };
            storage.sync().context("Failed to flush card")?;

            debug!("Finished {} card(s)", reports.len());
            for report in &reports {
                if let Some(files) = &report.files {
                    let failures = files.failures().count();
                    if failures > 0 {
                        bail!("{} file(s) did not fit on the card on {}", failures, report.bus);
                    }
                }
            }
        }
        Commands::Show { image } => show(&image, &mut output)?,
        Commands::Plan { sectors } => {
            let plan = PartitionPlan::for_device(sectors).context("Card cannot be formatted")?;
            for line in plan.summary() {
                writeln!(output, "{}", line)?;
            }
            writeln!(
                output,
                "System partition: {} freeze slots, {} directory sectors",
                plan.system.slot_count, plan.system.dir_sectors
            )?;
        }
        Commands::CreateImage { path, mib } => {
            let sectors = mib.checked_mul(2048).context("Image size too large")?;
            ImageStorage::create_image(&path, sectors)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            writeln!(output, "Created {} ({} sectors)", path.display(), sectors)?;
        }
    }

    Ok(())
}

fn show(image: &Path, output: &mut impl Write) -> anyhow::Result<()> {
    let mut storage =
        ImageStorage::open(Some(image), None).with_context(|| format!("Failed to open {}", image.display()))?;
    let sectors = storage.sector_count()?;
    let mbr = storage.read_sector(0).context("Failed to read MBR")?;

    writeln!(output, "{}: {} sectors", image.display(), sectors)?;
    for line in describe_partition_table(&mbr) {
        writeln!(output, "{}", line)?;
    }
    writeln!(output)?;

    let result = MbrVerifier::verify_mbr(&mbr, Some(sectors));
    write!(output, "{}", MbrVerifier::generate_report(&result))?;
    if !result.is_valid {
        bail!("Partition table has errors");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use m65fdisk_core::FdiskError;
    use std::io::Cursor;

    fn run_args(args: &[&str], input: &str) -> (anyhow::Result<()>, String) {
        let cli = Cli::try_parse_from(std::iter::once("m65fdisk").chain(args.iter().copied())).unwrap();
        let mut output = Vec::new();
        let result = run(cli, Cursor::new(input.as_bytes().to_vec()), &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    fn blank_card(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("card.img").to_str().unwrap().to_string();
        let (result, output) = run_args(&["create-image", &path, "--mib", "16"], "");
        result.unwrap();
        assert!(output.contains("32768 sectors"));
        path
    }

    fn all_zero(path: &str) -> bool {
        std::fs::read(path).unwrap().iter().all(|&b| b == 0)
    }

    fn fdisk_error(result: &anyhow::Result<()>) -> &FdiskError {
        result.as_ref().unwrap_err().downcast_ref::<FdiskError>().unwrap()
    }

    #[test]
    fn test_wrong_phrase_fails_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let card = blank_card(&dir);

        let (result, output) = run_args(&["format", "--image", &card], "0\nyes\nDELETE EVERYTHING\n");

        assert!(matches!(fdisk_error(&result), FdiskError::ConfirmationMismatch(_)));
        assert!(output.contains("Entered text does not match."));
        assert!(!output.contains("SD Card has been formatted."));
        assert!(all_zero(&card));
    }

    #[test]
    fn test_wrong_preset_phrase_fails() {
        let dir = tempfile::tempdir().unwrap();
        let card = blank_card(&dir);

        let (result, _) = run_args(&["format", "--image", &card, "--bus", "0", "--yes-i-know", "yes"], "");

        assert!(matches!(fdisk_error(&result), FdiskError::ConfirmationMismatch(_)));
        assert!(all_zero(&card));
    }

    #[test]
    fn test_missing_host_file_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let card = blank_card(&dir);
        let missing = dir.path().join("MISSING.TXT").to_str().unwrap().to_string();

        let (result, _) = run_args(
            &["format", "--image", &card, "--bus", "0", "--yes-i-know", "DELETE EVERYTHING", &missing],
            "",
        );

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<std::io::Error>().is_some());
        assert!(err.to_string().contains("Cannot read"));
        assert!(all_zero(&card));
    }

    #[test]
    fn test_long_host_file_name_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let card = blank_card(&dir);
        let long = dir.path().join("toolongname.txt");
        std::fs::write(&long, b"data").unwrap();

        let (result, _) = run_args(
            &["format", "--image", &card, "--bus", "0", "--yes-i-know", "DELETE EVERYTHING", long.to_str().unwrap()],
            "",
        );

        assert!(matches!(fdisk_error(&result), FdiskError::NameTooLong(_)));
        assert!(all_zero(&card));
    }

    #[test]
    fn test_format_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let card = blank_card(&dir);
        let rom = dir.path().join("MEGA65.ROM");
        std::fs::write(&rom, vec![0x5A; 2000]).unwrap();

        let (result, output) = run_args(&["format", "--image", &card, rom.to_str().unwrap()], "0\nDELETE EVERYTHING\n");
        result.unwrap();
        assert!(output.contains("SD Card has been formatted."));
        assert!(output.contains("Reboot to continue."));

        let (result, output) = run_args(&["show", &card], "");
        result.unwrap();
        assert!(output.contains("Current partition table:"));
        assert!(output.contains("Status: VALID"));
    }

    #[test]
    fn test_plan_for_too_small_card() {
        let (result, _) = run_args(&["plan", "8192"], "");
        assert!(matches!(fdisk_error(&result), FdiskError::Capacity(_)));

        let (result, output) = run_args(&["plan", "40960"], "");
        result.unwrap();
        assert!(output.contains("MiB VFAT32 Data Partition"));
    }
}
