pub mod fat32;
pub mod fat_common;
pub mod orchestrator;
pub mod partitioner;
pub mod planner;
pub mod populate;
pub mod session;
pub mod system_partition;

// Re-export the main entry points
pub use fat32::{Fat32ContiguousAllocator, Fat32NativeFormatter};
pub use orchestrator::{Confirmation, FormatOrchestrator, FormatOutcome, FormatState};
pub use partitioner::mbr_verifier::{MbrVerificationResult, MbrVerifier};
pub use partitioner::{create_mega65_mbr, describe_partition_table, show_mbr};
pub use planner::{Fat32Geometry, PartitionPlan};
pub use populate::{EmbeddedFilePopulator, PopulateReport, SlotInfo, SlotTable};
pub use session::{CardReport, FdiskSession, FileSource, SessionOptions};
pub use system_partition::SystemPartitionLayout;
