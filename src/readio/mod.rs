//! Read file access: the per-file capability contract, the htslib-backed
//! BAM implementation, and the open-file-budgeted read manager.

pub mod bam;
pub mod manager;
pub mod reader;

pub use bam::{BamReadFileFactory, HtslibReadReader};
pub use manager::ReadManager;
pub use reader::{ReadFileFactory, ReadFileReader, ReadIoError, SampleName};
