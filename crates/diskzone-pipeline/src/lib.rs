//! # diskzone pipeline
//!
//! Block device implementations for the discovery engine.
//!
//! This crate provides concrete devices and the partition window:
//! - **MemoryDevice**: an owned in-memory disk (tests, scratch images)
//! - **FileDevice**: a read/write disk image file
//! - **MmapDevice**: a memory-mapped, read-only disk image
//! - **PartitionDevice**: one discovered partition exposed as its own device
//!
//! ## Example
//!
//! ```rust,no_run
//! use diskzone_core::BlockDevice;
//! use diskzone_pipeline::{MmapDevice, PartitionDevice};
//! use std::path::Path;
//!
//! let mut disk = MmapDevice::open(Path::new("disk.img"), 512).unwrap();
//! println!("{} sectors", disk.total_sectors());
//! # let info: diskzone_core::PartitionInfo = unimplemented!();
//!
//! // Expose a discovered partition as a device of its own
//! let mut part = PartitionDevice::new(&mut disk, info).unwrap();
//! let mut sector = [0u8; 512];
//! part.read_blocks(0, &mut sector).unwrap();
//! ```

pub mod file;
pub mod memory;
pub mod mmap;
pub mod partition;

pub use file::FileDevice;
pub use memory::MemoryDevice;
pub use mmap::MmapDevice;
pub use partition::PartitionDevice;
