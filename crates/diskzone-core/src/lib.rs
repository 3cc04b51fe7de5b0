//! # diskzone core
//!
//! Core traits, types, and error handling for partition discovery.
//!
//! This crate provides the foundational abstractions the other crates build on:
//! - **BlockDevice**: sector-addressed storage the engine reads from and repairs
//! - **ZoneTable**: a parsed partition table (GPT or MBR)
//! - **PartitionInfo**: the normalized description of one discovered partition
//! - **Guid**: on-disk mixed-endian GUIDs used by GPT
//!
//! ## Example
//!
//! ```rust,no_run
//! use diskzone_core::{BlockDevice, Result};
//!
//! fn describe(device: &mut dyn BlockDevice) -> Result<()> {
//!     println!("{} sectors of {} bytes", device.total_sectors(), device.block_size());
//!     let mut sector = vec![0u8; device.block_size() as usize];
//!     device.read_blocks(0, &mut sector)?;
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod security;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{Error, Result};
pub use security::*;
pub use traits::{BlockDevice, ZoneTable};
pub use types::{Guid, PartitionInfo, PartitionKind, PartitionList, Scheme};
