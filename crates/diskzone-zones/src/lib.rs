//! # diskzone zones
//!
//! Partition table discovery over a [`BlockDevice`](diskzone_core::BlockDevice).
//!
//! This crate provides:
//! - **GPT**: header validation, primary/backup cross-checking and repair,
//!   and per-entry range/overlap/attribute checks
//! - **MBR**: the legacy four-slot table plus logical partitions found by
//!   walking the EBR chain of each extended partition
//! - **Discovery**: one entry point that tries GPT first and falls back to MBR
//!
//! ## Example
//!
//! ```rust,no_run
//! use diskzone_core::ZoneTable;
//! use diskzone_pipeline::FileDevice;
//! use diskzone_zones::{discover_with, DiscoveryConfig};
//! use std::path::Path;
//!
//! let mut disk = FileDevice::open(Path::new("disk.img"), 512, true).unwrap();
//! let discovery = discover_with(&mut disk, &DiscoveryConfig::default()).unwrap();
//!
//! println!("Partition table: {}", discovery.identify());
//! for zone in discovery.enumerate_zones() {
//!     println!("  {}", zone);
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod gpt;
pub mod mbr;

#[cfg(test)]
mod testutil;

pub use config::DiscoveryConfig;
pub use discovery::{discover, discover_with, Discovery, DiskId};
pub use gpt::recovery::{restore_gpt, Recovery};
pub use gpt::{validate_gpt, GptZoneTable};
pub use mbr::{discover_mbr, MbrZoneTable};
