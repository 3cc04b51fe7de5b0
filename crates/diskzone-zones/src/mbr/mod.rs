//! MBR (Master Boot Record) partition table implementation

pub mod ebr;
pub mod types;

use crate::config::DiscoveryConfig;
use diskzone_core::{
    security, BlockDevice, Error, PartitionInfo, PartitionKind, Result, Scheme, ZoneTable,
};
use ebr::{ChainLimits, FIRST_LOGICAL_NUMBER};
use types::{BootRecord, MbrEntry};

/// Normalized description of a primary or logical MBR partition
pub(crate) fn partition_info(entry: &MbrEntry, start_lba: u64, partition_number: u32) -> PartitionInfo {
    let size_sectors = entry.size_in_lba as u64;
    PartitionInfo {
        scheme: Scheme::Mbr,
        kind: PartitionKind::Mbr(entry.partition_type.to_byte()),
        unique_guid: None,
        start_lba,
        end_lba: start_lba.saturating_add(size_sectors.saturating_sub(1)),
        size_sectors,
        attributes: 0,
        name: entry.partition_type.name().to_string(),
        bootable: entry.is_bootable(),
        partition_number,
        is_efi_system: false,
        is_os_reserved: false,
    }
}

/// Discover the primary and logical partitions of a legacy MBR
///
/// Shorthand for [`MbrZoneTable::discover`] with the default configuration.
pub fn discover_mbr<D: BlockDevice + ?Sized>(device: &mut D) -> Result<Vec<PartitionInfo>> {
    MbrZoneTable::discover(device, &DiscoveryConfig::default()).map(MbrZoneTable::into_zones)
}

/// MBR partition table
///
/// The Master Boot Record is the traditional partitioning scheme used by BIOS-based systems.
/// It supports up to 4 primary partitions, or 3 primary partitions and 1 extended partition
/// whose chain of EBRs describes any number of logical partitions.
///
/// Primary partitions are numbered 1-4 by slot. Logical partitions are
/// numbered from 5 in the order their EBRs are found.
#[derive(Debug, Clone)]
pub struct MbrZoneTable {
    zones: Vec<PartitionInfo>,
    disk_signature: u32,
}

impl MbrZoneTable {
    /// Parse the MBR in sector 0 and follow any extended partitions
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the boot signature is wrong, a slot is
    /// malformed, the MBR is a GPT protective MBR, or no partition is
    /// found. Device errors while reading the MBR or an EBR are returned
    /// as they are.
    pub fn discover<D: BlockDevice + ?Sized>(device: &mut D, config: &DiscoveryConfig) -> Result<Self> {
        config.validate()?;

        let block_size = device.block_size() as usize;
        if block_size < BootRecord::MBR_SIZE {
            return Err(Error::invalid_parameter(format!(
                "block size {} cannot hold an MBR",
                block_size
            )));
        }

        let mut sector = security::alloc_scratch(block_size, "MBR")?;
        device.read_blocks(0, &mut sector)?;

        let record = BootRecord::parse(&sector)
            .and_then(|record| record.validate().map(|()| record))
            .map_err(|err| Error::not_found(format!("no usable MBR: {}", err)))?;

        if record.is_protective() {
            return Err(Error::not_found(
                "protective MBR found; the disk is partitioned with GPT",
            ));
        }

        let limits = ChainLimits {
            max_partitions: config.max_entries,
            max_hops: config.max_ebr_chain,
        };
        let mut zones = Vec::new();
        let mut next_logical = FIRST_LOGICAL_NUMBER;

        for (slot, entry) in record.entries.iter().enumerate() {
            if zones.len() >= config.max_entries {
                break;
            }

            if entry.is_empty() {
                continue;
            }

            if entry.is_extended() {
                ebr::walk_ebr_chain(
                    device,
                    entry.starting_lba as u64,
                    limits,
                    &mut next_logical,
                    &mut zones,
                )?;
                continue;
            }

            zones.push(partition_info(entry, entry.starting_lba as u64, slot as u32 + 1));
        }

        if zones.is_empty() {
            return Err(Error::not_found("MBR has no partitions"));
        }

        tracing::info!("Found MBR with {} partitions", zones.len());

        Ok(Self {
            zones,
            disk_signature: record.disk_signature,
        })
    }

    /// Get the disk signature
    pub fn disk_signature(&self) -> u32 {
        self.disk_signature
    }

    /// Consume the table, keeping only the partitions
    pub fn into_zones(self) -> Vec<PartitionInfo> {
        self.zones
    }
}

impl ZoneTable for MbrZoneTable {
    fn identify(&self) -> &str {
        "Master Boot Record"
    }

    fn enumerate_zones(&self) -> &[PartitionInfo] {
        &self.zones
    }
}
