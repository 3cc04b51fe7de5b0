//! Extended Boot Record chain walker

use super::partition_info;
use super::types::BootRecord;
use diskzone_core::{security, BlockDevice, PartitionInfo, Result};
use std::collections::HashSet;

/// First number handed to a logical partition
pub const FIRST_LOGICAL_NUMBER: u32 = 5;

/// Limits applied while following one chain
#[derive(Debug, Clone, Copy)]
pub struct ChainLimits {
    /// Stop once the output holds this many partitions
    pub max_partitions: usize,
    /// Stop after reading this many EBRs
    pub max_hops: usize,
}

/// Walk the EBR chain of one extended partition
///
/// `base_lba` is the extended partition's starting LBA; it is both the
/// location of the first EBR and the base that "next EBR" pointers are
/// relative to. Logical partition starts are relative to their own EBR.
///
/// Logical partitions are appended to `out`, numbered from `next_number`,
/// which is advanced past them. The chain ends quietly at an EBR without a
/// valid signature, at an empty or non-extended second slot, at an EBR
/// outside the device, at an EBR that was already visited, or once a limit
/// is reached. Device errors are returned.
pub fn walk_ebr_chain<D: BlockDevice + ?Sized>(
    device: &mut D,
    base_lba: u64,
    limits: ChainLimits,
    next_number: &mut u32,
    out: &mut Vec<PartitionInfo>,
) -> Result<()> {
    let mut sector = security::alloc_scratch(device.block_size() as usize, "EBR")?;
    let mut visited = HashSet::new();
    let mut current = base_lba;

    while current != 0 && out.len() < limits.max_partitions {
        if visited.len() >= limits.max_hops {
            tracing::warn!(
                "EBR chain at LBA {} cut after {} records",
                base_lba,
                limits.max_hops
            );
            break;
        }

        if !visited.insert(current) {
            tracing::warn!("EBR chain at LBA {} loops back to LBA {}", base_lba, current);
            break;
        }

        if current >= device.total_sectors() {
            tracing::warn!("EBR at LBA {} lies beyond the end of the device", current);
            break;
        }

        device.read_blocks(current, &mut sector)?;

        let record = match BootRecord::parse(&sector) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!("EBR chain ends at LBA {}: {}", current, err);
                break;
            }
        };

        let logical = &record.entries[0];
        if !logical.is_empty() {
            match current.checked_add(logical.starting_lba as u64) {
                Some(start_lba) => {
                    out.push(partition_info(logical, start_lba, *next_number));
                    *next_number += 1;
                }
                None => tracing::warn!("Logical partition in EBR at LBA {} overflows", current),
            }
        }

        let link = &record.entries[1];
        current = if !link.is_empty() && link.is_extended() {
            base_lba.saturating_add(link.starting_lba as u64)
        } else {
            0
        };
    }

    Ok(())
}
