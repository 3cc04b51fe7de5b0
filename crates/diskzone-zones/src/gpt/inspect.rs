//! Per-entry checks over a validated GPT partition entry array

use super::types::{GptHeader, GptPartitionEntry};
use diskzone_core::{Error, PartitionInfo, PartitionKind, Result, Scheme};
use serde::Serialize;

/// Classification of one entry of the array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntryStatus {
    /// Type GUID is all zeros
    pub unused: bool,
    /// Inverted, or not inside the usable LBA range
    pub out_of_range: bool,
    /// Shares at least one LBA with another used entry
    pub overlap: bool,
    /// Attribute bit 1 is set
    pub os_specific: bool,
}

impl EntryStatus {
    /// Does this entry make it into the discovery result?
    pub fn is_usable(&self) -> bool {
        !(self.unused || self.out_of_range || self.overlap || self.os_specific)
    }
}

/// Split a verified entry array into `num_partition_entries` records
///
/// Records are `partition_entry_size` bytes apart; only the first 128
/// bytes of each are interpreted.
pub fn parse_entries(header: &GptHeader, entry_array: &[u8]) -> Result<Vec<GptPartitionEntry>> {
    let stride = header.partition_entry_size as usize;
    if stride < GptPartitionEntry::ENTRY_SIZE {
        return Err(Error::invalid_zone_table(format!(
            "GPT partition entry size {} is smaller than {}",
            stride,
            GptPartitionEntry::ENTRY_SIZE
        )));
    }

    let count = header.num_partition_entries as usize;
    let needed = count.checked_mul(stride);
    if needed.map_or(true, |needed| needed > entry_array.len()) {
        return Err(Error::invalid_zone_table(format!(
            "GPT entry array of {} bytes cannot hold {} entries of {} bytes",
            entry_array.len(),
            count,
            stride
        )));
    }

    entry_array
        .chunks_exact(stride)
        .take(count)
        .map(GptPartitionEntry::from_bytes)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::invalid_zone_table("truncated GPT partition entry"))
}

/// Classify every entry against the header and against each other
///
/// Two used entries overlap if their inclusive LBA ranges intersect. Both
/// members of an overlapping pair are flagged. Inverted entries are
/// already out of range and take no part in overlap detection.
pub fn check_gpt_entries(header: &GptHeader, entries: &[GptPartitionEntry]) -> Vec<EntryStatus> {
    let mut statuses: Vec<EntryStatus> = entries
        .iter()
        .map(|entry| {
            if entry.is_unused() {
                return EntryStatus {
                    unused: true,
                    ..EntryStatus::default()
                };
            }

            EntryStatus {
                unused: false,
                out_of_range: entry.first_lba > entry.last_lba
                    || entry.first_lba < header.first_usable_lba
                    || entry.last_lba > header.last_usable_lba,
                overlap: false,
                os_specific: entry.is_os_specific(),
            }
        })
        .collect();

    // Sweep the used ranges in start order. An entry overlaps an earlier one
    // iff it starts at or before the furthest end seen so far; the entry
    // owning that end is its partner.
    let mut order: Vec<usize> = (0..entries.len())
        .filter(|&i| !statuses[i].unused && entries[i].first_lba <= entries[i].last_lba)
        .collect();
    order.sort_by_key(|&i| (entries[i].first_lba, entries[i].last_lba));

    let mut furthest: Option<(u64, usize)> = None;
    for i in order {
        let entry = &entries[i];
        match furthest {
            Some((end, owner)) if entry.first_lba <= end => {
                statuses[i].overlap = true;
                statuses[owner].overlap = true;
                if entry.last_lba > end {
                    furthest = Some((entry.last_lba, i));
                }
            }
            _ => furthest = Some((entry.last_lba, i)),
        }
    }

    statuses
}

/// Normalized description of one GPT entry
///
/// `index` is the zero-based position in the entry array.
pub fn to_partition_info(entry: &GptPartitionEntry, index: usize) -> PartitionInfo {
    PartitionInfo {
        scheme: Scheme::Gpt,
        kind: PartitionKind::Gpt(entry.partition_type_guid.guid()),
        unique_guid: Some(entry.unique_partition_guid),
        start_lba: entry.first_lba,
        end_lba: entry.last_lba,
        size_sectors: entry.size_lba(),
        attributes: entry.attributes,
        name: entry.name.clone(),
        bootable: entry.is_legacy_bootable(),
        partition_number: index as u32 + 1,
        is_efi_system: entry.is_efi_system(),
        is_os_reserved: entry.is_os_specific(),
    }
}

/// Usable entries in array order, at most `max_entries` of them
pub fn collect_partitions(
    entries: &[GptPartitionEntry],
    statuses: &[EntryStatus],
    max_entries: usize,
) -> Vec<PartitionInfo> {
    let excluded = statuses
        .iter()
        .filter(|status| !status.unused && !status.is_usable())
        .count();
    if excluded > 0 {
        tracing::warn!("Excluded {} GPT entries (out of range, overlapping or OS-specific)", excluded);
    }

    entries
        .iter()
        .zip(statuses)
        .enumerate()
        .filter(|(_, (_, status))| status.is_usable())
        .take(max_entries)
        .map(|(index, (entry, _))| to_partition_info(entry, index))
        .collect()
}
