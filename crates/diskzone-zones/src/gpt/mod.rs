//! GPT (GUID Partition Table) partition table implementation

pub mod inspect;
pub mod recovery;
pub mod types;

use crate::config::DiscoveryConfig;
use crate::mbr::types::BootRecord;
use diskzone_core::{
    security, BlockDevice, Error, Guid, PartitionInfo, Result, ZoneTable, MAX_PARTITION_TABLE_BYTES,
};
use inspect::EntryStatus;
use recovery::Recovery;
use types::{GptHeader, GptPartitionEntry};

/// One GPT copy that passed every check, together with its entry array
#[derive(Debug, Clone)]
pub struct GptCopy {
    pub header: GptHeader,
    pub entry_array: Vec<u8>,
}

/// Read and validate the GPT header stored at `lba`
///
/// A header is valid only if all of the following hold:
/// 1. The sector at `lba` can be read.
/// 2. The signature is `"EFI PART"`.
/// 3. `header_size` is between 92 and the block size, and the CRC32 over
///    `header_size` bytes (CRC field zeroed) matches.
/// 4. `my_lba` equals `lba`.
/// 5. The declared entry size holds a full 128-byte entry record.
/// 6. The entry array size neither overflows nor exceeds 16 MiB.
/// 7. The entry array can be read and its CRC32 matches.
///
/// # Errors
///
/// Any failure means this copy is unusable. Structural problems are
/// `InvalidZoneTable`, CRC mismatches are `ChecksumVerification`, device
/// failures are passed through, and allocation failure is `OutOfResources`.
pub fn validate_gpt<D: BlockDevice + ?Sized>(device: &mut D, lba: u64) -> Result<GptHeader> {
    read_gpt_copy(device, lba, MAX_PARTITION_TABLE_BYTES).map(|copy| copy.header)
}

/// Like [`validate_gpt`], keeping the verified entry array
pub fn read_gpt_copy<D: BlockDevice + ?Sized>(
    device: &mut D,
    lba: u64,
    max_array_bytes: u64,
) -> Result<GptCopy> {
    let block_size = device.block_size();
    let mut sector = security::alloc_scratch(block_size as usize, "GPT header")?;
    device.read_blocks(lba, &mut sector)?;

    let header = GptHeader::from_bytes(&sector)?;

    if header.header_size == 0 || header.header_size > block_size {
        return Err(Error::invalid_zone_table(format!(
            "GPT header size {} outside 1..={}",
            header.header_size, block_size
        )));
    }

    if (header.header_size as usize) < GptHeader::HEADER_SIZE {
        return Err(Error::invalid_zone_table(format!(
            "GPT header size {} is smaller than {}",
            header.header_size,
            GptHeader::HEADER_SIZE
        )));
    }

    if !header.verify_header_crc32(&sector) {
        return Err(Error::checksum(format!(
            "GPT header CRC32 verification failed at LBA {}",
            lba
        )));
    }

    if header.my_lba != lba {
        return Err(Error::invalid_zone_table(format!(
            "GPT header read from LBA {} claims to live at LBA {}",
            lba, header.my_lba
        )));
    }

    if (header.partition_entry_size as usize) < GptPartitionEntry::ENTRY_SIZE {
        return Err(Error::invalid_zone_table(format!(
            "GPT partition entry size {} is smaller than {}",
            header.partition_entry_size,
            GptPartitionEntry::ENTRY_SIZE
        )));
    }

    if header.first_usable_lba > header.last_usable_lba {
        return Err(Error::invalid_zone_table(format!(
            "GPT usable range {}..={} is inverted",
            header.first_usable_lba, header.last_usable_lba
        )));
    }

    let array_len = header
        .entry_array_len()
        .ok_or_else(|| Error::invalid_zone_table("GPT partition entry array size overflows"))?;
    if array_len > max_array_bytes {
        return Err(Error::invalid_zone_table(format!(
            "GPT partition entry array of {} bytes exceeds limit {}",
            array_len, max_array_bytes
        )));
    }

    let array_len = security::u64_to_usize(array_len, "GPT partition entry array")?;
    let mut entry_array = security::alloc_scratch(array_len, "GPT partition entry array")?;
    device.read_blocks(header.partition_entry_lba, &mut entry_array)?;

    if !header.verify_partition_entries_crc32(&entry_array) {
        return Err(Error::checksum(format!(
            "GPT partition entries CRC32 verification failed (header at LBA {})",
            lba
        )));
    }

    Ok(GptCopy { header, entry_array })
}

/// GPT partition table
///
/// The GUID Partition Table is the modern partitioning scheme used by UEFI-based systems.
/// It supports up to 128 partitions by default and uses GUIDs for partition identification.
///
/// # Structure
///
/// ```text
/// LBA 0:    Protective MBR (for backward compatibility)
/// LBA 1:    Primary GPT header
/// LBA 2-33: Partition entries array (typically 128 entries)
/// LBA 34+:  Usable disk space
/// ...
/// Last 33:  Backup partition entries array
/// Last 1:   Backup GPT header
/// ```
#[derive(Debug, Clone)]
pub struct GptZoneTable {
    zones: Vec<PartitionInfo>,
    header: GptHeader,
    statuses: Vec<EntryStatus>,
    recovery: Recovery,
}

impl GptZoneTable {
    /// Discover the GPT on a device
    ///
    /// Validates both copies, restores a damaged one from the other when
    /// `config.repair` is set, then inspects the entry array of the copy in
    /// use. Only entries that pass every per-entry check are reported.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if neither copy is valid (or a required protective
    /// MBR is missing), `InvalidParameter` for an unusable configuration and
    /// `OutOfResources` if scratch memory cannot be allocated.
    pub fn discover<D: BlockDevice + ?Sized>(device: &mut D, config: &DiscoveryConfig) -> Result<Self> {
        config.validate()?;

        let block_size = device.block_size() as usize;
        if block_size < GptHeader::HEADER_SIZE {
            return Err(Error::invalid_parameter(format!(
                "block size {} cannot hold a GPT header",
                block_size
            )));
        }

        if config.require_protective_mbr {
            let mut sector = security::alloc_scratch(block_size, "protective MBR")?;
            device.read_blocks(0, &mut sector)?;
            let protective = BootRecord::parse(&sector)
                .map(|record| record.is_protective())
                .unwrap_or(false);
            if !protective {
                return Err(Error::not_found("no protective MBR in front of the GPT"));
            }
        }

        let (copy, recovery) = recovery::select_copy(device, config)?;

        let entries = inspect::parse_entries(&copy.header, &copy.entry_array)?;
        let statuses = inspect::check_gpt_entries(&copy.header, &entries);
        let zones = inspect::collect_partitions(&entries, &statuses, config.max_entries);

        tracing::info!(
            "Found GPT at LBA {} with {} usable partitions",
            copy.header.my_lba,
            zones.len()
        );

        Ok(Self {
            zones,
            header: copy.header,
            statuses,
            recovery,
        })
    }

    /// Get the disk GUID
    pub fn disk_guid(&self) -> Guid {
        self.header.disk_guid
    }

    /// Get the GPT header of the copy in use
    pub fn header(&self) -> &GptHeader {
        &self.header
    }

    /// Which copy, if any, was regenerated or left damaged
    pub fn recovery(&self) -> Recovery {
        self.recovery
    }

    /// Status of every entry in the array, in array order
    pub fn entry_statuses(&self) -> &[EntryStatus] {
        &self.statuses
    }

    /// Consume the table, keeping only the partitions
    pub fn into_zones(self) -> Vec<PartitionInfo> {
        self.zones
    }
}

impl ZoneTable for GptZoneTable {
    fn identify(&self) -> &str {
        "GUID Partition Table"
    }

    fn enumerate_zones(&self) -> &[PartitionInfo] {
        &self.zones
    }
}
