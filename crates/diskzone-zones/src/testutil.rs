//! Disk image builders shared by the unit tests

use crate::gpt::types::{GptHeader, GptPartitionEntry, PartitionTypeGuid};
use crate::mbr::types::{BootRecord, MbrEntry};
use diskzone_core::{checksum, Guid};
use diskzone_pipeline::MemoryDevice;

pub(crate) const SECTOR: usize = 512;

/// Copy raw bytes onto a device without going through the I/O counters
pub(crate) fn put_bytes(device: &mut MemoryDevice, lba: u64, bytes: &[u8]) {
    let start = lba as usize * SECTOR;
    device.as_bytes_mut()[start..start + bytes.len()].copy_from_slice(bytes);
}

pub(crate) fn gpt_entry(type_guid: PartitionTypeGuid, first_lba: u64, last_lba: u64, name: &str) -> GptPartitionEntry {
    GptPartitionEntry {
        partition_type_guid: type_guid,
        unique_partition_guid: Guid::from_bytes([first_lba as u8 | 0x80; 16]),
        first_lba,
        last_lba,
        attributes: 0,
        name: name.to_string(),
    }
}

pub(crate) fn mbr_entry(boot_indicator: u8, type_code: u8, starting_lba: u32, size_in_lba: u32) -> MbrEntry {
    MbrEntry::new(boot_indicator, type_code, starting_lba, size_in_lba)
}

/// A 512-byte boot sector with `0xAA55` and the given slots filled
pub(crate) fn boot_sector(disk_signature: u32, slots: &[(usize, MbrEntry)]) -> Vec<u8> {
    let mut record = BootRecord::empty();
    record.disk_signature = disk_signature;
    for (slot, entry) in slots {
        record.entries[*slot] = *entry;
    }

    let mut sector = vec![0u8; SECTOR];
    record.write_to(&mut sector).unwrap();
    sector
}

/// Builder for a GPT disk with both copies and a protective MBR
pub(crate) struct GptImage {
    pub total_sectors: u64,
    pub num_entries: u32,
    pub entry_size: u32,
    pub disk_guid: Guid,
    pub protective_mbr: bool,
    pub entries: Vec<(usize, GptPartitionEntry)>,
}

impl GptImage {
    pub fn new(total_sectors: u64) -> Self {
        Self {
            total_sectors,
            num_entries: 128,
            entry_size: 128,
            disk_guid: Guid::from_bytes([0x5A; 16]),
            protective_mbr: true,
            entries: Vec::new(),
        }
    }

    /// Append an entry at the next free array index
    pub fn partition(self, type_guid: PartitionTypeGuid, first_lba: u64, last_lba: u64) -> Self {
        let name = format!("part{}", self.entries.len() + 1);
        let entry = gpt_entry(type_guid, first_lba, last_lba, &name);
        let index = self.entries.len();
        self.entry_at(index, entry)
    }

    pub fn entry_at(mut self, index: usize, entry: GptPartitionEntry) -> Self {
        self.entries.push((index, entry));
        self
    }

    pub fn without_protective_mbr(mut self) -> Self {
        self.protective_mbr = false;
        self
    }

    pub fn entry_array_sectors(&self) -> u64 {
        let bytes = self.num_entries as u64 * self.entry_size as u64;
        bytes.div_ceil(SECTOR as u64)
    }

    pub fn last_lba(&self) -> u64 {
        self.total_sectors - 1
    }

    pub fn first_usable_lba(&self) -> u64 {
        2 + self.entry_array_sectors()
    }

    pub fn last_usable_lba(&self) -> u64 {
        self.total_sectors - 2 - self.entry_array_sectors()
    }

    pub fn entry_array(&self) -> Vec<u8> {
        let stride = self.entry_size as usize;
        let mut array = vec![0u8; self.num_entries as usize * stride];
        for (index, entry) in &self.entries {
            entry.write_to(&mut array[index * stride..]).unwrap();
        }
        array
    }

    pub fn header(&self, my_lba: u64, alternate_lba: u64, partition_entry_lba: u64) -> GptHeader {
        GptHeader {
            revision: GptHeader::REVISION_1_0,
            header_size: GptHeader::HEADER_SIZE as u32,
            header_crc32: 0,
            my_lba,
            alternate_lba,
            first_usable_lba: self.first_usable_lba(),
            last_usable_lba: self.last_usable_lba(),
            disk_guid: self.disk_guid,
            partition_entry_lba,
            num_partition_entries: self.num_entries,
            partition_entry_size: self.entry_size,
            partition_entries_crc32: checksum::crc32(&self.entry_array()),
        }
    }

    pub fn primary_header(&self) -> GptHeader {
        self.header(1, self.last_lba(), 2)
    }

    pub fn backup_header(&self) -> GptHeader {
        self.header(self.last_lba(), 1, self.last_usable_lba() + 1)
    }

    pub fn build(&self) -> MemoryDevice {
        let mut device = MemoryDevice::new(self.total_sectors, SECTOR as u32).unwrap();

        if self.protective_mbr {
            let size = (self.total_sectors - 1).min(u32::MAX as u64) as u32;
            put_bytes(&mut device, 0, &boot_sector(0, &[(0, mbr_entry(0x00, 0xEE, 1, size))]));
        }

        let array = self.entry_array();
        for mut header in [self.primary_header(), self.backup_header()] {
            write_header(&mut device, &mut header);
            put_bytes(&mut device, header.partition_entry_lba, &array);
        }

        device
    }
}

/// Seal a header and place it at its own `my_lba`
pub(crate) fn write_header(device: &mut MemoryDevice, header: &mut GptHeader) {
    let mut sector = vec![0u8; SECTOR];
    header.seal_into(&mut sector).unwrap();
    put_bytes(device, header.my_lba, &sector);
}
