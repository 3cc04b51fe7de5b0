//! GPT partition types and structures

use diskzone_core::{checksum, Error, Guid, Result};
use std::fmt;

/// LBA of the primary GPT header
pub const PRIMARY_HEADER_LBA: u64 = 1;

/// Attribute bit 1: the entry is reserved for OS-specific use
pub const ATTR_OS_SPECIFIC: u64 = 1 << 1;

/// Attribute bit 2: legacy BIOS bootable
pub const ATTR_LEGACY_BOOTABLE: u64 = 1 << 2;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

/// GPT partition type GUID
///
/// Well-known partition type GUIDs used in GPT partition tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionTypeGuid(pub Guid);

impl PartitionTypeGuid {
    /// Unused entry
    pub const UNUSED: Self = Self(Guid::ZERO);

    /// EFI System Partition
    pub const EFI_SYSTEM: Self = Self(Guid::from_fields(
        0xC12A7328,
        0xF81F,
        0x11D2,
        [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    ));

    /// Microsoft Basic Data (FAT, NTFS, exFAT)
    pub const MICROSOFT_BASIC_DATA: Self = Self(Guid::from_fields(
        0xEBD0A0A2,
        0xB9E5,
        0x4433,
        [0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7],
    ));

    /// Linux filesystem
    pub const LINUX_FILESYSTEM: Self = Self(Guid::from_fields(
        0x0FC63DAF,
        0x8483,
        0x4772,
        [0x8E, 0x79, 0x3D, 0x69, 0xD8, 0x47, 0x7D, 0xE4],
    ));

    /// Linux swap
    pub const LINUX_SWAP: Self = Self(Guid::from_fields(
        0x0657FD6D,
        0xA4AB,
        0x43C4,
        [0x84, 0xE5, 0x09, 0x33, 0xC8, 0x4B, 0x4F, 0x4F],
    ));

    /// Android boot image
    pub const ANDROID_BOOT: Self = Self(Guid::from_fields(
        0x49A4D17F,
        0x93A3,
        0x45C1,
        [0xA0, 0xDE, 0xF5, 0x0B, 0x2E, 0xBE, 0x25, 0x99],
    ));

    /// Android system image
    pub const ANDROID_SYSTEM: Self = Self(Guid::from_fields(
        0x97409AC0,
        0xBDBE,
        0x4B38,
        [0xAF, 0xC7, 0x8B, 0x4F, 0xAE, 0x85, 0x7E, 0xF8],
    ));

    /// Android user data
    pub const ANDROID_USERDATA: Self = Self(Guid::from_fields(
        0x0BB7E6ED,
        0x4424,
        0x49C0,
        [0x9C, 0x72, 0xE8, 0xB2, 0x4F, 0x4E, 0x6C, 0x1E],
    ));

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &'static str {
        match *self {
            Self::UNUSED => "Unused",
            Self::EFI_SYSTEM => "EFI System",
            Self::MICROSOFT_BASIC_DATA => "Microsoft Basic Data",
            Self::LINUX_FILESYSTEM => "Linux filesystem",
            Self::LINUX_SWAP => "Linux swap",
            Self::ANDROID_BOOT => "Android boot",
            Self::ANDROID_SYSTEM => "Android system",
            Self::ANDROID_USERDATA => "Android userdata",
            _ => "Unknown",
        }
    }

    /// The GUID itself
    pub fn guid(&self) -> Guid {
        self.0
    }
}

impl fmt::Display for PartitionTypeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// GPT partition entry
///
/// Each partition entry is at least 128 bytes and describes one partition
/// on the disk. Larger declared entry sizes carry trailing bytes we ignore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptPartitionEntry {
    /// Partition type GUID
    pub partition_type_guid: PartitionTypeGuid,
    /// Unique partition GUID
    pub unique_partition_guid: Guid,
    /// First LBA (inclusive)
    pub first_lba: u64,
    /// Last LBA (inclusive)
    pub last_lba: u64,
    /// Attribute flags
    pub attributes: u64,
    /// Partition name, code units >= 128 replaced by '?'
    pub name: String,
}

impl GptPartitionEntry {
    /// Size of a partition entry record in bytes
    pub const ENTRY_SIZE: usize = 128;

    /// Bytes of the UTF-16LE name field (36 code units)
    pub const NAME_BYTES: usize = 72;

    /// Parse a partition entry from bytes
    ///
    /// Returns `None` if fewer than [`Self::ENTRY_SIZE`] bytes are supplied.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::ENTRY_SIZE {
            return None;
        }

        Some(Self {
            partition_type_guid: PartitionTypeGuid(Guid::read_from(&bytes[0..16])?),
            unique_partition_guid: Guid::read_from(&bytes[16..32])?,
            first_lba: read_u64(bytes, 32),
            last_lba: read_u64(bytes, 40),
            attributes: read_u64(bytes, 48),
            name: Self::parse_name(&bytes[56..Self::ENTRY_SIZE]),
        })
    }

    /// Serialize into the first [`Self::ENTRY_SIZE`] bytes of `out`
    ///
    /// The name is truncated to 36 UTF-16 code units.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `out` is shorter than one entry.
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        let available = out.len();
        let out = out.get_mut(..Self::ENTRY_SIZE).ok_or_else(|| {
            Error::invalid_parameter(format!(
                "GPT entry needs {} bytes, buffer has {}",
                Self::ENTRY_SIZE,
                available
            ))
        })?;
        out.fill(0);
        out[0..16].copy_from_slice(self.partition_type_guid.0.as_bytes());
        out[16..32].copy_from_slice(self.unique_partition_guid.as_bytes());
        out[32..40].copy_from_slice(&self.first_lba.to_le_bytes());
        out[40..48].copy_from_slice(&self.last_lba.to_le_bytes());
        out[48..56].copy_from_slice(&self.attributes.to_le_bytes());

        let name_field = &mut out[56..];
        for (slot, unit) in name_field
            .chunks_exact_mut(2)
            .zip(self.name.encode_utf16())
        {
            slot.copy_from_slice(&unit.to_le_bytes());
        }

        Ok(())
    }

    /// Check if this entry is unused
    pub fn is_unused(&self) -> bool {
        self.partition_type_guid == PartitionTypeGuid::UNUSED
    }

    /// Is the entry reserved for OS-specific use?
    pub fn is_os_specific(&self) -> bool {
        self.attributes & ATTR_OS_SPECIFIC != 0
    }

    /// Is the legacy BIOS bootable attribute set?
    pub fn is_legacy_bootable(&self) -> bool {
        self.attributes & ATTR_LEGACY_BOOTABLE != 0
    }

    /// Is this an EFI System Partition?
    pub fn is_efi_system(&self) -> bool {
        self.partition_type_guid == PartitionTypeGuid::EFI_SYSTEM
    }

    /// Get the size of this partition in LBA sectors
    pub fn size_lba(&self) -> u64 {
        if self.last_lba >= self.first_lba {
            self.last_lba - self.first_lba + 1
        } else {
            0
        }
    }

    /// Decode the UTF-16LE name, stopping at the first NUL
    ///
    /// Only ASCII survives; every other code unit becomes '?'.
    fn parse_name(bytes: &[u8]) -> String {
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .map(|unit| if unit < 0x80 { unit as u8 as char } else { '?' })
            .collect()
    }
}

/// GPT header
///
/// The GPT header contains metadata about the partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptHeader {
    /// GPT revision (usually 0x00010000)
    pub revision: u32,
    /// Header size in bytes (usually 92)
    pub header_size: u32,
    /// CRC32 checksum of header
    pub header_crc32: u32,
    /// Current LBA (location of this header)
    pub my_lba: u64,
    /// LBA of the counterpart header
    pub alternate_lba: u64,
    /// First usable LBA for partitions
    pub first_usable_lba: u64,
    /// Last usable LBA for partitions
    pub last_usable_lba: u64,
    /// Disk GUID
    pub disk_guid: Guid,
    /// Starting LBA of partition entries
    pub partition_entry_lba: u64,
    /// Number of partition entries
    pub num_partition_entries: u32,
    /// Size of each partition entry
    pub partition_entry_size: u32,
    /// CRC32 of partition entries array
    pub partition_entries_crc32: u32,
}

impl GptHeader {
    /// GPT header signature
    pub const SIGNATURE: &'static [u8; 8] = b"EFI PART";

    /// Size of the header fields we understand
    pub const HEADER_SIZE: usize = 92;

    /// Revision 1.0
    pub const REVISION_1_0: u32 = 0x0001_0000;

    /// Byte range of the header CRC32 field
    pub const CRC_FIELD: std::ops::Range<usize> = 16..20;

    /// Parse GPT header from bytes
    ///
    /// Only the signature is checked here; see `validate_gpt` for the rest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(Error::invalid_zone_table(format!(
                "GPT header needs {} bytes, got {}",
                Self::HEADER_SIZE,
                bytes.len()
            )));
        }

        if &bytes[0..8] != Self::SIGNATURE {
            return Err(Error::invalid_zone_table("Invalid GPT header signature"));
        }

        Ok(Self {
            revision: read_u32(bytes, 8),
            header_size: read_u32(bytes, 12),
            header_crc32: read_u32(bytes, 16),
            my_lba: read_u64(bytes, 24),
            alternate_lba: read_u64(bytes, 32),
            first_usable_lba: read_u64(bytes, 40),
            last_usable_lba: read_u64(bytes, 48),
            disk_guid: Guid::read_from(&bytes[56..72])
                .ok_or_else(|| Error::invalid_zone_table("truncated disk GUID"))?,
            partition_entry_lba: read_u64(bytes, 72),
            num_partition_entries: read_u32(bytes, 80),
            partition_entry_size: read_u32(bytes, 84),
            partition_entries_crc32: read_u32(bytes, 88),
        })
    }

    /// Serialize into a zeroed header sector and seal it with a fresh CRC32
    ///
    /// Bytes from 92 up to `header_size` are zero. The computed CRC is
    /// stored both in the sector and in `self.header_crc32`.
    pub fn seal_into(&mut self, sector: &mut [u8]) -> Result<()> {
        let covered = self.header_size as usize;
        if covered < Self::HEADER_SIZE || covered > sector.len() {
            return Err(Error::invalid_parameter(format!(
                "GPT header size {} does not fit a {}-byte sector",
                covered,
                sector.len()
            )));
        }

        sector.fill(0);
        sector[0..8].copy_from_slice(Self::SIGNATURE);
        sector[8..12].copy_from_slice(&self.revision.to_le_bytes());
        sector[12..16].copy_from_slice(&self.header_size.to_le_bytes());
        sector[24..32].copy_from_slice(&self.my_lba.to_le_bytes());
        sector[32..40].copy_from_slice(&self.alternate_lba.to_le_bytes());
        sector[40..48].copy_from_slice(&self.first_usable_lba.to_le_bytes());
        sector[48..56].copy_from_slice(&self.last_usable_lba.to_le_bytes());
        sector[56..72].copy_from_slice(self.disk_guid.as_bytes());
        sector[72..80].copy_from_slice(&self.partition_entry_lba.to_le_bytes());
        sector[80..84].copy_from_slice(&self.num_partition_entries.to_le_bytes());
        sector[84..88].copy_from_slice(&self.partition_entry_size.to_le_bytes());
        sector[88..92].copy_from_slice(&self.partition_entries_crc32.to_le_bytes());

        self.header_crc32 = checksum::crc32(&sector[..covered]);
        sector[Self::CRC_FIELD].copy_from_slice(&self.header_crc32.to_le_bytes());
        Ok(())
    }

    /// Verify the header CRC32 checksum
    ///
    /// # Arguments
    /// * `header_bytes` - The raw header sector as read from disk
    pub fn verify_header_crc32(&self, header_bytes: &[u8]) -> bool {
        let covered = self.header_size as usize;
        if covered == 0 || header_bytes.len() < covered {
            return false;
        }

        checksum::crc32_with_zeroed_field(&header_bytes[..covered], Self::CRC_FIELD) == self.header_crc32
    }

    /// Verify the partition entries array CRC32 checksum
    pub fn verify_partition_entries_crc32(&self, partition_entries_bytes: &[u8]) -> bool {
        checksum::crc32(partition_entries_bytes) == self.partition_entries_crc32
    }

    /// Declared size of the partition entry array in bytes
    ///
    /// `None` if the product overflows.
    pub fn entry_array_len(&self) -> Option<u64> {
        (self.num_partition_entries as u64).checked_mul(self.partition_entry_size as u64)
    }

    /// Number of usable sectors between the first and last usable LBA
    pub fn usable_lba_count(&self) -> u64 {
        if self.last_usable_lba >= self.first_usable_lba {
            self.last_usable_lba - self.first_usable_lba + 1
        } else {
            0
        }
    }

    /// Is this the primary copy?
    pub fn is_primary(&self) -> bool {
        self.my_lba == PRIMARY_HEADER_LBA
    }
}
