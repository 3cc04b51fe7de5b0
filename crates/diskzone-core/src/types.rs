//! Core types for partition discovery

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// A GUID exactly as stored on disk
///
/// The first three fields are little-endian (4, 2 and 2 bytes), followed by
/// eight raw bytes. Equality is byte equality of the on-disk form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid([u8; 16]);

impl Guid {
    /// The all-zero GUID, marking an unused GPT entry
    pub const ZERO: Self = Self([0; 16]);

    /// Wrap 16 on-disk bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Build a GUID from its textual field values
    ///
    /// `from_fields(0xC12A7328, 0xF81F, 0x11D2, [0xBA, 0x4B, ...])` is the
    /// GUID written `C12A7328-F81F-11D2-BA4B-...`.
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        let a = data1.to_le_bytes();
        let b = data2.to_le_bytes();
        let c = data3.to_le_bytes();
        Self([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], data4[0], data4[1], data4[2],
            data4[3], data4[4], data4[5], data4[6], data4[7],
        ])
    }

    /// Read a GUID from the first 16 bytes of a slice
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 16] = bytes.get(..16)?.try_into().ok()?;
        Some(Self(raw))
    }

    /// The on-disk bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Is this the all-zero GUID?
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Convert to a `Uuid` in canonical (big-endian) field order
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes_le(self.0)
    }

    /// Convert from a `Uuid` to the on-disk mixed-endian form
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.to_bytes_le())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Uuid::encode_buffer();
        f.write_str(self.to_uuid().hyphenated().encode_upper(&mut buffer))
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Uuid::parse_str(&text)
            .map(Self::from_uuid)
            .map_err(serde::de::Error::custom)
    }
}

/// Partitioning scheme a partition was discovered through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// GUID Partition Table
    Gpt,
    /// Legacy Master Boot Record (primary and logical partitions)
    Mbr,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Gpt => write!(f, "GPT"),
            Scheme::Mbr => write!(f, "MBR"),
        }
    }
}

/// Type identifier of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "type", rename_all = "lowercase")]
pub enum PartitionKind {
    /// GPT partition type GUID
    Gpt(Guid),
    /// MBR one-byte system indicator
    Mbr(u8),
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKind::Gpt(guid) => write!(f, "{}", guid),
            PartitionKind::Mbr(code) => write!(f, "0x{:02X}", code),
        }
    }
}

/// Normalized description of one discovered partition
///
/// Created fresh by discovery and owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    /// Scheme the partition came from
    pub scheme: Scheme,

    /// Partition type (GUID for GPT, type code for MBR)
    pub kind: PartitionKind,

    /// Unique partition GUID (GPT only)
    pub unique_guid: Option<Guid>,

    /// First sector (inclusive)
    pub start_lba: u64,

    /// Last sector (inclusive)
    pub end_lba: u64,

    /// Number of sectors
    pub size_sectors: u64,

    /// GPT attribute bits (0 for MBR)
    pub attributes: u64,

    /// Partition label (GPT) or type description (MBR)
    pub name: String,

    /// Legacy-bootable flag
    pub bootable: bool,

    /// 1-based partition number
    pub partition_number: u32,

    /// Is this an EFI System Partition? (GPT only)
    pub is_efi_system: bool,

    /// Is this entry reserved for OS-specific use? (GPT only)
    pub is_os_reserved: bool,
}

impl PartitionInfo {
    /// Byte offset of the partition on its device
    pub fn byte_offset(&self, block_size: u32) -> u64 {
        self.start_lba.saturating_mul(block_size as u64)
    }

    /// Length of the partition in bytes
    pub fn byte_length(&self, block_size: u32) -> u64 {
        self.size_sectors.saturating_mul(block_size as u64)
    }

    /// Does this partition contain the given absolute LBA?
    pub fn contains_lba(&self, lba: u64) -> bool {
        self.start_lba <= lba && lba <= self.end_lba
    }
}

impl fmt::Display for PartitionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} [{} @ LBA {}..={}, {} sectors]",
            self.scheme, self.partition_number, self.name, self.start_lba, self.end_lba, self.size_sectors
        )?;
        if self.bootable {
            write!(f, " bootable")?;
        }
        if self.is_efi_system {
            write!(f, " esp")?;
        }
        Ok(())
    }
}

/// Lookup helpers over a discovered partition list
pub trait PartitionList {
    /// Find a partition by exact name
    fn find_by_name(&self, name: &str) -> Option<&PartitionInfo>;

    /// Find the first partition with the given GPT type GUID
    fn find_by_type_guid(&self, type_guid: &Guid) -> Option<&PartitionInfo>;

    /// Find the first partition with the given MBR type code
    fn find_by_mbr_type(&self, type_code: u8) -> Option<&PartitionInfo>;

    /// Find a partition by its 1-based partition number
    fn find_by_number(&self, partition_number: u32) -> Option<&PartitionInfo>;

    /// First partition flagged as legacy-bootable
    fn find_bootable(&self) -> Option<&PartitionInfo>;

    /// First EFI System Partition
    fn find_efi_system(&self) -> Option<&PartitionInfo>;
}

impl PartitionList for [PartitionInfo] {
    fn find_by_name(&self, name: &str) -> Option<&PartitionInfo> {
        self.iter().find(|p| p.name == name)
    }

    fn find_by_type_guid(&self, type_guid: &Guid) -> Option<&PartitionInfo> {
        self.iter()
            .find(|p| matches!(p.kind, PartitionKind::Gpt(guid) if guid == *type_guid))
    }

    fn find_by_mbr_type(&self, type_code: u8) -> Option<&PartitionInfo> {
        self.iter()
            .find(|p| matches!(p.kind, PartitionKind::Mbr(code) if code == type_code))
    }

    fn find_by_number(&self, partition_number: u32) -> Option<&PartitionInfo> {
        self.iter().find(|p| p.partition_number == partition_number)
    }

    fn find_bootable(&self) -> Option<&PartitionInfo> {
        self.iter().find(|p| p.bootable)
    }

    fn find_efi_system(&self) -> Option<&PartitionInfo> {
        self.iter().find(|p| p.is_efi_system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESP: Guid = Guid::from_fields(
        0xC12A7328,
        0xF81F,
        0x11D2,
        [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    );

    fn partition(number: u32, name: &str, kind: PartitionKind) -> PartitionInfo {
        PartitionInfo {
            scheme: match kind {
                PartitionKind::Gpt(_) => Scheme::Gpt,
                PartitionKind::Mbr(_) => Scheme::Mbr,
            },
            kind,
            unique_guid: None,
            start_lba: 100 * number as u64,
            end_lba: 100 * number as u64 + 99,
            size_sectors: 100,
            attributes: 0,
            name: name.to_string(),
            bootable: false,
            partition_number: number,
            is_efi_system: false,
            is_os_reserved: false,
        }
    }

    #[test]
    fn test_guid_field_layout() {
        assert_eq!(
            ESP.as_bytes(),
            &[0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11, 0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9, 0x3b]
        );
        assert_eq!(ESP.to_string(), "C12A7328-F81F-11D2-BA4B-00A0C93EC93B");
    }

    #[test]
    fn test_guid_uuid_conversion() {
        let uuid = ESP.to_uuid();
        assert_eq!(Guid::from_uuid(uuid), ESP);
        assert!(Guid::ZERO.is_zero());
        assert!(!ESP.is_zero());
        assert_eq!(Guid::read_from(&[0u8; 8]), None);
    }

    #[test]
    fn test_partition_list_lookups() {
        let mut esp = partition(1, "EFI", PartitionKind::Gpt(ESP));
        esp.is_efi_system = true;
        let mut boot = partition(2, "boot", PartitionKind::Mbr(0x0C));
        boot.bootable = true;
        let parts = vec![esp, boot];

        assert_eq!(parts.find_by_name("boot").unwrap().partition_number, 2);
        assert_eq!(parts.find_by_type_guid(&ESP).unwrap().partition_number, 1);
        assert_eq!(parts.find_by_mbr_type(0x0C).unwrap().partition_number, 2);
        assert_eq!(parts.find_by_number(1).unwrap().name, "EFI");
        assert_eq!(parts.find_bootable().unwrap().name, "boot");
        assert_eq!(parts.find_efi_system().unwrap().name, "EFI");
        assert!(parts.find_by_name("system").is_none());
    }

    #[test]
    fn test_partition_geometry() {
        let info = partition(2, "data", PartitionKind::Mbr(0x83));
        assert_eq!(info.byte_offset(512), 200 * 512);
        assert_eq!(info.byte_length(512), 100 * 512);
        assert!(info.contains_lba(299));
        assert!(!info.contains_lba(300));
    }
}
