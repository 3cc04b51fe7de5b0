//! MBR partition types, entries and boot records

use diskzone_core::{Error, Result};
use std::fmt;

/// MBR partition type codes
///
/// These are the standard partition type identifiers used in the MBR partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbrPartitionType {
    /// Empty/unused partition entry
    Empty,
    /// FAT12, CHS
    Fat12,
    /// FAT16 < 32MB, CHS
    Fat16Small,
    /// Extended partition, CHS
    Extended,
    /// FAT16 >= 32MB, CHS
    Fat16,
    /// NTFS/exFAT/HPFS
    Ntfs,
    /// FAT32, CHS
    Fat32Chs,
    /// FAT32, LBA
    Fat32Lba,
    /// FAT16, LBA
    Fat16Lba,
    /// Extended partition, LBA
    ExtendedLba,
    /// Linux swap
    LinuxSwap,
    /// Linux native (ext2/ext3/ext4)
    LinuxNative,
    /// Linux extended partition
    LinuxExtended,
    /// Linux LVM physical volume
    LinuxLvm,
    /// GPT protective MBR
    GptProtective,
    /// EFI system partition
    EfiSystem,
    /// Unknown partition type
    Unknown(u8),
}

impl MbrPartitionType {
    /// Create a partition type from a byte value
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::Empty,
            0x01 => Self::Fat12,
            0x04 => Self::Fat16Small,
            0x05 => Self::Extended,
            0x06 => Self::Fat16,
            0x07 => Self::Ntfs,
            0x0B => Self::Fat32Chs,
            0x0C => Self::Fat32Lba,
            0x0E => Self::Fat16Lba,
            0x0F => Self::ExtendedLba,
            0x82 => Self::LinuxSwap,
            0x83 => Self::LinuxNative,
            0x85 => Self::LinuxExtended,
            0x8E => Self::LinuxLvm,
            0xEE => Self::GptProtective,
            0xEF => Self::EfiSystem,
            _ => Self::Unknown(b),
        }
    }

    /// Get the byte value of this partition type
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::Fat12 => 0x01,
            Self::Fat16Small => 0x04,
            Self::Extended => 0x05,
            Self::Fat16 => 0x06,
            Self::Ntfs => 0x07,
            Self::Fat32Chs => 0x0B,
            Self::Fat32Lba => 0x0C,
            Self::Fat16Lba => 0x0E,
            Self::ExtendedLba => 0x0F,
            Self::LinuxSwap => 0x82,
            Self::LinuxNative => 0x83,
            Self::LinuxExtended => 0x85,
            Self::LinuxLvm => 0x8E,
            Self::GptProtective => 0xEE,
            Self::EfiSystem => 0xEF,
            Self::Unknown(b) => b,
        }
    }

    /// Does this type mark a container of logical partitions?
    pub fn is_extended(self) -> bool {
        matches!(self, Self::Extended | Self::ExtendedLba | Self::LinuxExtended)
    }

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Fat12 => "FAT12",
            Self::Fat16Small => "FAT16 (<32MB)",
            Self::Extended => "Extended",
            Self::Fat16 => "FAT16",
            Self::Ntfs => "NTFS/exFAT",
            Self::Fat32Chs => "FAT32 (CHS)",
            Self::Fat32Lba => "FAT32 (LBA)",
            Self::Fat16Lba => "FAT16 (LBA)",
            Self::ExtendedLba => "Extended (LBA)",
            Self::LinuxSwap => "Linux swap",
            Self::LinuxNative => "Linux",
            Self::LinuxExtended => "Linux extended",
            Self::LinuxLvm => "Linux LVM",
            Self::GptProtective => "GPT Protective",
            Self::EfiSystem => "EFI System",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for MbrPartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// CHS (Cylinder-Head-Sector) address
///
/// Traditional disk addressing using physical geometry. Carried for
/// completeness only; partition locations always come from the LBA fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CHSAddress {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

impl CHSAddress {
    /// Parse CHS address from 3 bytes
    ///
    /// Format:
    /// - Byte 0: Head (0-255)
    /// - Byte 1: Sector (bits 0-5) + Cylinder high (bits 6-7)
    /// - Byte 2: Cylinder low (bits 0-7)
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        let head = bytes[0];
        let sector = bytes[1] & 0x3F; // Lower 6 bits
        let cyl_high = ((bytes[1] & 0xC0) as u16) << 2; // Upper 2 bits
        let cyl_low = bytes[2] as u16;

        Self {
            cylinder: cyl_high | cyl_low,
            head,
            sector,
        }
    }

    /// Convert CHS to bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        let cyl_high = ((self.cylinder >> 8) & 0x03) as u8;
        let cyl_low = (self.cylinder & 0xFF) as u8;

        [self.head, (self.sector & 0x3F) | (cyl_high << 6), cyl_low]
    }
}

impl fmt::Display for CHSAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/H:{}/S:{}", self.cylinder, self.head, self.sector)
    }
}

/// One 16-byte partition slot of an MBR or EBR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrEntry {
    /// 0x80 bootable, 0x00 not; anything else is invalid
    pub boot_indicator: u8,
    pub chs_start: CHSAddress,
    pub partition_type: MbrPartitionType,
    pub chs_end: CHSAddress,
    pub starting_lba: u32,
    pub size_in_lba: u32,
}

impl MbrEntry {
    /// Size of each partition entry
    pub const SIZE: usize = 16;

    /// An all-zero slot
    pub const EMPTY: Self = Self {
        boot_indicator: 0,
        chs_start: CHSAddress {
            cylinder: 0,
            head: 0,
            sector: 0,
        },
        partition_type: MbrPartitionType::Empty,
        chs_end: CHSAddress {
            cylinder: 0,
            head: 0,
            sector: 0,
        },
        starting_lba: 0,
        size_in_lba: 0,
    };

    /// An entry with zeroed CHS fields
    pub fn new(boot_indicator: u8, type_code: u8, starting_lba: u32, size_in_lba: u32) -> Self {
        Self {
            boot_indicator,
            partition_type: MbrPartitionType::from_byte(type_code),
            starting_lba,
            size_in_lba,
            ..Self::EMPTY
        }
    }

    /// Parse one slot
    pub fn from_bytes(entry: &[u8; Self::SIZE]) -> Self {
        Self {
            boot_indicator: entry[0],
            chs_start: CHSAddress::from_bytes([entry[1], entry[2], entry[3]]),
            partition_type: MbrPartitionType::from_byte(entry[4]),
            chs_end: CHSAddress::from_bytes([entry[5], entry[6], entry[7]]),
            starting_lba: u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]),
            size_in_lba: u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]),
        }
    }

    /// Serialize one slot
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut entry = [0u8; Self::SIZE];
        entry[0] = self.boot_indicator;
        entry[1..4].copy_from_slice(&self.chs_start.to_bytes());
        entry[4] = self.partition_type.to_byte();
        entry[5..8].copy_from_slice(&self.chs_end.to_bytes());
        entry[8..12].copy_from_slice(&self.starting_lba.to_le_bytes());
        entry[12..16].copy_from_slice(&self.size_in_lba.to_le_bytes());
        entry
    }

    /// Type 0 or zero length
    pub fn is_empty(&self) -> bool {
        self.partition_type == MbrPartitionType::Empty || self.size_in_lba == 0
    }

    pub fn is_extended(&self) -> bool {
        self.partition_type.is_extended()
    }

    pub fn is_bootable(&self) -> bool {
        self.boot_indicator == 0x80
    }

    /// GPT protective entry: type 0xEE starting at LBA 1
    pub fn is_protective(&self) -> bool {
        self.partition_type == MbrPartitionType::GptProtective && self.starting_lba == 1
    }

    /// Boot indicator and size are sane for a slot with a non-zero type
    fn check(&self, slot: usize) -> Result<()> {
        if self.partition_type == MbrPartitionType::Empty {
            return Ok(());
        }

        if !matches!(self.boot_indicator, 0x00 | 0x80) {
            return Err(Error::invalid_zone_table(format!(
                "MBR slot {} has invalid boot indicator 0x{:02X}",
                slot + 1,
                self.boot_indicator
            )));
        }

        if self.size_in_lba == 0 {
            return Err(Error::invalid_zone_table(format!(
                "MBR slot {} has type 0x{:02X} but no sectors",
                slot + 1,
                self.partition_type.to_byte()
            )));
        }

        Ok(())
    }
}

/// A parsed MBR or EBR sector
///
/// # Structure
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0x000   440   Bootstrap code
/// 0x1B8   4     Disk signature
/// 0x1BE   16    Partition entry 1
/// 0x1CE   16    Partition entry 2
/// 0x1DE   16    Partition entry 3
/// 0x1EE   16    Partition entry 4
/// 0x1FE   2     Boot signature (0xAA55)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRecord {
    pub disk_signature: u32,
    pub entries: [MbrEntry; 4],
}

impl BootRecord {
    /// The boot signature that must be present at offset 0x1FE
    pub const BOOT_SIGNATURE: u16 = 0xAA55;

    /// Size of the MBR in bytes (always 512)
    pub const MBR_SIZE: usize = 512;

    /// Offset of the disk signature
    pub const DISK_SIGNATURE_OFFSET: usize = 0x1B8;

    /// Offset of the first partition entry
    pub const PARTITION_TABLE_OFFSET: usize = 0x1BE;

    /// Offset of the boot signature
    pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;

    /// Number of partition entries in MBR
    pub const NUM_PARTITIONS: usize = 4;

    /// A record with four empty slots
    pub fn empty() -> Self {
        Self {
            disk_signature: 0,
            entries: [MbrEntry::EMPTY; 4],
        }
    }

    /// Parse the first 512 bytes of a sector
    ///
    /// Fails with `InvalidZoneTable` if the sector is short or does not end
    /// in `0xAA55`. Slot contents are not checked; see [`Self::validate`].
    pub fn parse(sector: &[u8]) -> Result<Self> {
        if sector.len() < Self::MBR_SIZE {
            return Err(Error::invalid_zone_table(format!(
                "boot record needs {} bytes, got {}",
                Self::MBR_SIZE,
                sector.len()
            )));
        }

        let boot_signature = u16::from_le_bytes([
            sector[Self::BOOT_SIGNATURE_OFFSET],
            sector[Self::BOOT_SIGNATURE_OFFSET + 1],
        ]);
        if boot_signature != Self::BOOT_SIGNATURE {
            return Err(Error::invalid_zone_table(format!(
                "Invalid MBR boot signature: expected 0x{:04X}, got 0x{:04X}",
                Self::BOOT_SIGNATURE,
                boot_signature
            )));
        }

        let disk_signature = u32::from_le_bytes([
            sector[Self::DISK_SIGNATURE_OFFSET],
            sector[Self::DISK_SIGNATURE_OFFSET + 1],
            sector[Self::DISK_SIGNATURE_OFFSET + 2],
            sector[Self::DISK_SIGNATURE_OFFSET + 3],
        ]);

        let mut entries = [MbrEntry::EMPTY; 4];
        for (i, entry) in entries.iter_mut().enumerate() {
            let offset = Self::PARTITION_TABLE_OFFSET + i * MbrEntry::SIZE;
            let mut raw = [0u8; MbrEntry::SIZE];
            raw.copy_from_slice(&sector[offset..offset + MbrEntry::SIZE]);
            *entry = MbrEntry::from_bytes(&raw);
        }

        Ok(Self {
            disk_signature,
            entries,
        })
    }

    /// Check every slot with a non-zero type
    pub fn validate(&self) -> Result<()> {
        self.entries
            .iter()
            .enumerate()
            .try_for_each(|(slot, entry)| entry.check(slot))
    }

    /// Does any slot mark this disk as GPT?
    pub fn is_protective(&self) -> bool {
        self.entries.iter().any(MbrEntry::is_protective)
    }

    /// Write the table, disk signature and boot signature into a sector
    ///
    /// The bootstrap code area is left as it is.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `sector` is shorter than an MBR.
    pub fn write_to(&self, sector: &mut [u8]) -> Result<()> {
        if sector.len() < Self::MBR_SIZE {
            return Err(Error::invalid_parameter(format!(
                "MBR needs {} bytes, buffer has {}",
                Self::MBR_SIZE,
                sector.len()
            )));
        }

        sector[Self::DISK_SIGNATURE_OFFSET..Self::DISK_SIGNATURE_OFFSET + 4]
            .copy_from_slice(&self.disk_signature.to_le_bytes());
        for (i, entry) in self.entries.iter().enumerate() {
            let offset = Self::PARTITION_TABLE_OFFSET + i * MbrEntry::SIZE;
            sector[offset..offset + MbrEntry::SIZE].copy_from_slice(&entry.to_bytes());
        }
        sector[Self::BOOT_SIGNATURE_OFFSET..Self::BOOT_SIGNATURE_OFFSET + 2]
            .copy_from_slice(&Self::BOOT_SIGNATURE.to_le_bytes());

        Ok(())
    }
}
