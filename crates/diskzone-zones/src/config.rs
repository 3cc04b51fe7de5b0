//! Discovery configuration

use diskzone_core::{Error, Result, MAX_PARTITION_COUNT, MAX_PARTITION_TABLE_BYTES};
use serde::{Deserialize, Serialize};

/// Default capacity of a discovery result
pub const DEFAULT_MAX_ENTRIES: usize = 128;

/// Knobs for a discovery run
///
/// # Example
///
/// ```rust
/// use diskzone_zones::DiscoveryConfig;
///
/// let config = DiscoveryConfig::default()
///     .with_max_entries(16)
///     .with_repair(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Capacity of the result; further partitions are silently dropped
    pub max_entries: usize,

    /// Rewrite a damaged GPT copy from its healthy counterpart
    pub repair: bool,

    /// Require a protective MBR in sector 0 before trusting a GPT
    pub require_protective_mbr: bool,

    /// Maximum number of EBRs followed in one extended partition
    pub max_ebr_chain: usize,

    /// Largest GPT partition entry array we will read
    pub max_entry_array_bytes: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            repair: true,
            require_protective_mbr: false,
            max_ebr_chain: MAX_PARTITION_COUNT,
            max_entry_array_bytes: MAX_PARTITION_TABLE_BYTES,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }

    pub fn with_protective_mbr_required(mut self, required: bool) -> Self {
        self.require_protective_mbr = required;
        self
    }

    pub fn with_max_ebr_chain(mut self, max_ebr_chain: usize) -> Self {
        self.max_ebr_chain = max_ebr_chain;
        self
    }

    pub fn with_max_entry_array_bytes(mut self, max_bytes: u64) -> Self {
        self.max_entry_array_bytes = max_bytes;
        self
    }

    /// Reject settings no discovery can run with
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::invalid_parameter("max_entries must be at least 1"));
        }

        if self.max_entry_array_bytes == 0 {
            return Err(Error::invalid_parameter(
                "max_entry_array_bytes must be at least 1",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.max_entries, 128);
        assert!(config.repair);
        assert!(!config.require_protective_mbr);
        assert_eq!(config.max_ebr_chain, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = DiscoveryConfig::default().with_max_entries(0);
        assert!(matches!(config.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: DiscoveryConfig = serde_json::from_str(r#"{"repair": false}"#).unwrap();
        assert!(!config.repair);
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
    }
}
