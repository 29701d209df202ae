//! Chip variants and per-chip bring-up parameters.

use std::fmt;

/// Supported radio chip variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipVariant {
    /// AW1722-class parts (e.g. XR819).
    #[default]
    Aw1722,
    /// AW1732-class parts (e.g. XR829).
    ///
    /// The boot ROM on these re-enters the sync handshake once after the
    /// jump command and has to be told to jump a second time.
    Aw1732,
}

impl ChipVariant {
    /// Whether the ROM comes back for a second handshake after the jump.
    pub fn resyncs_after_jump(self) -> bool {
        matches!(self, Self::Aw1732)
    }

    /// Look up a variant by name, accepting both module and SoC names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "aw1722" | "xr819" => Some(Self::Aw1722),
            "aw1732" | "xr829" => Some(Self::Aw1732),
            _ => None,
        }
    }
}

impl fmt::Display for ChipVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aw1722 => write!(f, "AW1722"),
            Self::Aw1732 => write!(f, "AW1732"),
        }
    }
}

/// Per-chip bring-up parameters.
#[derive(Debug, Clone)]
pub struct ChipConfig {
    /// Chip variant.
    pub variant: ChipVariant,
    /// RAM address the firmware image is written to.
    pub load_addr: u32,
    /// Entry point the chip jumps to after loading.
    pub jump_addr: u32,
}

impl ChipConfig {
    /// Default parameters for a variant. The stock firmware images load
    /// and start at address zero.
    pub fn new(variant: ChipVariant) -> Self {
        Self {
            variant,
            load_addr: 0,
            jump_addr: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_from_name() {
        assert_eq!(ChipVariant::from_name("aw1722"), Some(ChipVariant::Aw1722));
        assert_eq!(ChipVariant::from_name("XR829"), Some(ChipVariant::Aw1732));
        assert_eq!(ChipVariant::from_name("ws63"), None);
    }

    #[test]
    fn test_only_aw1732_resyncs() {
        assert!(!ChipVariant::Aw1722.resyncs_after_jump());
        assert!(ChipVariant::Aw1732.resyncs_after_jump());
    }

    #[test]
    fn test_default_config_loads_at_zero() {
        let config = ChipConfig::new(ChipVariant::Aw1732);
        assert_eq!(config.load_addr, 0);
        assert_eq!(config.jump_addr, 0);
    }
}
