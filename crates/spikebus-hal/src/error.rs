//! Error types for the platform capability layer

use thiserror::Error;

/// Result type for HAL operations
pub type Result<T> = std::result::Result<T, HalError>;

/// Errors that can occur in the platform layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    /// Access outside a mapped memory window
    #[error("Address {addr:#010x} (+{len} bytes) outside window {window}")]
    OutOfRange {
        /// Requested start address
        addr: u32,
        /// Requested length in bytes
        len: usize,
        /// Name of the violated window
        window: &'static str,
    },

    /// Word access at an address that is not 32-bit aligned
    #[error("Misaligned word access at {addr:#010x}")]
    Misaligned {
        /// Offending address
        addr: u32,
    },

    /// Flash operation outside the device
    #[error("Flash range {offset:#010x}+{len:#x} exceeds device size {device_size:#x}")]
    FlashOutOfRange {
        /// Requested flash offset
        offset: u32,
        /// Requested length
        len: u32,
        /// Total flash size
        device_size: u32,
    },

    /// Flash erase not aligned to the sector size
    #[error("Flash erase at {offset:#010x} not aligned to {sector_size} byte sectors")]
    EraseAlignment {
        /// Requested erase offset
        offset: u32,
        /// Required sector size
        sector_size: u32,
    },

    /// Flash program spilling over a page boundary
    #[error("Flash program at {offset:#010x} crosses a {page_size} byte page boundary")]
    PageOverrun {
        /// Requested program offset
        offset: u32,
        /// Page size
        page_size: u32,
    },

    /// Hardware reported a program/erase failure
    #[error("Flash program failed at {offset:#010x}")]
    FlashProgram {
        /// Offset of the failed operation
        offset: u32,
    },

    /// Invalid application image header
    #[error("Invalid application header: {reason}")]
    InvalidHeader {
        /// Reason the header was rejected
        reason: &'static str,
    },

    /// Scratch register index outside the bank
    #[error("Scratch register index {index} out of range (bank size {bank_size})")]
    ScratchIndex {
        /// Requested index
        index: usize,
        /// Number of scratch registers
        bank_size: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HalError::OutOfRange {
            addr: 0x1500_0000,
            len: 16,
            window: "psram-uncached",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("psram-uncached"));

        let err = HalError::Misaligned { addr: 0x1500_0002 };
        assert!(format!("{}", err).contains("0x15000002"));
    }
}
