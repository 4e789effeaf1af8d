//! Durable access to the external quad-SPI PSRAM
//!
//! The PSRAM is mapped at two aliases over the same physical memory: a cached
//! alias used for reads and an uncached alias used for writes. The memory
//! controller corrupts sub-word stores to the uncached alias, so every write
//! is issued as whole 32-bit words, with read-modify-write at unaligned
//! edges, followed by a release barrier.
//!
//! The two aliases are exposed as separate typed handles: [`PsramReader`]
//! resolves addresses in either window, [`PsramWriter`] only in the uncached
//! window. Out-of-range operations are logged no-ops at the call sites that
//! consume bus traffic; here they surface as [`HalError::OutOfRange`].

use crate::error::{HalError, Result};
use core::ptr;
use core::sync::atomic::{fence, Ordering};

/// Cached PSRAM alias base address
pub const PSRAM_CACHED_BASE: u32 = 0x1100_0000;

/// Uncached PSRAM alias base address
pub const PSRAM_UNCACHED_BASE: u32 = 0x1500_0000;

/// Size of the PSRAM part in bytes (8 MiB)
pub const PSRAM_SIZE: u32 = 8 * 1024 * 1024;

/// Address-space layout of the PSRAM aliases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsramLayout {
    /// Base of the cached (read) alias
    pub cached_base: u32,
    /// Base of the uncached (write) alias
    pub uncached_base: u32,
    /// Window size in bytes; must be a multiple of 4
    pub size: u32,
}

impl Default for PsramLayout {
    fn default() -> Self {
        Self {
            cached_base: PSRAM_CACHED_BASE,
            uncached_base: PSRAM_UNCACHED_BASE,
            size: PSRAM_SIZE,
        }
    }
}

impl PsramLayout {
    /// Absolute uncached-alias address for a byte offset into the part
    pub const fn uncached_addr(&self, offset: u32) -> u32 {
        self.uncached_base + offset
    }

    /// Absolute cached-alias address for a byte offset into the part
    pub const fn cached_addr(&self, offset: u32) -> u32 {
        self.cached_base + offset
    }

    fn offset_in(&self, base: u32, addr: u32, len: usize) -> Option<usize> {
        let off = addr.checked_sub(base)?;
        let end = (off as u64) + len as u64;
        if end <= self.size as u64 {
            Some(off as usize)
        } else {
            None
        }
    }
}

/// External PSRAM device
///
/// Owns the backing memory on the host (word-aligned so volatile word access
/// is always legal) or wraps the mapped window on the target.
pub struct Psram {
    layout: PsramLayout,
    base: *mut u32,
    _backing: Option<Box<[u32]>>,
}

// Single-owner access only; raw pointer is an implementation detail of the
// host backing.
unsafe impl Send for Psram {}

impl Psram {
    /// Create a host-backed PSRAM of `layout.size` bytes, zero-filled
    pub fn new_host(layout: PsramLayout) -> Self {
        assert!(layout.size % 4 == 0, "PSRAM size must be word-sized");
        let mut backing = vec![0u32; (layout.size / 4) as usize].into_boxed_slice();
        let base = backing.as_mut_ptr();
        Self {
            layout,
            base,
            _backing: Some(backing),
        }
    }

    /// Wrap an already-mapped PSRAM window.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `layout.size` bytes of word-aligned
    /// memory that stays mapped for the lifetime of the returned value.
    pub unsafe fn from_raw(layout: PsramLayout, base: *mut u32) -> Self {
        Self {
            layout,
            base,
            _backing: None,
        }
    }

    /// The configured alias layout
    pub fn layout(&self) -> PsramLayout {
        self.layout
    }

    /// Read-only handle resolving addresses in either alias window
    pub fn reader(&self) -> PsramReader<'_> {
        PsramReader { psram: self }
    }

    /// Write-only handle resolving addresses in the uncached window
    pub fn writer(&mut self) -> PsramWriter<'_> {
        PsramWriter { psram: self }
    }

    fn load_word(&self, word_index: usize) -> u32 {
        unsafe { ptr::read_volatile(self.base.add(word_index)) }
    }

    fn store_word(&self, word_index: usize, value: u32) {
        unsafe { ptr::write_volatile(self.base.add(word_index), value) }
    }

    fn resolve_read(&self, addr: u32, len: usize) -> Result<usize> {
        self.layout
            .offset_in(self.layout.uncached_base, addr, len)
            .or_else(|| self.layout.offset_in(self.layout.cached_base, addr, len))
            .ok_or(HalError::OutOfRange {
                addr,
                len,
                window: "psram",
            })
    }

    fn resolve_write(&self, addr: u32, len: usize) -> Result<usize> {
        self.layout
            .offset_in(self.layout.uncached_base, addr, len)
            .ok_or(HalError::OutOfRange {
                addr,
                len,
                window: "psram-uncached",
            })
    }

    fn write_bytes(&self, mut offset: usize, mut src: &[u8]) {
        // Head: partial word up to the next boundary
        let head = offset % 4;
        if head != 0 && !src.is_empty() {
            let take = (4 - head).min(src.len());
            let wi = offset / 4;
            let mut bytes = self.load_word(wi).to_le_bytes();
            bytes[head..head + take].copy_from_slice(&src[..take]);
            self.store_word(wi, u32::from_le_bytes(bytes));
            offset += take;
            src = &src[take..];
        }

        // Body: whole words
        while src.len() >= 4 {
            let mut word = [0u8; 4];
            word.copy_from_slice(&src[..4]);
            self.store_word(offset / 4, u32::from_le_bytes(word));
            offset += 4;
            src = &src[4..];
        }

        // Tail: read-modify-store of the final partial word
        if !src.is_empty() {
            let wi = offset / 4;
            let mut bytes = self.load_word(wi).to_le_bytes();
            bytes[..src.len()].copy_from_slice(src);
            self.store_word(wi, u32::from_le_bytes(bytes));
        }

        // Release barrier: all stores visible before any subsequent access.
        fence(Ordering::Release);
    }

    fn read_bytes(&self, mut offset: usize, mut out: &mut [u8]) {
        let head = offset % 4;
        if head != 0 && !out.is_empty() {
            let take = (4 - head).min(out.len());
            let bytes = self.load_word(offset / 4).to_le_bytes();
            out[..take].copy_from_slice(&bytes[head..head + take]);
            offset += take;
            out = &mut out[take..];
        }

        while out.len() >= 4 {
            let word = self.load_word(offset / 4).to_le_bytes();
            out[..4].copy_from_slice(&word);
            offset += 4;
            out = &mut out[4..];
        }

        if !out.is_empty() {
            let bytes = self.load_word(offset / 4).to_le_bytes();
            let take = out.len();
            out.copy_from_slice(&bytes[..take]);
        }

        fence(Ordering::Acquire);
    }
}

/// Read handle over the PSRAM (cached or uncached alias)
pub struct PsramReader<'a> {
    psram: &'a Psram,
}

impl PsramReader<'_> {
    /// Word-wise read of `out.len()` bytes starting at `addr`
    pub fn read(&self, addr: u32, out: &mut [u8]) -> Result<()> {
        let offset = self.psram.resolve_read(addr, out.len()).map_err(|e| {
            log::warn!("PSRAM read rejected: {}", e);
            e
        })?;
        self.psram.read_bytes(offset, out);
        Ok(())
    }

    /// Single aligned word read
    pub fn read_word(&self, addr: u32) -> Result<u32> {
        if addr % 4 != 0 {
            return Err(HalError::Misaligned { addr });
        }
        let offset = self.psram.resolve_read(addr, 4)?;
        let value = self.psram.load_word(offset / 4);
        fence(Ordering::Acquire);
        Ok(value)
    }
}

/// Write handle over the PSRAM (uncached alias only)
pub struct PsramWriter<'a> {
    psram: &'a mut Psram,
}

impl PsramWriter<'_> {
    /// Word-wise write of `data` starting at `addr`.
    ///
    /// Out-of-range writes are rejected without touching memory.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let offset = self.psram.resolve_write(addr, data.len()).map_err(|e| {
            log::warn!("PSRAM write rejected: {}", e);
            e
        })?;
        self.psram.write_bytes(offset, data);
        Ok(())
    }

    /// Single aligned word store
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        if addr % 4 != 0 {
            return Err(HalError::Misaligned { addr });
        }
        let offset = self.psram.resolve_write(addr, 4)?;
        self.psram.store_word(offset / 4, value);
        fence(Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_psram() -> Psram {
        Psram::new_host(PsramLayout {
            cached_base: 0x1100_0000,
            uncached_base: 0x1500_0000,
            size: 4096,
        })
    }

    #[test]
    fn test_aligned_roundtrip() {
        let mut psram = small_psram();
        let data = [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        psram.writer().write(0x1500_0000, &data).unwrap();

        let mut out = [0u8; 8];
        psram.reader().read(0x1500_0000, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_unaligned_write_preserves_neighbors() {
        let mut psram = small_psram();
        psram.writer().write(0x1500_0000, &[0xAA; 12]).unwrap();

        // Write 5 bytes starting at offset 3: head RMW, one whole word, tail RMW
        psram.writer().write(0x1500_0003, &[1, 2, 3, 4, 5]).unwrap();

        let mut out = [0u8; 12];
        psram.reader().read(0x1500_0000, &mut out).unwrap();
        assert_eq!(out, [0xAA, 0xAA, 0xAA, 1, 2, 3, 4, 5, 0xAA, 0xAA, 0xAA, 0xAA]);
    }

    #[test]
    fn test_read_through_cached_alias() {
        let mut psram = small_psram();
        psram.writer().write(0x1500_0010, &[9, 8, 7]).unwrap();

        let mut out = [0u8; 3];
        psram.reader().read(0x1100_0010, &mut out).unwrap();
        assert_eq!(out, [9, 8, 7]);
    }

    #[test]
    fn test_write_rejects_cached_alias() {
        let mut psram = small_psram();
        let err = psram.writer().write(0x1100_0000, &[0]).unwrap_err();
        assert!(matches!(err, HalError::OutOfRange { .. }));
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let mut psram = small_psram();
        assert!(psram.writer().write(0x1500_0FFE, &[0; 4]).is_err());
        assert!(psram.reader().read_word(0x1500_1000).is_err());

        // Nothing was clobbered near the end of the window
        let mut out = [0u8; 2];
        psram.reader().read(0x1500_0FFE, &mut out).unwrap();
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn test_word_access() {
        let mut psram = small_psram();
        psram.writer().write_word(0x1500_0020, 0xDEAD_BEEF).unwrap();
        assert_eq!(psram.reader().read_word(0x1500_0020).unwrap(), 0xDEAD_BEEF);

        // Byte view is little-endian
        let mut out = [0u8; 4];
        psram.reader().read(0x1500_0020, &mut out).unwrap();
        assert_eq!(out, [0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_misaligned_word_access() {
        let mut psram = small_psram();
        assert_eq!(
            psram.writer().write_word(0x1500_0002, 0),
            Err(HalError::Misaligned { addr: 0x1500_0002 })
        );
    }
}
