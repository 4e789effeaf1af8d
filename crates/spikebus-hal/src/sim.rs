//! Deterministic host platform for tests and tooling
//!
//! In-memory flash with NOR semantics (erase to `0xFF`, programming only
//! clears bits), a manually advanced clock, a scratch bank, LED state and
//! watchdog/reset bookkeeping. Per-sector erase counters are kept so tests
//! can assert on wear behavior.

use crate::error::{HalError, Result};
use crate::flash::{FLASH_SIZE, PAGE_SIZE, SECTOR_SIZE};
use crate::platform::{Platform, SCRATCH_BANK_SIZE};

/// Host implementation of [`Platform`]
pub struct SimPlatform {
    clock_us: u64,
    flash: Vec<u8>,
    sector_erase_counts: Vec<u32>,
    scratch: [u32; SCRATCH_BANK_SIZE],
    led: (u8, u8, u8),
    free_memory: u32,
    interrupts_disabled: bool,
    /// Watchdog kicks observed
    pub watchdog_kicks: u32,
    /// Set once `request_reset` has been called
    pub reset_requested: bool,
    /// Flash program operations issued inside a critical section
    pub critical_program_ops: u32,
    /// Total flash program operations
    pub program_ops: u32,
    /// Total flash erase operations
    pub erase_ops: u32,
    /// Next flash program fails with `FlashProgram` when set
    pub fail_next_program: bool,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    /// Create a simulated platform with blank (erased) flash
    pub fn new() -> Self {
        Self {
            clock_us: 0,
            flash: vec![0xFF; FLASH_SIZE as usize],
            sector_erase_counts: vec![0; (FLASH_SIZE / SECTOR_SIZE) as usize],
            scratch: [0; SCRATCH_BANK_SIZE],
            led: (0, 0, 0),
            free_memory: 256 * 1024,
            interrupts_disabled: false,
            watchdog_kicks: 0,
            reset_requested: false,
            critical_program_ops: 0,
            program_ops: 0,
            erase_ops: 0,
            fail_next_program: false,
        }
    }

    /// Advance the simulated clock
    pub fn advance_us(&mut self, us: u32) {
        self.clock_us += us as u64;
    }

    /// Raw view of the flash contents
    pub fn flash_contents(&self) -> &[u8] {
        &self.flash
    }

    /// Erase cycles a sector has seen
    pub fn sector_erase_count(&self, sector: usize) -> u32 {
        self.sector_erase_counts.get(sector).copied().unwrap_or(0)
    }

    fn check_flash_range(&self, offset: u32, len: u32) -> Result<()> {
        if offset as u64 + len as u64 > FLASH_SIZE as u64 {
            return Err(HalError::FlashOutOfRange {
                offset,
                len,
                device_size: FLASH_SIZE,
            });
        }
        Ok(())
    }
}

impl Platform for SimPlatform {
    fn now_us(&self) -> u32 {
        self.clock_us as u32
    }

    fn uptime_ms(&self) -> u64 {
        self.clock_us / 1000
    }

    fn with_interrupts_disabled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was = self.interrupts_disabled;
        self.interrupts_disabled = true;
        let result = f(self);
        self.interrupts_disabled = was;
        result
    }

    fn flash_erase(&mut self, offset: u32, len: u32) -> Result<()> {
        self.check_flash_range(offset, len)?;
        if offset % SECTOR_SIZE != 0 || len % SECTOR_SIZE != 0 {
            return Err(HalError::EraseAlignment {
                offset,
                sector_size: SECTOR_SIZE,
            });
        }
        self.flash[offset as usize..(offset + len) as usize].fill(0xFF);
        let first = (offset / SECTOR_SIZE) as usize;
        for sector in first..first + (len / SECTOR_SIZE) as usize {
            self.sector_erase_counts[sector] += 1;
        }
        self.erase_ops += 1;
        Ok(())
    }

    fn flash_program(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.check_flash_range(offset, data.len() as u32)?;
        if (offset % PAGE_SIZE) as usize + data.len() > PAGE_SIZE as usize {
            return Err(HalError::PageOverrun {
                offset,
                page_size: PAGE_SIZE,
            });
        }
        if self.fail_next_program {
            self.fail_next_program = false;
            return Err(HalError::FlashProgram { offset });
        }
        // NOR cells only transition 1 -> 0 outside of an erase
        for (cell, byte) in self.flash[offset as usize..].iter_mut().zip(data) {
            *cell &= byte;
        }
        self.program_ops += 1;
        if self.interrupts_disabled {
            self.critical_program_ops += 1;
        }
        Ok(())
    }

    fn flash_read(&self, offset: u32, out: &mut [u8]) -> Result<()> {
        self.check_flash_range(offset, out.len() as u32)?;
        out.copy_from_slice(&self.flash[offset as usize..offset as usize + out.len()]);
        Ok(())
    }

    fn scratch_read(&self, index: usize) -> Result<u32> {
        self.scratch
            .get(index)
            .copied()
            .ok_or(HalError::ScratchIndex {
                index,
                bank_size: SCRATCH_BANK_SIZE,
            })
    }

    fn scratch_write(&mut self, index: usize, value: u32) -> Result<()> {
        match self.scratch.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(HalError::ScratchIndex {
                index,
                bank_size: SCRATCH_BANK_SIZE,
            }),
        }
    }

    fn watchdog_kick(&mut self) {
        self.watchdog_kicks += 1;
    }

    fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock_us += ms as u64 * 1000;
    }

    fn set_led(&mut self, r: u8, g: u8, b: u8) {
        self.led = (r, g, b);
    }

    fn led(&self) -> (u8, u8, u8) {
        self.led
    }

    fn free_memory_bytes(&self) -> u32 {
        self.free_memory
    }
}
