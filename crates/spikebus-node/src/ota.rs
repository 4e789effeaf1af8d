//! Over-the-air update session
//!
//! One session at a time reconstructs a firmware image in the PSRAM staging
//! buffer from chunks that may arrive out of order; a bitmap records which
//! chunks have landed. Verification is a CRC32 over the staged image, and
//! commit moves the image into the application flash partition under a
//! critical section, then proves it back out of flash.

use crate::error::{NodeError, Result};
use spikebus_hal::flash::{sectors_covering, APP_PARTITION_OFFSET, PAGE_SIZE, SECTOR_SIZE};
use spikebus_hal::{Platform, Psram};

/// Byte offset of the OTA staging buffer from the PSRAM base
pub const OTA_BUFFER_OFFSET: u32 = 0x0010_0000;

/// Maximum chunks per session, bounded by the bitmap
pub const MAX_CHUNKS: u32 = 4096;

/// Words in the chunk-presence bitmap
pub const BITMAP_WORDS: usize = (MAX_CHUNKS / 32) as usize;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    /// No update activity
    Idle,
    /// Update mode entered, no transfer announced yet
    ModeEntered,
    /// Transfer announced; chunks are landing
    Receiving,
    /// Staged image passed CRC verification
    Verified,
    /// Image programmed and proven in flash
    Committed,
}

/// State of the single allowed update session
#[derive(Debug)]
pub struct OtaSession {
    state: OtaState,
    firmware_size: u32,
    expected_crc32: u32,
    chunk_size: u32,
    total_chunks: u32,
    chunks_received: u32,
    bitmap: [u32; BITMAP_WORDS],
}

impl Default for OtaSession {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaSession {
    /// Create an idle session holder
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            firmware_size: 0,
            expected_crc32: 0,
            chunk_size: 0,
            total_chunks: 0,
            chunks_received: 0,
            bitmap: [0; BITMAP_WORDS],
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Whether a transfer is in flight (announced and not yet committed)
    pub fn is_active(&self) -> bool {
        matches!(self.state, OtaState::Receiving | OtaState::Verified)
    }

    /// Chunks that have landed at least once
    pub fn chunks_received(&self) -> u32 {
        self.chunks_received
    }

    /// Chunks announced at session start
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Announced firmware size in bytes
    pub fn firmware_size(&self) -> u32 {
        self.firmware_size
    }

    /// Presence bits for the announced chunks
    pub fn bitmap(&self) -> &[u32; BITMAP_WORDS] {
        &self.bitmap
    }

    /// Enter update mode, discarding any previous session
    pub fn enter_mode(&mut self) {
        self.clear();
        self.state = OtaState::ModeEntered;
    }

    /// Leave update mode and drop all session state
    pub fn exit(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.state = OtaState::Idle;
        self.firmware_size = 0;
        self.expected_crc32 = 0;
        self.chunk_size = 0;
        self.total_chunks = 0;
        self.chunks_received = 0;
        self.bitmap = [0; BITMAP_WORDS];
    }

    /// Announce a transfer; replaces any session already in flight.
    ///
    /// `available` is the staging space between the buffer offset and the
    /// end of PSRAM.
    pub fn start(
        &mut self,
        firmware_size: u32,
        expected_crc32: u32,
        chunk_size: u32,
        total_chunks: u32,
        available: u32,
    ) -> Result<()> {
        if chunk_size == 0 || firmware_size == 0 {
            return Err(NodeError::InvalidConfig {
                reason: "zero firmware or chunk size",
            });
        }
        if total_chunks > MAX_CHUNKS {
            return Err(NodeError::TooManyChunks {
                requested: total_chunks,
                limit: MAX_CHUNKS,
            });
        }
        if firmware_size > available {
            return Err(NodeError::ImageTooLarge {
                size: firmware_size,
                available,
            });
        }

        self.firmware_size = firmware_size;
        self.expected_crc32 = expected_crc32;
        self.chunk_size = chunk_size;
        self.total_chunks = total_chunks;
        self.chunks_received = 0;
        self.bitmap = [0; BITMAP_WORDS];
        self.state = OtaState::Receiving;
        log::info!(
            "Update session: {} bytes in {} chunks of {}",
            firmware_size,
            total_chunks,
            chunk_size
        );
        Ok(())
    }

    /// Stage one chunk. Chunks may repeat or arrive in any order; the
    /// received count moves only on first arrival.
    pub fn write_chunk(&mut self, psram: &mut Psram, chunk_num: u32, data: &[u8]) -> Result<()> {
        if !self.is_active() {
            return Err(NodeError::NoSession);
        }
        if chunk_num >= self.total_chunks {
            log::warn!("Rejecting chunk {} of {}", chunk_num, self.total_chunks);
            return Err(NodeError::BadChunk {
                chunk_num,
                total_chunks: self.total_chunks,
            });
        }
        if data.len() as u32 > self.chunk_size {
            return Err(NodeError::ChunkTooLarge {
                data_size: data.len() as u32,
                chunk_size: self.chunk_size,
            });
        }

        let addr = psram.layout().uncached_addr(OTA_BUFFER_OFFSET) + chunk_num * self.chunk_size;
        psram.writer().write(addr, data)?;

        let word = (chunk_num / 32) as usize;
        let bit = 1u32 << (chunk_num % 32);
        if self.bitmap[word] & bit == 0 {
            self.bitmap[word] |= bit;
            self.chunks_received += 1;
        }
        Ok(())
    }

    /// Whether every announced chunk has landed
    pub fn is_complete(&self) -> bool {
        if self.total_chunks == 0 {
            return false;
        }
        let full_words = (self.total_chunks / 32) as usize;
        for word in &self.bitmap[..full_words] {
            if *word != u32::MAX {
                return false;
            }
        }
        let tail_bits = self.total_chunks % 32;
        if tail_bits != 0 {
            let mask = (1u32 << tail_bits) - 1;
            if self.bitmap[full_words] & mask != mask {
                return false;
            }
        }
        true
    }

    /// CRC32 over the staged image
    pub fn compute_crc(&self, psram: &Psram) -> Result<u32> {
        let base = psram.layout().uncached_addr(OTA_BUFFER_OFFSET);
        let reader = psram.reader();
        let mut hasher = crc32fast::Hasher::new();
        let mut offset = 0u32;
        let mut block = [0u8; 256];
        while offset < self.firmware_size {
            let take = (self.firmware_size - offset).min(block.len() as u32) as usize;
            reader.read(base + offset, &mut block[..take])?;
            hasher.update(&block[..take]);
            offset += take as u32;
        }
        Ok(hasher.finalize())
    }

    /// Verify the staged image against the announced CRC.
    ///
    /// On success the session moves to `Verified`; on mismatch it stays
    /// open so the controller can re-send chunks.
    pub fn verify(&mut self, psram: &Psram) -> Result<u32> {
        if !self.is_active() {
            return Err(NodeError::NoSession);
        }
        let computed = self.compute_crc(psram)?;
        if computed == self.expected_crc32 {
            self.state = OtaState::Verified;
            Ok(computed)
        } else {
            log::warn!(
                "Staged image CRC {:08x} != expected {:08x}",
                computed,
                self.expected_crc32
            );
            Err(NodeError::CrcMismatch {
                expected: self.expected_crc32,
                computed,
            })
        }
    }

    /// Erase, program and prove the application partition.
    ///
    /// Interrupts stay disabled across erase and page programming only; the
    /// read-back CRC runs with interrupts restored. Any failure leaves the
    /// session open for the controller to drive recovery.
    pub fn commit<P: Platform>(&mut self, psram: &Psram, platform: &mut P) -> Result<()> {
        if !self.is_active() {
            return Err(NodeError::NoSession);
        }

        let size = self.firmware_size;
        let erase_len = sectors_covering(size) * SECTOR_SIZE;
        let staging = psram.layout().uncached_addr(OTA_BUFFER_OFFSET);

        let reader = psram.reader();
        platform.with_interrupts_disabled(|p| -> Result<()> {
            p.flash_erase(APP_PARTITION_OFFSET, erase_len)?;

            let mut offset = 0u32;
            while offset < size {
                // Final partial page is padded with the erased value
                let mut page = [0xFFu8; PAGE_SIZE as usize];
                let take = (size - offset).min(PAGE_SIZE) as usize;
                reader.read(staging + offset, &mut page[..take])?;
                p.flash_program(APP_PARTITION_OFFSET + offset, &page)?;
                offset += PAGE_SIZE;
            }
            Ok(())
        })?;

        let mut hasher = crc32fast::Hasher::new();
        let mut offset = 0u32;
        let mut block = [0u8; 256];
        while offset < size {
            let take = (size - offset).min(block.len() as u32) as usize;
            platform.flash_read(APP_PARTITION_OFFSET + offset, &mut block[..take])?;
            hasher.update(&block[..take]);
            offset += take as u32;
        }
        let computed = hasher.finalize();
        if computed != self.expected_crc32 {
            log::warn!(
                "Flash read-back CRC {:08x} != expected {:08x}",
                computed,
                self.expected_crc32
            );
            return Err(NodeError::CrcMismatch {
                expected: self.expected_crc32,
                computed,
            });
        }

        self.state = OtaState::Committed;
        log::info!("Firmware committed: {} bytes", size);
        Ok(())
    }
}
