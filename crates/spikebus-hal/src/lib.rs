//! Platform capability layer for spikebus compute nodes
//!
//! A node core runs against exactly two hardware surfaces: the external
//! quad-SPI PSRAM (neuron table, OTA staging buffer) and the capabilities
//! bundled in the [`Platform`] trait (flash, scratch registers, watchdog,
//! critical sections, LED, clocks). Everything here is host-testable; the
//! `sim` feature provides a deterministic in-memory platform.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flash;
pub mod platform;
pub mod psram;

#[cfg(feature = "sim")]
pub mod sim;

pub use error::{HalError, Result};
pub use flash::{
    AppHeader, APP_HEADER_MAGIC, APP_HEADER_SIZE, APP_PARTITION_OFFSET, APP_PARTITION_SIZE,
    PAGE_SIZE, SECTOR_SIZE,
};
pub use platform::{
    Platform, SCRATCH_BANK_SIZE, SCRATCH_NODE_ID_INDEX, SCRATCH_NODE_ID_MAGIC,
};
pub use psram::{
    Psram, PsramLayout, PsramReader, PsramWriter, PSRAM_CACHED_BASE, PSRAM_SIZE,
    PSRAM_UNCACHED_BASE,
};

#[cfg(feature = "sim")]
pub use sim::SimPlatform;
