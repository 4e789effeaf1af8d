//! Error types for the node runtime
//!
//! All of these are handled locally; the node never aborts. Failures become
//! negative reply frames, counters, or log lines.

use thiserror::Error;

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors that can occur in the node runtime
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    /// Frame too short for its opcode
    #[error("Malformed frame: opcode {opcode:#06x}, {length} bytes")]
    FrameMalformed {
        /// Opcode word of the offending frame
        opcode: u16,
        /// Byte length of the offending frame
        length: u16,
    },

    /// OTA chunk index outside the announced session
    #[error("Chunk {chunk_num} out of range (session has {total_chunks} chunks)")]
    BadChunk {
        /// Rejected chunk index
        chunk_num: u32,
        /// Chunks announced at session start
        total_chunks: u32,
    },

    /// Chunk payload longer than the session chunk size
    #[error("Chunk data of {data_size} bytes exceeds chunk size {chunk_size}")]
    ChunkTooLarge {
        /// Bytes carried by the frame
        data_size: u32,
        /// Session chunk size
        chunk_size: u32,
    },

    /// Firmware CRC verification failed
    #[error("CRC mismatch: expected {expected:08x}, computed {computed:08x}")]
    CrcMismatch {
        /// CRC announced at session start
        expected: u32,
        /// CRC computed over the buffer or flash
        computed: u32,
    },

    /// OTA operation without an active session
    #[error("No active update session")]
    NoSession,

    /// Session parameters exceed the staging buffer
    #[error("Firmware of {size} bytes exceeds available staging space {available}")]
    ImageTooLarge {
        /// Announced firmware size
        size: u32,
        /// Staging bytes available in PSRAM
        available: u32,
    },

    /// Session announces more chunks than the bitmap can track
    #[error("Session announces {requested} chunks (limit {limit})")]
    TooManyChunks {
        /// Announced chunk count
        requested: u32,
        /// Bitmap capacity
        limit: u32,
    },

    /// Invalid node configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration was rejected
        reason: &'static str,
    },

    /// Platform layer error
    #[error("HAL error: {source}")]
    Hal {
        #[from]
        /// Source HAL error
        source: spikebus_hal::HalError,
    },

    /// Engine topology error
    #[error("Topology error: {source}")]
    Topology {
        #[from]
        /// Source topology error
        source: spikebus_engine::TopologyError,
    },
}
