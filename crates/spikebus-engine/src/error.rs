//! Error types for the LIF engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised while loading a neuron table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// The table started with the end marker
    #[error("Neuron table is empty")]
    NoNeurons,

    /// An entry declared more synapses than a neuron can hold
    #[error("Neuron {local_id} declares {count} synapses (limit {limit})")]
    TooManySynapses {
        /// Local id of the offending entry
        local_id: u16,
        /// Declared synapse count
        count: u16,
        /// Per-neuron synapse limit
        limit: usize,
    },

    /// An entry's stored local id does not match its table position
    #[error("Entry at position {position} carries local id {local_id}")]
    EntryIdMismatch {
        /// Table position of the entry
        position: u16,
        /// Local id stored in the entry
        local_id: u16,
    },

    /// A parameter field was NaN, infinite or outside its domain
    #[error("Neuron {local_id}: invalid {field}")]
    InvalidParameter {
        /// Local id of the offending entry
        local_id: u16,
        /// Name of the rejected field
        field: &'static str,
    },

    /// PSRAM access failed while walking the table
    #[error("PSRAM error: {source}")]
    Psram {
        #[from]
        /// Source HAL error
        source: spikebus_hal::HalError,
    },
}
