//! Leaky Integrate-and-Fire engine for spikebus compute nodes
//!
//! One node simulates a small LIF population on a fixed 1 ms tick,
//! integrating spikes that arrive over the cluster bus and emitting spikes
//! for its peers. The engine is an owned value driven by an external loop:
//! no globals, no allocation in the hot path, bounded work per tick.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod neuron;
pub mod queue;
pub mod spike;
pub mod stats;
pub mod topology;

pub use engine::{LifEngine, DEFAULT_TIMESTEP_US};
pub use error::{Result, TopologyError};
pub use neuron::{
    decode_weight, encode_weight, Neuron, NeuronFlags, Synapse, DEFAULT_SYNAPSE_DELAY_US,
    MAX_SYNAPSES_PER_NEURON,
};
pub use queue::{SpikeQueue, SPIKE_QUEUE_CAPACITY};
pub use spike::{GlobalNeuronId, Spike};
pub use stats::EngineStats;
pub use topology::{ENTRY_SIZE, NEURON_TABLE_OFFSET, TABLE_END_MARKER};

/// Maximum neurons per node
pub const MAX_NEURONS: usize = 16;

/// Queued spikes integrated per tick; the rest stay for the next tick
pub const MAX_SPIKES_PER_TIMESTEP: usize = 100;

/// Capacity of the per-tick output spike buffer
pub const OUTPUT_BUFFER_CAPACITY: usize = 256;
